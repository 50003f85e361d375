//! The per-PLC acquisition loop: `INIT -> FINS_CONNECTING -> OPCUA_CONNECTING
//! -> RUNNING -> DRAINING -> TERMINATED`, one independent OS thread per PLC,
//! generalized from the reference crate's thread-per-task model in `tasks.rs`.

use crate::coerce::{decode, Value};
use crate::config::{DataType, PlcConfig, TagMapping};
use crate::error::StopReason;
use crate::fins::FinsClient;
use crate::planner::{plan, ReadGroup};
use crate::plc_log::PlcLog;
use crate::sample::{Sample, HEARTBEAT_TAG};
use crate::sinks::{CsvSink, NodeMapper, OpcuaSink};
use bmart_derive::EnumStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;

const FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumStr)]
pub enum LoopState {
    Init,
    FinsConnecting,
    OpcuaConnecting,
    Running,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumStr)]
pub enum SinkMode {
    OpcuaOnly,
    CsvOnly,
    Dual,
}

impl SinkMode {
    #[must_use]
    pub fn for_state(opcua_up: bool, csv_flag: bool) -> Self {
        match (opcua_up, csv_flag) {
            (true, true) => SinkMode::Dual,
            (true, false) => SinkMode::OpcuaOnly,
            (false, _) => SinkMode::CsvOnly,
        }
    }
}

/// Everything one acquisition loop owns exclusively: its FINS connection,
/// its CSV file, and its runtime counters. Nothing here is shared with any
/// other loop.
pub struct AcquisitionLoop {
    plc_name: String,
    opcua_url: String,
    tags: Vec<TagMapping>,
    sleep_interval: Duration,
    csv_flag: bool,
    fins: Arc<dyn FinsClient>,
    nodes_path: PathBuf,
    csv: CsvSink,
    log: PlcLog,
    cancel: Arc<AtomicBool>,
    failure_tx: SyncSender<(String, StopReason)>,
}

impl AcquisitionLoop {
    #[must_use]
    pub fn new(
        config: &PlcConfig,
        fins: Arc<dyn FinsClient>,
        csv_flag: bool,
        plc_data_root: &Path,
        log_root: &Path,
        nodes_path: PathBuf,
        cancel: Arc<AtomicBool>,
        failure_tx: SyncSender<(String, StopReason)>,
    ) -> Self {
        // HEARTBEAT is a synthetic sink column, never a PLC read; if it is
        // declared as a tag anyway, drop it here so it is never planned or
        // read and is only ever produced by `set_heartbeat`.
        let tags = config
            .address_mappings
            .iter()
            .filter(|t| t.tag_name != HEARTBEAT_TAG)
            .cloned()
            .collect();
        Self {
            plc_name: config.plc_name.clone(),
            opcua_url: config.opcua_url.clone(),
            tags,
            sleep_interval: Duration::from_secs_f64(config.sleep_interval.max(0.0)),
            csv_flag,
            fins,
            nodes_path,
            csv: CsvSink::new(plc_data_root, &config.plc_name),
            log: PlcLog::new(log_root, &config.plc_name),
            cancel,
            failure_tx,
        }
    }

    fn post(&self, reason: StopReason) {
        let _ = self.failure_tx.send((self.plc_name.clone(), reason));
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Runs the loop to completion, consuming `self`. Returns the reason it
    /// stopped; the caller (the supervisor thread wrapper) uses this to
    /// decide the process exit code.
    #[must_use]
    pub fn run(mut self) -> StopReason {
        self.log.info(format!("state={}", LoopState::FinsConnecting));
        if let Err(reason) = self.connect_fins() {
            self.csv.remove_if_created();
            self.post(reason.clone());
            self.log.info(format!("state={}", LoopState::Terminated));
            return reason;
        }

        self.log.info(format!("state={}", LoopState::OpcuaConnecting));
        let (mut opcua_sink, mut opcua_up) = self.connect_opcua();

        self.log.info(format!("state={}", LoopState::Running));
        let groups = plan(&self.tags);
        let mut consecutive_read_failures = 0u32;
        let mut consecutive_write_failures = 0u32;

        let stop_reason = loop {
            if self.cancelled() {
                break StopReason::OperatorCancel;
            }

            let (sample, any_read_ok) = self.run_cycle(&groups);
            if any_read_ok {
                consecutive_read_failures = 0;
            } else {
                consecutive_read_failures += 1;
            }

            if opcua_up {
                if let Some(sink) = opcua_sink.as_ref() {
                    let to_write: Vec<(&str, &Value)> = sample
                        .iter()
                        .filter_map(|(name, v)| v.map(|value| (name, value)))
                        .collect();
                    match sink.write_sample(&to_write) {
                        Ok(()) => consecutive_write_failures = 0,
                        Err(e) => {
                            self.log
                                .warn(format!("opc ua write failed, demoting to csv-only: {e}"));
                            opcua_up = false;
                            consecutive_write_failures += 1;
                        }
                    }
                }
            }

            if self.csv_flag || !opcua_up {
                if let Err(e) = self.csv.write_row(&sample) {
                    self.log.warn(format!("csv write failed: {e}"));
                }
            }

            self.log.info(format!(
                "cycle complete mode={}",
                SinkMode::for_state(opcua_up, self.csv_flag)
            ));

            if consecutive_read_failures >= FAILURE_THRESHOLD {
                break StopReason::ReadThreshold;
            }
            if consecutive_write_failures >= FAILURE_THRESHOLD {
                break StopReason::WriteThreshold;
            }
            if self.cancelled() {
                break StopReason::OperatorCancel;
            }
            std::thread::sleep(self.sleep_interval);
        };

        self.log.info(format!("state={}", LoopState::Draining));
        opcua_sink = None;
        self.fins.disconnect();
        self.post(stop_reason.clone());
        self.log.info(format!("state={}", LoopState::Terminated));
        stop_reason
    }

    fn connect_fins(&mut self) -> Result<(), StopReason> {
        if let Err(reason) = self.fins.connect() {
            self.log.error(format!("fins connect failed: {reason}"));
            return Err(StopReason::FinsUnreachable);
        }
        if let Err(reason) = self.fins.cpu_unit_details_read() {
            self.log.error(format!("fins unreachable: {reason}"));
            self.fins.disconnect();
            return Err(StopReason::FinsUnreachable);
        }
        Ok(())
    }

    fn connect_opcua(&mut self) -> (Option<OpcuaSink>, bool) {
        match NodeMapper::wait_and_load(&self.nodes_path) {
            Ok(mapper) => match OpcuaSink::connect(&self.opcua_url, mapper) {
                Ok(sink) => (Some(sink), true),
                Err(e) => {
                    self.log
                        .warn(format!("opc ua connect failed, continuing csv-only: {e}"));
                    (None, false)
                }
            },
            Err(e) => {
                self.log
                    .warn(format!("node descriptor unavailable, continuing csv-only: {e}"));
                (None, false)
            }
        }
    }

    /// One read-decode-buffer pass over every planned group, in declared
    /// order. Returns the filled sample (heartbeat included) and whether at
    /// least one read in the cycle succeeded.
    fn run_cycle(&mut self, groups: &[ReadGroup]) -> (Sample, bool) {
        let mut sample = Sample::new();
        let mut any_ok = false;
        let mut plc_cycle_ok = true;

        for group in groups {
            match group {
                ReadGroup::Batch(tags) => {
                    let area = tags[0].memory_area;
                    let start = tags[0].address;
                    let total_words: u16 = tags.iter().map(|t| t.data_type.word_width()).sum();
                    match self.fins.batch_read(area, start, total_words) {
                        Ok(words) => {
                            any_ok = true;
                            let mut offset = 0usize;
                            for tag in tags {
                                let width = tag.data_type.word_width() as usize;
                                let slice = &words[offset..offset + width];
                                let value = self.decode_tag(tag, slice);
                                sample.insert(tag.tag_name.clone(), Some(value));
                                offset += width;
                            }
                        }
                        Err(e) => {
                            plc_cycle_ok = false;
                            self.log
                                .warn(format!("batch read failed ({e}); falling back to individual reads"));
                            self.read_individually(tags, &mut sample, &mut any_ok, &mut plc_cycle_ok);
                        }
                    }
                }
                ReadGroup::Single(tag) => {
                    self.read_individually(
                        std::slice::from_ref(tag),
                        &mut sample,
                        &mut any_ok,
                        &mut plc_cycle_ok,
                    );
                }
            }
        }

        sample.set_heartbeat(plc_cycle_ok);
        (sample, any_ok)
    }

    /// Decodes one tag's words, warning on a malformed BOOL word (nonzero but
    /// not exactly 1) before it gets coerced to `false`.
    fn decode_tag(&mut self, tag: &TagMapping, words: &[u16]) -> Value {
        if tag.data_type == DataType::Bool && words[0] != 0 && words[0] != 1 {
            self.log.warn(format!(
                "tag '{}': malformed BOOL word {:#06x}, coercing to false",
                tag.tag_name, words[0]
            ));
        }
        decode(tag.data_type, words)
    }

    fn read_individually(
        &mut self,
        tags: &[TagMapping],
        sample: &mut Sample,
        any_ok: &mut bool,
        plc_cycle_ok: &mut bool,
    ) {
        for tag in tags {
            match self.fins.read(tag.memory_area, tag.address, tag.data_type.word_width()) {
                Ok(words) => {
                    *any_ok = true;
                    let value = self.decode_tag(tag, &words);
                    sample.insert(tag.tag_name.clone(), Some(value));
                }
                Err(e) => {
                    *plc_cycle_ok = false;
                    self.log.warn(format!("read failed for tag '{}': {e}", tag.tag_name));
                    sample.insert(tag.tag_name.clone(), None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DataType, MemoryArea};
    use crate::fins::fake::FakeFinsClient;

    fn tag(name: &str, addr: u16, dt: DataType) -> TagMapping {
        TagMapping {
            tag_name: name.to_string(),
            memory_area: MemoryArea::D,
            address: addr,
            data_type: dt,
        }
    }

    fn test_loop(tags: Vec<TagMapping>, fake: Arc<FakeFinsClient>) -> (AcquisitionLoop, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = PlcConfig {
            plc_name: "line1".to_string(),
            plc_ip: "10.0.0.5".to_string(),
            opcua_url: "opc.tcp://x:4840".to_string(),
            sleep_interval: 0.0,
            address_mappings: tags,
        };
        let (tx, _rx) = std::sync::mpsc::sync_channel(1);
        let fins: Arc<dyn FinsClient> = fake;
        let loop_ = AcquisitionLoop::new(
            &config,
            fins,
            false,
            dir.path(),
            dir.path(),
            dir.path().join("nodes.json"),
            Arc::new(AtomicBool::new(false)),
            tx,
        );
        (loop_, dir)
    }

    #[test]
    fn a_full_batch_cycle_decodes_in_declared_order() {
        let fake = Arc::new(FakeFinsClient::new());
        fake.set(MemoryArea::D, 100, 10);
        fake.set(MemoryArea::D, 101, 20);
        fake.set(MemoryArea::D, 102, 30);
        fake.set(MemoryArea::D, 200, 40);
        let tags = vec![
            tag("t1", 100, DataType::Int16),
            tag("t2", 101, DataType::Int16),
            tag("t3", 102, DataType::Int16),
            tag("t4", 200, DataType::Int16),
        ];
        let (mut loop_, _dir) = test_loop(tags, fake);
        let groups = plan(&loop_.tags);
        let (sample, any_ok) = loop_.run_cycle(&groups);
        assert!(any_ok);
        assert_eq!(sample.get("t1"), Some(&Value::Int16(10)));
        assert_eq!(sample.get("t2"), Some(&Value::Int16(20)));
        assert_eq!(sample.get("t3"), Some(&Value::Int16(30)));
        assert_eq!(sample.get("t4"), Some(&Value::Int16(40)));
        assert_eq!(sample.get("HEARTBEAT"), Some(&Value::Bool(true)));
    }

    #[test]
    fn batch_failure_falls_back_to_individual_reads() {
        let fake = Arc::new(FakeFinsClient::new());
        fake.set(MemoryArea::D, 100, 10);
        fake.set(MemoryArea::D, 101, 20);
        *fake.fail_batch.lock() = true;
        let tags = vec![tag("t1", 100, DataType::Int16), tag("t2", 101, DataType::Int16)];
        let (mut loop_, _dir) = test_loop(tags, Arc::clone(&fake));
        let groups = plan(&loop_.tags);
        let (sample, any_ok) = loop_.run_cycle(&groups);
        assert!(any_ok);
        assert_eq!(sample.get("t1"), Some(&Value::Int16(10)));
        assert_eq!(sample.get("t2"), Some(&Value::Int16(20)));
        assert_eq!(sample.get("HEARTBEAT"), Some(&Value::Bool(true)));
    }

    #[test]
    fn read_failure_leaves_tag_null_and_heartbeat_false() {
        let fake = Arc::new(FakeFinsClient::new());
        *fake.fail_reads.lock() = true;
        let tags = vec![tag("t1", 100, DataType::Int16), tag("t2", 101, DataType::Int16)];
        let (mut loop_, _dir) = test_loop(tags, fake);
        let groups = plan(&loop_.tags);
        let (sample, any_ok) = loop_.run_cycle(&groups);
        assert!(!any_ok);
        assert!(sample.get("t1").is_none());
        assert_eq!(sample.get("HEARTBEAT"), Some(&Value::Bool(false)));
    }

    #[test]
    fn declared_heartbeat_tag_is_never_planned_or_read() {
        let fake = Arc::new(FakeFinsClient::new());
        fake.set(MemoryArea::D, 100, 10);
        let tags = vec![
            tag("t1", 100, DataType::Int16),
            tag(HEARTBEAT_TAG, 200, DataType::Bool),
        ];
        let (mut loop_, _dir) = test_loop(tags, fake);
        assert_eq!(loop_.tags.len(), 1);
        let groups = plan(&loop_.tags);
        let (sample, any_ok) = loop_.run_cycle(&groups);
        assert!(any_ok);
        assert_eq!(sample.get("t1"), Some(&Value::Int16(10)));
        assert_eq!(sample.get("HEARTBEAT"), Some(&Value::Bool(true)));
        assert_eq!(sample.tag_names(), vec!["t1", "HEARTBEAT"]);
    }

    #[test]
    fn malformed_bool_word_coerces_to_false_and_warns() {
        let fake = Arc::new(FakeFinsClient::new());
        fake.set(MemoryArea::D, 100, 7);
        let tags = vec![tag("flag", 100, DataType::Bool)];
        let (mut loop_, _dir) = test_loop(tags, fake);
        let groups = plan(&loop_.tags);
        let (sample, any_ok) = loop_.run_cycle(&groups);
        assert!(any_ok);
        assert_eq!(sample.get("flag"), Some(&Value::Bool(false)));
    }

    #[test]
    fn fins_unreachable_leaves_no_csv_artifact() {
        let fake = Arc::new(FakeFinsClient::new());
        *fake.reachable.lock() = false;
        let (loop_, _dir) = test_loop(vec![tag("t1", 100, DataType::Int16)], fake);
        let csv_path = loop_.csv.path();
        let reason = loop_.run();
        assert_eq!(reason, StopReason::FinsUnreachable);
        assert!(!csv_path.exists());
    }
}
