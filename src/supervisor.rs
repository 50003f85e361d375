//! Spawns one acquisition loop per configured PLC and owns the shared
//! failure channel, generalized from the reference crate's `tasks::spawn`
//! plus `WAIT_HANDLES`/`shutdown()` join pattern in `tasks.rs`.

use crate::acquisition::AcquisitionLoop;
use crate::config::PlcConfig;
use crate::error::StopReason;
use crate::fins::{FinsAdapter, FinsClient};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Process exit codes, per the CLI surface: 0 normal, 1 config error (the
/// caller maps that before the supervisor is even constructed), 2 a loop
/// never reached the PLC, 3 a loop breached its failure threshold, 130
/// operator interrupt.
pub const EXIT_OK: i32 = 0;
pub const EXIT_FINS_UNREACHABLE: i32 = 2;
pub const EXIT_THRESHOLD: i32 = 3;

pub struct Supervisor {
    handles: Vec<(String, JoinHandle<StopReason>)>,
    failure_rx: mpsc::Receiver<(String, StopReason)>,
}

impl Supervisor {
    /// Spawns one OS thread per PLC, each running its own `AcquisitionLoop`
    /// to completion. No loop shares mutable state with another; the
    /// failure channel is the only cross-thread communication path.
    pub fn spawn(
        plcs: &[PlcConfig],
        csv_flag: bool,
        plc_data_root: &Path,
        log_root: &Path,
        nodes_path: &Path,
        cancel: &Arc<AtomicBool>,
    ) -> Self {
        let (tx, rx) = mpsc::sync_channel(plcs.len().max(1));
        let mut handles = Vec::with_capacity(plcs.len());

        for plc in plcs {
            let fins: Arc<dyn FinsClient> = match plc.plc_ip.parse::<Ipv4Addr>() {
                Ok(ip) => Arc::new(FinsAdapter::new(ip, 1, 0)),
                Err(e) => {
                    log::error!("plc '{}' has an invalid plc_ip '{}': {e}", plc.plc_name, plc.plc_ip);
                    continue;
                }
            };
            let loop_ = AcquisitionLoop::new(
                plc,
                fins,
                csv_flag,
                plc_data_root,
                log_root,
                nodes_path.to_path_buf(),
                Arc::clone(cancel),
                tx.clone(),
            );
            let name = plc.plc_name.clone();
            let handle = std::thread::Builder::new()
                .name(format!("acq-{name}"))
                .spawn(move || loop_.run())
                .expect("failed to spawn acquisition thread");
            handles.push((name, handle));
        }

        Self {
            handles,
            failure_rx: rx,
        }
    }

    /// Blocks until every spawned loop has terminated, draining the
    /// failure channel for logging as it goes, then computes the process
    /// exit code from the worst outcome observed.
    pub fn join_all(self) -> i32 {
        let count = self.handles.len();
        let mut reasons: HashMap<String, StopReason> = HashMap::new();
        for _ in 0..count {
            if let Ok((plc_name, reason)) = self.failure_rx.recv() {
                log::info!("plc '{plc_name}' stopped: {reason:?}");
                reasons.insert(plc_name, reason);
            }
        }
        for (name, handle) in self.handles {
            if let Err(e) = handle.join() {
                log::error!("acquisition thread for '{name}' panicked: {e:?}");
            }
        }
        exit_code_for(reasons.values())
    }
}

fn exit_code_for<'a>(reasons: impl Iterator<Item = &'a StopReason>) -> i32 {
    let mut code = EXIT_OK;
    for reason in reasons {
        code = match reason {
            StopReason::OperatorCancel => code.max(EXIT_OK),
            StopReason::FinsUnreachable => code.max(EXIT_FINS_UNREACHABLE),
            StopReason::ReadThreshold | StopReason::WriteThreshold => code.max(EXIT_THRESHOLD),
        };
    }
    code
}
