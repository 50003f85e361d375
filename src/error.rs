use thiserror::Error;

/// Fatal: the PLC configuration file failed to parse or validate.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate plc_name '{0}' in configuration")]
    DuplicatePlcName(String),
    #[error("duplicate tag_name '{tag}' within plc '{plc}'")]
    DuplicateTagName { plc: String, tag: String },
    #[error("plc '{0}' has an empty plc_name")]
    EmptyPlcName(usize),
    #[error("tag #{index} of plc '{plc}' has an empty tag_name")]
    EmptyTagName { plc: String, index: usize },
    #[error("plc '{0}' has no configured plc_ip")]
    MissingIp(String),
    #[error("plc '{plc}' tag '{tag}' has an invalid STRING length (must be > 0)")]
    InvalidStringLength { plc: String, tag: String },
}

/// The reason an acquisition loop stopped, reported to the supervisor.
///
/// Per-cycle failures (FINS reads, OPC UA writes, CSV writes) don't get
/// their own error types: they're handled locally in `acquisition.rs` as
/// plain `String` reasons from the `FinsClient`/sink boundaries and only
/// escalate to a `StopReason` once a threshold is crossed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Clean shutdown requested by the operator or the supervisor.
    OperatorCancel,
    /// FINS could never be reached at loop startup.
    FinsUnreachable,
    /// `consecutive_read_failures` reached the threshold.
    ReadThreshold,
    /// `consecutive_write_failures` reached the threshold (OPC UA only; CSV never counts).
    WriteThreshold,
}
