use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

fn default_sleep_interval() -> f64 {
    0.01
}

/// The PLC memory areas addressable over FINS. Kept as a closed enum so every
/// new variant forces every match on it (planner, coercion) to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemoryArea {
    /// Data memory (D).
    D,
    /// Holding memory (H).
    H,
    /// Work area (W).
    W,
    /// Common I/O (C).
    C,
    /// Auxiliary area (A).
    A,
}

/// The wire-level data types a tag can declare. `String` carries its byte
/// length `n`; words needed is `ceil(n / 2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum DataType {
    Bool,
    Channel,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Real32,
    String { n: u16 },
}

impl DataType {
    /// Number of consecutive 16-bit words this type occupies on the wire.
    #[must_use]
    pub fn word_width(self) -> u16 {
        match self {
            DataType::Bool | DataType::Channel | DataType::Int16 | DataType::Uint16 => 1,
            DataType::Int32 | DataType::Uint32 | DataType::Real32 => 2,
            DataType::String { n } => n.div_ceil(2).max(1),
        }
    }
}

/// One declared tag: where to read it, and how to interpret the words.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagMapping {
    pub tag_name: String,
    pub memory_area: MemoryArea,
    pub address: u16,
    pub data_type: DataType,
}

/// One PLC entry from the top-level configuration array.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlcConfig {
    pub plc_name: String,
    pub plc_ip: String,
    pub opcua_url: String,
    #[serde(default = "default_sleep_interval")]
    pub sleep_interval: f64,
    #[serde(default)]
    pub address_mappings: Vec<TagMapping>,
}

/// The full bridge configuration: a flat JSON array of PLCs.
pub struct BridgeConfig;

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Vec<PlcConfig>, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let plcs: Vec<PlcConfig> =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        validate(&plcs)?;
        Ok(plcs)
    }
}

fn validate(plcs: &[PlcConfig]) -> Result<(), ConfigError> {
    let mut seen_plcs = HashSet::new();
    for (idx, plc) in plcs.iter().enumerate() {
        if plc.plc_name.is_empty() {
            return Err(ConfigError::EmptyPlcName(idx));
        }
        if plc.plc_ip.is_empty() {
            return Err(ConfigError::MissingIp(plc.plc_name.clone()));
        }
        if !seen_plcs.insert(plc.plc_name.clone()) {
            return Err(ConfigError::DuplicatePlcName(plc.plc_name.clone()));
        }
        let mut seen_tags = HashSet::new();
        for (tidx, tag) in plc.address_mappings.iter().enumerate() {
            if tag.tag_name.is_empty() {
                return Err(ConfigError::EmptyTagName {
                    plc: plc.plc_name.clone(),
                    index: tidx,
                });
            }
            if !seen_tags.insert(tag.tag_name.clone()) {
                return Err(ConfigError::DuplicateTagName {
                    plc: plc.plc_name.clone(),
                    tag: tag.tag_name.clone(),
                });
            }
            if let DataType::String { n } = tag.data_type {
                if n == 0 {
                    return Err(ConfigError::InvalidStringLength {
                        plc: plc.plc_name.clone(),
                        tag: tag.tag_name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_a_minimal_plc() {
        let f = write_config(
            r#"[{"plc_name":"line1","plc_ip":"10.0.0.5","opcua_url":"opc.tcp://x:4840","address_mappings":[]}]"#,
        );
        let plcs = BridgeConfig::load(f.path()).unwrap();
        assert_eq!(plcs.len(), 1);
        assert_eq!(plcs[0].sleep_interval, 0.01);
    }

    #[test]
    fn rejects_duplicate_plc_name() {
        let f = write_config(
            r#"[
                {"plc_name":"line1","plc_ip":"10.0.0.5","opcua_url":"x","address_mappings":[]},
                {"plc_name":"line1","plc_ip":"10.0.0.6","opcua_url":"x","address_mappings":[]}
            ]"#,
        );
        let err = BridgeConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePlcName(n) if n == "line1"));
    }

    #[test]
    fn rejects_duplicate_tag_name() {
        let f = write_config(
            r#"[{"plc_name":"line1","plc_ip":"10.0.0.5","opcua_url":"x","address_mappings":[
                {"tag_name":"t1","memory_area":"D","address":100,"data_type":{"kind":"INT16"}},
                {"tag_name":"t1","memory_area":"D","address":101,"data_type":{"kind":"INT16"}}
            ]}]"#,
        );
        let err = BridgeConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTagName { tag, .. } if tag == "t1"));
    }

    #[test]
    fn rejects_zero_length_string() {
        let f = write_config(
            r#"[{"plc_name":"line1","plc_ip":"10.0.0.5","opcua_url":"x","address_mappings":[
                {"tag_name":"t1","memory_area":"D","address":100,"data_type":{"kind":"STRING","n":0}}
            ]}]"#,
        );
        let err = BridgeConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStringLength { .. }));
    }

    #[test]
    fn word_width_matches_type() {
        assert_eq!(DataType::Bool.word_width(), 1);
        assert_eq!(DataType::Int32.word_width(), 2);
        assert_eq!(DataType::String { n: 5 }.word_width(), 3);
        assert_eq!(DataType::String { n: 6 }.word_width(), 3);
    }
}
