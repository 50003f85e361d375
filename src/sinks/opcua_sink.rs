//! OPC UA sink: a session wrapper with a runtime node map, modeled on
//! `OpcSafeSess` — dials at connect time under a 60 s ceiling, never
//! reconnects on write failure (demotion is the loop's job, not this
//! sink's).

use crate::coerce::Value;
use indexmap::IndexMap;
use opcua::client::prelude::*;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

type OpcSession = Arc<RwLock<Session>>;

const NODE_FILE_WAIT_CEILING: Duration = Duration::from_secs(60);
const NODE_FILE_POLL_INTERVAL: Duration = Duration::from_millis(200);
const OPCUA_CONNECT_CEILING: Duration = Duration::from_secs(60);

/// One row of `opcua_json_files/nodes.json`: `map` is the tag name as it
/// appears in `address_mappings`, `id` is the OPC UA NodeId string.
#[derive(Debug, Clone, Deserialize)]
struct NodeMapEntry {
    id: String,
    map: String,
}

/// Tag name → OPC UA `NodeId`, loaded once at loop startup.
pub struct NodeMapper {
    nodes: IndexMap<String, NodeId>,
}

impl NodeMapper {
    /// Waits up to 60 s for the descriptor file to appear, then loads it.
    /// The core never writes this file; an external node-manager owns it.
    pub fn wait_and_load(path: &Path) -> Result<Self, String> {
        let started = Instant::now();
        while !path.exists() {
            if started.elapsed() > NODE_FILE_WAIT_CEILING {
                return Err(format!(
                    "node descriptor {} did not appear within 60s",
                    path.display()
                ));
            }
            std::thread::sleep(NODE_FILE_POLL_INTERVAL);
        }
        Self::load(path)
    }

    fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let entries: Vec<NodeMapEntry> = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        let mut nodes = IndexMap::new();
        for entry in entries {
            let node_id: NodeId = entry
                .id
                .parse()
                .map_err(|_| format!("invalid node id '{}' for tag '{}'", entry.id, entry.map))?;
            nodes.insert(entry.map, node_id);
        }
        Ok(Self { nodes })
    }

    fn node_for(&self, tag_name: &str) -> Option<&NodeId> {
        self.nodes.get(tag_name)
    }
}

/// OPC UA client/session pair connected at construction time, generalized
/// from the reference crate's `OpcSafeSess` to a runtime `NodeMapper`
/// instead of a compile-time node list.
pub struct OpcuaSink {
    url: String,
    client: Mutex<Client>,
    session: Mutex<Option<OpcSession>>,
    nodes: NodeMapper,
}

impl OpcuaSink {
    /// Builds the client and dials the endpoint right away, bounded by
    /// `OPCUA_CONNECT_CEILING`: the underlying `connect_to_endpoint` call
    /// has no caller-supplied deadline, so the dial runs on its own thread
    /// and the ceiling is enforced by how long the caller waits for it to
    /// report back.
    pub fn connect(url: &str, nodes: NodeMapper) -> Result<Self, String> {
        let client = ClientBuilder::new()
            .application_name("fins-opcua-bridge")
            .application_uri("urn:fins-opcua-bridge")
            .trust_server_certs(true)
            .session_retry_limit(0)
            .session_timeout(5_000)
            .client()
            .ok_or_else(|| "failed to build opc ua client".to_string())?;

        let endpoint: EndpointDescription = (
            url,
            "None",
            MessageSecurityMode::None,
            UserTokenPolicy::anonymous(),
        )
            .into();

        let (client, session) = dial_with_ceiling(client, endpoint)?;
        Ok(Self {
            url: url.to_string(),
            client: Mutex::new(client),
            session: Mutex::new(Some(session)),
            nodes,
        })
    }

    fn get_session(&self) -> Result<OpcSession, String> {
        self.session
            .lock()
            .as_ref()
            .cloned()
            .ok_or_else(|| "opc ua session not connected".to_string())
    }

    /// Write every tag in `sample` that has a node mapping. Returns an error
    /// on the first failed write; the caller (the acquisition loop) treats
    /// any error as grounds for demotion to CSV-only. This sink never
    /// reconnects itself on failure — see the design notes on non-reconnection.
    pub fn write_sample(&self, tags: &[(&str, &Value)]) -> Result<(), String> {
        let session = self.get_session()?;
        let mut to_write = Vec::with_capacity(tags.len());
        for (tag_name, value) in tags {
            let Some(node_id) = self.nodes.node_for(tag_name) else {
                continue;
            };
            to_write.push(WriteValue {
                node_id: node_id.clone(),
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                value: DataValue::new_now(to_variant(value)),
            });
        }
        if to_write.is_empty() {
            return Ok(());
        }
        let result = session
            .read()
            .write(&to_write)
            .map_err(|status| status.to_string())?;
        if let Some(bad) = result.iter().find(|s| s.is_bad()) {
            return Err(format!("opc ua write returned {bad}"));
        }
        Ok(())
    }
}

/// Runs `Client::connect_to_endpoint` on a dedicated thread and waits at
/// most `OPCUA_CONNECT_CEILING` for it to finish, so a server that never
/// answers cannot hold `OPCUA_CONNECTING` open indefinitely. A dial that
/// outlives the ceiling is abandoned: its thread is left to finish or hang
/// on its own, and the loop proceeds as if the connect had failed.
fn dial_with_ceiling(
    client: Client,
    endpoint: EndpointDescription,
) -> Result<(Client, OpcSession), String> {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::Builder::new()
        .name("opcua-connect".to_string())
        .spawn(move || {
            let mut client = client;
            let result = client
                .connect_to_endpoint(endpoint, IdentityToken::Anonymous)
                .map_err(|e| e.to_string());
            let _ = tx.send(result.map(|session| (client, session)));
        })
        .map_err(|e| e.to_string())?;

    match rx.recv_timeout(OPCUA_CONNECT_CEILING) {
        Ok(result) => result,
        Err(_) => Err(format!(
            "opc ua connect did not complete within {}s",
            OPCUA_CONNECT_CEILING.as_secs()
        )),
    }
}

fn to_variant(value: &Value) -> Variant {
    match value {
        Value::Bool(b) => Variant::Boolean(*b),
        Value::Int16(v) => Variant::Int16(*v),
        Value::Uint16(v) => Variant::UInt16(*v),
        Value::Int32(v) => Variant::Int32(*v),
        Value::Uint32(v) => Variant::UInt32(*v),
        Value::Real32(v) => Variant::Float(*v),
        Value::Text(s) => Variant::String(UAString::from(s.as_str())),
    }
}
