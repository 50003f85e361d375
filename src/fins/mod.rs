//! Adapter from the bridge's own FINS collaborator interface to the
//! `omron-fins` protocol crate, which is deliberately a thin, no-retry,
//! no-reconnect wire codec and does not itself expose `connect`/`disconnect`/
//! `batch_read`/`cpu_unit_details_read`. Those four are this module's job.

use crate::config::MemoryArea;
use omron_fins::{Client, ClientConfig, MemoryArea as FinsMemoryArea};
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::time::Duration;

const FINS_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// `omron-fins` caps a single read at this many words per its own
/// `MAX_WORDS_PER_COMMAND`; the adapter chunks larger batches transparently.
const MAX_WORDS_PER_READ: u16 = 500;

fn to_fins_area(area: MemoryArea) -> FinsMemoryArea {
    match area {
        MemoryArea::D => FinsMemoryArea::DM,
        MemoryArea::H => FinsMemoryArea::HR,
        MemoryArea::W => FinsMemoryArea::WR,
        MemoryArea::C => FinsMemoryArea::CIO,
        MemoryArea::A => FinsMemoryArea::AR,
    }
}

/// The interface the acquisition loop depends on. A fake implementation
/// backs loop-level tests; `FinsAdapter` is the production implementation.
pub trait FinsClient: Send + Sync {
    fn connect(&self) -> Result<(), String>;
    fn disconnect(&self);
    /// Confirms the PLC actually answers, since a UDP socket alone never
    /// detects a dead peer.
    fn cpu_unit_details_read(&self) -> Result<(), String>;
    fn read(&self, area: MemoryArea, address: u16, word_count: u16) -> Result<Vec<u16>, String>;
    fn batch_read(&self, area: MemoryArea, address: u16, word_count: u16) -> Result<Vec<u16>, String> {
        self.read(area, address, word_count)
    }
}

/// Production `FinsClient` over UDP, lazily opening its socket on the first
/// `connect()` the way the reference crate's `Comm` transports lazily open
/// theirs (see `TcpComm::get_stream`); `disconnect` just drops it, matching
/// `omron-fins`'s stance that reconnection is the caller's job.
pub struct FinsAdapter {
    ip: Ipv4Addr,
    source_node: u8,
    dest_node: u8,
    client: Mutex<Option<Client>>,
}

impl FinsAdapter {
    #[must_use]
    pub fn new(ip: Ipv4Addr, source_node: u8, dest_node: u8) -> Self {
        Self {
            ip,
            source_node,
            dest_node,
            client: Mutex::new(None),
        }
    }

    fn with_client<T>(&self, f: impl FnOnce(&Client) -> omron_fins::Result<T>) -> Result<T, String> {
        let guard = self.client.lock();
        match guard.as_ref() {
            Some(client) => f(client).map_err(|e| e.to_string()),
            None => Err("fins client not connected".to_string()),
        }
    }
}

impl FinsClient for FinsAdapter {
    fn connect(&self) -> Result<(), String> {
        let config = ClientConfig::new(self.ip, self.source_node, self.dest_node)
            .with_timeout(FINS_READ_TIMEOUT);
        let client = Client::new(config).map_err(|e| e.to_string())?;
        *self.client.lock() = Some(client);
        Ok(())
    }

    fn disconnect(&self) {
        self.client.lock().take();
    }

    fn cpu_unit_details_read(&self) -> Result<(), String> {
        self.with_client(|client| client.read(FinsMemoryArea::DM, 0, 1))
            .map(|_| ())
    }

    fn read(&self, area: MemoryArea, address: u16, word_count: u16) -> Result<Vec<u16>, String> {
        self.with_client(|client| client.read(to_fins_area(area), address, word_count))
    }

    fn batch_read(&self, area: MemoryArea, address: u16, word_count: u16) -> Result<Vec<u16>, String> {
        if word_count <= MAX_WORDS_PER_READ {
            return self.read(area, address, word_count);
        }
        let mut out = Vec::with_capacity(word_count as usize);
        let mut remaining = word_count;
        let mut offset = address;
        while remaining > 0 {
            let chunk = remaining.min(MAX_WORDS_PER_READ);
            out.extend(self.read(area, offset, chunk)?);
            offset += chunk;
            remaining -= chunk;
        }
        Ok(out)
    }
}
