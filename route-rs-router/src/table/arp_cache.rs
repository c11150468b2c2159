use super::{expect_fields, parse_ipv4, records};
use crate::ConfigError;
use route_rs_packets::MacAddr;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpSource {
    /// Loaded from the ARP file at startup
    Static,
    /// Learned from an ARP reply
    Learned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    ip: Ipv4Addr,
    mac: MacAddr,
    source: ArpSource,
}

impl ArpEntry {
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn source(&self) -> ArpSource {
        self.source
    }
}

/// IP to MAC mappings shared between frame handlers. Entries never expire and are never
/// removed.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: RwLock<HashMap<Ipv4Addr, ArpEntry>>,
}

impl ArpCache {
    pub fn new() -> Self {
        ArpCache::default()
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<ArpEntry> {
        let entries = self.entries.read().unwrap();
        entries.get(&ip).copied()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let entries = self.entries.read().unwrap();
        entries.contains_key(&ip)
    }

    /// Records a mapping learned from the wire, overwriting whatever was there.
    pub fn insert(&self, mac: MacAddr, ip: Ipv4Addr) {
        self.upsert(mac, ip, ArpSource::Learned);
    }

    pub fn insert_static(&self, mac: MacAddr, ip: Ipv4Addr) {
        self.upsert(mac, ip, ArpSource::Static);
    }

    fn upsert(&self, mac: MacAddr, ip: Ipv4Addr, source: ArpSource) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(ip, ArpEntry { ip, mac, source });
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Parses ARP file contents: `ip mac` per line.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let cache = ArpCache::new();
        for (line, fields) in records(contents) {
            expect_fields(line, &fields, 2)?;
            let ip = parse_ipv4(line, fields[0])?;
            let mac = fields[1]
                .parse::<MacAddr>()
                .map_err(|reason| ConfigError::InvalidMac {
                    line,
                    value: fields[1].to_owned(),
                    reason,
                })?;
            cache.insert_static(mac, ip);
        }
        Ok(cache)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let cache = ArpCache::parse(&contents)?;
        info!(path = %path.display(), entries = cache.len(), "loaded ARP cache\n{}", cache);
        Ok(cache)
    }
}

impl fmt::Display for ArpCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read().unwrap();
        let mut sorted: Vec<&ArpEntry> = entries.values().collect();
        sorted.sort_by_key(|entry| u32::from(entry.ip));

        writeln!(f, "{:<16}MAC", "IP")?;
        for entry in sorted {
            writeln!(f, "{:<16}{}", entry.ip.to_string(), entry.mac)?;
        }
        Ok(())
    }
}
