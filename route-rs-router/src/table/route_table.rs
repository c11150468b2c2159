use super::{expect_fields, parse_ipv4, records};
use crate::interface::{Interface, InterfaceRegistry};
use crate::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A static route: packets whose destination falls in `destination/mask` leave through
/// `interface` toward `gateway`, or straight to the destination when the gateway is 0.0.0.0.
/// Host bits of `destination` are cleared on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    destination: Ipv4Addr,
    gateway: Ipv4Addr,
    mask: Ipv4Addr,
    interface: Arc<Interface>,
}

impl RouteEntry {
    pub fn new(
        destination: Ipv4Addr,
        gateway: Ipv4Addr,
        mask: Ipv4Addr,
        interface: Arc<Interface>,
    ) -> Self {
        RouteEntry {
            destination: Ipv4Addr::from(u32::from(destination) & u32::from(mask)),
            gateway,
            mask,
            interface,
        }
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn mask(&self) -> Ipv4Addr {
        self.mask
    }

    pub fn interface(&self) -> &Arc<Interface> {
        &self.interface
    }

    /// Number of one bits in the mask
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.mask).count_ones()
    }

    pub fn is_directly_connected(&self) -> bool {
        self.gateway.is_unspecified()
    }

    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.mask);
        u32::from(addr) & mask == u32::from(self.destination) & mask
    }

    /// The address to resolve for a packet headed to `dest` over this route
    pub fn next_hop(&self, dest: Ipv4Addr) -> Ipv4Addr {
        if self.is_directly_connected() {
            dest
        } else {
            self.gateway
        }
    }
}

/// Static routes keyed by (network, mask). Built at startup and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: HashMap<(Ipv4Addr, Ipv4Addr), RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable::default()
    }

    /// Adds a route, returning the route it replaced for the same network and mask.
    pub fn insert(
        &mut self,
        destination: Ipv4Addr,
        gateway: Ipv4Addr,
        mask: Ipv4Addr,
        interface: Arc<Interface>,
    ) -> Option<RouteEntry> {
        let entry = RouteEntry::new(destination, gateway, mask, interface);
        self.routes.insert((entry.destination(), mask), entry)
    }

    /// Longest-prefix match over every route. Equal prefix lengths are not expected in a
    /// sane table; whichever is found first wins.
    pub fn lookup(&self, dest: Ipv4Addr) -> Option<&RouteEntry> {
        let mut best: Option<&RouteEntry> = None;
        for route in self.routes.values().filter(|route| route.matches(dest)) {
            match best {
                Some(current) if current.prefix_len() >= route.prefix_len() => {}
                _ => best = Some(route),
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Parses route file contents: `destination gateway mask interface` per line.
    pub fn parse(contents: &str, interfaces: &InterfaceRegistry) -> Result<Self, ConfigError> {
        let mut table = RouteTable::new();
        for (line, fields) in records(contents) {
            expect_fields(line, &fields, 4)?;
            let destination = parse_ipv4(line, fields[0])?;
            let gateway = parse_ipv4(line, fields[1])?;
            let mask = parse_ipv4(line, fields[2])?;
            let interface =
                interfaces
                    .get(fields[3])
                    .ok_or_else(|| ConfigError::UnknownInterface {
                        line,
                        name: fields[3].to_owned(),
                    })?;
            table.insert(destination, gateway, mask, interface.clone());
        }
        Ok(table)
    }

    pub fn load<P: AsRef<Path>>(
        path: P,
        interfaces: &InterfaceRegistry,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let table = RouteTable::parse(&contents, interfaces)?;
        info!(path = %path.display(), routes = table.len(), "loaded route table\n{}", table);
        Ok(table)
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<&RouteEntry> = self.routes.values().collect();
        routes.sort_by_key(|route| (u32::from(route.destination), route.prefix_len()));

        writeln!(
            f,
            "{:<16}{:<16}{:<16}Interface",
            "Destination", "Gateway", "Mask"
        )?;
        for route in routes {
            writeln!(
                f,
                "{:<16}{:<16}{:<16}{}",
                route.destination.to_string(),
                route.gateway.to_string(),
                route.mask.to_string(),
                route.interface.name()
            )?;
        }
        Ok(())
    }
}
