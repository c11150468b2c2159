use crate::TransmitError;
use crossbeam::channel::{self, Receiver, Sender};
use route_rs_packets::{EthernetFrame, MacAddr};
use std::collections::BTreeMap;
use std::fmt;
use std::iter::FromIterator;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// A named router port with its link and network addresses. Owned by the device layer and
/// never mutated once the router is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    name: String,
    mac: MacAddr,
    ip: Ipv4Addr,
}

impl Interface {
    pub fn new(name: impl Into<String>, mac: MacAddr, ip: Ipv4Addr) -> Self {
        Interface {
            name: name.into(),
            mac,
            ip,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac_addr(&self) -> MacAddr {
        self.mac
    }

    pub fn ip_addr(&self) -> Ipv4Addr {
        self.ip
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.ip, self.mac)
    }
}

/// The router's interfaces by name.
#[derive(Debug, Default, Clone)]
pub struct InterfaceRegistry {
    interfaces: BTreeMap<String, Arc<Interface>>,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        InterfaceRegistry::default()
    }

    /// Registers an interface, replacing any previous one with the same name.
    pub fn add(&mut self, interface: Interface) -> Arc<Interface> {
        let interface = Arc::new(interface);
        self.interfaces
            .insert(interface.name().to_owned(), interface.clone());
        interface
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Interface>> {
        self.interfaces.get(name)
    }

    /// The interface whose address is `ip`, if the router owns it.
    pub fn owner_of(&self, ip: Ipv4Addr) -> Option<&Arc<Interface>> {
        self.interfaces.values().find(|iface| iface.ip_addr() == ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Interface>> {
        self.interfaces.values()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

impl FromIterator<Interface> for InterfaceRegistry {
    fn from_iter<I: IntoIterator<Item = Interface>>(iter: I) -> Self {
        let mut registry = InterfaceRegistry::new();
        for interface in iter {
            registry.add(interface);
        }
        registry
    }
}

/// The device layer's send primitive. Every frame the router emits, whether a reply, a
/// forwarded packet or an ICMP error, leaves through here.
pub trait Transmit: Send + Sync {
    fn transmit(&self, frame: EthernetFrame, iface: &Interface) -> Result<(), TransmitError>;
}

/// Hands outbound frames to a crossbeam channel tagged with the egress interface name, for
/// an I/O loop (or a test) on the other end to drain.
#[derive(Clone)]
pub struct ChannelTransmitter {
    sender: Sender<(String, EthernetFrame)>,
}

impl ChannelTransmitter {
    pub fn new(sender: Sender<(String, EthernetFrame)>) -> Self {
        ChannelTransmitter { sender }
    }

    pub fn unbounded() -> (Self, Receiver<(String, EthernetFrame)>) {
        let (sender, receiver) = channel::unbounded();
        (ChannelTransmitter::new(sender), receiver)
    }
}

impl Transmit for ChannelTransmitter {
    fn transmit(&self, frame: EthernetFrame, iface: &Interface) -> Result<(), TransmitError> {
        self.sender
            .send((iface.name().to_owned(), frame))
            .map_err(|_| TransmitError::ChannelClosed(iface.name().to_owned()))
    }
}
