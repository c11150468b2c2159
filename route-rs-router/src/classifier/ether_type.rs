use crate::classifier::Classifier;
use route_rs_packets::{EthernetFrame, ARP_ETHER_TYPE, IPV4_ETHER_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherTypeClass {
    Arp,
    Ipv4,
    Other(u16),
}

/// Sorts inbound frames by the ether type in their Ethernet header
#[derive(Default)]
pub struct ClassifyEtherType {}

impl ClassifyEtherType {
    pub fn new() -> Self {
        ClassifyEtherType {}
    }
}

impl Classifier for ClassifyEtherType {
    type Packet = EthernetFrame;
    type Class = EtherTypeClass;

    fn classify(&self, frame: &Self::Packet) -> Self::Class {
        match frame.ether_type() {
            ARP_ETHER_TYPE => EtherTypeClass::Arp,
            IPV4_ETHER_TYPE => EtherTypeClass::Ipv4,
            other => EtherTypeClass::Other(other),
        }
    }
}
