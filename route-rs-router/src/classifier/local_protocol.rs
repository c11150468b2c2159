use crate::classifier::Classifier;
use route_rs_packets::{Icmpv4Type, IpProtocol, Ipv4Packet};

/// What a packet addressed to the router itself is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalClass {
    /// TCP or UDP; nothing listens, so the sender gets a port unreachable
    Transport,
    EchoRequest,
    Other,
}

#[derive(Default)]
pub struct ClassifyLocalDelivery {}

impl ClassifyLocalDelivery {
    pub fn new() -> Self {
        ClassifyLocalDelivery {}
    }
}

impl Classifier for ClassifyLocalDelivery {
    type Packet = Ipv4Packet;
    type Class = LocalClass;

    fn classify(&self, packet: &Self::Packet) -> Self::Class {
        match packet.protocol() {
            IpProtocol::TCP | IpProtocol::UDP => LocalClass::Transport,
            IpProtocol::ICMP => match packet.payload().first() {
                Some(&icmp_type) if icmp_type == Icmpv4Type::EchoRequest as u8 => {
                    LocalClass::EchoRequest
                }
                _ => LocalClass::Other,
            },
            IpProtocol::Unknown(_) => LocalClass::Other,
        }
    }
}
