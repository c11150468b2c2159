use crate::processor::Processor;
use route_rs_packets::Ipv4Packet;

/// Decrements the TTL of an IPv4 packet and refreshes the header checksum
#[derive(Default, Clone)]
pub struct DecIpv4HopLimit {}

impl DecIpv4HopLimit {
    pub fn new() -> DecIpv4HopLimit {
        DecIpv4HopLimit {}
    }
}

impl Processor for DecIpv4HopLimit {
    type Input = Ipv4Packet;
    type Output = Ipv4Packet;

    fn process(&mut self, mut packet: Self::Input) -> Option<Self::Output> {
        match packet.ttl() {
            0 => Some(packet),
            ttl => {
                packet.set_ttl(ttl - 1);
                packet.set_checksum();
                Some(packet)
            }
        }
    }
}
