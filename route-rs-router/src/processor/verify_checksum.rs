use crate::processor::Processor;
use route_rs_packets::Ipv4Packet;
use tracing::debug;

/// Drops IPv4 packets whose header checksum does not match the recomputed value
#[derive(Default, Clone)]
pub struct VerifyIpv4Checksum {}

impl VerifyIpv4Checksum {
    pub fn new() -> VerifyIpv4Checksum {
        VerifyIpv4Checksum {}
    }
}

impl Processor for VerifyIpv4Checksum {
    type Input = Ipv4Packet;
    type Output = Ipv4Packet;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output> {
        if packet.validate_checksum() {
            Some(packet)
        } else {
            debug!(
                src = %packet.src_addr(),
                dest = %packet.dest_addr(),
                checksum = packet.checksum(),
                expected = packet.calculate_checksum(),
                "dropping packet with bad header checksum"
            );
            None
        }
    }
}
