//! Processors take a packet by value and hand back a (possibly modified) packet, or `None` to
//! drop it. The forwarding path is built from these stages.
mod dec_ip_hop;
pub use self::dec_ip_hop::*;

mod verify_checksum;
pub use self::verify_checksum::*;

pub trait Processor {
    type Input: Send + Clone;
    type Output: Send + Clone;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output>;
}
