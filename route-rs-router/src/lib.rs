//! The forwarding and address resolution core of a software IPv4 router. Frames come in from
//! a device layer through `Router::handle_frame`, and everything the router decides to send,
//! whether answers, forwarded packets or ICMP errors, goes back out through a `Transmit`
//! implementation.

/// Interfaces are the router's named ports. The device layer owns them and implements
/// `Transmit` to put frames on the wire; `ChannelTransmitter` hands them to a crossbeam
/// channel instead.
pub mod interface;

/// The static route table, matched by longest prefix, and the IP to MAC cache. Both can be
/// loaded from the plain text files the router is started with.
pub mod table;

/// Builds the frames the router originates itself: ARP requests and replies, ICMP errors
/// and echo replies.
pub mod frame_factory;

/// Resolution of next-hop link addresses. Packets waiting on an address are queued on a
/// per-address `PendingResolution` while a tokio task retries the ARP request.
pub mod resolver;

/// Processors transform or drop a packet on its way through the router.
pub mod processor;

/// Classifiers decide which path a packet takes.
pub mod classifier;

mod router;
pub use self::router::*;

mod error;
pub use self::error::*;

/// Utility module
mod utils;
