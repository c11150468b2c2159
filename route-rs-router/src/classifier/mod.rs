//! Classifiers look at a packet by reference and sort it into a class; the router dispatches
//! on the class to pick the path the packet takes.
mod ether_type;
pub use self::ether_type::*;

mod local_protocol;
pub use self::local_protocol::*;

pub trait Classifier {
    type Packet: Send + Clone;
    type Class: Sized;

    fn classify(&self, packet: &Self::Packet) -> Self::Class;
}
