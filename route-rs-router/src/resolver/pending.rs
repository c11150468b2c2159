use crate::interface::Interface;
use route_rs_packets::{ArpFrame, EthernetFrame, MacAddr};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A routed packet parked until its next hop's link address is known.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    /// The outbound frame, TTL already decremented and source MAC already rewritten
    pub frame: EthernetFrame,
    pub in_iface: Arc<Interface>,
    /// Where an ICMP error about this packet goes if resolution fails
    pub original_src_mac: MacAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Sending requests and accepting packets
    Pending,
    /// A reply arrived; the queue is about to be forwarded
    Resolved,
    /// The retry budget ran out; the queue is about to be bounced
    TimedOut,
    /// Every queued packet has been dealt with
    Drained,
}

/// What happens to the queue once the retry loop stops.
#[derive(Debug)]
pub enum Outcome {
    Resolved {
        mac: MacAddr,
        iface: Arc<Interface>,
        packets: Vec<QueuedPacket>,
    },
    TimedOut {
        packets: Vec<QueuedPacket>,
    },
}

#[derive(Debug)]
struct State {
    phase: Phase,
    queue: VecDeque<QueuedPacket>,
    reply: Option<(ArpFrame, Arc<Interface>)>,
}

/// Resolution of a single next-hop address: the request to keep sending, where to send it,
/// and the packets waiting on the answer. At most one is live per address.
#[derive(Debug)]
pub struct PendingResolution {
    target: Ipv4Addr,
    request: EthernetFrame,
    out_iface: Arc<Interface>,
    state: Mutex<State>,
    replied: Notify,
}

impl PendingResolution {
    pub fn new(
        target: Ipv4Addr,
        request: EthernetFrame,
        out_iface: Arc<Interface>,
        first: QueuedPacket,
    ) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(first);
        PendingResolution {
            target,
            request,
            out_iface,
            state: Mutex::new(State {
                phase: Phase::Pending,
                queue,
                reply: None,
            }),
            replied: Notify::new(),
        }
    }

    pub fn target(&self) -> Ipv4Addr {
        self.target
    }

    pub fn request(&self) -> &EthernetFrame {
        &self.request
    }

    pub fn out_iface(&self) -> &Arc<Interface> {
        &self.out_iface
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().unwrap().phase
    }

    /// True once a reply has been delivered or the retry budget has run out
    pub fn is_completed(&self) -> bool {
        self.phase() != Phase::Pending
    }

    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    /// Appends `packet` while the resolution is still pending. Hands the packet back
    /// otherwise, and the caller has to resolve it some other way.
    pub fn try_enqueue(&self, packet: QueuedPacket) -> Result<(), QueuedPacket> {
        let mut state = self.state.lock().unwrap();
        if state.phase != Phase::Pending {
            return Err(packet);
        }
        state.queue.push_back(packet);
        Ok(())
    }

    /// Records the reply that resolves this address and wakes the retry loop. Only the first
    /// reply counts, and nothing is recorded once the loop has given up.
    pub fn deliver_reply(&self, reply: ArpFrame, reply_iface: Arc<Interface>) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.phase != Phase::Pending {
            return false;
        }
        state.reply = Some((reply, reply_iface));
        state.phase = Phase::Resolved;
        drop(state);

        self.replied.notify_one();
        true
    }

    pub(crate) fn has_reply(&self) -> bool {
        self.state.lock().unwrap().reply.is_some()
    }

    pub(crate) async fn wait_for_reply(&self) {
        self.replied.notified().await
    }

    /// Stops accepting packets and takes the queue. A resolution still pending at this point
    /// has timed out.
    pub(crate) fn finish(&self) -> Outcome {
        let mut state = self.state.lock().unwrap();
        let packets: Vec<QueuedPacket> = state.queue.drain(..).collect();
        if let Some((reply, iface)) = &state.reply {
            return Outcome::Resolved {
                mac: reply.sender_hardware_addr(),
                iface: iface.clone(),
                packets,
            };
        }
        state.phase = Phase::TimedOut;
        Outcome::TimedOut { packets }
    }

    pub(crate) fn mark_drained(&self) {
        self.state.lock().unwrap().phase = Phase::Drained;
    }
}
