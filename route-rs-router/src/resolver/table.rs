use crate::interface::Interface;
use crate::resolver::{Outcome, PendingResolution, QueuedPacket};
use crate::table::ArpCache;
use route_rs_packets::{ArpFrame, EthernetFrame, MacAddr};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Where a packet went when it was handed to the table.
#[derive(Debug)]
pub enum Admission {
    /// Appended to a live resolution's queue
    Queued,
    /// Became the first packet of a new resolution, which the caller must start
    Created(Arc<PendingResolution>),
    /// The address was learned in the meantime; the packet is handed back with the MAC to
    /// send it to
    Resolved(MacAddr, QueuedPacket),
}

/// What became of an ARP reply offered to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// Nobody was waiting on the sender's address. A reply that arrives after its
    /// resolution timed out lands here too, since retiring removes the entry.
    Unsolicited,
    /// Woke a live resolution; the mapping is now cached
    Delivered,
}

/// The live resolutions, keyed by next-hop address. All lookups, inserts and removals go
/// through one lock, and each resolution's own lock is only ever taken while holding it,
/// never the other way round.
#[derive(Debug, Default)]
pub struct ResolutionTable {
    entries: Mutex<HashMap<Ipv4Addr, Arc<PendingResolution>>>,
}

impl ResolutionTable {
    pub fn new() -> Self {
        ResolutionTable::default()
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<Arc<PendingResolution>> {
        self.entries.lock().unwrap().get(&ip).cloned()
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.entries.lock().unwrap().contains_key(&ip)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Queues `packet` behind the resolution for `next_hop`, creating the resolution with
    /// `request` sent from `out_iface` if none is live. The ARP cache is checked again under
    /// the table lock, since a reply may have landed after the caller's miss.
    pub(crate) fn admit(
        &self,
        next_hop: Ipv4Addr,
        packet: QueuedPacket,
        arp_cache: &ArpCache,
        request: impl FnOnce() -> (EthernetFrame, Arc<Interface>),
    ) -> Admission {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = arp_cache.lookup(next_hop) {
            return Admission::Resolved(entry.mac(), packet);
        }

        let packet = match entries.get(&next_hop) {
            Some(live) => match live.try_enqueue(packet) {
                Ok(()) => return Admission::Queued,
                Err(packet) => packet,
            },
            None => packet,
        };

        let (request, out_iface) = request();
        let pending = Arc::new(PendingResolution::new(
            next_hop, request, out_iface, packet,
        ));
        entries.insert(next_hop, pending.clone());
        Admission::Created(pending)
    }

    /// Hands `reply` to whatever resolution is waiting on its sender. The table entry is
    /// removed either way, and the sender's mapping is cached only when a live resolution
    /// accepted the reply.
    pub(crate) fn settle_reply(
        &self,
        reply: ArpFrame,
        reply_iface: Arc<Interface>,
        arp_cache: &ArpCache,
    ) -> ReplyDisposition {
        let sender_ip = reply.sender_protocol_addr();
        let sender_mac = reply.sender_hardware_addr();

        let mut entries = self.entries.lock().unwrap();
        let pending = match entries.remove(&sender_ip) {
            Some(pending) => pending,
            None => return ReplyDisposition::Unsolicited,
        };

        if pending.deliver_reply(reply, reply_iface) {
            arp_cache.insert(sender_mac, sender_ip);
            ReplyDisposition::Delivered
        } else {
            ReplyDisposition::Unsolicited
        }
    }

    /// Removes `pending` if it is still the live entry for its address and takes its queue.
    /// Both happen under the table lock, so a packet admitted concurrently either made it
    /// into the returned queue or started a fresh resolution.
    pub(crate) fn retire(&self, pending: &Arc<PendingResolution>) -> Outcome {
        let mut entries = self.entries.lock().unwrap();
        let target = pending.target();
        if entries
            .get(&target)
            .map_or(false, |live| Arc::ptr_eq(live, pending))
        {
            entries.remove(&target);
        }
        pending.finish()
    }
}
