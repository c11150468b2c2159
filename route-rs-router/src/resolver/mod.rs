//! Next-hop address resolution. A packet routed toward an address with no ARP entry is
//! parked on that address's `PendingResolution`, and a tokio task keeps asking for the
//! address until a reply arrives or the retry budget runs out. The task then either forwards
//! everything that queued up or bounces each packet back to its sender as host unreachable.
use crate::frame_factory::FrameFactory;
use crate::interface::{Interface, Transmit};
use route_rs_packets::{EthernetFrame, Ipv4Packet};
use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time;
use tracing::{debug, trace, warn};

mod pending;
pub use self::pending::*;

mod table;
pub use self::table::*;

/// How many ARP requests a resolution sends, and how long it waits after each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            interval: Duration::from_secs(1),
        }
    }
}

/// Everything a resolution task needs once it is detached from the frame that started it.
#[derive(Clone)]
pub(crate) struct Resolver {
    table: Arc<ResolutionTable>,
    transmitter: Arc<dyn Transmit>,
    factory: FrameFactory,
    retry: RetryPolicy,
    runtime: Handle,
}

impl Resolver {
    pub(crate) fn new(
        transmitter: Arc<dyn Transmit>,
        factory: FrameFactory,
        retry: RetryPolicy,
        runtime: Handle,
    ) -> Self {
        Resolver {
            table: Arc::new(ResolutionTable::new()),
            transmitter,
            factory,
            retry,
            runtime,
        }
    }

    pub(crate) fn table(&self) -> &ResolutionTable {
        &self.table
    }

    /// Starts the retry loop for a freshly created resolution. Callable from any thread.
    pub(crate) fn spawn(&self, pending: Arc<PendingResolution>) {
        self.runtime.spawn(self.clone().run(pending));
    }

    async fn run(self, pending: Arc<PendingResolution>) {
        let target = pending.target();
        for attempt in 1..=self.retry.attempts {
            if pending.has_reply() {
                break;
            }
            trace!(%target, attempt, iface = pending.out_iface().name(), "sending ARP request");
            self.send(pending.request().clone(), pending.out_iface());

            tokio::select! {
                _ = time::sleep(self.retry.interval) => {}
                _ = pending.wait_for_reply() => break,
            }
        }

        match self.table.retire(&pending) {
            Outcome::Resolved {
                mac,
                iface,
                packets,
            } => {
                debug!(%target, %mac, forwarded = packets.len(), "next hop resolved");
                for packet in packets {
                    let mut frame = packet.frame;
                    frame.set_dest_mac(mac);
                    self.send(frame, &iface);
                }
            }
            Outcome::TimedOut { packets } => {
                debug!(
                    %target,
                    attempts = self.retry.attempts,
                    bounced = packets.len(),
                    "next hop did not answer"
                );
                for packet in packets {
                    let queued = match Ipv4Packet::try_from(packet.frame) {
                        Ok(queued) => queued,
                        Err(reason) => {
                            warn!(%target, reason, "queued frame is not IPv4");
                            continue;
                        }
                    };
                    let reply = self.factory.host_unreachable(
                        &queued,
                        &packet.in_iface,
                        packet.original_src_mac,
                    );
                    self.send(reply, &packet.in_iface);
                }
            }
        }
        pending.mark_drained();
    }

    /// Transmit failures are logged, never propagated.
    pub(crate) fn send(&self, frame: EthernetFrame, iface: &Interface) {
        if let Err(err) = self.transmitter.transmit(frame, iface) {
            warn!(iface = iface.name(), %err, "failed to transmit frame");
        }
    }
}
