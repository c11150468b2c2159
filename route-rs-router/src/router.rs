use crate::classifier::{
    Classifier, ClassifyEtherType, ClassifyLocalDelivery, EtherTypeClass, LocalClass,
};
use crate::error::RouterError;
use crate::frame_factory::{FrameFactory, DEFAULT_ICMP_TTL};
use crate::interface::{Interface, InterfaceRegistry, Transmit};
use crate::processor::{DecIpv4HopLimit, Processor, VerifyIpv4Checksum};
use crate::resolver::{
    Admission, QueuedPacket, ReplyDisposition, ResolutionTable, Resolver, RetryPolicy,
};
use crate::table::{ArpCache, RouteTable};
use route_rs_packets::{ArpFrame, ArpOp, EthernetFrame, Ipv4Packet, MacAddr};
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

/// Runtime knobs. The defaults are three ARP requests one second apart and a TTL of 64 on
/// every ICMP message the router originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    pub retry: RetryPolicy,
    pub icmp_ttl: u8,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            retry: RetryPolicy::default(),
            icmp_ttl: DEFAULT_ICMP_TTL,
        }
    }
}

/// The forwarding core. The device layer feeds it every received frame through
/// `handle_frame`, from as many tasks as it likes, and gets back frames to send through
/// its `Transmit` implementation.
pub struct Router {
    interfaces: InterfaceRegistry,
    routes: RouteTable,
    arp_cache: ArpCache,
    factory: FrameFactory,
    resolver: Resolver,
}

impl Router {
    /// Builds a router with the default `RouterConfig` on the current tokio runtime.
    pub fn new(
        interfaces: InterfaceRegistry,
        routes: RouteTable,
        arp_cache: ArpCache,
        transmitter: Arc<dyn Transmit>,
    ) -> Result<Self, RouterError> {
        Router::with_config(
            interfaces,
            routes,
            arp_cache,
            transmitter,
            RouterConfig::default(),
        )
    }

    /// Fails when called outside a tokio runtime; use `with_handle` to name one explicitly.
    pub fn with_config(
        interfaces: InterfaceRegistry,
        routes: RouteTable,
        arp_cache: ArpCache,
        transmitter: Arc<dyn Transmit>,
        config: RouterConfig,
    ) -> Result<Self, RouterError> {
        let runtime = Handle::try_current()?;
        Ok(Router::with_handle(
            interfaces,
            routes,
            arp_cache,
            transmitter,
            config,
            runtime,
        ))
    }

    /// Resolution tasks run on `runtime`, which lets the device layer call `handle_frame`
    /// from threads that are not part of it.
    pub fn with_handle(
        interfaces: InterfaceRegistry,
        routes: RouteTable,
        arp_cache: ArpCache,
        transmitter: Arc<dyn Transmit>,
        config: RouterConfig,
        runtime: Handle,
    ) -> Self {
        let factory = FrameFactory::new(config.icmp_ttl);
        Router {
            interfaces,
            routes,
            arp_cache,
            factory,
            resolver: Resolver::new(transmitter, factory, config.retry, runtime),
        }
    }

    pub fn interfaces(&self) -> &InterfaceRegistry {
        &self.interfaces
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn resolutions(&self) -> &ResolutionTable {
        self.resolver.table()
    }

    /// Handles one frame received on `in_iface`. Replies, forwarded packets and ICMP errors
    /// go out through the transmitter; anything else is dropped.
    pub fn handle_frame(&self, frame: EthernetFrame, in_iface: &Arc<Interface>) {
        match ClassifyEtherType::new().classify(&frame) {
            EtherTypeClass::Arp => self.handle_arp(frame, in_iface),
            EtherTypeClass::Ipv4 => self.handle_ipv4(frame, in_iface),
            EtherTypeClass::Other(ether_type) => {
                trace!(iface = in_iface.name(), ether_type, "dropping frame");
            }
        }
    }

    fn handle_arp(&self, frame: EthernetFrame, in_iface: &Arc<Interface>) {
        let arp = match ArpFrame::try_from(frame) {
            Ok(arp) => arp,
            Err(reason) => {
                trace!(iface = in_iface.name(), reason, "dropping malformed ARP frame");
                return;
            }
        };

        if arp.target_protocol_addr() != in_iface.ip_addr() {
            trace!(
                iface = in_iface.name(),
                target = %arp.target_protocol_addr(),
                "ignoring ARP for another address"
            );
            return;
        }

        match arp.opcode() {
            op if op == ArpOp::Request as u16 => {
                debug!(
                    iface = in_iface.name(),
                    requester = %arp.sender_protocol_addr(),
                    "answering ARP request"
                );
                let reply = self.factory.arp_reply(&arp, in_iface);
                self.transmit(reply, in_iface);
            }
            op if op == ArpOp::Reply as u16 => self.handle_arp_reply(arp, in_iface),
            op => trace!(iface = in_iface.name(), op, "ignoring ARP operation"),
        }
    }

    fn handle_arp_reply(&self, reply: ArpFrame, in_iface: &Arc<Interface>) {
        let sender = reply.sender_protocol_addr();
        if self.arp_cache.contains(sender) {
            trace!(%sender, "ARP reply for an address already known");
            return;
        }

        let mac = reply.sender_hardware_addr();
        match self
            .resolver
            .table()
            .settle_reply(reply, in_iface.clone(), &self.arp_cache)
        {
            ReplyDisposition::Delivered => debug!(%sender, %mac, "learned next hop"),
            ReplyDisposition::Unsolicited => trace!(%sender, "unsolicited ARP reply"),
        }
    }

    fn handle_ipv4(&self, frame: EthernetFrame, in_iface: &Arc<Interface>) {
        let src_mac = frame.src_mac();
        let packet = match Ipv4Packet::try_from(frame) {
            Ok(packet) => packet,
            Err(reason) => {
                trace!(iface = in_iface.name(), reason, "dropping malformed IPv4 frame");
                return;
            }
        };

        if packet.ttl() <= 1 {
            debug!(src = %packet.src_addr(), dest = %packet.dest_addr(), "TTL expired");
            let reply = self.factory.time_exceeded(&packet, in_iface, src_mac);
            self.transmit(reply, in_iface);
            return;
        }

        let packet = match VerifyIpv4Checksum::new().process(packet) {
            Some(packet) => packet,
            None => return,
        };

        if self.interfaces.owner_of(packet.dest_addr()).is_some() {
            self.deliver_locally(packet, in_iface, src_mac);
        } else {
            self.forward(packet, in_iface, src_mac);
        }
    }

    fn deliver_locally(&self, packet: Ipv4Packet, in_iface: &Arc<Interface>, src_mac: MacAddr) {
        let reply = match ClassifyLocalDelivery::new().classify(&packet) {
            LocalClass::Transport => {
                debug!(src = %packet.src_addr(), protocol = ?packet.protocol(), "port unreachable");
                self.factory.port_unreachable(&packet, in_iface, src_mac)
            }
            LocalClass::EchoRequest => {
                debug!(src = %packet.src_addr(), dest = %packet.dest_addr(), "echo request");
                self.factory.echo_reply(&packet, in_iface, src_mac)
            }
            LocalClass::Other => {
                trace!(src = %packet.src_addr(), protocol = ?packet.protocol(), "dropping local packet");
                return;
            }
        };
        self.transmit(reply, in_iface);
    }

    fn forward(&self, packet: Ipv4Packet, in_iface: &Arc<Interface>, src_mac: MacAddr) {
        let dest = packet.dest_addr();
        let route = match self.routes.lookup(dest) {
            Some(route) => route,
            None => {
                debug!(%dest, "no route");
                let reply = self.factory.net_unreachable(&packet, in_iface, src_mac);
                self.transmit(reply, in_iface);
                return;
            }
        };

        let packet = match DecIpv4HopLimit::new().process(packet) {
            Some(packet) => packet,
            None => return,
        };
        let mut frame = match EthernetFrame::try_from(packet) {
            Ok(frame) => frame,
            Err(reason) => {
                warn!(%dest, reason, "routed packet lost its Ethernet header");
                return;
            }
        };

        let out_iface = route.interface();
        let next_hop = route.next_hop(dest);
        frame.set_src_mac(out_iface.mac_addr());

        match self.arp_cache.lookup(next_hop) {
            Some(entry) => {
                trace!(%dest, %next_hop, iface = out_iface.name(), "forwarding");
                frame.set_dest_mac(entry.mac());
                self.transmit(frame, out_iface);
            }
            None => self.resolve(
                next_hop,
                QueuedPacket {
                    frame,
                    in_iface: in_iface.clone(),
                    original_src_mac: src_mac,
                },
                out_iface,
            ),
        }
    }

    fn resolve(&self, next_hop: Ipv4Addr, packet: QueuedPacket, out_iface: &Arc<Interface>) {
        let factory = self.factory;
        let admission = self
            .resolver
            .table()
            .admit(next_hop, packet, &self.arp_cache, || {
                (factory.arp_request(next_hop, out_iface), out_iface.clone())
            });

        match admission {
            Admission::Queued => trace!(%next_hop, "queued behind pending resolution"),
            Admission::Created(pending) => {
                debug!(%next_hop, iface = out_iface.name(), "resolving next hop");
                self.resolver.spawn(pending);
            }
            Admission::Resolved(mac, packet) => {
                let mut frame = packet.frame;
                frame.set_dest_mac(mac);
                self.transmit(frame, out_iface);
            }
        }
    }

    fn transmit(&self, frame: EthernetFrame, iface: &Interface) {
        self.resolver.send(frame, iface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Phase;
    use crate::utils::test::*;
    use route_rs_packets::{Icmpv4Packet, IpProtocol, ARP_ETHER_TYPE};
    use std::time::Duration;
    use tokio::time;

    struct Fixture {
        router: Arc<Router>,
        sent: Recorded,
        eth0: Arc<Interface>,
        eth1: Arc<Interface>,
    }

    fn fixture() -> Fixture {
        let interfaces = interfaces();
        let routes = routes(&interfaces);
        let eth0 = interfaces.get(ETH0).unwrap().clone();
        let eth1 = interfaces.get(ETH1).unwrap().clone();
        let (transmitter, sent) = RecordingTransmitter::new();
        let router =
            Router::new(interfaces, routes, ArpCache::new(), Arc::new(transmitter)).unwrap();
        Fixture {
            router: Arc::new(router),
            sent,
            eth0,
            eth1,
        }
    }

    fn icmp_of(sent: &Sent) -> (Ipv4Packet, Icmpv4Packet) {
        let packet = Ipv4Packet::try_from(sent.frame.clone()).unwrap();
        let icmp = Icmpv4Packet::try_from(packet.clone()).unwrap();
        (packet, icmp)
    }

    #[tokio::test]
    async fn ttl_one_is_time_exceeded() {
        let f = fixture();
        let frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 1, IpProtocol::UDP, &[1, 2]);
        f.router.handle_frame(frame, &f.eth1);

        let sent = f.sent.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].iface, ETH1);
        assert_eq!(sent[0].frame.dest_mac(), HOST_MAC);
        assert_eq!(sent[0].frame.src_mac(), ETH1_MAC);
        let (packet, icmp) = icmp_of(&sent[0]);
        assert_eq!(packet.src_addr(), ETH1_IP);
        assert_eq!(packet.dest_addr(), HOST);
        assert_eq!((icmp.icmp_type(), icmp.code()), (11, 0));
        assert!(f.router.resolutions().is_empty());
    }

    #[tokio::test]
    async fn ttl_zero_is_time_exceeded() {
        let f = fixture();
        let frame = ipv4_frame(HOST, ETH0_IP, 0, IpProtocol::UDP, &[]);
        f.router.handle_frame(frame, &f.eth1);

        let sent = f.sent.drain();
        assert_eq!(sent.len(), 1);
        let (_, icmp) = icmp_of(&sent[0]);
        assert_eq!((icmp.icmp_type(), icmp.code()), (11, 0));
    }

    #[tokio::test]
    async fn bad_checksum_is_dropped() {
        let f = fixture();
        let mut frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 1, 9), 9, IpProtocol::UDP, &[7]);
        // flip a bit in the source address
        frame.data[14 + 12] ^= 0x01;
        f.router.handle_frame(frame, &f.eth1);

        assert!(f.sent.drain().is_empty());
        assert!(f.router.resolutions().is_empty());
    }

    #[tokio::test]
    async fn non_ipv4_is_dropped() {
        let f = fixture();
        let mut frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 1, 9), 9, IpProtocol::UDP, &[7]);
        frame.set_ether_type(0x86DD);
        f.router.handle_frame(frame, &f.eth1);

        let mut runt = EthernetFrame::empty();
        runt.set_ether_type(0x0800);
        f.router.handle_frame(runt, &f.eth1);

        assert!(f.sent.drain().is_empty());
    }

    #[tokio::test]
    async fn transport_to_router_is_port_unreachable() {
        let f = fixture();
        for protocol in vec![IpProtocol::TCP, IpProtocol::UDP] {
            let frame = ipv4_frame(HOST, ETH0_IP, 64, protocol, &[0, 80, 0, 80]);
            f.router.handle_frame(frame, &f.eth1);
        }
        let frame = ipv4_frame(HOST, ETH1_IP, 64, IpProtocol::Unknown(89), &[0; 8]);
        f.router.handle_frame(frame, &f.eth1);

        let sent = f.sent.drain();
        assert_eq!(sent.len(), 2);
        for reply in &sent {
            assert_eq!(reply.iface, ETH1);
            let (packet, icmp) = icmp_of(reply);
            assert_eq!((icmp.icmp_type(), icmp.code()), (3, 3));
            assert_eq!(packet.src_addr(), ETH1_IP);
        }
    }

    #[tokio::test]
    async fn echo_request_to_router_is_answered() {
        let f = fixture();
        // pinging eth0's address from the eth1 side
        let frame = echo_request_frame(HOST, ETH0_IP, 0x4242, 3, b"abcdefgh");
        f.router.handle_frame(frame, &f.eth1);

        let sent = f.sent.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].iface, ETH1);
        assert_eq!(sent[0].frame.dest_mac(), HOST_MAC);
        let (packet, icmp) = icmp_of(&sent[0]);
        assert!(packet.validate_checksum());
        assert_eq!(packet.src_addr(), ETH0_IP);
        assert_eq!(packet.dest_addr(), HOST);
        assert!(icmp.validate_checksum());
        assert_eq!((icmp.icmp_type(), icmp.code()), (0, 0));
        assert_eq!(icmp.identifier(), Some(0x4242));
        assert_eq!(icmp.sequence(), Some(3));
        assert_eq!(&icmp.body()[4..], b"abcdefgh");
    }

    #[tokio::test]
    async fn no_route_is_net_unreachable() {
        let interfaces = interfaces();
        let eth1 = interfaces.get(ETH1).unwrap().clone();
        let mut routes = RouteTable::new();
        routes.insert(
            Ipv4Addr::new(10, 0, 1, 0),
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(255, 255, 255, 0),
            eth1.clone(),
        );
        let (transmitter, sent) = RecordingTransmitter::new();
        let router =
            Router::new(interfaces, routes, ArpCache::new(), Arc::new(transmitter)).unwrap();

        let frame = ipv4_frame(HOST, Ipv4Addr::new(8, 8, 8, 8), 64, IpProtocol::UDP, &[1]);
        router.handle_frame(frame, &eth1);

        let sent = sent.drain();
        assert_eq!(sent.len(), 1);
        let (packet, icmp) = icmp_of(&sent[0]);
        assert_eq!((icmp.icmp_type(), icmp.code()), (3, 0));
        assert_eq!(packet.dest_addr(), HOST);
        assert!(router.resolutions().is_empty());
    }

    #[tokio::test]
    async fn forwards_with_known_next_hop() {
        let f = fixture();
        f.router.arp_cache().insert(GATEWAY_MAC, GATEWAY);

        let frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[9; 12]);
        f.router.handle_frame(frame, &f.eth1);

        let sent = f.sent.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].iface, ETH0);
        assert_eq!(sent[0].frame.src_mac(), ETH0_MAC);
        assert_eq!(sent[0].frame.dest_mac(), GATEWAY_MAC);

        let packet = Ipv4Packet::try_from(sent[0].frame.clone()).unwrap();
        assert_eq!(packet.ttl(), 4);
        assert!(packet.validate_checksum());
        assert_eq!(packet.src_addr(), HOST);
        assert_eq!(packet.dest_addr(), Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(packet.payload(), vec![9; 12]);
    }

    #[tokio::test]
    async fn directly_connected_resolves_destination() {
        let f = fixture();
        let neighbour = Ipv4Addr::new(10, 0, 1, 30);
        let neighbour_mac = MacAddr::new([0, 0, 0x5e, 0, 0x53, 0x1e]);
        f.router.arp_cache().insert(neighbour_mac, neighbour);

        let frame = ipv4_frame(HOST, neighbour, 64, IpProtocol::UDP, &[1]);
        f.router.handle_frame(frame, &f.eth1);

        let sent = f.sent.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].iface, ETH1);
        assert_eq!(sent[0].frame.dest_mac(), neighbour_mac);
    }

    #[tokio::test]
    async fn arp_request_for_interface_is_answered() {
        let f = fixture();
        f.router
            .handle_frame(arp_request(GATEWAY, GATEWAY_MAC, ETH0_IP), &f.eth0);

        let sent = f.sent.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].iface, ETH0);
        assert_eq!(sent[0].frame.dest_mac(), GATEWAY_MAC);
        let reply = ArpFrame::try_from(sent[0].frame.clone()).unwrap();
        assert_eq!(reply.opcode(), ArpOp::Reply as u16);
        assert_eq!(reply.sender_hardware_addr(), ETH0_MAC);
        assert_eq!(reply.sender_protocol_addr(), ETH0_IP);
        assert_eq!(reply.target_protocol_addr(), GATEWAY);
    }

    #[tokio::test]
    async fn arp_for_other_address_is_ignored() {
        let f = fixture();
        // eth1's address, but received on eth0
        f.router
            .handle_frame(arp_request(GATEWAY, GATEWAY_MAC, ETH1_IP), &f.eth0);
        f.router.handle_frame(
            arp_request(GATEWAY, GATEWAY_MAC, Ipv4Addr::new(192, 168, 1, 77)),
            &f.eth0,
        );

        assert!(f.sent.drain().is_empty());
    }

    #[tokio::test]
    async fn unsolicited_reply_is_not_learned() {
        let f = fixture();
        f.router
            .handle_frame(arp_reply(GATEWAY, GATEWAY_MAC).frame(), &f.eth0);

        assert!(f.router.arp_cache().is_empty());
        assert!(f.sent.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_next_hop_is_host_unreachable() {
        let f = fixture();
        let begin = time::Instant::now();
        let frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[1; 16]);
        f.router.handle_frame(frame, &f.eth1);

        // a single resolution, keyed by the gateway rather than the destination
        assert_eq!(f.router.resolutions().len(), 1);
        let pending = f.router.resolutions().get(GATEWAY).unwrap();
        assert!(!f.router.resolutions().contains(Ipv4Addr::new(10, 0, 0, 5)));

        time::sleep(Duration::from_millis(2500)).await;
        let requests = f.sent.drain();
        assert_eq!(requests.len(), 3);
        for (i, request) in requests.iter().enumerate() {
            assert_eq!(request.iface, ETH0);
            assert_eq!(request.frame.ether_type(), ARP_ETHER_TYPE);
            assert_eq!(request.frame.dest_mac(), MacAddr::BROADCAST);
            assert_near(request.at - begin, Duration::from_secs(i as u64));
            let arp = ArpFrame::try_from(request.frame.clone()).unwrap();
            assert_eq!(arp.target_protocol_addr(), GATEWAY);
            assert_eq!(arp.sender_protocol_addr(), ETH0_IP);
        }

        time::sleep(Duration::from_secs(1)).await;
        let bounced = f.sent.drain();
        assert_eq!(bounced.len(), 1);
        assert_near(bounced[0].at - begin, Duration::from_secs(3));
        assert_eq!(bounced[0].iface, ETH1);
        assert_eq!(bounced[0].frame.dest_mac(), HOST_MAC);
        let (packet, icmp) = icmp_of(&bounced[0]);
        assert_eq!((icmp.icmp_type(), icmp.code()), (3, 1));
        assert_eq!(packet.src_addr(), ETH1_IP);
        assert_eq!(packet.dest_addr(), HOST);

        assert_eq!(pending.phase(), Phase::Drained);
        assert!(f.router.resolutions().is_empty());
        assert!(f.router.arp_cache().lookup(GATEWAY).is_none());
    }

    #[test]
    fn building_outside_a_runtime_fails() {
        let interfaces = interfaces();
        let routes = routes(&interfaces);
        let (transmitter, _sent) = RecordingTransmitter::new();
        let router = Router::new(interfaces, routes, ArpCache::new(), Arc::new(transmitter));
        assert!(matches!(router, Err(RouterError::NoRuntime(_))));
    }

    #[test]
    fn resolves_for_a_device_thread_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();
        let interfaces = interfaces();
        let routes = routes(&interfaces);
        let eth1 = interfaces.get(ETH1).unwrap().clone();
        let (transmitter, sent) = RecordingTransmitter::new();
        let router = Arc::new(Router::with_handle(
            interfaces,
            routes,
            ArpCache::new(),
            Arc::new(transmitter),
            RouterConfig::default(),
            runtime.handle().clone(),
        ));

        let device = {
            let router = router.clone();
            std::thread::spawn(move || {
                let frame =
                    ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[1; 16]);
                router.handle_frame(frame, &eth1);
            })
        };
        device.join().unwrap();
        assert!(router.resolutions().contains(GATEWAY));

        runtime.block_on(async { time::sleep(Duration::from_millis(3100)).await });
        let sent = sent.drain();
        assert_eq!(sent.len(), 4);
        for request in &sent[..3] {
            assert_eq!(request.iface, ETH0);
            assert_eq!(request.frame.ether_type(), ARP_ETHER_TYPE);
        }
        assert_near(sent[2].at - sent[0].at, Duration::from_secs(2));
        assert_eq!(sent[3].iface, ETH1);
        let (_, icmp) = icmp_of(&sent[3]);
        assert_eq!((icmp.icmp_type(), icmp.code()), (3, 1));
        assert!(router.resolutions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reply_forwards_everything_queued() {
        let f = fixture();
        for tag in 1..=2 {
            let frame =
                ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[tag]);
            f.router.handle_frame(frame, &f.eth1);
        }
        time::sleep(Duration::from_millis(1200)).await;

        // a third packet, to another host behind the same gateway
        let frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 6), 5, IpProtocol::UDP, &[3]);
        f.router.handle_frame(frame, &f.eth1);
        assert_eq!(f.router.resolutions().len(), 1);
        assert_eq!(f.sent.drain().len(), 2);

        f.router
            .handle_frame(arp_reply(GATEWAY, GATEWAY_MAC).frame(), &f.eth0);
        assert_eq!(f.router.arp_cache().lookup(GATEWAY).unwrap().mac(), GATEWAY_MAC);

        time::sleep(Duration::from_millis(10)).await;
        let forwarded = f.sent.drain();
        assert_eq!(forwarded.len(), 3);
        let tags: Vec<u8> = forwarded.iter().map(|sent| frame_tag(&sent.frame)).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        for sent in &forwarded {
            assert_eq!(sent.iface, ETH0);
            assert_eq!(sent.frame.src_mac(), ETH0_MAC);
            assert_eq!(sent.frame.dest_mac(), GATEWAY_MAC);
            let packet = Ipv4Packet::try_from(sent.frame.clone()).unwrap();
            assert_eq!(packet.ttl(), 4);
            assert!(packet.validate_checksum());
        }

        // later traffic goes straight out, and no ICMP ever follows
        let frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[4]);
        f.router.handle_frame(frame, &f.eth1);
        time::sleep(Duration::from_secs(5)).await;
        let later = f.sent.drain();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].frame.dest_mac(), GATEWAY_MAC);
        assert!(f.router.resolutions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_is_ignored() {
        let f = fixture();
        let frame = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[1]);
        f.router.handle_frame(frame, &f.eth1);
        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(f.sent.drain().len(), 4);

        f.router
            .handle_frame(arp_reply(GATEWAY, GATEWAY_MAC).frame(), &f.eth0);
        assert!(f.router.arp_cache().is_empty());
        assert!(f.sent.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_next_hops_resolve_independently() {
        let f = fixture();
        let to_gateway = ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[1]);
        let to_default = ipv4_frame(HOST, Ipv4Addr::new(8, 8, 8, 8), 5, IpProtocol::UDP, &[2]);
        f.router.handle_frame(to_gateway, &f.eth1);
        f.router.handle_frame(to_default, &f.eth1);

        assert_eq!(f.router.resolutions().len(), 2);
        assert!(f.router.resolutions().contains(GATEWAY));
        assert!(f.router.resolutions().contains(DEFAULT_GATEWAY));

        time::sleep(Duration::from_millis(500)).await;
        f.router
            .handle_frame(arp_reply(GATEWAY, GATEWAY_MAC).frame(), &f.eth0);
        time::sleep(Duration::from_secs(3)).await;

        let sent = f.sent.drain();
        let forwarded: Vec<&Sent> = sent
            .iter()
            .filter(|s| s.frame.dest_mac() == GATEWAY_MAC)
            .collect();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(frame_tag(&forwarded[0].frame), 1);

        let bounced: Vec<&Sent> = sent.iter().filter(|s| s.iface == ETH1).collect();
        assert_eq!(bounced.len(), 1);
        let (_, icmp) = icmp_of(bounced[0]);
        assert_eq!((icmp.icmp_type(), icmp.code()), (3, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_packets_share_one_resolution() {
        let f = fixture();
        let handles: Vec<_> = (0..8u8)
            .map(|tag| {
                let router = f.router.clone();
                let eth1 = f.eth1.clone();
                tokio::spawn(async move {
                    let frame =
                        ipv4_frame(HOST, Ipv4Addr::new(10, 0, 0, 5), 5, IpProtocol::UDP, &[tag]);
                    router.handle_frame(frame, &eth1);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(f.router.resolutions().len(), 1);
        let pending = f.router.resolutions().get(GATEWAY).unwrap();
        assert_eq!(pending.queued(), 8);

        f.router
            .handle_frame(arp_reply(GATEWAY, GATEWAY_MAC).frame(), &f.eth0);
        while pending.phase() != Phase::Drained {
            tokio::task::yield_now().await;
        }

        let mut tags: Vec<u8> = f
            .sent
            .drain()
            .iter()
            .filter(|s| s.frame.dest_mac() == GATEWAY_MAC)
            .map(|s| frame_tag(&s.frame))
            .collect();
        tags.sort();
        assert_eq!(tags, (0..8).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn closed_transmitter_is_not_fatal() {
        let interfaces = interfaces();
        let routes = routes(&interfaces);
        let eth1 = interfaces.get(ETH1).unwrap().clone();
        let (transmitter, receiver) = crate::interface::ChannelTransmitter::unbounded();
        drop(receiver);
        let router =
            Router::new(interfaces, routes, ArpCache::new(), Arc::new(transmitter)).unwrap();

        let frame = ipv4_frame(HOST, ETH1_IP, 1, IpProtocol::UDP, &[]);
        router.handle_frame(frame, &eth1);
    }
}
