use crate::interface::Interface;
use route_rs_packets::{
    ArpFrame, ArpOp, DestUnreachableCode, EthernetFrame, Icmpv4Packet, Icmpv4Type, Ipv4Packet,
    MacAddr, TimeExceededCode,
};
use std::net::Ipv4Addr;

/// Bytes of the offending datagram's payload quoted after its header in an ICMP error
const QUOTED_PAYLOAD_LEN: usize = 8;
/// The unused word that opens every error message body
const ERROR_UNUSED_LEN: usize = 4;
/// Type, code and checksum ahead of an echo's identifier, sequence number and data
const ICMP_HEADER_LEN: usize = 4;

pub const DEFAULT_ICMP_TTL: u8 = 64;

/// Builds every frame the router originates: ARP requests and replies, ICMP errors and echo
/// replies. ICMP frames are addressed back out the interface the triggering packet came in
/// on, toward the link address it came from.
#[derive(Debug, Clone, Copy)]
pub struct FrameFactory {
    icmp_ttl: u8,
}

impl Default for FrameFactory {
    fn default() -> Self {
        FrameFactory::new(DEFAULT_ICMP_TTL)
    }
}

impl FrameFactory {
    pub fn new(icmp_ttl: u8) -> Self {
        FrameFactory { icmp_ttl }
    }

    /// Answers `request` on behalf of `in_iface`.
    pub fn arp_reply(&self, request: &ArpFrame, in_iface: &Interface) -> EthernetFrame {
        let mut reply = ArpFrame::new();
        reply.set_opcode(ArpOp::Reply as u16);
        reply.set_sender_hardware_addr(in_iface.mac_addr());
        reply.set_sender_protocol_addr(in_iface.ip_addr());
        reply.set_target_hardware_addr(request.sender_hardware_addr());
        reply.set_target_protocol_addr(request.sender_protocol_addr());

        let ethernet = reply.ethernet_mut();
        ethernet.set_src_mac(in_iface.mac_addr());
        ethernet.set_dest_mac(request.ethernet().src_mac());
        reply.frame()
    }

    /// Broadcast request for `next_hop`, sent from `out_iface`.
    pub fn arp_request(&self, next_hop: Ipv4Addr, out_iface: &Interface) -> EthernetFrame {
        let mut request = ArpFrame::new();
        request.set_opcode(ArpOp::Request as u16);
        request.set_sender_hardware_addr(out_iface.mac_addr());
        request.set_sender_protocol_addr(out_iface.ip_addr());
        request.set_target_hardware_addr(MacAddr::ZERO);
        request.set_target_protocol_addr(next_hop);

        let ethernet = request.ethernet_mut();
        ethernet.set_src_mac(out_iface.mac_addr());
        ethernet.set_dest_mac(MacAddr::BROADCAST);
        request.frame()
    }

    /// An ICMP error about `trigger`, quoting its header and the first 8 bytes of its
    /// payload.
    pub fn icmp(
        &self,
        icmp_type: u8,
        code: u8,
        trigger: &Ipv4Packet,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        let payload = trigger.payload();
        let quoted = &payload[..payload.len().min(QUOTED_PAYLOAD_LEN)];

        let mut body = Vec::with_capacity(ERROR_UNUSED_LEN + trigger.header_len() + quoted.len());
        body.extend_from_slice(&[0; ERROR_UNUSED_LEN]);
        body.extend_from_slice(trigger.header());
        body.extend_from_slice(quoted);

        let mut icmp = Icmpv4Packet::empty();
        icmp.set_icmp_type(icmp_type);
        icmp.set_code(code);
        icmp.set_body(&body);
        icmp.set_checksum();

        self.wrap(icmp, in_iface.ip_addr(), trigger.src_addr(), in_iface, dest_mac)
    }

    pub fn time_exceeded(
        &self,
        trigger: &Ipv4Packet,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        self.icmp(
            Icmpv4Type::TimeExceeded as u8,
            TimeExceededCode::TtlExpired as u8,
            trigger,
            in_iface,
            dest_mac,
        )
    }

    pub fn net_unreachable(
        &self,
        trigger: &Ipv4Packet,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        self.unreachable(DestUnreachableCode::Net, trigger, in_iface, dest_mac)
    }

    pub fn host_unreachable(
        &self,
        trigger: &Ipv4Packet,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        self.unreachable(DestUnreachableCode::Host, trigger, in_iface, dest_mac)
    }

    pub fn port_unreachable(
        &self,
        trigger: &Ipv4Packet,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        self.unreachable(DestUnreachableCode::Port, trigger, in_iface, dest_mac)
    }

    fn unreachable(
        &self,
        code: DestUnreachableCode,
        trigger: &Ipv4Packet,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        self.icmp(
            Icmpv4Type::DestUnreachable as u8,
            code as u8,
            trigger,
            in_iface,
            dest_mac,
        )
    }

    /// Echoes `request`'s identifier, sequence number and data back to its sender, sourced
    /// from the address that was pinged rather than the receiving interface.
    pub fn echo_reply(
        &self,
        request: &Ipv4Packet,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        let payload = request.payload();
        let body = payload.get(ICMP_HEADER_LEN..).unwrap_or(&[]);

        let mut icmp = Icmpv4Packet::empty();
        icmp.set_icmp_type(Icmpv4Type::EchoReply as u8);
        icmp.set_code(0);
        icmp.set_body(body);
        icmp.set_checksum();

        self.wrap(
            icmp,
            request.dest_addr(),
            request.src_addr(),
            in_iface,
            dest_mac,
        )
    }

    fn wrap(
        &self,
        icmp: Icmpv4Packet,
        src: Ipv4Addr,
        dest: Ipv4Addr,
        in_iface: &Interface,
        dest_mac: MacAddr,
    ) -> EthernetFrame {
        let mut packet = Ipv4Packet::encap_icmp(icmp);
        packet.set_ttl(self.icmp_ttl);
        packet.set_src_addr(src);
        packet.set_dest_addr(dest);
        packet.set_checksum();

        let mut frame = EthernetFrame::encap_ipv4(packet);
        frame.set_src_mac(in_iface.mac_addr());
        frame.set_dest_mac(dest_mac);
        frame
    }
}
