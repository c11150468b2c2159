use crate::*;
use std::borrow::Cow;
use std::convert::{TryFrom, TryInto};

/// ICMPv4 message types handled by the router
pub enum Icmpv4Type {
    EchoReply = 0,
    DestUnreachable = 3,
    EchoRequest = 8,
    TimeExceeded = 11,
}

/// Codes for `Icmpv4Type::DestUnreachable`
pub enum DestUnreachableCode {
    Net = 0,
    Host = 1,
    Port = 3,
}

/// Codes for `Icmpv4Type::TimeExceeded`
pub enum TimeExceededCode {
    TtlExpired = 0,
}

/// Type, code and checksum. Everything after is the message body: the identifier/sequence
/// and data of an echo, or the unused word and quoted datagram of an error.
const ICMP_HEADER_LEN: usize = 4;
const CHECKSUM_WORD: usize = 1;

///
/// Getters/setters for the ICMPv4 message layout described in RFC 792
/// https://tools.ietf.org/html/rfc792
///
#[derive(Clone, Debug)]
pub struct Icmpv4Packet {
    pub data: PacketData,
    pub layer2_offset: Option<usize>,
    pub layer3_offset: Option<usize>,
    pub layer4_offset: usize,
}

impl Packet for Icmpv4Packet {}

impl Icmpv4Packet {
    /// A zeroed 4 byte header with an empty body, not wrapped in any lower layer
    pub fn empty() -> Icmpv4Packet {
        Icmpv4Packet {
            data: vec![0; ICMP_HEADER_LEN],
            layer2_offset: None,
            layer3_offset: None,
            layer4_offset: 0,
        }
    }

    pub fn icmp_type(&self) -> u8 {
        self.data[self.layer4_offset]
    }

    pub fn set_icmp_type(&mut self, icmp_type: u8) {
        self.data[self.layer4_offset] = icmp_type;
    }

    pub fn code(&self) -> u8 {
        self.data[self.layer4_offset + 1]
    }

    pub fn set_code(&mut self, code: u8) {
        self.data[self.layer4_offset + 1] = code;
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer4_offset + 2..=self.layer4_offset + 3]
                .try_into()
                .unwrap(),
        )
    }

    /// Checksum over the whole message with the checksum field treated as zero
    pub fn calculate_checksum(&self) -> u16 {
        internet_checksum(&self.data[self.layer4_offset..], Some(CHECKSUM_WORD))
    }

    pub fn validate_checksum(&self) -> bool {
        self.checksum() == self.calculate_checksum()
    }

    pub fn set_checksum(&mut self) {
        let new_checksum = self.calculate_checksum();
        self.data[self.layer4_offset + 2..=self.layer4_offset + 3]
            .copy_from_slice(&new_checksum.to_be_bytes());
    }

    pub fn body(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.layer4_offset + ICMP_HEADER_LEN..])
    }

    /// Replaces the body. Only valid on a standalone message; a message still wrapped in an
    /// IPv4 packet would be left with a stale total length.
    pub fn set_body(&mut self, body: &[u8]) {
        self.data.truncate(self.layer4_offset + ICMP_HEADER_LEN);
        self.data.reserve_exact(body.len());
        self.data.extend(body);
    }

    /// Echo identifier, when the body is long enough to carry one
    pub fn identifier(&self) -> Option<u16> {
        let start = self.layer4_offset + ICMP_HEADER_LEN;
        self.data
            .get(start..start + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    /// Echo sequence number, when the body is long enough to carry one
    pub fn sequence(&self) -> Option<u16> {
        let start = self.layer4_offset + ICMP_HEADER_LEN + 2;
        self.data
            .get(start..start + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    }
}

impl TryFrom<Ipv4Packet> for Icmpv4Packet {
    type Error = &'static str;

    fn try_from(packet: Ipv4Packet) -> Result<Self, Self::Error> {
        if packet.protocol() != IpProtocol::ICMP {
            return Err("Packet does not carry ICMP");
        }
        if packet.data.len() < packet.payload_offset + ICMP_HEADER_LEN {
            return Err("Payload is too short to be an ICMP message");
        }
        Ok(Icmpv4Packet {
            data: packet.data,
            layer2_offset: packet.layer2_offset,
            layer3_offset: Some(packet.layer3_offset),
            layer4_offset: packet.payload_offset,
        })
    }
}
