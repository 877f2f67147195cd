use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{require, validate_process_port, Metric, RouterDescription};
use crate::error::{Result, RouterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum PacketType {
    NoPortsAvailable,
    Hello,
    LsaUpdate,
    Connect,
    Disconnect,
    Heartbeat,
}

impl TryFrom<i16> for PacketType {
    type Error = RouterError;

    fn try_from(code: i16) -> Result<Self> {
        match code {
            -1 => Ok(PacketType::NoPortsAvailable),
            0 => Ok(PacketType::Hello),
            1 => Ok(PacketType::LsaUpdate),
            2 => Ok(PacketType::Connect),
            3 => Ok(PacketType::Disconnect),
            4 => Ok(PacketType::Heartbeat),
            other => Err(RouterError::InvalidPacketType(other)),
        }
    }
}

impl From<PacketType> for i16 {
    fn from(packet_type: PacketType) -> i16 {
        match packet_type {
            PacketType::NoPortsAvailable => -1,
            PacketType::Hello => 0,
            PacketType::LsaUpdate => 1,
            PacketType::Connect => 2,
            PacketType::Disconnect => 3,
            PacketType::Heartbeat => 4,
        }
    }
}

impl PacketType {
    /// HELLO and CONNECT both drive the neighbor handshake.
    pub fn is_hello(self) -> bool {
        matches!(self, PacketType::Hello | PacketType::Connect)
    }
}

/// LSA sequence number. Variant order makes "never advertised" older than any issued number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceNumber {
    NoPriorAdvertisement,
    Issued(u32),
}

impl SequenceNumber {
    pub fn next(self) -> Self {
        match self {
            SequenceNumber::NoPriorAdvertisement => SequenceNumber::Issued(0),
            SequenceNumber::Issued(n) => SequenceNumber::Issued(n.saturating_add(1)),
        }
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceNumber::NoPriorAdvertisement => write!(f, "-"),
            SequenceNumber::Issued(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDescription {
    pub link_id: String,
    pub process_port: u16,
    pub metric: Metric,
}

impl LinkDescription {
    pub fn new(link_id: impl Into<String>, process_port: u16, metric: Metric) -> Result<Self> {
        let link_id = link_id.into();
        require(&link_id, "link id")?;
        Ok(Self {
            link_id,
            process_port,
            metric,
        })
    }
}

impl fmt::Display for LinkDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.link_id, self.process_port, self.metric)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStateAdvertisement {
    pub link_state_id: String,
    pub sequence: SequenceNumber,
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub shutdown: bool,
}

impl LinkStateAdvertisement {
    /// The entry a router writes for itself before any network activity.
    pub fn bootstrap(router: &RouterDescription) -> Self {
        Self {
            link_state_id: router.simulated_ip.clone(),
            sequence: SequenceNumber::NoPriorAdvertisement,
            links: vec![LinkDescription {
                link_id: router.simulated_ip.clone(),
                process_port: router.process_port,
                metric: Metric::SelfLoop,
            }],
            shutdown: false,
        }
    }

    pub fn link_to(&self, target: &str) -> Option<&LinkDescription> {
        self.links.iter().find(|link| link.link_id == target)
    }
}

impl fmt::Display for LinkStateAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.link_state_id, self.sequence)?;
        if self.shutdown {
            write!(f, " [shutdown]")?;
        }
        write!(f, ":")?;
        for link in &self.links {
            write!(f, "\t{}", link)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WirePacket {
    src_process_ip: String,
    src_process_port: u16,
    src_ip: String,
    dst_ip: String,
    packet_type: i16,
    router_id: String,
    neighbor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lsas: Option<Vec<LinkStateAdvertisement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    weight: Option<u16>,
}

/// A packet exchanged between routers. Decoding goes through the same checks as [`SospfPacket::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePacket", into = "WirePacket")]
pub struct SospfPacket {
    pub src_process_ip: String,
    pub src_process_port: u16,
    pub src_ip: String,
    pub dst_ip: String,
    pub packet_type: PacketType,
    pub router_id: String,
    pub neighbor_id: String,
    pub lsas: Option<Vec<LinkStateAdvertisement>>,
    /// Only meaningful for HELLO and CONNECT
    pub weight: Option<u16>,
}

impl SospfPacket {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        src_process_ip: impl Into<String>,
        src_process_port: u16,
        src_ip: impl Into<String>,
        dst_ip: impl Into<String>,
        packet_type: i16,
        router_id: impl Into<String>,
        neighbor_id: impl Into<String>,
        lsas: Option<Vec<LinkStateAdvertisement>>,
        weight: Option<u16>,
    ) -> Result<Self> {
        let packet = Self {
            src_process_ip: src_process_ip.into(),
            src_process_port: validate_process_port(src_process_port)?,
            src_ip: src_ip.into(),
            dst_ip: dst_ip.into(),
            packet_type: PacketType::try_from(packet_type)?,
            router_id: router_id.into(),
            neighbor_id: neighbor_id.into(),
            lsas,
            weight,
        };
        require(&packet.src_process_ip, "source process IP")?;
        require(&packet.src_ip, "source simulated IP")?;
        require(&packet.dst_ip, "destination simulated IP")?;
        require(&packet.router_id, "router id")?;
        require(&packet.neighbor_id, "neighbor id")?;
        Ok(packet)
    }

    /// Build a packet sent by `src`, using its simulated address as router and neighbor id.
    pub fn from_description(
        src: &RouterDescription,
        dst_ip: &str,
        packet_type: PacketType,
        lsas: Option<Vec<LinkStateAdvertisement>>,
        weight: Option<u16>,
    ) -> Result<Self> {
        Self::new(
            src.process_ip.as_str(),
            src.process_port,
            src.simulated_ip.as_str(),
            dst_ip,
            packet_type.into(),
            src.simulated_ip.as_str(),
            src.simulated_ip.as_str(),
            lsas,
            weight,
        )
    }

    pub fn lsa_batch(&self) -> &[LinkStateAdvertisement] {
        self.lsas.as_deref().unwrap_or(&[])
    }
}

impl TryFrom<WirePacket> for SospfPacket {
    type Error = RouterError;

    fn try_from(wire: WirePacket) -> Result<Self> {
        SospfPacket::new(
            wire.src_process_ip,
            wire.src_process_port,
            wire.src_ip,
            wire.dst_ip,
            wire.packet_type,
            wire.router_id,
            wire.neighbor_id,
            wire.lsas,
            wire.weight,
        )
    }
}

impl From<SospfPacket> for WirePacket {
    fn from(packet: SospfPacket) -> Self {
        WirePacket {
            src_process_ip: packet.src_process_ip,
            src_process_port: packet.src_process_port,
            src_ip: packet.src_ip,
            dst_ip: packet.dst_ip,
            packet_type: packet.packet_type.into(),
            router_id: packet.router_id,
            neighbor_id: packet.neighbor_id,
            lsas: packet.lsas,
            weight: packet.weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> RouterDescription {
        RouterDescription::new("127.0.0.1", 20000, "192.168.1.1", Metric::SelfLoop).unwrap()
    }

    #[test]
    fn packet_type_codes() {
        for code in -1..=4 {
            let packet_type = PacketType::try_from(code).unwrap();
            assert_eq!(i16::from(packet_type), code);
        }
        assert!(matches!(
            PacketType::try_from(5),
            Err(RouterError::InvalidPacketType(5))
        ));
        assert!(matches!(
            PacketType::try_from(-2),
            Err(RouterError::InvalidPacketType(-2))
        ));
    }

    #[test]
    fn construction_rejects_bad_type_and_empty_ids() {
        let bad_type = SospfPacket::new("127.0.0.1", 20000, "a", "b", 9, "a", "a", None, None);
        assert!(matches!(bad_type, Err(RouterError::InvalidPacketType(9))));

        let empty_dst = SospfPacket::new("127.0.0.1", 20000, "a", "", 0, "a", "a", None, Some(1));
        assert!(matches!(
            empty_dst,
            Err(RouterError::MissingField("destination simulated IP"))
        ));

        let empty_neighbor = SospfPacket::new("127.0.0.1", 20000, "a", "b", 0, "a", "", None, None);
        assert!(matches!(
            empty_neighbor,
            Err(RouterError::MissingField("neighbor id"))
        ));
    }

    #[test]
    fn construction_rejects_reserved_source_port() {
        let packet = SospfPacket::new("127.0.0.1", 80, "a", "b", 0, "a", "a", None, Some(1));
        assert!(matches!(
            packet,
            Err(RouterError::PortOutOfRange { port: 80, .. })
        ));
    }

    #[test]
    fn decoding_rejects_reserved_source_port() {
        let json = r#"{"src_process_ip":"127.0.0.1","src_process_port":80,"src_ip":"a",
            "dst_ip":"b","packet_type":0,"router_id":"a","neighbor_id":"a","weight":1}"#;
        assert!(serde_json::from_str::<SospfPacket>(json).is_err());
    }

    #[test]
    fn decoding_validates_packet_type() {
        let json = r#"{"src_process_ip":"127.0.0.1","src_process_port":20000,"src_ip":"a",
            "dst_ip":"b","packet_type":42,"router_id":"a","neighbor_id":"a"}"#;
        assert!(serde_json::from_str::<SospfPacket>(json).is_err());
    }

    #[test]
    fn update_packet_carries_lsas() {
        let me = router();
        let lsa = LinkStateAdvertisement::bootstrap(&me);
        let packet = SospfPacket::from_description(
            &me,
            "192.168.1.2",
            PacketType::LsaUpdate,
            Some(vec![lsa.clone()]),
            None,
        )
        .unwrap();

        let json = serde_json::to_string(&packet).unwrap();
        assert!(json.contains("\"packet_type\":1"));
        assert!(!json.contains("\"weight\""));

        let decoded: SospfPacket = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.router_id, "192.168.1.1");
        assert_eq!(decoded.neighbor_id, "192.168.1.1");
        assert_eq!(decoded.lsa_batch(), &[lsa]);
    }

    #[test]
    fn sequence_numbers_start_at_zero() {
        let none = SequenceNumber::NoPriorAdvertisement;
        assert_eq!(none.next(), SequenceNumber::Issued(0));
        assert_eq!(SequenceNumber::Issued(0).next(), SequenceNumber::Issued(1));
        assert!(none < SequenceNumber::Issued(0));
        assert!(SequenceNumber::Issued(3) < SequenceNumber::Issued(4));
    }

    #[test]
    fn bootstrap_lsa_is_single_self_loop() {
        let me = router();
        let lsa = LinkStateAdvertisement::bootstrap(&me);

        assert_eq!(lsa.link_state_id, "192.168.1.1");
        assert_eq!(lsa.sequence, SequenceNumber::NoPriorAdvertisement);
        assert_eq!(lsa.links.len(), 1);
        assert_eq!(lsa.links[0].link_id, "192.168.1.1");
        assert_eq!(lsa.links[0].metric, Metric::SelfLoop);
        assert!(!lsa.shutdown);
    }

    #[test]
    fn link_description_requires_id() {
        assert!(LinkDescription::new("", 20000, Metric::Cost(1)).is_err());
    }
}
