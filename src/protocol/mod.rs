//! SOSPF wire protocol: data model, framing, neighbor handshake, LSA flooding and
//! failure detection.

pub mod codec;
pub mod flooding;
pub mod handshake;
pub mod heartbeat;
pub mod lsd;
pub mod messages;
pub mod ports;
pub mod server;
pub mod types;

pub use codec::PacketStream;
pub use lsd::LinkStateDatabase;
pub use messages::{LinkDescription, LinkStateAdvertisement, PacketType, SequenceNumber, SospfPacket};
pub use ports::{PortSearchResult, PortTable};
pub use types::{
    validate_process_port, Link, Metric, RouterDescription, RouterStatus, MAX_PROCESS_PORT,
    MIN_PROCESS_PORT,
};
