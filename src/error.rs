//! Error types for the SOSPF router.

use thiserror::Error;

use crate::protocol::PacketType;

/// Errors that can occur while running a router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Packet type code outside the known set
    #[error("invalid SOSPF packet type: {0}")]
    InvalidPacketType(i16),

    /// A required identifier was empty
    #[error("missing or empty {0}")]
    MissingField(&'static str),

    /// Process port outside the range routers listen on
    #[error("process port {port} is outside {min}..={max}")]
    PortOutOfRange { port: u16, min: u16, max: u16 },

    #[error("port index {index} is invalid (router has {capacity} ports)")]
    InvalidPortIndex { index: usize, capacity: usize },

    #[error("link weight must be greater than 0")]
    InvalidWeight,

    #[error("cannot attach a router to itself ({0})")]
    SelfAttachment(String),

    #[error("no free port available on this router")]
    NoFreePort,

    #[error("already attached to {0}")]
    DuplicateAttachment(String),

    #[error("no link attached at port index {0}")]
    PortNotAttached(usize),

    #[error("no link attached to {0}")]
    UnknownNeighbor(String),

    #[error("no free listening port in {min}..={max}")]
    NoListeningPort { min: u16, max: u16 },

    /// The remote side answered our HELLO with NO_PORTS_AVAILABLE
    #[error("remote router {0} has no ports available")]
    RemoteNoPortsAvailable(String),

    /// Protocol violation on a single connection
    #[error("expected {expected} but received {received:?}")]
    UnexpectedPacket {
        expected: &'static str,
        received: PacketType,
    },

    #[error("HELLO from {0} carries no transmission weight")]
    MissingWeight(String),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("packet exceeds {limit} bytes")]
    PacketTooLarge { limit: usize },

    #[error("timed out while {0}")]
    Timeout(&'static str),

    #[error("LSA for {originator} cannot be stored under key {key}")]
    LsaKeyMismatch { key: String, originator: String },

    /// Path reconstruction did not end at the source: the database is inconsistent
    #[error("shortest path walk ended at {root}, expected source {source_id}")]
    InconsistentPath { root: String, source_id: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RouterError {
    /// Transient failures talking to a peer, as opposed to local or protocol faults.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RouterError::Io(_) | RouterError::Timeout(_) | RouterError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
