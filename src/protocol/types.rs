use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, RouterError};

pub const MIN_PROCESS_PORT: u16 = 20000;
pub const MAX_PROCESS_PORT: u16 = i16::MAX as u16;

/// Neighbor status, ordered by handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RouterStatus {
    Unknown,
    Init,
    TwoWay,
}

impl fmt::Display for RouterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterStatus::Unknown => write!(f, "UNKNOWN"),
            RouterStatus::Init => write!(f, "INIT"),
            RouterStatus::TwoWay => write!(f, "TWO_WAY"),
        }
    }
}

/// Cost of traversing an edge.
///
/// `SelfLoop` marks the originator's own node inside its LSA and costs nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SelfLoop,
    Cost(u16),
}

impl Metric {
    pub fn cost(self) -> u64 {
        match self {
            Metric::SelfLoop => 0,
            Metric::Cost(weight) => weight as u64,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cost())
    }
}

pub fn validate_process_port(port: u16) -> Result<u16> {
    if !(MIN_PROCESS_PORT..=MAX_PROCESS_PORT).contains(&port) {
        return Err(RouterError::PortOutOfRange {
            port,
            min: MIN_PROCESS_PORT,
            max: MAX_PROCESS_PORT,
        });
    }
    Ok(port)
}

pub(crate) fn require(value: &str, field: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RouterError::MissingField(field));
    }
    Ok(())
}

/// One router endpoint: where to open sockets and how it is known on the simulated network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDescription {
    pub process_ip: String,
    pub process_port: u16,
    pub simulated_ip: String,
    pub status: RouterStatus,
    /// Weight assigned to the link when this description was created
    pub weight: Metric,
}

impl RouterDescription {
    pub fn new(
        process_ip: impl Into<String>,
        process_port: u16,
        simulated_ip: impl Into<String>,
        weight: Metric,
    ) -> Result<Self> {
        let process_ip = process_ip.into();
        let simulated_ip = simulated_ip.into();
        require(&process_ip, "process IP")?;
        require(&simulated_ip, "simulated IP")?;

        Ok(Self {
            process_ip,
            process_port,
            simulated_ip,
            status: RouterStatus::Unknown,
            weight,
        })
    }

    pub fn process_addr(&self) -> String {
        format!("{}:{}", self.process_ip, self.process_port)
    }
}

/// A link from this router to one remote router, held in a port-table slot.
#[derive(Debug, Clone)]
pub struct Link {
    pub remote: RouterDescription,
    pub weight: u16,
    pub established_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Link {
    pub fn new(remote: RouterDescription, weight: u16) -> Result<Self> {
        if weight == 0 {
            return Err(RouterError::InvalidWeight);
        }
        Ok(Self {
            remote,
            weight,
            established_at: None,
            last_heartbeat: None,
        })
    }

    pub fn status(&self) -> RouterStatus {
        self.remote.status
    }

    pub fn is_two_way(&self) -> bool {
        self.remote.status == RouterStatus::TwoWay
    }

    /// Move the link to `status`, stamping the time it first became TWO_WAY.
    pub fn set_status(&mut self, status: RouterStatus) {
        if status == RouterStatus::TwoWay && !self.is_two_way() {
            self.established_at = Some(Utc::now());
        }
        self.remote.status = status;
    }
}
