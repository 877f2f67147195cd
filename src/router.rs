use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::algorithms::PathOutcome;
use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::protocol::{
    flooding, handshake, validate_process_port, Link, LinkDescription, LinkStateAdvertisement,
    LinkStateDatabase, Metric, PacketStream, PacketType, PortTable, RouterDescription,
    SequenceNumber, SospfPacket,
};
use crate::SharedRouterState;

/// Everything guarded by the router's single critical section.
#[derive(Debug)]
pub struct RouterState {
    pub ports: PortTable,
    pub lsd: LinkStateDatabase,
}

impl RouterState {
    pub fn new(me: &RouterDescription, num_ports: usize) -> Self {
        Self {
            ports: PortTable::new(num_ports),
            lsd: LinkStateDatabase::new(me),
        }
    }

    /// Bring this router's own LSA in line with the port table.
    ///
    /// A new sequence number is issued only when the advertised links differ from the stored
    /// copy, or when the stored copy is flagged as shut down. Returns whether a new LSA was stored.
    pub fn refresh_own_lsa(&mut self, me: &RouterDescription) -> Result<bool> {
        let mut links = vec![LinkDescription::new(
            me.simulated_ip.as_str(),
            me.process_port,
            Metric::SelfLoop,
        )?];
        for (_, link) in self.ports.two_way_links() {
            links.push(LinkDescription::new(
                link.remote.simulated_ip.as_str(),
                link.remote.process_port,
                Metric::Cost(link.weight),
            )?);
        }

        let previous = self.lsd.get(&me.simulated_ip);
        if let Some(stored) = previous {
            if stored.links == links && !stored.shutdown {
                return Ok(false);
            }
        }

        let sequence = previous
            .map(|stored| stored.sequence)
            .unwrap_or(SequenceNumber::NoPriorAdvertisement)
            .next();
        let lsa = LinkStateAdvertisement {
            link_state_id: me.simulated_ip.clone(),
            sequence,
            links,
            shutdown: false,
        };
        self.lsd.put(&me.simulated_ip, lsa)
    }

    /// Process descriptions of TWO_WAY neighbors, optionally leaving one out.
    pub fn two_way_neighbors(&self, exclude: Option<&str>) -> Vec<RouterDescription> {
        self.ports
            .two_way_links()
            .filter(|(_, link)| Some(link.remote.simulated_ip.as_str()) != exclude)
            .map(|(_, link)| link.remote.clone())
            .collect()
    }
}

/// Cheap, cloneable handle on one router instance.
#[derive(Debug, Clone)]
pub struct Router {
    description: RouterDescription,
    config: Arc<RouterConfig>,
    state: SharedRouterState,
}

impl Router {
    /// Build a router listening on `process_port`. No network activity happens here.
    pub fn new(config: RouterConfig, process_port: u16) -> Result<Self> {
        config.validate()?;
        let description = RouterDescription::new(
            config.process_ip.as_str(),
            process_port,
            config.simulated_ip.as_str(),
            Metric::SelfLoop,
        )?;
        let state = RouterState::new(&description, config.num_ports);

        Ok(Self {
            description,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
        })
    }

    pub fn description(&self) -> &RouterDescription {
        &self.description
    }

    pub fn simulated_ip(&self) -> &str {
        &self.description.simulated_ip
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn state(&self) -> &SharedRouterState {
        &self.state
    }

    pub fn io_timeout(&self) -> Duration {
        self.config.io_timeout()
    }

    /// Register a pending link. No packet is sent and nothing is flooded.
    pub async fn attach(
        &self,
        process_ip: &str,
        process_port: u16,
        simulated_ip: &str,
        weight: u16,
    ) -> Result<usize> {
        validate_process_port(process_port)?;
        if weight == 0 {
            return Err(RouterError::InvalidWeight);
        }
        let remote =
            RouterDescription::new(process_ip, process_port, simulated_ip, Metric::Cost(weight))?;
        if remote.simulated_ip == self.description.simulated_ip
            || (remote.process_ip == self.description.process_ip
                && remote.process_port == self.description.process_port)
        {
            return Err(RouterError::SelfAttachment(remote.simulated_ip));
        }
        let link = Link::new(remote, weight)?;

        let index = self.state.lock().await.ports.attach(link)?;
        info!(port = index, neighbor = simulated_ip, weight, "attached link");
        Ok(index)
    }

    /// Run the HELLO handshake against every attached link that is not yet TWO_WAY.
    pub async fn start(&self) -> Vec<(String, Result<()>)> {
        let pending: Vec<String> = {
            let state = self.state.lock().await;
            state
                .ports
                .iter()
                .filter(|(_, link)| !link.is_two_way())
                .map(|(_, link)| link.remote.simulated_ip.clone())
                .collect()
        };

        let mut results = Vec::with_capacity(pending.len());
        for neighbor in pending {
            let result = handshake::initiate(self, &neighbor).await;
            if let Err(e) = &result {
                warn!(neighbor = %neighbor, error = %e, "handshake failed");
            }
            results.push((neighbor, result));
        }
        results
    }

    /// Attach and immediately handshake with a single router.
    pub async fn connect(
        &self,
        process_ip: &str,
        process_port: u16,
        simulated_ip: &str,
        weight: u16,
    ) -> Result<usize> {
        let index = self
            .attach(process_ip, process_port, simulated_ip, weight)
            .await?;

        if let Err(e) = handshake::initiate(self, simulated_ip).await {
            let mut state = self.state.lock().await;
            let stale = state
                .ports
                .get(index)
                .is_some_and(|link| link.remote.simulated_ip == simulated_ip && !link.is_two_way());
            if stale {
                state.ports.detach(index)?;
            }
            return Err(e);
        }
        Ok(index)
    }

    /// Point-in-time copy of the occupied port slots.
    pub async fn neighbors(&self) -> Vec<(usize, Link)> {
        let state = self.state.lock().await;
        state
            .ports
            .iter()
            .map(|(index, link)| (index, link.clone()))
            .collect()
    }

    pub async fn detect(&self, destination: &str) -> Result<PathOutcome> {
        let state = self.state.lock().await;
        state.lsd.shortest_path(destination)
    }

    /// Tear down the link at `index`, telling the neighbor on a best-effort basis.
    pub async fn disconnect(&self, index: usize) -> Result<RouterDescription> {
        let remote = {
            let state = self.state.lock().await;
            if index >= state.ports.capacity() {
                return Err(RouterError::InvalidPortIndex {
                    index,
                    capacity: state.ports.capacity(),
                });
            }
            state
                .ports
                .get(index)
                .map(|link| link.remote.clone())
                .ok_or(RouterError::PortNotAttached(index))?
        };

        if let Err(e) = self.send_disconnect(&remote).await {
            warn!(neighbor = %remote.simulated_ip, error = %e, "could not deliver DISCONNECT");
        }
        self.remove_neighbor(&remote.simulated_ip).await?;
        Ok(remote)
    }

    async fn send_disconnect(&self, remote: &RouterDescription) -> Result<()> {
        let packet = SospfPacket::from_description(
            &self.description,
            &remote.simulated_ip,
            PacketType::Disconnect,
            None,
            None,
        )?;
        let mut stream = PacketStream::connect(&remote.process_addr(), self.io_timeout()).await?;
        stream.send(&packet).await?;
        stream.shutdown().await;
        Ok(())
    }

    /// Clear the slot holding `simulated_ip`, re-issue our LSA and flood it to every
    /// remaining TWO_WAY neighbor. Returns whether a slot was cleared.
    pub async fn remove_neighbor(&self, simulated_ip: &str) -> Result<bool> {
        let changed = {
            let mut state = self.state.lock().await;
            let Some(index) = state.ports.position_of(simulated_ip) else {
                return Ok(false);
            };
            state.ports.detach(index)?;
            info!(port = index, neighbor = simulated_ip, "link removed");
            state.refresh_own_lsa(&self.description)?
        };

        if changed {
            flooding::flood(self, None).await;
        }
        Ok(true)
    }

    /// Disconnect every occupied slot.
    pub async fn quit(&self) -> Vec<(usize, Result<RouterDescription>)> {
        let occupied: Vec<usize> = self.neighbors().await.into_iter().map(|(i, _)| i).collect();

        let mut results = Vec::with_capacity(occupied.len());
        for index in occupied {
            results.push((index, self.disconnect(index).await));
        }
        info!(router = %self.description.simulated_ip, "router shutting down");
        results
    }

    pub async fn lsd_dump(&self) -> String {
        self.state.lock().await.lsd.to_string()
    }
}
