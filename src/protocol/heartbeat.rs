//! Periodic liveness probing of TWO_WAY neighbors.

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::codec::PacketStream;
use super::flooding;
use super::messages::{PacketType, SospfPacket};
use super::types::RouterDescription;
use crate::error::{Result, RouterError};
use crate::router::{Router, RouterState};

/// Result of one detector pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorReport {
    /// Neighbors declared dead during this pass
    pub dead: Vec<String>,
    /// Whether the pass flooded a database change
    pub flooded: bool,
}

/// One HEARTBEAT round trip over a fresh connection.
async fn ping(router: &Router, remote: &RouterDescription) -> Result<()> {
    let packet = SospfPacket::from_description(
        router.description(),
        &remote.simulated_ip,
        PacketType::Heartbeat,
        None,
        None,
    )?;
    let mut stream = PacketStream::connect(&remote.process_addr(), router.io_timeout()).await?;
    stream.send(&packet).await?;
    let reply = stream.recv().await?;
    stream.shutdown().await;

    if reply.packet_type != PacketType::Heartbeat {
        return Err(RouterError::UnexpectedPacket {
            expected: "HEARTBEAT",
            received: reply.packet_type,
        });
    }
    Ok(())
}

/// Tear down the slot at `index` if it still belongs to `simulated_ip` and mark the
/// neighbor's last known LSA as shut down.
fn condemn(
    state: &mut RouterState,
    me: &RouterDescription,
    index: usize,
    simulated_ip: &str,
) -> Result<bool> {
    let still_attached = state
        .ports
        .get(index)
        .is_some_and(|link| link.remote.simulated_ip == simulated_ip);
    if !still_attached {
        return Ok(false);
    }

    state.ports.detach(index)?;
    state.refresh_own_lsa(me)?;

    if let Some(mut dead) = state.lsd.get(simulated_ip).cloned() {
        dead.shutdown = true;
        dead.sequence = dead.sequence.next();
        state.lsd.put(simulated_ip, dead)?;
    }
    Ok(true)
}

/// Ping every TWO_WAY neighbor, retrying each up to the configured budget.
///
/// Neighbors that never answer are removed and flagged as shut down; if anything changed the
/// database is flooded once to the neighbors that remain.
pub async fn run_pass(router: &Router) -> DetectorReport {
    let max_retry = router.config().heartbeat_max_retry;
    let targets: Vec<(usize, RouterDescription)> = {
        let state = router.state().lock().await;
        state
            .ports
            .two_way_links()
            .map(|(index, link)| (index, link.remote.clone()))
            .collect()
    };

    let mut report = DetectorReport::default();
    let mut changed = false;
    for (index, remote) in targets {
        let mut alive = false;
        for attempt in 1..=max_retry {
            match ping(router, &remote).await {
                Ok(()) => {
                    alive = true;
                    break;
                }
                Err(e) => debug!(
                    "Heartbeat {}/{} to {} failed: {}",
                    attempt, max_retry, remote.simulated_ip, e
                ),
            }
        }

        if alive {
            let mut state = router.state().lock().await;
            if let Some(link) = state.ports.find_mut(&remote.simulated_ip) {
                link.last_heartbeat = Some(Utc::now());
            }
            continue;
        }

        warn!(
            "Lost heartbeat from {} after {} attempts",
            remote.simulated_ip, max_retry
        );
        let mut state = router.state().lock().await;
        match condemn(&mut state, router.description(), index, &remote.simulated_ip) {
            Ok(true) => {
                info!("Neighbor {} declared dead, port {} freed", remote.simulated_ip, index);
                report.dead.push(remote.simulated_ip.clone());
                changed = true;
            }
            Ok(false) => debug!("{} already left port {}", remote.simulated_ip, index),
            Err(e) => error!("Failed to remove dead neighbor {}: {}", remote.simulated_ip, e),
        }
    }

    if changed {
        flooding::flood(router, None).await;
        report.flooded = true;
    }
    report
}

/// Run [`run_pass`] on the configured heartbeat interval for the life of the router.
pub fn spawn_detector(router: Router) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(router.config().heartbeat_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = run_pass(&router).await;
            if !report.dead.is_empty() {
                info!("Failure detector removed {:?}", report.dead);
            }
        }
    })
}

/// Reply to an inbound HEARTBEAT on the same connection.
pub async fn answer_heartbeat<S>(
    router: &Router,
    stream: &mut PacketStream<S>,
    packet: &SospfPacket,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = SospfPacket::from_description(
        router.description(),
        &packet.src_ip,
        PacketType::Heartbeat,
        None,
        None,
    )?;
    stream.send(&reply).await?;

    let mut state = router.state().lock().await;
    if let Some(link) = state.ports.find_mut(&packet.src_ip) {
        link.last_heartbeat = Some(Utc::now());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::protocol::{
        Link, LinkDescription, LinkStateAdvertisement, Metric, RouterStatus, SequenceNumber,
    };
    use std::time::Duration;

    fn me() -> RouterDescription {
        RouterDescription::new("127.0.0.1", 20000, "10.0.0.1", Metric::SelfLoop).unwrap()
    }

    #[test]
    fn condemn_flags_last_known_lsa() {
        let mut state = RouterState::new(&me(), 4);
        let remote = RouterDescription::new("127.0.0.1", 20001, "10.0.0.2", Metric::Cost(2)).unwrap();
        let mut link = Link::new(remote, 2).unwrap();
        link.set_status(RouterStatus::TwoWay);
        state.ports.attach(link).unwrap();
        state.refresh_own_lsa(&me()).unwrap();
        state
            .lsd
            .put(
                "10.0.0.2",
                LinkStateAdvertisement {
                    link_state_id: "10.0.0.2".to_string(),
                    sequence: SequenceNumber::Issued(3),
                    links: vec![LinkDescription::new("10.0.0.2", 20001, Metric::SelfLoop).unwrap()],
                    shutdown: false,
                },
            )
            .unwrap();

        assert!(condemn(&mut state, &me(), 0, "10.0.0.2").unwrap());

        assert!(state.ports.is_empty());
        let dead = state.lsd.get("10.0.0.2").unwrap();
        assert!(dead.shutdown);
        assert_eq!(dead.sequence, SequenceNumber::Issued(4));
        let own = state.lsd.get("10.0.0.1").unwrap();
        assert!(own.link_to("10.0.0.2").is_none());

        assert!(!condemn(&mut state, &me(), 0, "10.0.0.2").unwrap());
    }

    #[tokio::test]
    async fn answers_heartbeat_on_same_stream() {
        let router = Router::new(RouterConfig::new("10.0.0.1"), 20000).unwrap();
        let (left, right) = tokio::io::duplex(4096);
        let mut peer = PacketStream::new(left, Duration::from_secs(1));
        let mut inbound = PacketStream::new(right, Duration::from_secs(1));

        let peer_desc = RouterDescription::new("127.0.0.1", 20001, "10.0.0.2", Metric::SelfLoop).unwrap();
        let ping = SospfPacket::from_description(&peer_desc, "10.0.0.1", PacketType::Heartbeat, None, None)
            .unwrap();

        answer_heartbeat(&router, &mut inbound, &ping).await.unwrap();
        let pong = peer.recv().await.unwrap();
        assert_eq!(pong.packet_type, PacketType::Heartbeat);
        assert_eq!(pong.dst_ip, "10.0.0.2");
    }

    #[tokio::test]
    async fn pass_without_neighbors_is_quiet() {
        let router = Router::new(RouterConfig::new("10.0.0.1"), 20000).unwrap();
        assert_eq!(run_pass(&router).await, DetectorReport::default());
    }
}
