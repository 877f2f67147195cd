//! LSA acceptance and re-broadcast.

use log::{debug, info, warn};
use tokio::task::JoinSet;

use super::codec::PacketStream;
use super::messages::{LinkStateAdvertisement, PacketType, SospfPacket};
use super::types::{Metric, RouterDescription};
use crate::error::Result;
use crate::router::{Router, RouterState};

/// What applying one LSAUPDATE batch did to the database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// LSAs stored because they were newer than the held copy
    pub accepted: usize,
    /// No LSA from the sender was held before this batch
    pub first_from_sender: bool,
    /// The sender advertised a new weight for its edge back to us
    pub weight_changed: bool,
    /// Our own LSA was re-issued
    pub own_reissued: bool,
}

impl BatchOutcome {
    pub fn changed(&self) -> bool {
        self.accepted > 0 || self.own_reissued
    }
}

/// Apply an LSA batch received from `sender` under the router lock.
///
/// An LSA is stored only if its sequence number is strictly greater than the held one. Afterwards,
/// if the sender's LSA advertises an edge back to `me` whose weight differs from the local link,
/// the local weight follows it and our own LSA is refreshed.
pub fn apply_lsa_batch(
    state: &mut RouterState,
    me: &RouterDescription,
    sender: &str,
    lsas: &[LinkStateAdvertisement],
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome {
        first_from_sender: !state.lsd.contains(sender),
        ..Default::default()
    };

    for lsa in lsas {
        if state.lsd.put(&lsa.link_state_id, lsa.clone())? {
            debug!("Accepted LSA {}({})", lsa.link_state_id, lsa.sequence);
            outcome.accepted += 1;
        }
    }

    let advertised = state
        .lsd
        .get(sender)
        .and_then(|lsa| lsa.link_to(&me.simulated_ip))
        .map(|edge| edge.metric);
    if let Some(Metric::Cost(weight)) = advertised {
        if let Some(link) = state.ports.find_mut(sender) {
            if link.weight != weight {
                info!(
                    "Link weight to {} changed from {} to {}",
                    sender, link.weight, weight
                );
                link.weight = weight;
                outcome.weight_changed = true;
            }
        }
    }

    outcome.own_reissued = state.refresh_own_lsa(me)?;
    Ok(outcome)
}

/// Handle an LSAUPDATE that arrived on its own connection.
pub async fn handle_lsa_update(router: &Router, packet: &SospfPacket) -> Result<BatchOutcome> {
    let sender = packet.src_ip.as_str();
    let outcome = {
        let mut state = router.state().lock().await;
        apply_lsa_batch(&mut state, router.description(), sender, packet.lsa_batch())?
    };

    if outcome.changed() {
        // A first advertisement from this neighbor goes back to it as well.
        let exclude = if outcome.first_from_sender {
            None
        } else {
            Some(sender)
        };
        flood(router, exclude).await;
    } else {
        debug!("LSAUPDATE from {} changed nothing", sender);
    }
    Ok(outcome)
}

/// Send the current database snapshot to every TWO_WAY neighbor except `exclude`.
///
/// Each target gets its own connection; unreachable targets are skipped. Returns how many
/// neighbors received the update.
pub async fn flood(router: &Router, exclude: Option<&str>) -> usize {
    let (snapshot, targets) = {
        let state = router.state().lock().await;
        (state.lsd.all_values(), state.two_way_neighbors(exclude))
    };
    if targets.is_empty() {
        return 0;
    }

    let mut sends = JoinSet::new();
    for target in targets {
        let me = router.description().clone();
        let lsas = snapshot.clone();
        let io_timeout = router.io_timeout();
        sends.spawn(async move {
            let result = send_update(&me, &target, lsas, io_timeout).await;
            (target.simulated_ip, result)
        });
    }

    let mut delivered = 0;
    while let Some(joined) = sends.join_next().await {
        match joined {
            Ok((_, Ok(()))) => delivered += 1,
            Ok((target, Err(e))) => warn!("Skipping flood to {}: {}", target, e),
            Err(e) => warn!("Flood task failed: {}", e),
        }
    }
    debug!("Flooded {} LSAs to {} neighbors", snapshot.len(), delivered);
    delivered
}

async fn send_update(
    me: &RouterDescription,
    target: &RouterDescription,
    lsas: Vec<LinkStateAdvertisement>,
    io_timeout: std::time::Duration,
) -> Result<()> {
    let packet = SospfPacket::from_description(
        me,
        &target.simulated_ip,
        PacketType::LsaUpdate,
        Some(lsas),
        None,
    )?;
    let mut stream = PacketStream::connect(&target.process_addr(), io_timeout).await?;
    stream.send(&packet).await?;
    stream.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::protocol::{Link, LinkDescription, RouterStatus, SequenceNumber};

    fn me() -> RouterDescription {
        RouterDescription::new("127.0.0.1", 20000, "10.0.0.1", Metric::SelfLoop).unwrap()
    }

    fn neighbor_lsa(sequence: u32, weight_back: u16) -> LinkStateAdvertisement {
        LinkStateAdvertisement {
            link_state_id: "10.0.0.2".to_string(),
            sequence: SequenceNumber::Issued(sequence),
            links: vec![
                LinkDescription::new("10.0.0.2", 20001, Metric::SelfLoop).unwrap(),
                LinkDescription::new("10.0.0.1", 20000, Metric::Cost(weight_back)).unwrap(),
            ],
            shutdown: false,
        }
    }

    fn state_with_neighbor(weight: u16) -> RouterState {
        let mut state = RouterState::new(&me(), 4);
        let remote =
            RouterDescription::new("127.0.0.1", 20001, "10.0.0.2", Metric::Cost(weight)).unwrap();
        let mut link = Link::new(remote, weight).unwrap();
        link.set_status(RouterStatus::TwoWay);
        state.ports.attach(link).unwrap();
        state.refresh_own_lsa(&me()).unwrap();
        state
    }

    #[test]
    fn redelivery_is_a_no_op() {
        let mut state = state_with_neighbor(4);
        let batch = vec![neighbor_lsa(0, 4)];

        let first = apply_lsa_batch(&mut state, &me(), "10.0.0.2", &batch).unwrap();
        assert!(first.first_from_sender);
        assert!(first.changed());

        let before = state.lsd.all_values();
        let second = apply_lsa_batch(&mut state, &me(), "10.0.0.2", &batch).unwrap();
        assert_eq!(second, BatchOutcome::default());
        assert!(!second.changed());
        assert_eq!(state.lsd.all_values(), before);
    }

    #[test]
    fn stale_lsa_is_dropped() {
        let mut state = state_with_neighbor(4);
        apply_lsa_batch(&mut state, &me(), "10.0.0.2", &[neighbor_lsa(5, 4)]).unwrap();

        let outcome = apply_lsa_batch(&mut state, &me(), "10.0.0.2", &[neighbor_lsa(2, 9)]).unwrap();
        assert_eq!(outcome.accepted, 0);
        assert_eq!(
            state.lsd.get("10.0.0.2").unwrap().sequence,
            SequenceNumber::Issued(5)
        );
        assert_eq!(state.ports.find("10.0.0.2").unwrap().weight, 4);
    }

    #[test]
    fn advertised_weight_back_updates_local_link() {
        let mut state = state_with_neighbor(4);
        let own_before = state.lsd.get("10.0.0.1").unwrap().sequence;

        let outcome = apply_lsa_batch(&mut state, &me(), "10.0.0.2", &[neighbor_lsa(0, 7)]).unwrap();

        assert!(outcome.weight_changed);
        assert!(outcome.own_reissued);
        assert_eq!(state.ports.find("10.0.0.2").unwrap().weight, 7);

        let own = state.lsd.get("10.0.0.1").unwrap();
        assert_eq!(own.sequence, own_before.next());
        assert_eq!(own.link_to("10.0.0.2").unwrap().metric, Metric::Cost(7));
    }

    #[test]
    fn batch_with_foreign_originators_is_stored() {
        let mut state = state_with_neighbor(4);
        let third = LinkStateAdvertisement {
            link_state_id: "10.0.0.3".to_string(),
            sequence: SequenceNumber::Issued(0),
            links: vec![LinkDescription::new("10.0.0.3", 20002, Metric::SelfLoop).unwrap()],
            shutdown: false,
        };

        let outcome = apply_lsa_batch(
            &mut state,
            &me(),
            "10.0.0.2",
            &[neighbor_lsa(0, 4), third],
        )
        .unwrap();
        assert_eq!(outcome.accepted, 2);
        assert!(state.lsd.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn flood_without_neighbors_sends_nothing() {
        let router = Router::new(RouterConfig::new("10.0.0.1"), 20000).unwrap();
        assert_eq!(flood(&router, None).await, 0);
    }
}
