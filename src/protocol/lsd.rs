use std::collections::HashMap;
use std::fmt;

use super::messages::LinkStateAdvertisement;
use super::types::RouterDescription;
use crate::algorithms::dijkstra::{self, PathOutcome};
use crate::error::{Result, RouterError};

/// Latest LSA per originator. No history is kept.
///
/// The database itself is not synchronized; it lives inside the router state mutex.
#[derive(Debug, Clone)]
pub struct LinkStateDatabase {
    owner: String,
    store: HashMap<String, LinkStateAdvertisement>,
}

impl LinkStateDatabase {
    /// Seed the database with the owner's bootstrap LSA.
    pub fn new(owner: &RouterDescription) -> Self {
        let mut store = HashMap::new();
        store.insert(
            owner.simulated_ip.clone(),
            LinkStateAdvertisement::bootstrap(owner),
        );
        Self {
            owner: owner.simulated_ip.clone(),
            store,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn get(&self, originator: &str) -> Option<&LinkStateAdvertisement> {
        self.store.get(originator)
    }

    pub fn contains(&self, originator: &str) -> bool {
        self.store.contains_key(originator)
    }

    /// Store `lsa` under `originator` if it is newer than what is held.
    ///
    /// Returns `Ok(false)` when the stored sequence number is equal or greater, which leaves the
    /// database untouched.
    pub fn put(&mut self, originator: &str, lsa: LinkStateAdvertisement) -> Result<bool> {
        if lsa.link_state_id != originator {
            return Err(RouterError::LsaKeyMismatch {
                key: originator.to_string(),
                originator: lsa.link_state_id,
            });
        }

        if let Some(stored) = self.store.get(originator) {
            if lsa.sequence <= stored.sequence {
                return Ok(false);
            }
        }
        self.store.insert(originator.to_string(), lsa);
        Ok(true)
    }

    /// Snapshot of every stored LSA, ordered by originator.
    pub fn all_values(&self) -> Vec<LinkStateAdvertisement> {
        let mut values: Vec<_> = self.store.values().cloned().collect();
        values.sort_by(|a, b| a.link_state_id.cmp(&b.link_state_id));
        values
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Shortest path from the owner to `destination`.
    pub fn shortest_path(&self, destination: &str) -> Result<PathOutcome> {
        dijkstra::shortest_path(&self.store, &self.owner, destination)
    }
}

impl fmt::Display for LinkStateDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for lsa in self.all_values() {
            writeln!(f, "{}", lsa)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LinkDescription, Metric, SequenceNumber};

    fn owner() -> RouterDescription {
        RouterDescription::new("127.0.0.1", 20000, "10.0.0.1", Metric::SelfLoop).unwrap()
    }

    fn advertisement(id: &str, sequence: u32, peers: &[(&str, u16)]) -> LinkStateAdvertisement {
        let mut links = vec![LinkDescription::new(id, 20001, Metric::SelfLoop).unwrap()];
        for (peer, weight) in peers {
            links.push(LinkDescription::new(*peer, 20000, Metric::Cost(*weight)).unwrap());
        }
        LinkStateAdvertisement {
            link_state_id: id.to_string(),
            sequence: SequenceNumber::Issued(sequence),
            links,
            shutdown: false,
        }
    }

    #[test]
    fn bootstrap_entry_is_present() {
        let lsd = LinkStateDatabase::new(&owner());
        let own = lsd.get("10.0.0.1").unwrap();

        assert_eq!(own.sequence, SequenceNumber::NoPriorAdvertisement);
        assert_eq!(own.links.len(), 1);
        assert_eq!(own.links[0].link_id, "10.0.0.1");
        assert_eq!(own.links[0].metric, Metric::SelfLoop);
        assert_eq!(lsd.len(), 1);
    }

    #[test]
    fn put_enforces_monotonic_sequence() {
        let mut lsd = LinkStateDatabase::new(&owner());

        assert!(lsd.put("10.0.0.2", advertisement("10.0.0.2", 3, &[])).unwrap());
        assert!(!lsd.put("10.0.0.2", advertisement("10.0.0.2", 3, &[("10.0.0.1", 9)])).unwrap());
        assert!(!lsd.put("10.0.0.2", advertisement("10.0.0.2", 1, &[("10.0.0.1", 9)])).unwrap());
        assert_eq!(lsd.get("10.0.0.2").unwrap().links.len(), 1);

        assert!(lsd.put("10.0.0.2", advertisement("10.0.0.2", 4, &[("10.0.0.1", 9)])).unwrap());
        assert_eq!(lsd.get("10.0.0.2").unwrap().sequence, SequenceNumber::Issued(4));
    }

    #[test]
    fn put_rejects_mismatched_key() {
        let mut lsd = LinkStateDatabase::new(&owner());
        let result = lsd.put("10.0.0.3", advertisement("10.0.0.2", 0, &[]));

        assert!(matches!(result, Err(RouterError::LsaKeyMismatch { .. })));
        assert!(!lsd.contains("10.0.0.3"));
        assert!(!lsd.contains("10.0.0.2"));
    }

    #[test]
    fn first_issued_sequence_replaces_bootstrap() {
        let mut lsd = LinkStateDatabase::new(&owner());
        assert!(lsd.put("10.0.0.1", advertisement("10.0.0.1", 0, &[])).unwrap());
    }

    #[test]
    fn all_values_is_sorted_snapshot() {
        let mut lsd = LinkStateDatabase::new(&owner());
        lsd.put("10.0.0.3", advertisement("10.0.0.3", 0, &[])).unwrap();
        lsd.put("10.0.0.2", advertisement("10.0.0.2", 0, &[])).unwrap();

        let ids: Vec<_> = lsd.all_values().into_iter().map(|l| l.link_state_id).collect();
        assert_eq!(ids, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(lsd.to_string().lines().count(), 3);
    }

    #[test]
    fn shortest_path_runs_from_owner() {
        let mut lsd = LinkStateDatabase::new(&owner());
        lsd.put("10.0.0.1", advertisement("10.0.0.1", 0, &[("10.0.0.2", 2), ("10.0.0.3", 10)]))
            .unwrap();
        lsd.put("10.0.0.2", advertisement("10.0.0.2", 0, &[("10.0.0.1", 2), ("10.0.0.3", 3)]))
            .unwrap();
        lsd.put("10.0.0.3", advertisement("10.0.0.3", 0, &[("10.0.0.2", 3), ("10.0.0.1", 10)]))
            .unwrap();

        let PathOutcome::Found(path) = lsd.shortest_path("10.0.0.3").unwrap() else {
            panic!("expected a path");
        };
        assert_eq!(path.to_string(), "10.0.0.1 -> (2) 10.0.0.2 -> (3) 10.0.0.3");
    }
}
