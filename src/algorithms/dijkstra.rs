use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use crate::error::{Result, RouterError};
use crate::protocol::{LinkStateAdvertisement, Metric};

const INFINITY: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestPath {
    /// Nodes from source to destination
    pub nodes: Vec<String>,
    /// `weights[i]` is the edge between `nodes[i]` and `nodes[i + 1]`
    pub weights: Vec<Metric>,
    pub cost: u64,
}

impl fmt::Display for ShortestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes = self.nodes.iter();
        if let Some(first) = nodes.next() {
            write!(f, "{}", first)?;
        }
        for (node, weight) in nodes.zip(&self.weights) {
            write!(f, " -> ({}) {}", weight, node)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoPathReason {
    /// No LSA stored for the destination
    Unknown,
    /// The destination's LSA is flagged as shut down
    Shutdown,
    /// Known, but not connected to the source
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    Found(ShortestPath),
    NoPath(NoPathReason),
}

/// Dijkstra over the latest LSA of every originator.
///
/// Ties on distance are broken by extracting the lexicographically smaller id first; a
/// predecessor is only replaced by a strictly shorter path. Edges out of a shut-down router
/// (other than the source) are not relaxed.
pub fn shortest_path(
    lsas: &HashMap<String, LinkStateAdvertisement>,
    source: &str,
    destination: &str,
) -> Result<PathOutcome> {
    match lsas.get(destination) {
        None => return Ok(PathOutcome::NoPath(NoPathReason::Unknown)),
        Some(lsa) if lsa.shutdown => return Ok(PathOutcome::NoPath(NoPathReason::Shutdown)),
        Some(_) => {}
    }

    let mut distances: HashMap<&str, u64> = HashMap::new();
    let mut previous: HashMap<&str, Option<(&str, Metric)>> = HashMap::new();
    for lsa in lsas.values() {
        for node in std::iter::once(&lsa.link_state_id).chain(lsa.links.iter().map(|l| &l.link_id)) {
            distances.insert(node.as_str(), INFINITY);
            previous.insert(node.as_str(), None);
        }
    }
    distances.insert(source, Metric::SelfLoop.cost());
    previous.insert(source, None);

    let mut heap = BinaryHeap::new();
    heap.push(Reverse((Metric::SelfLoop.cost(), source)));

    while let Some(Reverse((cost, node))) = heap.pop() {
        if node == destination {
            break;
        }
        if cost > distances.get(node).copied().unwrap_or(INFINITY) {
            continue;
        }

        let Some(lsa) = lsas.get(node) else {
            continue;
        };

        for link in &lsa.links {
            let neighbor = link.link_id.as_str();
            let alt = cost.saturating_add(link.metric.cost());
            if alt < distances.get(neighbor).copied().unwrap_or(INFINITY) {
                distances.insert(neighbor, alt);
                previous.insert(neighbor, Some((node, link.metric)));
                heap.push(Reverse((alt, neighbor)));
            }
        }
    }

    let cost = distances.get(destination).copied().unwrap_or(INFINITY);
    if cost == INFINITY {
        return Ok(PathOutcome::NoPath(NoPathReason::Unreachable));
    }

    let mut nodes = vec![destination.to_string()];
    let mut weights = Vec::new();
    let mut current = destination;
    while let Some(Some((prev, metric))) = previous.get(current) {
        if nodes.len() > distances.len() {
            break;
        }
        nodes.push(prev.to_string());
        weights.push(*metric);
        current = *prev;
    }

    if current != source {
        return Err(RouterError::InconsistentPath {
            root: current.to_string(),
            source_id: source.to_string(),
        });
    }

    nodes.reverse();
    weights.reverse();
    Ok(PathOutcome::Found(ShortestPath {
        nodes,
        weights,
        cost,
    }))
}

/// Render a query result the way the `detect` command prints it.
pub fn format_path(outcome: &PathOutcome, destination: &str) -> String {
    match outcome {
        PathOutcome::Found(path) => path.to_string(),
        PathOutcome::NoPath(NoPathReason::Unknown) => {
            format!("no path to {}: not in the link state database", destination)
        }
        PathOutcome::NoPath(NoPathReason::Shutdown) => {
            format!("no path to {}: router is shut down", destination)
        }
        PathOutcome::NoPath(NoPathReason::Unreachable) => {
            format!("no path to {}: unreachable", destination)
        }
    }
}
