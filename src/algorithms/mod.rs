pub mod dijkstra;

pub use dijkstra::{format_path, shortest_path, NoPathReason, PathOutcome, ShortestPath};
