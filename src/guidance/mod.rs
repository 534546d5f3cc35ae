//! Guidance graphs and the axons grown through them
//!
//! - `graph`: directed graph core with per-vertex attributes
//! - `landscape`: landscapes, edge weights and edge masks
//! - `factory`: construction of the up and down graphs
//! - `find_axon`: reachability and shortest-path tree extraction
//! - `axon` / `metrics`: queries on extracted axons
//! - `random`: random axons as a null model

mod axon;
mod factory;
mod find_axon;
mod graph;
mod guidance_graph;
mod landscape;
mod metrics;
mod random;

pub use axon::Axon;
pub use factory::{make_guidance_graphs, GuidanceConfig};
pub use find_axon::find_axon_tree;
pub use graph::{DiGraph, Edge, ShortestPaths, Vertex};
pub use guidance_graph::{sample_axons, GuidanceGraph};
pub use landscape::{EdgeMask, LandscapeMethod, WeightMethod};
pub use metrics::{euclidean_distance, euclidean_path_length, path_positions};
pub use random::draw_random_axon;
