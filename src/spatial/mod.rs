//! Spatial voxel graphs
//!
//! An undirected neighbourhood graph over the voxels of a volume, stored
//! as mutual directed edges so that gradients of per-voxel signals can be
//! read off per edge direction.

mod factory;
mod graph;

pub use factory::{gabriel_edges, lattice_edges, voxel_graph_from_volume, EdgeGenerator};
pub use graph::VoxelGraph;
