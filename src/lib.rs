//! AxonAtlas — hierarchical decomposition and axon guidance over spatial
//! gene-expression atlases
//!
//! A volume of voxels is split recursively on expression into a region
//! hierarchy. Each region turns its expression signature into a landscape
//! over the voxel graph, and the landscapes of all regions are stitched
//! into up and down guidance graphs. Axons are out-trees grown through
//! those graphs from a source voxel.

pub mod config;
pub mod error;
pub mod guidance;
pub mod hierarchy;
pub mod spatial;
pub mod stats;
pub mod volume;

pub use config::PipelineConfig;
pub use error::{AtlasError, Result};
pub use guidance::{Axon, GuidanceConfig, GuidanceGraph};
pub use hierarchy::{DecompositionConfig, Hierarchy, NodeId, SplitMethod};
pub use spatial::{voxel_graph_from_volume, EdgeGenerator, VoxelGraph};
pub use volume::Volume;
