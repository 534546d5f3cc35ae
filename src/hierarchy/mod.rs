//! Hierarchical decomposition of a volume
//!
//! A [`Hierarchy`] is a rooted tree whose leaves are the voxels of one
//! volume. Interior nodes are regions; their expression and position are
//! means over the voxels below them.

mod decomposition;
mod export;
mod matching;
mod tree;

pub use decomposition::{
    make_balanced_hierarchy, make_hierarchy, pca_split, random_projection_split, random_split,
    split_node, split_node_children, DecompositionConfig, Schedule, SplitMethod,
};
pub use export::HierarchyRecord;
pub use matching::{
    match_components, match_voxels_to_hierarchy_nodes, rotate_to_match,
    score_voxel_to_hierarchy_match, NodeMap,
};
pub use tree::{Hierarchy, NodeId};
