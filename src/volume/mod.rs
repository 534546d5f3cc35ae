//! Volume — voxel expression and position data for one atlas age
//!
//! The volume is the read-only data source for everything downstream: an
//! expression matrix (voxels × genes), integer grid coordinates per voxel,
//! and the gene names labelling the expression columns.

mod container;

pub use container::{voxel_size_for_age, Volume, AGES};
