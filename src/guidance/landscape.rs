//! Landscapes, edge weights and edge masks
//!
//! A landscape is one scalar per voxel for one hierarchy region. Its
//! gradient along the voxel graph decides which spatial edges a region
//! keeps and how expensive each kept edge is to follow.

use crate::hierarchy::{Hierarchy, NodeId};
use crate::stats::{minmax_normalize, pearson};
use log::warn;
use serde::{Deserialize, Serialize};

/// Per-voxel landscape of a region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LandscapeMethod {
    /// Pearson correlation of every voxel's expression with the region's
    /// mean expression, with values below `threshold` set to zero
    Correlation { threshold: f64 },
}

impl Default for LandscapeMethod {
    fn default() -> Self {
        LandscapeMethod::Correlation { threshold: 0.1 }
    }
}

impl LandscapeMethod {
    /// Landscape of `node` over all voxels of the volume
    pub fn landscape(&self, hierarchy: &Hierarchy, node: NodeId) -> Vec<f64> {
        match *self {
            LandscapeMethod::Correlation { threshold } => {
                correlation_landscape(hierarchy, node, threshold)
            }
        }
    }
}

fn correlation_landscape(hierarchy: &Hierarchy, node: NodeId, threshold: f64) -> Vec<f64> {
    let volume = hierarchy.volume();
    let signature = hierarchy.expression(node);
    let mut degenerate = 0usize;

    let landscape = (0..volume.n_voxels())
        .map(|v| {
            let row: Vec<f64> = volume.expression.row(v).iter().copied().collect();
            match pearson(&row, signature.as_slice()) {
                Some(r) if r >= threshold => r,
                Some(_) => 0.0,
                None => {
                    degenerate += 1;
                    0.0
                }
            }
        })
        .collect();

    if degenerate > 0 {
        warn!(
            "Landscape of {}: {} voxels with zero-variance correlation input",
            node, degenerate
        );
    }
    landscape
}

/// Edge weight from a landscape gradient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightMethod {
    /// `1 - minmax(gradient)`: the steepest ascent costs 0, the steepest
    /// descent costs 1, a flat landscape costs 1 everywhere
    #[default]
    Normalized,
}

impl WeightMethod {
    pub fn weights(&self, gradient: &[f64]) -> Vec<f64> {
        match self {
            WeightMethod::Normalized => minmax_normalize(gradient)
                .into_iter()
                .map(|g| 1.0 - g)
                .collect(),
        }
    }
}

/// Which spatial edges a region keeps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EdgeMask {
    /// Keep edges whose gradient is strictly above `threshold`
    Threshold { threshold: f64 },
}

impl Default for EdgeMask {
    fn default() -> Self {
        EdgeMask::Threshold { threshold: 0.1 }
    }
}

impl EdgeMask {
    pub fn mask(&self, gradient: &[f64]) -> Vec<bool> {
        match *self {
            EdgeMask::Threshold { threshold } => gradient.iter().map(|&g| g > threshold).collect(),
        }
    }
}
