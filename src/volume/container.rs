//! Volume container with consistency checks and JSON persistence

use crate::error::{AtlasError, Result};
use log::info;
use nalgebra::{DMatrix, DVector, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ages available in the developing mouse brain atlas
pub const AGES: [&str; 8] = ["E11.5", "E13.5", "E15.5", "E18.5", "P4", "P14", "P28", "P56"];

/// Physical voxel edge length (µm) for an atlas age, 1 for unknown ages
pub fn voxel_size_for_age(age: &str) -> f64 {
    match age {
        "E11.5" => 80.0,
        "E13.5" => 100.0,
        "E15.5" => 120.0,
        "E18.5" => 140.0,
        "P4" => 160.0,
        "P14" | "P28" | "P56" => 200.0,
        _ => 1.0,
    }
}

/// A volume of expression data at a particular age
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Atlas age label, determines the voxel size
    pub age: String,
    /// Expression matrix (n_voxels × n_genes)
    pub expression: DMatrix<f64>,
    /// Integer grid coordinates, one triple per voxel
    pub voxel_indices: Vec<[i64; 3]>,
    /// Gene names, one per expression column
    pub genes: Vec<String>,
}

impl Volume {
    /// Create a volume, naming genes `g0..` when no names are given
    pub fn new(
        age: impl Into<String>,
        expression: DMatrix<f64>,
        voxel_indices: Vec<[i64; 3]>,
        genes: Option<Vec<String>>,
    ) -> Result<Self> {
        let genes = genes
            .unwrap_or_else(|| (0..expression.ncols()).map(|i| format!("g{}", i)).collect());
        let volume = Self {
            age: age.into(),
            expression,
            voxel_indices,
            genes,
        };
        volume.check_consistency()?;
        Ok(volume)
    }

    /// Smooth synthetic volume on a regular grid
    ///
    /// Every gene is a Gaussian bump around a random center with a little
    /// noise on top, which gives expression landscapes with real spatial
    /// structure for tests and demos.
    pub fn synthetic(dims: [usize; 3], n_genes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut voxel_indices = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for x in 0..dims[0] {
            for y in 0..dims[1] {
                for z in 0..dims[2] {
                    voxel_indices.push([x as i64, y as i64, z as i64]);
                }
            }
        }

        let centers: Vec<Vector3<f64>> = (0..n_genes)
            .map(|_| {
                Vector3::new(
                    rng.gen::<f64>() * dims[0] as f64,
                    rng.gen::<f64>() * dims[1] as f64,
                    rng.gen::<f64>() * dims[2] as f64,
                )
            })
            .collect();
        let extent = dims.iter().copied().max().unwrap_or(1).max(1) as f64;
        let sigma = extent / 3.0;

        let n_voxels = voxel_indices.len();
        let mut expression = DMatrix::zeros(n_voxels, n_genes);
        for (v, idx) in voxel_indices.iter().enumerate() {
            let p = Vector3::new(idx[0] as f64, idx[1] as f64, idx[2] as f64);
            for (g, center) in centers.iter().enumerate() {
                let d2 = (p - center).norm_squared();
                let noise = (rng.gen::<f64>() - 0.5) * 0.05;
                expression[(v, g)] = (-d2 / (2.0 * sigma * sigma)).exp() + noise;
            }
        }

        Self {
            age: "synthetic".into(),
            expression,
            voxel_indices,
            genes: (0..n_genes).map(|i| format!("g{}", i)).collect(),
        }
    }

    pub fn n_voxels(&self) -> usize {
        self.expression.nrows()
    }

    pub fn n_genes(&self) -> usize {
        self.expression.ncols()
    }

    /// Voxel edge length for this volume's age
    pub fn voxel_size(&self) -> f64 {
        voxel_size_for_age(&self.age)
    }

    /// Physical position of a voxel (grid index × voxel size)
    pub fn voxel_position(&self, voxel: usize) -> Vector3<f64> {
        let idx = self.voxel_indices[voxel];
        Vector3::new(idx[0] as f64, idx[1] as f64, idx[2] as f64) * self.voxel_size()
    }

    /// Physical positions of all voxels
    pub fn voxel_positions(&self) -> Vec<Vector3<f64>> {
        (0..self.n_voxels()).map(|v| self.voxel_position(v)).collect()
    }

    /// Expression of a single voxel as a column vector
    pub fn expression_of(&self, voxel: usize) -> DVector<f64> {
        self.expression.row(voxel).transpose()
    }

    /// Keep only the voxels whose mask entry is true
    pub fn filter_voxels(&mut self, mask: &[bool]) -> Result<()> {
        if mask.len() != self.n_voxels() {
            return Err(AtlasError::InconsistentVolume(format!(
                "voxel mask has {} entries for {} voxels",
                mask.len(),
                self.n_voxels()
            )));
        }
        let kept: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
        let filtered = DMatrix::from_fn(kept.len(), self.n_genes(), |i, j| {
            self.expression[(kept[i], j)]
        });
        self.expression = filtered;
        self.voxel_indices = kept.iter().map(|&i| self.voxel_indices[i]).collect();
        Ok(())
    }

    /// Keep only the genes whose mask entry is true
    pub fn filter_genes(&mut self, mask: &[bool]) -> Result<()> {
        if mask.len() != self.n_genes() {
            return Err(AtlasError::InconsistentVolume(format!(
                "gene mask has {} entries for {} genes",
                mask.len(),
                self.n_genes()
            )));
        }
        let kept: Vec<usize> = (0..mask.len()).filter(|&j| mask[j]).collect();
        let filtered = DMatrix::from_fn(self.n_voxels(), kept.len(), |i, j| {
            self.expression[(i, kept[j])]
        });
        self.expression = filtered;
        self.genes = kept.iter().map(|&j| self.genes[j].clone()).collect();
        Ok(())
    }

    /// Masks selecting the genes this volume shares with `other`, one mask
    /// per volume, each in that volume's own gene order
    pub fn common_gene_masks(&self, other: &Volume) -> (Vec<bool>, Vec<bool>) {
        let mine: Vec<bool> = self.genes.iter().map(|g| other.genes.contains(g)).collect();
        let theirs: Vec<bool> = other.genes.iter().map(|g| self.genes.contains(g)).collect();
        (mine, theirs)
    }

    /// Row counts must agree, and the gene list must label every column
    pub fn check_consistency(&self) -> Result<()> {
        if self.voxel_indices.len() != self.expression.nrows() {
            return Err(AtlasError::InconsistentVolume(format!(
                "{} voxel positions for {} expression rows",
                self.voxel_indices.len(),
                self.expression.nrows()
            )));
        }
        if self.genes.len() != self.expression.ncols() {
            return Err(AtlasError::InconsistentVolume(format!(
                "{} gene names for {} expression columns",
                self.genes.len(),
                self.expression.ncols()
            )));
        }
        Ok(())
    }

    /// Save volume to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load volume from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let volume: Volume = serde_json::from_str(&json)?;
        volume.check_consistency()?;
        info!(
            "Loaded volume '{}': {} voxels × {} genes",
            volume.age,
            volume.n_voxels(),
            volume.n_genes()
        );
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_volume() -> Volume {
        let expression = DMatrix::from_row_slice(
            4,
            3,
            &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        );
        let indices = vec![[0, 0, 0], [1, 0, 0], [0, 1, 0], [1, 1, 0]];
        Volume::new("E13.5", expression, indices, None).unwrap()
    }

    #[test]
    fn test_default_gene_names() {
        let volume = small_volume();
        assert_eq!(volume.genes, vec!["g0", "g1", "g2"]);
        assert_eq!(volume.n_voxels(), 4);
        assert_eq!(volume.n_genes(), 3);
    }

    #[test]
    fn test_inconsistent_rows_rejected() {
        let expression = DMatrix::zeros(3, 2);
        let result = Volume::new("P56", expression, vec![[0, 0, 0]], None);
        assert!(matches!(result, Err(AtlasError::InconsistentVolume(_))));
    }

    #[test]
    fn test_positions_scale_with_age() {
        let volume = small_volume();
        assert_eq!(volume.voxel_size(), 100.0);
        assert_eq!(volume.voxel_position(3), Vector3::new(100.0, 100.0, 0.0));
        assert_eq!(voxel_size_for_age("unknown"), 1.0);
    }

    #[test]
    fn test_filters() {
        let mut volume = small_volume();
        volume.filter_voxels(&[true, false, true, true]).unwrap();
        assert_eq!(volume.n_voxels(), 3);
        assert_eq!(volume.voxel_indices[1], [0, 1, 0]);

        volume.filter_genes(&[false, true, true]).unwrap();
        assert_eq!(volume.genes, vec!["g1", "g2"]);
        assert_eq!(volume.expression[(1, 0)], 1.0);
        assert!(volume.check_consistency().is_ok());

        assert!(volume.filter_genes(&[true]).is_err());
    }

    #[test]
    fn test_common_genes() {
        let a = small_volume();
        let mut b = small_volume();
        b.genes = vec!["g2".into(), "x".into(), "g0".into()];
        let (ma, mb) = a.common_gene_masks(&b);
        assert_eq!(ma, vec![true, false, true]);
        assert_eq!(mb, vec![true, false, true]);
    }

    #[test]
    fn test_synthetic_shape() {
        let volume = Volume::synthetic([3, 4, 2], 5, 7);
        assert_eq!(volume.n_voxels(), 24);
        assert_eq!(volume.n_genes(), 5);
        assert!(volume.check_consistency().is_ok());
        let again = Volume::synthetic([3, 4, 2], 5, 7);
        assert_eq!(volume.expression, again.expression);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let volume = small_volume();
        let path = std::env::temp_dir().join("axonatlas-volume-test.json");
        volume.save(&path).unwrap();
        let loaded = Volume::load(&path).unwrap();
        assert_eq!(loaded.expression, volume.expression);
        assert_eq!(loaded.voxel_indices, volume.voxel_indices);
        std::fs::remove_file(&path).ok();
    }
}
