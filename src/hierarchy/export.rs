//! Nested JSON export of a hierarchy
//!
//! Leaves can be left out: they are one-to-one with voxels, and a tree
//! without them is much smaller on disk. Reloading a leaf-less export
//! gives a truncated tree whose childless interior nodes carry no voxel.

use super::tree::{Hierarchy, NodeId};
use crate::error::{AtlasError, Result};
use crate::volume::Volume;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// One node of an exported hierarchy and everything below it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voxel_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<Vec<f64>>,
    #[serde(default)]
    pub children: Vec<HierarchyRecord>,
}

impl HierarchyRecord {
    /// Number of records in this subtree
    pub fn n_records(&self) -> usize {
        1 + self.children.iter().map(HierarchyRecord::n_records).sum::<usize>()
    }
}

impl Hierarchy {
    /// Export the subtree below `id`
    pub fn to_record(&self, id: NodeId, include_leaves: bool) -> HierarchyRecord {
        HierarchyRecord {
            voxel_index: self.voxel_index(id),
            component: self.component(id).map(|c| c.iter().copied().collect()),
            children: self
                .children(id)
                .iter()
                .filter(|&&c| include_leaves || !self.is_leaf(c))
                .map(|&c| self.to_record(c, include_leaves))
                .collect(),
        }
    }

    /// Rebuild a hierarchy over `volume` from an exported record
    ///
    /// Node ids are not preserved; nesting, voxel indices and components are.
    pub fn from_record(volume: Arc<Volume>, record: &HierarchyRecord) -> Result<Self> {
        let n_voxels = volume.n_voxels();
        let n_genes = volume.n_genes();
        let mut hierarchy = Hierarchy::new(volume);

        let mut stack = vec![(hierarchy.root(), record)];
        while let Some((node, datum)) = stack.pop() {
            if let Some(voxel) = datum.voxel_index {
                if voxel >= n_voxels {
                    return Err(AtlasError::InconsistentVolume(format!(
                        "record references voxel {} of {}",
                        voxel, n_voxels
                    )));
                }
            }
            hierarchy.set_voxel_index(node, datum.voxel_index);
            if let Some(component) = &datum.component {
                if component.len() != n_genes {
                    return Err(AtlasError::InconsistentVolume(format!(
                        "component of length {} for {} genes",
                        component.len(),
                        n_genes
                    )));
                }
                hierarchy.set_component(node, Some(DVector::from_column_slice(component)));
            }
            // children are created in order so sibling order survives
            let created: Vec<NodeId> = datum
                .children
                .iter()
                .map(|_| hierarchy.add_child(node, None))
                .collect();
            stack.extend(created.into_iter().zip(&datum.children).rev());
        }
        Ok(hierarchy)
    }

    pub fn save_json(&self, path: impl AsRef<Path>, include_leaves: bool) -> Result<()> {
        let record = self.to_record(self.root(), include_leaves);
        fs::write(path, serde_json::to_string(&record)?)?;
        Ok(())
    }

    pub fn load_json(volume: Arc<Volume>, path: impl AsRef<Path>) -> Result<Self> {
        let record: HierarchyRecord = serde_json::from_str(&fs::read_to_string(path)?)?;
        Self::from_record(volume, &record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{make_hierarchy, SplitMethod};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn hierarchy() -> Hierarchy {
        let volume = Arc::new(Volume::synthetic([3, 2, 2], 4, 6));
        let mut rng = StdRng::seed_from_u64(1);
        make_hierarchy(volume, None, SplitMethod::Pca, &mut rng).unwrap()
    }

    #[test]
    fn test_round_trip_with_leaves() {
        let h = hierarchy();
        let record = h.to_record(h.root(), true);
        assert_eq!(record.n_records(), h.n_nodes());

        let reloaded = Hierarchy::from_record(h.volume().clone(), &record).unwrap();
        assert_eq!(reloaded.to_record(reloaded.root(), true), record);
        assert_eq!(reloaded.voxels(reloaded.root()), h.voxels(h.root()));
        assert_eq!(reloaded.max_depth(), h.max_depth());
    }

    #[test]
    fn test_without_leaves_truncates() {
        let h = hierarchy();
        let record = h.to_record(h.root(), false);
        assert_eq!(record.n_records(), h.n_progenitors(h.root()));

        let reloaded = Hierarchy::from_record(h.volume().clone(), &record).unwrap();
        assert!(reloaded.voxels(reloaded.root()).is_empty());
        assert_eq!(reloaded.n_nodes(), h.n_progenitors(h.root()));
    }

    #[test]
    fn test_json_file() {
        let h = hierarchy();
        let path = std::env::temp_dir().join(format!("axonatlas_hierarchy_{}.json", std::process::id()));
        h.save_json(&path, true).unwrap();
        let reloaded = Hierarchy::load_json(h.volume().clone(), &path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(reloaded.n_nodes(), h.n_nodes());
        assert_eq!(
            reloaded.component(reloaded.root()).map(|c| c.len()),
            Some(h.volume().n_genes())
        );
    }

    #[test]
    fn test_rejects_foreign_voxels() {
        let h = hierarchy();
        let record = HierarchyRecord {
            voxel_index: None,
            component: None,
            children: vec![HierarchyRecord {
                voxel_index: Some(99),
                component: None,
                children: Vec::new(),
            }],
        };
        assert!(Hierarchy::from_record(h.volume().clone(), &record).is_err());
    }
}
