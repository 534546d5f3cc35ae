//! Matching nodes between hierarchies
//!
//! Hierarchies built separately, even from the same volume, do not agree
//! on the order of children or the sign of components. The functions here
//! align a second hierarchy to a reference and score how well hierarchies
//! and voxel-to-node assignments agree. Only genes both volumes share are
//! compared.

use super::tree::{Hierarchy, NodeId};
use crate::error::{AtlasError, Result};
use crate::stats::pearson;
use log::debug;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

/// Correspondence from reference nodes to nodes of another hierarchy
pub type NodeMap = BTreeMap<NodeId, NodeId>;

fn masked(values: &DVector<f64>, mask: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(mask)
        .filter(|(_, &keep)| keep)
        .map(|(&v, _)| v)
        .collect()
}

/// Align `other` to `reference` and return the node correspondence
///
/// Both trees are walked together. Where two corresponding nodes are both
/// binary and carry components pointing in opposite directions over the
/// shared genes, `other`'s children are reversed and its component
/// negated. Traversal only continues below pairs of binary nodes.
pub fn rotate_to_match(reference: &Hierarchy, other: &mut Hierarchy) -> NodeMap {
    let (mask_ref, mask_other) = reference.volume().common_gene_masks(other.volume());
    let mut map = NodeMap::new();

    let mut stack = vec![(reference.root(), other.root())];
    while let Some((a, b)) = stack.pop() {
        map.insert(a, b);
        if reference.children(a).len() != 2 || other.children(b).len() != 2 {
            continue;
        }
        if let (Some(ca), Some(cb)) = (reference.component(a), other.component(b)) {
            let dot: f64 = masked(ca, &mask_ref)
                .iter()
                .zip(masked(cb, &mask_other))
                .map(|(x, y)| x * y)
                .sum();
            if dot < 0.0 {
                debug!("Rotating {} to match {}", b, a);
                let flipped = -cb;
                other.reverse_children(b);
                other.set_component(b, Some(flipped));
            }
        }
        stack.extend(
            reference
                .children(a)
                .iter()
                .copied()
                .zip(other.children(b).iter().copied()),
        );
    }
    map
}

/// Depth-weighted mean correlation of matched components
///
/// A node at depth `d` has weight `2^-d`. Pairs where either node has no
/// component are skipped, as are pairs whose components have zero
/// variance over the shared genes. Returns `None` when nothing is scored.
pub fn match_components(reference: &Hierarchy, other: &Hierarchy, map: &NodeMap) -> Option<f64> {
    let (mask_ref, mask_other) = reference.volume().common_gene_masks(other.volume());
    let mut total = 0.0;
    let mut normalization = 0.0;

    for (&a, &b) in map {
        debug_assert_eq!(reference.depth(a), other.depth(b));
        let (Some(ca), Some(cb)) = (reference.component(a), other.component(b)) else {
            continue;
        };
        let Some(r) = pearson(&masked(ca, &mask_ref), &masked(cb, &mask_other)) else {
            continue;
        };
        let weight = 0.5f64.powi(reference.depth(a) as i32);
        total += r * weight;
        normalization += weight;
    }
    (normalization > 0.0).then(|| total / normalization)
}

/// Route every expression row down the hierarchy
///
/// At each node with a component, the rows that reached it are centered,
/// projected onto the component and sent to the left child when below the
/// mean projection. Rows stop at the first node without a component or
/// deeper than `depth`.
pub fn match_voxels_to_hierarchy_nodes(
    hierarchy: &Hierarchy,
    expression: &DMatrix<f64>,
    depth: Option<usize>,
) -> Result<Vec<NodeId>> {
    let n_genes = hierarchy.volume().n_genes();
    if expression.ncols() != n_genes {
        return Err(AtlasError::InconsistentVolume(format!(
            "expression has {} genes, hierarchy has {}",
            expression.ncols(),
            n_genes
        )));
    }

    let n_rows = expression.nrows();
    let mut result = vec![hierarchy.root(); n_rows];
    let mut stack = vec![(hierarchy.root(), (0..n_rows).collect::<Vec<usize>>())];

    while let Some((node, rows)) = stack.pop() {
        let too_deep = depth.is_some_and(|d| hierarchy.depth(node) > d);
        if too_deep || hierarchy.component(node).is_none() {
            for &row in &rows {
                result[row] = node;
            }
            continue;
        }

        let (left, right) = match hierarchy.children(node) {
            [left, right] => (*left, *right),
            other => {
                return Err(AtlasError::NotBinary {
                    node: node.index(),
                    found: other.len(),
                })
            }
        };

        let mut subset = expression.select_rows(rows.iter());
        let mean = subset.row_mean();
        for mut row in subset.row_iter_mut() {
            row -= &mean;
        }
        let Some(projection) = hierarchy.project_component(node, Some(&subset)) else {
            continue;
        };
        let threshold = projection.mean();

        let (go_left, go_right): (Vec<(usize, f64)>, Vec<(usize, f64)>) = rows
            .iter()
            .copied()
            .zip(projection.iter().copied())
            .partition(|&(_, p)| p < threshold);
        if !go_left.is_empty() {
            stack.push((left, go_left.into_iter().map(|(r, _)| r).collect()));
        }
        if !go_right.is_empty() {
            stack.push((right, go_right.into_iter().map(|(r, _)| r).collect()));
        }
    }
    Ok(result)
}

/// Fraction of voxels assigned to agreeing nodes
///
/// `first` and `second` give one node per voxel in the `reference` and
/// `other` hierarchies. With a node map, each node of `first` is
/// translated through its nearest mapped ancestor; without one, both
/// lists must refer to the same hierarchy.
///
/// With a depth, both assignments are lifted to that depth and a voxel
/// scores 1 for identical nodes. Without a depth, a voxel scores
/// `1 - 2^-d` where `d` is the depth of the least common ancestor.
pub fn score_voxel_to_hierarchy_match(
    reference: &Hierarchy,
    first: &[NodeId],
    other: &Hierarchy,
    second: &[NodeId],
    map: Option<&NodeMap>,
    depth: Option<usize>,
) -> Result<f64> {
    if first.len() != second.len() {
        return Err(AtlasError::InconsistentVolume(format!(
            "voxel lists of length {} and {}",
            first.len(),
            second.len()
        )));
    }
    if first.is_empty() {
        return Ok(0.0);
    }
    match map {
        Some(map) if !map.contains_key(&reference.root()) => {
            return Err(AtlasError::Config("node map must contain the reference root".into()))
        }
        None if !std::ptr::eq(reference, other) => {
            return Err(AtlasError::Config(
                "voxel lists from different hierarchies need a node map".into(),
            ))
        }
        _ => {}
    }

    let mut total = 0.0;
    for (&a, &b) in first.iter().zip(second) {
        let (a, b) = match depth {
            Some(d) => (
                reference.ancestor_at_depth(a, d),
                other.ancestor_at_depth(b, d),
            ),
            None => (a, b),
        };
        let a = match map {
            Some(map) => std::iter::once(a)
                .chain(reference.ancestors(a))
                .find_map(|n| map.get(&n).copied())
                .ok_or_else(|| AtlasError::Config(format!("node {} has no mapped ancestor", a)))?,
            None => a,
        };
        total += match depth {
            Some(_) if a == b => 1.0,
            Some(_) => 0.0,
            None => match other.least_common_ancestor(a, b) {
                Some(lca) => 1.0 - 0.5f64.powi(other.depth(lca) as i32),
                None => 0.0,
            },
        };
    }
    Ok(total / first.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{make_hierarchy, SplitMethod};
    use crate::volume::Volume;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn build(volume: Arc<Volume>, depth: Option<usize>) -> Hierarchy {
        let mut rng = StdRng::seed_from_u64(0);
        make_hierarchy(volume, depth, SplitMethod::Pca, &mut rng).unwrap()
    }

    /// Mirror a hierarchy: reverse every split node and negate its component
    fn mirrored(h: &Hierarchy) -> Hierarchy {
        let mut m = h.clone();
        for node in m.interior(m.root()) {
            let Some(flipped) = m.component(node).map(|c| -c) else {
                continue;
            };
            if m.children(node).len() == 2 {
                m.reverse_children(node);
            }
            m.set_component(node, Some(flipped));
        }
        m
    }

    #[test]
    fn test_rotation_undoes_mirroring() {
        let volume = Arc::new(Volume::synthetic([3, 3, 2], 5, 3));
        let reference = build(volume, Some(3));
        let mut other = mirrored(&reference);
        let map = rotate_to_match(&reference, &mut other);

        assert!(map.len() > 1);
        for (&a, &b) in &map {
            assert_eq!(reference.voxels(a), other.voxels(b));
        }
        let score = match_components(&reference, &other, &map).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_match_components_none_without_components() {
        let volume = Arc::new(Volume::synthetic([2, 2, 1], 3, 3));
        let h = Hierarchy::with_voxel_leaves(volume);
        let map = NodeMap::from([(h.root(), h.root())]);
        assert!(match_components(&h, &h, &map).is_none());
    }

    #[test]
    fn test_voxels_route_back_to_their_leaves() {
        let volume = Arc::new(Volume::synthetic([3, 3, 1], 4, 8));
        let h = build(volume.clone(), None);
        let assigned = match_voxels_to_hierarchy_nodes(&h, &volume.expression, Some(1)).unwrap();
        assert_eq!(assigned.len(), 9);
        for &node in &assigned {
            assert!(h.depth(node) <= 2);
        }
        // at depth 0 every row stops at one of the root's children
        let top = match_voxels_to_hierarchy_nodes(&h, &volume.expression, Some(0)).unwrap();
        let root_children = h.children(h.root());
        assert!(top.iter().all(|n| root_children.contains(n)));
    }

    #[test]
    fn test_routing_matches_decomposition_at_first_split() {
        let volume = Arc::new(Volume::synthetic([4, 3, 2], 4, 5));
        let h = build(volume.clone(), None);
        let top = match_voxels_to_hierarchy_nodes(&h, &volume.expression, Some(0)).unwrap();
        for (voxel, &node) in top.iter().enumerate() {
            assert!(h.voxels(node).contains(&voxel));
        }
    }

    #[test]
    fn test_routing_rejects_gene_mismatch() {
        let volume = Arc::new(Volume::synthetic([2, 2, 1], 3, 1));
        let h = build(volume, None);
        let wrong = DMatrix::zeros(2, 5);
        assert!(match_voxels_to_hierarchy_nodes(&h, &wrong, None).is_err());
    }

    #[test]
    fn test_score_identical_assignment() {
        let volume = Arc::new(Volume::synthetic([3, 2, 1], 3, 2));
        let h = build(volume, None);
        let leaves: Vec<NodeId> = (0..6).map(|v| h.get_leaf(v).unwrap()).collect();
        let exact = score_voxel_to_hierarchy_match(&h, &leaves, &h, &leaves, None, Some(1)).unwrap();
        assert_eq!(exact, 1.0);

        let lca = score_voxel_to_hierarchy_match(&h, &leaves, &h, &leaves, None, None).unwrap();
        let expected = leaves
            .iter()
            .map(|&l| 1.0 - 0.5f64.powi(h.depth(l) as i32))
            .sum::<f64>()
            / 6.0;
        assert!((lca - expected).abs() < 1e-12);

        let roots = vec![h.root(); 6];
        let none = score_voxel_to_hierarchy_match(&h, &roots, &h, &leaves, None, None).unwrap();
        assert_eq!(none, 0.0);
    }

    #[test]
    fn test_score_needs_map_across_hierarchies() {
        let volume = Arc::new(Volume::synthetic([2, 2, 1], 3, 2));
        let a = build(volume.clone(), None);
        let b = build(volume, None);
        let nodes = vec![a.root(); 4];
        assert!(score_voxel_to_hierarchy_match(&a, &nodes, &b, &nodes, None, None).is_err());

        let map = NodeMap::from([(a.root(), b.root())]);
        let score = score_voxel_to_hierarchy_match(&a, &nodes, &b, &nodes, Some(&map), Some(0)).unwrap();
        assert_eq!(score, 1.0);
    }
}
