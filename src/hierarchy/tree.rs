//! Hierarchy — an arena tree whose leaves are the voxels of a volume
//!
//! Nodes are addressed by [`NodeId`]. Parent and child links are stored as
//! indices, so re-parenting is an index update plus a child-list edit.
//! Nodes cut out of the tree stay in the arena but are no longer reachable
//! from the root.
//!
//! Expression and position of interior nodes are means over their leaves.
//! They are computed on first use and cached; every structural mutation
//! clears the caches on the path from the touched node up to the root.

use crate::error::{AtlasError, Result};
use crate::volume::Volume;
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Index of a node in a [`Hierarchy`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct HierarchyNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    depth: usize,
    voxel_index: Option<usize>,
    component: Option<DVector<f64>>,
    expression: OnceCell<DVector<f64>>,
    position: OnceCell<Vector3<f64>>,
}

impl HierarchyNode {
    fn new(parent: Option<NodeId>, depth: usize, voxel_index: Option<usize>) -> Self {
        Self {
            parent,
            children: Vec::new(),
            depth,
            voxel_index,
            component: None,
            expression: OnceCell::new(),
            position: OnceCell::new(),
        }
    }
}

/// A rooted tree over the voxels of one volume
#[derive(Debug, Clone)]
pub struct Hierarchy {
    volume: Arc<Volume>,
    nodes: Vec<HierarchyNode>,
    root: NodeId,
}

impl Hierarchy {
    /// A bare root without children
    pub fn new(volume: Arc<Volume>) -> Self {
        Self {
            volume,
            nodes: vec![HierarchyNode::new(None, 0, None)],
            root: NodeId(0),
        }
    }

    /// A root with one leaf child per voxel, the starting point of every
    /// decomposition
    pub fn with_voxel_leaves(volume: Arc<Volume>) -> Self {
        let n_voxels = volume.n_voxels();
        let mut hierarchy = Self::new(volume);
        for voxel in 0..n_voxels {
            hierarchy.add_child(hierarchy.root, Some(voxel));
        }
        hierarchy
    }

    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes reachable from the root
    pub fn n_nodes(&self) -> usize {
        self.descendants(self.root).len()
    }

    fn node(&self, id: NodeId) -> &HierarchyNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut HierarchyNode {
        &mut self.nodes[id.0]
    }

    /// Append a new child to `parent`
    pub fn add_child(&mut self, parent: NodeId, voxel_index: Option<usize>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let depth = self.node(parent).depth + 1;
        self.nodes.push(HierarchyNode::new(Some(parent), depth, voxel_index));
        self.node_mut(parent).children.push(id);
        self.invalidate(parent);
        id
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.node(id).depth
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).children.is_empty()
    }

    pub fn voxel_index(&self, id: NodeId) -> Option<usize> {
        self.node(id).voxel_index
    }

    pub(crate) fn set_voxel_index(&mut self, id: NodeId, voxel_index: Option<usize>) {
        self.node_mut(id).voxel_index = voxel_index;
        self.invalidate(id);
    }

    /// Gene-space direction used to split this node's children
    pub fn component(&self, id: NodeId) -> Option<&DVector<f64>> {
        self.node(id).component.as_ref()
    }

    pub fn set_component(&mut self, id: NodeId, component: Option<DVector<f64>>) {
        self.node_mut(id).component = component;
    }

    /// Move `child` under `new_parent`, appending it to the new child list
    pub fn set_parent(&mut self, child: NodeId, new_parent: NodeId) {
        if let Some(old) = self.node(child).parent {
            self.node_mut(old).children.retain(|&c| c != child);
            self.invalidate(old);
        }
        self.node_mut(child).parent = Some(new_parent);
        self.node_mut(new_parent).children.push(child);
        self.update_depths(child);
        self.invalidate(new_parent);
    }

    /// Put `new_child` in the slot of `old_child` among `parent`'s children
    ///
    /// `old_child` is detached from the tree.
    pub fn replace_child(&mut self, parent: NodeId, old_child: NodeId, new_child: NodeId) {
        if let Some(prev) = self.node(new_child).parent {
            self.node_mut(prev).children.retain(|&c| c != new_child);
        }
        if let Some(slot) = self
            .node(parent)
            .children
            .iter()
            .position(|&c| c == old_child)
        {
            self.node_mut(parent).children[slot] = new_child;
        } else {
            self.node_mut(parent).children.push(new_child);
        }
        self.node_mut(new_child).parent = Some(parent);
        self.node_mut(old_child).parent = None;
        self.update_depths(new_child);
        self.update_depths(old_child);
        self.invalidate(old_child);
        self.invalidate(parent);
    }

    /// Detach and return all children of a node
    ///
    /// The children keep their parent link until they are attached elsewhere.
    pub fn clear_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children = std::mem::take(&mut self.node_mut(id).children);
        self.invalidate(id);
        children
    }

    /// Reverse the order of a node's children
    pub fn reverse_children(&mut self, id: NodeId) {
        self.node_mut(id).children.reverse();
    }

    /// Recompute depths below `id` from its parent's depth
    fn update_depths(&mut self, id: NodeId) {
        let mut queue = VecDeque::from([id]);
        while let Some(n) = queue.pop_front() {
            let depth = self.node(n).parent.map_or(0, |p| self.node(p).depth + 1);
            self.node_mut(n).depth = depth;
            queue.extend(self.node(n).children.iter().copied());
        }
    }

    /// Drop cached values of `id` and all of its ancestors
    fn invalidate(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node_mut(n);
            node.expression.take();
            node.position.take();
            current = node.parent;
        }
    }

    /// Breadth-first traversal starting at (and including) `id`
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(n) = queue.pop_front() {
            order.push(n);
            queue.extend(self.node(n).children.iter().copied());
        }
        order
    }

    /// Leaves below `id`, in breadth-first order
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_leaf(n))
            .collect()
    }

    /// Non-leaf nodes below (and including) `id`, in breadth-first order
    pub fn interior(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| !self.is_leaf(n))
            .collect()
    }

    /// Nodes with at least one leaf child: the finest named regions
    pub fn just_not_leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.is_just_not_leaf(n))
            .collect()
    }

    pub fn is_just_not_leaf(&self, id: NodeId) -> bool {
        self.children(id).iter().any(|&c| self.is_leaf(c))
    }

    /// Number of interior nodes among the descendants
    pub fn n_progenitors(&self, id: NodeId) -> usize {
        self.interior(id).len()
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(n) = current {
            result.push(n);
            current = self.parent(n);
        }
        result
    }

    /// The topmost ancestor of a node (the node itself when detached)
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// Ancestor at the given depth, or the node itself when it is shallower
    pub fn ancestor_at_depth(&self, id: NodeId, depth: usize) -> NodeId {
        let mut current = id;
        while self.depth(current) > depth {
            match self.parent(current) {
                Some(p) => current = p,
                None => break,
            }
        }
        current
    }

    /// Deepest node that has both `a` and `b` below (or at) it
    pub fn least_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut lineage: HashSet<NodeId> = self.ancestors(a).into_iter().collect();
        lineage.insert(a);
        std::iter::once(b)
            .chain(self.ancestors(b))
            .find(|n| lineage.contains(n))
    }

    /// The leaf carrying a voxel index
    pub fn get_leaf(&self, voxel: usize) -> Option<NodeId> {
        self.leaves(self.root)
            .into_iter()
            .find(|&n| self.voxel_index(n) == Some(voxel))
    }

    /// Voxel indices of all leaves below `id`
    pub fn voxels(&self, id: NodeId) -> Vec<usize> {
        self.leaves(id)
            .into_iter()
            .filter_map(|n| self.voxel_index(n))
            .collect()
    }

    /// Expression rows of all leaves below `id`
    pub fn leaves_expression(&self, id: NodeId) -> DMatrix<f64> {
        let voxels = self.voxels(id);
        let expression = &self.volume.expression;
        DMatrix::from_fn(voxels.len(), expression.ncols(), |i, j| {
            expression[(voxels[i], j)]
        })
    }

    /// Expression of a leaf, or the mean leaf expression of an interior node
    pub fn expression(&self, id: NodeId) -> &DVector<f64> {
        self.node(id)
            .expression
            .get_or_init(|| match self.voxel_index(id) {
                Some(voxel) => self.volume.expression_of(voxel),
                None => {
                    let voxels = self.voxels(id);
                    let mut sum = DVector::zeros(self.volume.n_genes());
                    for &v in &voxels {
                        sum += self.volume.expression.row(v).transpose();
                    }
                    if !voxels.is_empty() {
                        sum /= voxels.len() as f64;
                    }
                    sum
                }
            })
    }

    /// Position of a leaf, or the mean leaf position of an interior node
    pub fn position(&self, id: NodeId) -> &Vector3<f64> {
        self.node(id)
            .position
            .get_or_init(|| match self.voxel_index(id) {
                Some(voxel) => self.volume.voxel_position(voxel),
                None => {
                    let voxels = self.voxels(id);
                    let mut sum = Vector3::zeros();
                    for &v in &voxels {
                        sum += self.volume.voxel_position(v);
                    }
                    if !voxels.is_empty() {
                        sum /= voxels.len() as f64;
                    }
                    sum
                }
            })
    }

    /// Expression difference between the two children of a binary node
    pub fn asymmetry(&self, id: NodeId) -> Result<DVector<f64>> {
        match self.children(id) {
            [left, right] => Ok(self.expression(*left) - self.expression(*right)),
            other => Err(AtlasError::NotBinary {
                node: id.0,
                found: other.len(),
            }),
        }
    }

    /// Project expression rows onto this node's component
    ///
    /// Uses the node's own leaf expression when `expression` is `None`.
    /// Returns `None` when the node has no component.
    pub fn project_component(
        &self,
        id: NodeId,
        expression: Option<&DMatrix<f64>>,
    ) -> Option<DVector<f64>> {
        let component = self.component(id)?;
        Some(match expression {
            Some(e) => e * component,
            None => self.leaves_expression(id) * component,
        })
    }

    /// Project expression rows onto this node's asymmetry
    pub fn project_asymmetry(
        &self,
        id: NodeId,
        expression: Option<&DMatrix<f64>>,
    ) -> Result<DVector<f64>> {
        let asymmetry = self.asymmetry(id)?;
        Ok(match expression {
            Some(e) => e * asymmetry,
            None => self.leaves_expression(id) * asymmetry,
        })
    }

    /// Mean distance of the node's voxels to the node position
    pub fn spatial_spread(&self, id: NodeId) -> f64 {
        let voxels = self.voxels(id);
        if voxels.is_empty() {
            return 0.0;
        }
        let center = *self.position(id);
        voxels
            .iter()
            .map(|&v| (self.volume.voxel_position(v) - center).norm())
            .sum::<f64>()
            / voxels.len() as f64
    }

    /// Maximum depth over all reachable nodes
    pub fn max_depth(&self) -> usize {
        self.descendants(self.root)
            .into_iter()
            .map(|n| self.depth(n))
            .max()
            .unwrap_or(0)
    }
}
