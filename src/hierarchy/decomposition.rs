//! Hierarchical decomposition of a volume into a [`Hierarchy`]
//!
//! Starting from a root that holds every voxel as a direct child, nodes are
//! split in two by grouping their children with a [`SplitMethod`]. Which
//! nodes get split, and in which order, is decided by a [`Schedule`]:
//! - **FixedDepth**: breadth-first, every node shallower than the target
//!   depth is split once
//! - **Balanced**: greedy, the node with the most children is split next

use super::tree::{Hierarchy, NodeId};
use crate::error::{AtlasError, Result};
use crate::volume::Volume;
use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;

/// Depth used when a fixed-depth decomposition is asked to resolve every
/// generation
const UNBOUNDED_DEPTH: usize = 1000;

/// Strategy grouping a node's children into a left and a right half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitMethod {
    /// Threshold the projection on the first principal component at its mean
    #[default]
    Pca,
    /// Uniform coin flips, with one child pinned to each side
    Random,
    /// Threshold the projection on a Gaussian random direction at its mean
    RandomProjection,
}

impl SplitMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SplitMethod::Pca => "PCA",
            SplitMethod::Random => "random",
            SplitMethod::RandomProjection => "random projection",
        }
    }

    /// Compute a go-left flag for each current child of `node`
    ///
    /// Projection-based methods record their direction as the node's
    /// component.
    pub fn go_left<R: Rng + ?Sized>(
        &self,
        hierarchy: &mut Hierarchy,
        node: NodeId,
        rng: &mut R,
    ) -> Result<Vec<bool>> {
        match self {
            SplitMethod::Pca => pca_split(hierarchy, node),
            SplitMethod::Random => Ok(random_split(hierarchy.children(node).len(), rng)),
            SplitMethod::RandomProjection => Ok(random_projection_split(hierarchy, node, rng)),
        }
    }
}

/// Which nodes are split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    /// Split breadth-first down to `depth` generations (`None`: resolve all)
    FixedDepth { depth: Option<usize> },
    /// Split the largest node first (`None`: twice the voxel count)
    Balanced { n_iterations: Option<usize> },
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::FixedDepth { depth: None }
    }
}

/// Decomposition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub schedule: Schedule,
    pub method: SplitMethod,
    /// Seed for the random split methods
    pub seed: u64,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            method: SplitMethod::Pca,
            seed: 0,
        }
    }
}

impl DecompositionConfig {
    /// Decompose a volume according to this configuration
    pub fn decompose(&self, volume: Arc<Volume>) -> Result<Hierarchy> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        match self.schedule {
            Schedule::FixedDepth { depth } => make_hierarchy(volume, depth, self.method, &mut rng),
            Schedule::Balanced { n_iterations } => {
                make_balanced_hierarchy(volume, n_iterations, self.method, &mut rng)
            }
        }
    }
}

/// Move the children of `node` into two new child nodes
///
/// `go_left[i]` decides the side of the i-th current child. A node without
/// children is left alone. A node with a single child is cut out: the child
/// takes its place under the grandparent (a root with a single child is
/// left alone). An assignment that puts every child on the same side is
/// rejected before anything is modified.
pub fn split_node_children(hierarchy: &mut Hierarchy, node: NodeId, go_left: &[bool]) -> Result<()> {
    let n_children = hierarchy.children(node).len();
    if n_children == 0 {
        return Ok(());
    }
    if n_children == 1 {
        collapse_single_child(hierarchy, node);
        return Ok(());
    }

    if go_left.len() != n_children {
        return Err(AtlasError::SplitLength {
            node: node.index(),
            expected: n_children,
            found: go_left.len(),
        });
    }
    if go_left.iter().all(|&g| g) || go_left.iter().all(|&g| !g) {
        return Err(AtlasError::DegenerateSplit {
            node: node.index(),
            n_children,
        });
    }

    let children = hierarchy.clear_children(node);
    let left = hierarchy.add_child(node, None);
    let right = hierarchy.add_child(node, None);
    for (child, &goes_left) in children.into_iter().zip(go_left) {
        hierarchy.set_parent(child, if goes_left { left } else { right });
    }
    Ok(())
}

fn collapse_single_child(hierarchy: &mut Hierarchy, node: NodeId) {
    if let Some(grandparent) = hierarchy.parent(node) {
        let child = hierarchy.children(node)[0];
        hierarchy.replace_child(grandparent, node, child);
    }
}

/// Split one node with a split method
///
/// Returns the nodes the traversal should continue with: the two new
/// children, the promoted child of a collapsed node, or nothing.
pub fn split_node<R: Rng + ?Sized>(
    hierarchy: &mut Hierarchy,
    node: NodeId,
    method: SplitMethod,
    rng: &mut R,
) -> Result<Vec<NodeId>> {
    match hierarchy.children(node).len() {
        0 => Ok(Vec::new()),
        1 => {
            let child = hierarchy.children(node)[0];
            collapse_single_child(hierarchy, node);
            Ok(vec![child])
        }
        _ => {
            let go_left = method.go_left(hierarchy, node, rng)?;
            split_node_children(hierarchy, node, &go_left)?;
            Ok(hierarchy.children(node).to_vec())
        }
    }
}

/// Expression of each child of `node` as the rows of a matrix
fn children_expression(hierarchy: &Hierarchy, node: NodeId) -> DMatrix<f64> {
    let children = hierarchy.children(node);
    let n_genes = hierarchy.volume().n_genes();
    let mut matrix = DMatrix::zeros(children.len(), n_genes);
    for (i, &child) in children.iter().enumerate() {
        matrix.set_row(i, &hierarchy.expression(child).transpose());
    }
    matrix
}

/// Split on the first principal component of the children's expression
///
/// The component is stored on the node with its largest-magnitude entry
/// made positive, so that the split is reproducible. Two children with
/// identical projections split as `[false, true]`.
pub fn pca_split(hierarchy: &mut Hierarchy, node: NodeId) -> Result<Vec<bool>> {
    let n_children = hierarchy.children(node).len();
    if n_children < 2 {
        return Err(AtlasError::TooFewChildren {
            method: SplitMethod::Pca.name(),
            node: node.index(),
            found: n_children,
        });
    }

    if hierarchy.volume().n_genes() == 0 {
        return Err(AtlasError::Numerical(format!(
            "cannot take principal components of node {} without genes",
            node
        )));
    }

    let mut centered = children_expression(hierarchy, node);
    let mean = centered.row_mean();
    for mut row in centered.row_iter_mut() {
        row -= &mean;
    }

    let svd = centered.clone().svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| AtlasError::Numerical("SVD did not produce right singular vectors".into()))?;
    let first = svd.singular_values.imax();
    let mut component: DVector<f64> = v_t.row(first).transpose();
    if component[component.iamax()] < 0.0 {
        component = -component;
    }

    let projection = &centered * &component;
    hierarchy.set_component(node, Some(component));

    if n_children == 2 && projection[0] == projection[1] {
        return Ok(vec![false, true]);
    }
    Ok(below_mean(&projection))
}

/// Random split keeping at least one child on each side
pub fn random_split<R: Rng + ?Sized>(n_children: usize, rng: &mut R) -> Vec<bool> {
    if n_children < 2 {
        return vec![true; n_children];
    }
    let pinned = rand::seq::index::sample(rng, n_children, 2);
    let mut draw: Vec<bool> = (0..n_children).map(|_| rng.gen::<f64>() < 0.5).collect();
    draw[pinned.index(0)] = true;
    draw[pinned.index(1)] = false;
    draw
}

/// Split on the projection onto a standard-normal random direction
pub fn random_projection_split<R: Rng + ?Sized>(
    hierarchy: &mut Hierarchy,
    node: NodeId,
    rng: &mut R,
) -> Vec<bool> {
    let n_children = hierarchy.children(node).len();
    if n_children < 2 {
        return vec![true; n_children];
    }
    let n_genes = hierarchy.volume().n_genes();
    let component = DVector::from_fn(n_genes, |_, _| rng.sample::<f64, _>(StandardNormal));
    let projection = children_expression(hierarchy, node) * &component;
    hierarchy.set_component(node, Some(component));
    below_mean(&projection)
}

fn below_mean(projection: &DVector<f64>) -> Vec<bool> {
    let mean = projection.mean();
    projection.iter().map(|&p| p < mean).collect()
}

/// Decompose a volume breadth-first down to a fixed depth
///
/// Every node at a depth below `depth` is split once; the root is
/// generation 0. With `None` all generations are resolved. When the depth
/// runs out before the tree is binary, the deepest interior nodes keep
/// more than two children.
pub fn make_hierarchy<R: Rng + ?Sized>(
    volume: Arc<Volume>,
    depth: Option<usize>,
    method: SplitMethod,
    rng: &mut R,
) -> Result<Hierarchy> {
    let mut hierarchy = Hierarchy::with_voxel_leaves(volume);
    let depth = depth.unwrap_or(UNBOUNDED_DEPTH);
    if depth == 0 {
        return Ok(hierarchy);
    }

    let mut queue = VecDeque::from([hierarchy.root()]);
    while let Some(node) = queue.pop_front() {
        let node_depth = hierarchy.depth(node);
        let next = split_node(&mut hierarchy, node, method, rng)?;
        if node_depth + 1 < depth {
            queue.extend(next);
        }
    }

    info!(
        "Hierarchy ({} split, depth {}): {} voxels, {} interior nodes, max depth {}",
        method.name(),
        depth,
        hierarchy.volume().n_voxels(),
        hierarchy.n_progenitors(hierarchy.root()),
        hierarchy.max_depth()
    );
    Ok(hierarchy)
}

/// Decompose a volume by always splitting the node with the most children
///
/// The root counts as the first iteration, so `n_iterations - 1` nodes
/// are visited. Ties go to the node that entered the worklist last.
/// Defaults to twice the number of voxels.
pub fn make_balanced_hierarchy<R: Rng + ?Sized>(
    volume: Arc<Volume>,
    n_iterations: Option<usize>,
    method: SplitMethod,
    rng: &mut R,
) -> Result<Hierarchy> {
    let mut hierarchy = Hierarchy::with_voxel_leaves(volume);
    let n_iterations =
        n_iterations.unwrap_or(2 * hierarchy.children(hierarchy.root()).len());
    let visited = balanced_splits(&mut hierarchy, n_iterations, method, rng)?;

    info!(
        "Balanced hierarchy ({} split, {} nodes visited): {} voxels, {} interior nodes, max depth {}",
        method.name(),
        visited.len(),
        hierarchy.volume().n_voxels(),
        hierarchy.n_progenitors(hierarchy.root()),
        hierarchy.max_depth()
    );
    Ok(hierarchy)
}

/// Greedy worklist of the balanced schedule
///
/// Returns every visited node with its child count at the time of the
/// visit, in visiting order.
fn balanced_splits<R: Rng + ?Sized>(
    hierarchy: &mut Hierarchy,
    n_iterations: usize,
    method: SplitMethod,
    rng: &mut R,
) -> Result<Vec<(NodeId, usize)>> {
    // A queued node's child count cannot change until it is popped.
    let mut worklist: BinaryHeap<(usize, usize, NodeId)> = BinaryHeap::new();
    let mut inserted = 0usize;
    worklist.push((hierarchy.children(hierarchy.root()).len(), inserted, hierarchy.root()));

    let mut visited = Vec::with_capacity(n_iterations.saturating_sub(1));
    for _ in 1..n_iterations {
        let Some((n_children, _, node)) = worklist.pop() else {
            break;
        };
        debug!("Balanced split of {} with {} children", node, n_children);
        visited.push((node, n_children));
        for next in split_node(hierarchy, node, method, rng)? {
            inserted += 1;
            worklist.push((hierarchy.children(next).len(), inserted, next));
        }
    }
    Ok(visited)
}
