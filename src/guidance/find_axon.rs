//! Extraction of an axon tree from the up and down guidance graphs
//!
//! The axon first climbs: every state reachable from the source in the up
//! graph. It then descends: every state reachable in the down graph from
//! any state of the climb. The union of both is reduced to the cheapest
//! route from the source to each of its dead ends, and those routes merged
//! into a single out-tree.

use super::graph::DiGraph;
use crate::error::{AtlasError, Result};
use log::debug;

/// Extract the axon tree grown from vertex `source`
///
/// Both graphs must share the vertex identity space produced by
/// [`make_guidance_graphs`](super::make_guidance_graphs).
///
/// # Panics
///
/// When the extracted tree does not have exactly one vertex without
/// incoming edges. This signals a broken guidance graph, not bad input.
pub fn find_axon_tree(up: &DiGraph, down: &DiGraph, source: usize) -> Result<DiGraph> {
    if source >= up.n_vertices() || up.n_vertices() != down.n_vertices() {
        return Err(AtlasError::VertexLookup {
            what: format!("source vertex {}", source),
            found: 0,
        });
    }

    let up_reachable = up.reachable_from([source]);
    let up_axon = up.induced_subgraph(&up_reachable);

    let down_reachable = down.reachable_from(up_reachable.iter().copied());
    let down_axon = down.induced_subgraph(&down_reachable);

    let axon_graph = up_axon.union_by_name(&down_axon);
    let matches: Vec<usize> = (0..axon_graph.n_vertices())
        .filter(|&v| axon_graph.vertex(v).name == source)
        .collect();
    let &[root] = matches.as_slice() else {
        return Err(AtlasError::VertexLookup {
            what: format!("vertex named {} in the axon graph", source),
            found: matches.len(),
        });
    };

    let paths = axon_graph.shortest_paths(root, true);
    let mut edges: Vec<usize> = axon_graph
        .sinks()
        .into_iter()
        .flat_map(|sink| paths.edge_path(&axon_graph, sink))
        .collect();
    edges.sort_unstable();
    edges.dedup();

    let tree = if edges.is_empty() {
        axon_graph.induced_subgraph(&[root])
    } else {
        axon_graph.subgraph_edges(&edges)
    };

    let n_roots = tree.roots().len();
    assert_eq!(
        n_roots, 1,
        "exactly one source vertex expected, found {}",
        n_roots
    );

    debug!(
        "Axon from {}: {} up, {} down, {} in union, tree of {} vertices",
        source,
        up_reachable.len(),
        down_reachable.len(),
        axon_graph.n_vertices(),
        tree.n_vertices()
    );
    Ok(tree)
}
