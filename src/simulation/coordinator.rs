//! Links between intersections
//!
//! The coordinator keeps a directed graph whose edges are labelled with the
//! outbound heading that leads from one intersection to the next. It answers
//! neighbor and queue-depth queries; it never acts on its own.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction as EdgeDirection;

use super::intersection::Intersection;
use super::signal::CongestionView;
use super::types::{Direction, IntersectionId, Lane, Position};

#[derive(Debug, Default, Clone)]
pub struct Coordinator {
    /// Nodes are intersections; an edge A -> B labelled `h` means traffic
    /// leaving A along heading `h` arrives at B
    graph: DiGraph<IntersectionId, Direction>,

    /// Maps intersection IDs to their node indices in the graph
    nodes: HashMap<IntersectionId, NodeIndex>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_intersection(&mut self, id: IntersectionId) {
        if self.nodes.contains_key(&id) {
            return;
        }
        let node = self.graph.add_node(id);
        self.nodes.insert(id, node);
    }

    /// Record that leaving `from` along `heading` leads to `to`
    pub fn link(
        &mut self,
        from: IntersectionId,
        heading: Direction,
        to: IntersectionId,
    ) -> Result<()> {
        let from_node = *self
            .nodes
            .get(&from)
            .with_context(|| format!("Intersection {} not in coordinator", from))?;
        let to_node = *self
            .nodes
            .get(&to)
            .with_context(|| format!("Intersection {} not in coordinator", to))?;
        self.graph.add_edge(from_node, to_node, heading);
        Ok(())
    }

    /// Intersection reached by leaving `id` along `heading`
    pub fn neighbor(&self, id: IntersectionId, heading: Direction) -> Option<IntersectionId> {
        let node = *self.nodes.get(&id)?;
        self.graph
            .edges_directed(node, EdgeDirection::Outgoing)
            .find(|edge| *edge.weight() == heading)
            .map(|edge| self.graph[edge.target()])
    }

    /// Outbound links of `id` as (heading, neighbor)
    pub fn links_from(&self, id: IntersectionId) -> Vec<(Direction, IntersectionId)> {
        let Some(&node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut links: Vec<_> = self
            .graph
            .edges_directed(node, EdgeDirection::Outgoing)
            .map(|edge| (*edge.weight(), self.graph[edge.target()]))
            .collect();
        links.sort();
        links
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vehicles waiting at `id` in `direction`/`lane`; 0 for an unknown intersection
    pub fn remaining_count(
        &self,
        intersections: &BTreeMap<IntersectionId, Intersection>,
        id: IntersectionId,
        direction: Direction,
        lane: Lane,
    ) -> usize {
        intersections
            .get(&id)
            .map(|intersection| intersection.lanes.remaining(direction, lane))
            .unwrap_or(0)
    }

    /// Depth of the neighbor queue each movement of `id` would feed.
    ///
    /// A movement leaving along heading `h` in lane `l` joins the neighbor's
    /// `h`/`l` queue, so that queue's remaining count is its depth.
    pub fn congestion_for(
        &self,
        intersections: &BTreeMap<IntersectionId, Intersection>,
        id: IntersectionId,
    ) -> CongestionView {
        let mut view = CongestionView::default();
        for direction in Direction::ALL {
            for lane in Lane::ALL {
                let heading = direction.exit_heading(lane);
                let depth = self
                    .neighbor(id, heading)
                    .filter(|neighbor| intersections.contains_key(neighbor))
                    .map(|neighbor| self.remaining_count(intersections, neighbor, heading, lane));
                view.set(direction, lane, depth);
            }
        }
        view
    }

    /// Neighbor that takes over a vehicle of `from` travelling along `heading`
    /// and currently at `position`
    pub fn handoff_target(
        &self,
        intersections: &BTreeMap<IntersectionId, Intersection>,
        from: IntersectionId,
        heading: Direction,
        position: Position,
    ) -> Option<IntersectionId> {
        let neighbor = self.neighbor(from, heading)?;
        let zone = intersections.get(&neighbor)?.entry_zone(heading)?;
        zone.contains(position).then_some(neighbor)
    }
}
