//! Profile-bounded speculation through max-flow / min-cut.
//!
//! The reduced graph keeps the phis that are partially anticipated but not
//! fully available, plus one node per real occurrence they define. Edges
//! point from definitions to uses and carry the execution count of the edge
//! plus one. A single source feeds every undefined phi operand and every
//! real node drains into a single sink.
//!
//! Any set of edges separating source from sink is a valid placement:
//! cutting an operand edge inserts the computation there, cutting a use
//! edge leaves that real occurrence alone. The minimum cut is the placement
//! executing the fewest computations under the profile.
//!
//! ```text
//!            source
//!           /      \
//!        phi B3   phi B7
//!          |    \   |
//!        real    phi B9
//!          |        |
//!          +- sink -+
//! ```

use std::collections::HashMap;

use crate::{
    compiler::passes::ssapre::{
        engine::CandidateEngine,
        occurrence::{OccId, OccTag, OpndFlags, PhiFlags},
    },
    Result,
};

const SOURCE: usize = 0;
const SINK: usize = 1;

/// One edge of a minimum cut, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CutEdge {
    /// The computation is inserted at the end of `pred` for the phi in
    /// `block`.
    Insertion {
        /// Block of the phi occurrence.
        block: usize,
        /// Predecessor receiving the insertion.
        pred: usize,
    },
    /// The real occurrence in `block` keeps its own computation.
    Use {
        /// Block of the real occurrence.
        block: usize,
    },
}

/// Max-flow and min-cut result of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FlowSummary {
    pub max_flow: u64,
    pub routes: usize,
    pub cut: Vec<CutEdge>,
    /// `false` if the cut came from the relaxed search.
    pub exact: bool,
}

#[derive(Debug, Clone, Default)]
struct RgNode {
    occ: Option<OccId>,
    preds: Vec<usize>,
    caps: Vec<u64>,
    used: Vec<u64>,
    /// For phi nodes, the operand position behind each incoming edge.
    opnd_indices: Vec<usize>,
}

/// Entering `node` through its incoming edge `pred`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Visit {
    node: usize,
    pred: usize,
}

#[derive(Debug, Clone)]
struct Route {
    /// From the sink back to the source.
    visits: Vec<Visit>,
    flow: u64,
}

#[derive(Debug, Clone)]
struct MinCut {
    visits: Vec<Visit>,
    exact: bool,
}

/// Multiset of node ids.
#[derive(Debug, Default)]
struct CutSet(HashMap<usize, usize>);

impl CutSet {
    fn insert(&mut self, node: usize) {
        *self.0.entry(node).or_insert(0) += 1;
    }

    fn remove_one(&mut self, node: usize) {
        if let Some(count) = self.0.get_mut(&node) {
            *count -= 1;
            if *count == 0 {
                self.0.remove(&node);
            }
        }
    }

    fn contains(&self, node: usize) -> bool {
        self.0.contains_key(&node)
    }
}

/// The flow network of one candidate.
#[derive(Debug, Clone)]
struct ReducedGraph {
    nodes: Vec<RgNode>,
    routes: Vec<Route>,
    source_edges: usize,
}

impl ReducedGraph {
    fn new() -> Self {
        Self {
            nodes: vec![RgNode::default(), RgNode::default()],
            routes: Vec::new(),
            source_edges: 0,
        }
    }

    fn add_node(&mut self, occ: OccId) -> usize {
        self.nodes.push(RgNode {
            occ: Some(occ),
            ..RgNode::default()
        });
        self.nodes.len() - 1
    }

    fn add_edge(&mut self, from: usize, to: usize, cap: u64, opnd_index: Option<usize>) {
        let node = &mut self.nodes[to];
        node.preds.push(from);
        node.caps.push(cap);
        node.used.push(0);
        if let Some(index) = opnd_index {
            node.opnd_indices.push(index);
        }
        if from == SOURCE {
            self.source_edges += 1;
        }
    }

    fn available(&self, visit: Visit) -> u64 {
        let node = &self.nodes[visit.node];
        node.caps[visit.pred] - node.used[visit.pred]
    }

    fn max_flow(&self) -> u64 {
        self.routes.iter().map(|route| route.flow).fold(0, u64::saturating_add)
    }

    /// Saturates augmenting routes until none is left.
    ///
    /// Returns `false` if `route_limit` routes were found before the search
    /// ran dry.
    fn find_max_flow(&mut self, route_limit: usize) -> bool {
        if self.nodes[SINK].preds.is_empty() {
            return true;
        }
        while self.find_another_route() {
            if self.routes.len() >= route_limit {
                return false;
            }
        }
        true
    }

    fn find_another_route(&mut self) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut visits = Vec::new();
        let sink_preds = self.nodes[SINK].preds.len();

        // Untaken sink edges first, then any.
        let mut success = false;
        for untaken_only in [true, false] {
            for i in 0..sink_preds {
                if untaken_only && self.nodes[SINK].used[i] != 0 {
                    continue;
                }
                visits.push(Visit { node: SINK, pred: i });
                let pred = self.nodes[SINK].preds[i];
                visited[pred] = true;
                if self.visit_node(pred, &mut visits, &mut visited) {
                    success = true;
                    break;
                }
                visits.pop();
            }
            if success {
                break;
            }
        }
        if !success {
            return false;
        }

        let bottleneck = visits
            .iter()
            .map(|&visit| self.available(visit))
            .min()
            .unwrap_or(0);
        for visit in &visits {
            self.nodes[visit.node].used[visit.pred] += bottleneck;
        }
        self.routes.push(Route {
            visits,
            flow: bottleneck,
        });
        true
    }

    fn visit_node(&self, node_id: usize, visits: &mut Vec<Visit>, visited: &mut [bool]) -> bool {
        let node = &self.nodes[node_id];
        let count = node.preds.len();

        for i in 0..count {
            if node.preds[i] == SOURCE && node.caps[i] > node.used[i] {
                // Prefer another source edge nobody used yet.
                let fresh = (i + 1..count)
                    .find(|&k| node.preds[k] == SOURCE && node.used[k] == 0 && node.caps[k] > 0)
                    .unwrap_or(i);
                visits.push(Visit {
                    node: node_id,
                    pred: fresh,
                });
                return true;
            }
        }

        for i in 0..count {
            let pred = node.preds[i];
            if node.used[i] == 0 && node.caps[i] > 0 && !visited[pred] {
                visits.push(Visit { node: node_id, pred: i });
                visited[pred] = true;
                if self.visit_node(pred, visits, visited) {
                    return true;
                }
                visits.pop();
            }
        }

        let mut by_capacity: Vec<usize> = (0..count).collect();
        by_capacity.sort_by_key(|&i| node.caps[i]);
        for i in by_capacity {
            let pred = node.preds[i];
            if !visited[pred] && node.caps[i] > node.used[i] {
                visits.push(Visit { node: node_id, pred: i });
                visited[pred] = true;
                if self.visit_node(pred, visits, visited) {
                    return true;
                }
                visits.pop();
            }
        }
        false
    }

    /// Picks one edge per route so that the picked edges add up to at most
    /// `bound`, preferring edges close to the sink.
    ///
    /// With `exact` only saturated edges qualify. An edge picked for an
    /// earlier route counts once.
    fn search_cut(
        &self,
        cut: &mut [Visit],
        cut_set: &mut CutSet,
        route_idx: usize,
        flow_so_far: u64,
        bound: u64,
        exact: bool,
    ) -> bool {
        let visits = &self.routes[route_idx].visits;
        let len = visits.len();

        let mut visit_idx = len - 1;
        while visit_idx > 1 && !cut_set.contains(visits[visit_idx].node) {
            visit_idx -= 1;
        }
        if visit_idx != 1 {
            for visit in &visits[1..visit_idx] {
                cut_set.insert(visit.node);
            }
        }

        loop {
            if visit_idx == len {
                for visit in &visits[1..] {
                    cut_set.remove_one(visit.node);
                }
                return false;
            }
            let visit = visits[visit_idx];
            let node = &self.nodes[visit.node];
            let mut cap = node.caps[visit.pred];

            if exact && cap != node.used[visit.pred] {
                if visit_idx != 0 {
                    cut_set.insert(visit.node);
                }
                visit_idx += 1;
                continue;
            }

            cut[route_idx] = visit;
            if visit_idx != 0 {
                cut_set.insert(visit.node);
            }
            if cut[..route_idx].contains(&visit) {
                cap = 0;
            }

            let total = flow_so_far.saturating_add(cap);
            let mut success = total <= bound;
            if success && route_idx + 1 != self.routes.len() {
                success = self.search_cut(cut, cut_set, route_idx + 1, total, bound, exact);
            }
            visit_idx += 1;
            if success {
                return true;
            }
        }
    }

    /// Finds the minimum cut of the saturated network.
    ///
    /// Beyond `route_threshold` routes the exact search is skipped and the
    /// cut is only bounded by `max_flow * max(routes / 10, 1)`. Otherwise
    /// the exact search runs first and the relaxed one, bounded by
    /// `max_flow * relaxed_factor`, is the fallback. When no cut fits the
    /// bound, the first cut found without a bound is taken. Relaxed cuts
    /// are heuristic and carry `exact == false`.
    fn determine_min_cut(&self, relaxed_factor: f64, route_threshold: usize) -> Result<Option<MinCut>> {
        if self.routes.is_empty() {
            return Ok(None);
        }
        if self.routes.iter().any(|route| route.visits.len() < 2) {
            return Err(malformed_error!("flow route without an edge into the reduced graph"));
        }

        let max_flow = self.max_flow();
        let route_count = self.routes.len();
        let mut relaxed_bound = (max_flow as f64 * relaxed_factor) as u64;
        let mut relaxed_only = false;
        if route_count >= route_threshold {
            relaxed_only = true;
            relaxed_bound = max_flow.saturating_mul((route_count / 10).max(1) as u64);
        }

        let placeholder = Visit { node: SINK, pred: 0 };
        let mut cut = vec![placeholder; route_count];

        let exact = !relaxed_only && self.search_cut(&mut cut, &mut CutSet::default(), 0, 0, max_flow, true);
        if !exact
            && !self.search_cut(&mut cut, &mut CutSet::default(), 0, 0, relaxed_bound, false)
            && !self.search_cut(&mut cut, &mut CutSet::default(), 0, 0, u64::MAX, false)
        {
            return Err(malformed_error!(
                "no cut for a max flow of {} over {} routes",
                max_flow,
                route_count
            ));
        }

        cut.sort();
        cut.dedup();
        Ok(Some(MinCut { visits: cut, exact }))
    }

    fn cut_capacity(&self, cut: &MinCut) -> u64 {
        cut.visits
            .iter()
            .map(|visit| self.nodes[visit.node].caps[visit.pred])
            .fold(0, u64::saturating_add)
    }
}

impl CandidateEngine<'_> {
    /// Computes availability with the speculative rules.
    ///
    /// Returns `false` if the flow search hit its route limit; the caller
    /// falls back to the classical rules.
    pub(super) fn compute_min_cut_avail(&mut self) -> Result<bool> {
        self.compute_full_avail()?;
        self.compute_partial_ant()?;

        let graph = self.reduce_graph()?;
        let Some(mut graph) = graph else {
            self.compute_mc_will_be_avail(None, None)?;
            self.flow = Some(FlowSummary {
                exact: true,
                ..FlowSummary::default()
            });
            return Ok(true);
        };

        if !graph.find_max_flow(self.config.max_flow_routes) {
            return Ok(false);
        }
        let cut = graph.determine_min_cut(self.config.relaxed_flow_factor, self.config.relaxed_route_threshold)?;
        self.compute_mc_will_be_avail(Some(&graph), cut.as_ref())?;

        let edges = match &cut {
            Some(cut) => self.cut_edges(&graph, cut)?,
            None => Vec::new(),
        };
        self.flow = Some(FlowSummary {
            max_flow: graph.max_flow(),
            routes: graph.routes.len(),
            cut: edges,
            exact: cut.as_ref().map_or(true, |cut| cut.exact),
        });
        Ok(true)
    }

    /// Builds the reduced graph with its source and sink.
    ///
    /// Returns `None` if no phi qualifies.
    fn reduce_graph(&self) -> Result<Option<ReducedGraph>> {
        let mut graph = ReducedGraph::new();
        let mut node_of: HashMap<OccId, usize> = HashMap::new();

        for &phi in &self.phi_occs {
            if self.in_reduced_graph(phi)? {
                node_of.insert(phi, graph.add_node(phi));
            }
        }
        if node_of.is_empty() {
            return Ok(None);
        }

        let mut use_nodes = Vec::new();
        for &id in &self.all_occs {
            let occ = self.occ(id);
            match occ.kind.tag() {
                OccTag::Real => {
                    let Some(&def_node) = occ.def.and_then(|def| node_of.get(&def)) else {
                        continue;
                    };
                    let node = graph.add_node(id);
                    let cap = self.block_frequency(occ.block).saturating_add(1);
                    graph.add_edge(def_node, node, cap, None);
                    use_nodes.push(node);
                }
                OccTag::PhiOpnd => {
                    let opnd = self.opnd(id)?;
                    let Some(&use_node) = node_of.get(&opnd.phi) else {
                        continue;
                    };
                    let Some(&def_node) = occ.def.and_then(|def| node_of.get(&def)) else {
                        continue;
                    };
                    let phi_block = self.occ(opnd.phi).block;
                    let cap = self.edge_frequency(occ.block, phi_block).saturating_add(1);
                    graph.add_edge(def_node, use_node, cap, Some(opnd.position));
                }
                _ => {}
            }
        }

        for &phi in &self.phi_occs {
            let Some(&node) = node_of.get(&phi) else {
                continue;
            };
            let phi_block = self.occ(phi).block;
            for (position, opnd) in self.phi_operands(phi)?.into_iter().enumerate() {
                if self.occ(opnd).def.is_some() {
                    continue;
                }
                let pred = self.occ(opnd).block;
                let cap = self.edge_frequency(pred, phi_block).saturating_add(1);
                graph.add_edge(SOURCE, node, cap, Some(position));
            }
        }

        if graph.source_edges > 0 {
            for node in use_nodes {
                graph.add_edge(node, SINK, u64::MAX, None);
            }
        }
        Ok(Some(graph))
    }

    fn in_reduced_graph(&self, phi: OccId) -> Result<bool> {
        let flags = self.phi(phi)?.flags;
        Ok(flags.contains(PhiFlags::PARTIAL_ANT) && !flags.contains(PhiFlags::FULLY_AVAIL))
    }

    fn compute_mc_will_be_avail(&mut self, graph: Option<&ReducedGraph>, cut: Option<&MinCut>) -> Result<()> {
        let phis = self.phi_occs.clone();
        let (Some(graph), Some(cut)) = (graph, cut) else {
            for phi in phis {
                let fully_avail = self.phi_has(phi, PhiFlags::FULLY_AVAIL)?;
                self.set_phi_flag(phi, PhiFlags::MC_WILL_BE_AVAIL, fully_avail)?;
            }
            return Ok(());
        };

        for visit in &cut.visits {
            let node = &graph.nodes[visit.node];
            let Some(occ) = node.occ.filter(|&occ| self.occ(occ).is_phi()) else {
                continue;
            };
            let position = node
                .opnd_indices
                .get(visit.pred)
                .copied()
                .ok_or_else(|| malformed_error!("cut edge into {} has no operand position", occ))?;
            let opnd = self
                .phi(occ)?
                .operands
                .get(position)
                .copied()
                .ok_or_else(|| malformed_error!("{} has no operand {}", occ, position))?;
            self.set_opnd_flag(opnd, OpndFlags::MC_INSERT, true)?;
        }

        for phi in phis {
            let mut uncovered = false;
            for opnd in self.phi_operands(phi)? {
                if self.occ(opnd).def.is_none() && !self.opnd_has(opnd, OpndFlags::MC_INSERT)? {
                    uncovered = true;
                    break;
                }
            }
            if uncovered {
                self.reset_mc_will_be_avail(phi)?;
            }
        }
        Ok(())
    }

    fn reset_mc_will_be_avail(&mut self, start: OccId) -> Result<()> {
        let mut pending = vec![start];
        while let Some(occ) = pending.pop() {
            if !self.phi_has(occ, PhiFlags::MC_WILL_BE_AVAIL)? {
                continue;
            }
            self.set_phi_flag(occ, PhiFlags::MC_WILL_BE_AVAIL, false)?;
            for &phi in &self.phi_occs {
                if !self.phi_has(phi, PhiFlags::MC_WILL_BE_AVAIL)? {
                    continue;
                }
                for &opnd in &self.phi(phi)?.operands {
                    let flags = self.opnd(opnd)?.flags;
                    if self.occ(opnd).def == Some(occ)
                        && !flags.intersects(OpndFlags::HAS_REAL_USE | OpndFlags::MC_INSERT)
                    {
                        pending.push(phi);
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn cut_edges(&self, graph: &ReducedGraph, cut: &MinCut) -> Result<Vec<CutEdge>> {
        let mut edges = Vec::with_capacity(cut.visits.len());
        for visit in &cut.visits {
            let node = &graph.nodes[visit.node];
            let Some(occ) = node.occ else {
                continue;
            };
            let block = self.occ(occ).block;
            if self.occ(occ).is_phi() {
                let position = node.opnd_indices.get(visit.pred).copied().unwrap_or_default();
                let pred = self.occ(self.phi(occ)?.operands[position]).block;
                edges.push(CutEdge::Insertion { block, pred });
            } else {
                edges.push(CutEdge::Use { block });
            }
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    /// Nodes reachable from the source without crossing a cut edge.
    fn reaches_sink(graph: &ReducedGraph, cut: &MinCut) -> bool {
        let mut reached = HashSet::from([SOURCE]);
        let mut changed = true;
        while changed {
            changed = false;
            for (id, node) in graph.nodes.iter().enumerate() {
                if reached.contains(&id) {
                    continue;
                }
                let entered = node.preds.iter().enumerate().any(|(pred_idx, pred)| {
                    reached.contains(pred) && !cut.visits.contains(&Visit { node: id, pred: pred_idx })
                });
                if entered {
                    reached.insert(id);
                    changed = true;
                }
            }
        }
        reached.contains(&SINK)
    }

    /// source -> phi (cap `cold`), phi -> real (cap `hot`), real -> sink.
    fn single_phi(cold: u64, hot: u64) -> ReducedGraph {
        let mut graph = ReducedGraph::new();
        let phi = graph.add_node(OccId::new(0));
        let real = graph.add_node(OccId::new(1));
        graph.add_edge(SOURCE, phi, cold, Some(1));
        graph.add_edge(phi, real, hot, None);
        graph.add_edge(real, SINK, u64::MAX, None);
        graph
    }

    #[test]
    fn test_cut_prefers_cheap_insertion() {
        let mut graph = single_phi(1, 101);
        assert!(graph.find_max_flow(100));
        assert_eq!(graph.max_flow(), 1);
        let cut = graph.determine_min_cut(1.25, 20).unwrap().unwrap();
        assert!(cut.exact);
        assert_eq!(cut.visits, vec![Visit { node: 2, pred: 0 }]);
        assert_eq!(graph.cut_capacity(&cut), graph.max_flow());
        assert!(!reaches_sink(&graph, &cut));
    }

    #[test]
    fn test_cut_prefers_use_edge_when_insertion_is_expensive() {
        let mut graph = single_phi(101, 11);
        assert!(graph.find_max_flow(100));
        assert_eq!(graph.max_flow(), 11);
        let cut = graph.determine_min_cut(1.25, 20).unwrap().unwrap();
        assert_eq!(cut.visits, vec![Visit { node: 3, pred: 0 }]);
        assert_eq!(graph.cut_capacity(&cut), 11);
    }

    #[test]
    fn test_duality_on_two_phis() {
        // source -> p1 (5), source -> p2 (3), p1 -> p2 (4), p1 -> r1 (2),
        // p2 -> r2 (10)
        let mut graph = ReducedGraph::new();
        let p1 = graph.add_node(OccId::new(0));
        let p2 = graph.add_node(OccId::new(1));
        let r1 = graph.add_node(OccId::new(2));
        let r2 = graph.add_node(OccId::new(3));
        graph.add_edge(SOURCE, p1, 5, Some(0));
        graph.add_edge(SOURCE, p2, 3, Some(0));
        graph.add_edge(p1, p2, 4, Some(1));
        graph.add_edge(p1, r1, 2, None);
        graph.add_edge(p2, r2, 10, None);
        graph.add_edge(r1, SINK, u64::MAX, None);
        graph.add_edge(r2, SINK, u64::MAX, None);

        assert!(graph.find_max_flow(100));
        assert_eq!(graph.max_flow(), 8);
        let cut = graph.determine_min_cut(1.25, 20).unwrap().unwrap();
        assert!(cut.exact);
        assert_eq!(graph.cut_capacity(&cut), graph.max_flow());
        assert!(!reaches_sink(&graph, &cut));
    }

    #[test]
    fn test_route_limit() {
        let mut graph = ReducedGraph::new();
        let phi = graph.add_node(OccId::new(0));
        for i in 0..3 {
            let real = graph.add_node(OccId::new(i + 1));
            graph.add_edge(phi, real, 1, None);
            graph.add_edge(real, SINK, u64::MAX, None);
        }
        graph.add_edge(SOURCE, phi, 10, Some(0));
        assert!(!graph.find_max_flow(2));
    }

    #[test]
    fn test_relaxed_search_beyond_threshold() {
        let mut graph = ReducedGraph::new();
        let phi = graph.add_node(OccId::new(0));
        graph.add_edge(SOURCE, phi, 100, Some(0));
        for i in 0..3 {
            let real = graph.add_node(OccId::new(i + 1));
            graph.add_edge(phi, real, 1, None);
            graph.add_edge(real, SINK, u64::MAX, None);
        }
        assert!(graph.find_max_flow(100));
        assert_eq!(graph.routes.len(), 3);
        let cut = graph.determine_min_cut(1.25, 2).unwrap().unwrap();
        assert!(!cut.exact);
        assert!(graph.cut_capacity(&cut) <= graph.max_flow());
        assert!(!reaches_sink(&graph, &cut));
    }

    #[test]
    fn test_relaxed_search_with_threshold_of_one() {
        // A single route already skips the exact search; its bound must
        // still admit the cut of capacity max_flow.
        let mut graph = single_phi(4, 9);
        assert!(graph.find_max_flow(100));
        assert_eq!(graph.routes.len(), 1);
        let cut = graph.determine_min_cut(1.25, 1).unwrap().unwrap();
        assert!(!cut.exact);
        assert_eq!(graph.cut_capacity(&cut), 4);
        assert!(!reaches_sink(&graph, &cut));
    }

    #[test]
    fn test_max_flow_saturates() {
        let mut graph = ReducedGraph::new();
        for i in 0..2 {
            let phi = graph.add_node(OccId::new(2 * i));
            let real = graph.add_node(OccId::new(2 * i + 1));
            graph.add_edge(SOURCE, phi, u64::MAX - 1, Some(0));
            graph.add_edge(phi, real, u64::MAX - 1, None);
            graph.add_edge(real, SINK, u64::MAX, None);
        }
        assert!(graph.find_max_flow(100));
        assert_eq!(graph.routes.len(), 2);
        assert_eq!(graph.max_flow(), u64::MAX);
    }

    #[test]
    fn test_empty_network() {
        let mut graph = ReducedGraph::new();
        graph.add_node(OccId::new(0));
        assert!(graph.find_max_flow(10));
        assert!(graph.determine_min_cut(1.25, 20).unwrap().is_none());
    }
}
