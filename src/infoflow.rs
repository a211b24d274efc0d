//! Information flow analysis.
//!
//! Every allow rule moves information between its source and target types
//! in the directions its permissions are mapped to: a write flows from the
//! source into the target, a read flows from the target into the source.
//! [`InfoFlowAnalysis`] turns the policy's allow rules into a weighted
//! directed graph over types using a [`PermissionMap`], then answers path
//! questions over a filtered view of that graph.
//!
//! # Graphs
//!
//! - The full graph holds every flow. It is rebuilt only when the
//!   permission map changes.
//! - The subgraph drops excluded types and flows lighter than the minimum
//!   weight. It is rebuilt when the full graph, the exclusions or the
//!   minimum weight change.
//!
//! Both are built lazily on the first analysis that needs them.
//!
//! # Example
//!
//! ```ignore
//! use seflow::{InfoFlowAnalysis, PermissionMap};
//!
//! let perm_map = PermissionMap::load("perm_map")?;
//! let mut ifa = InfoFlowAnalysis::new(&policy, perm_map).with_min_weight(3)?;
//!
//! for path in ifa.all_shortest_paths("user_t", "shadow_t")? {
//!     for step in path {
//!         println!("{}", step.to_json(&policy));
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{PolicyError, Result};
use crate::graph::TypeGraph;
use crate::permmap::{PermissionMap, MAX_WEIGHT, MIN_WEIGHT};
use crate::policy::{Policy, PolicyDisplay, TeRule, TeRuletype, TypeId};

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Flow between two types: the rules causing it and its heaviest weight.
#[derive(Debug, Clone, Default)]
struct FlowEdge<'p> {
    weight: u8,
    rules: Vec<&'p TeRule>,
}

/// One step of an information flow path.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoFlowStep<'p> {
    pub source: TypeId,
    pub target: TypeId,
    /// Largest directional weight of `rules` toward `target`.
    pub weight: u8,
    /// Allow rules creating this flow, in policy order.
    pub rules: Vec<&'p TeRule>,
}

impl<'p> InfoFlowStep<'p> {
    fn from_edge(source: TypeId, target: TypeId, edge: &FlowEdge<'p>) -> Self {
        Self {
            source,
            target,
            weight: edge.weight,
            rules: edge.rules.clone(),
        }
    }

    /// Render with names and policy-language rules.
    pub fn to_json(&self, policy: &Policy) -> Value {
        json!({
            "source": policy.type_(self.source).name,
            "target": policy.type_(self.target).name,
            "weight": self.weight,
            "rules": self
                .rules
                .iter()
                .map(|r| r.display(policy).to_string())
                .collect::<Vec<_>>(),
        })
    }
}

/// A path is the ordered list of its steps.
pub type InfoFlowPath<'p> = Vec<InfoFlowStep<'p>>;

/// Size of the full information flow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

fn path_steps<'p>(graph: &TypeGraph<FlowEdge<'p>>, path: &[TypeId]) -> InfoFlowPath<'p> {
    path.windows(2)
        .filter_map(|pair| {
            graph
                .edge(pair[0], pair[1])
                .map(|edge| InfoFlowStep::from_edge(pair[0], pair[1], edge))
        })
        .collect()
}

// =============================================================================
// ANALYSIS
// =============================================================================

/// Information flow analysis over one policy.
#[derive(Debug)]
pub struct InfoFlowAnalysis<'p> {
    policy: &'p Policy,
    perm_map: PermissionMap,
    min_weight: u8,
    exclude: Vec<TypeId>,

    graph: TypeGraph<FlowEdge<'p>>,
    subgraph: TypeGraph<FlowEdge<'p>>,
    rebuild_graph: bool,
    rebuild_subgraph: bool,
}

impl<'p> InfoFlowAnalysis<'p> {
    /// Analysis with minimum weight 1 and no exclusions.
    pub fn new(policy: &'p Policy, perm_map: PermissionMap) -> Self {
        Self {
            policy,
            perm_map,
            min_weight: MIN_WEIGHT,
            exclude: Vec::new(),
            graph: TypeGraph::new(),
            subgraph: TypeGraph::new(),
            rebuild_graph: true,
            rebuild_subgraph: true,
        }
    }

    pub fn with_min_weight(mut self, weight: u8) -> Result<Self> {
        self.set_min_weight(weight)?;
        Ok(self)
    }

    pub fn with_exclude<I, S>(mut self, types: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.set_exclude(types)?;
        Ok(self)
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    pub fn policy(&self) -> &'p Policy {
        self.policy
    }

    pub fn min_weight(&self) -> u8 {
        self.min_weight
    }

    /// Fails with `InvalidValue` unless `weight` is 1-10.
    pub fn set_min_weight(&mut self, weight: u8) -> Result<()> {
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
            return Err(PolicyError::InvalidValue(format!(
                "Min information flow weight must be an integer {}-{}: {}",
                MIN_WEIGHT, MAX_WEIGHT, weight
            )));
        }
        self.min_weight = weight;
        self.rebuild_subgraph = true;
        Ok(())
    }

    pub fn exclude(&self) -> &[TypeId] {
        &self.exclude
    }

    /// Replace the excluded types. Every name must resolve to a type.
    pub fn set_exclude<I, S>(&mut self, types: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclude = types
            .into_iter()
            .map(|name| self.policy.lookup_type(name.as_ref()).map(|t| t.id))
            .collect::<Result<_>>()?;
        self.rebuild_subgraph = true;
        Ok(())
    }

    pub fn perm_map(&self) -> &PermissionMap {
        &self.perm_map
    }

    /// Mutable access to the map; the graph is rebuilt on next use.
    pub fn perm_map_mut(&mut self) -> &mut PermissionMap {
        self.rebuild_graph = true;
        &mut self.perm_map
    }

    pub fn set_perm_map(&mut self, perm_map: PermissionMap) {
        self.perm_map = perm_map;
        self.rebuild_graph = true;
        self.rebuild_subgraph = true;
    }

    // -------------------------------------------------------------------------
    // Analyses
    // -------------------------------------------------------------------------

    /// One path with the fewest steps, if any.
    pub fn shortest_path(&mut self, source: &str, target: &str) -> Result<Option<InfoFlowPath<'p>>> {
        let (s, t) = self.endpoints(source, target)?;
        let graph = self.subgraph()?;

        info!("Generating one shortest path from {} to {}...", source, target);
        Ok(graph.shortest_path(s, t).map(|p| path_steps(graph, &p)))
    }

    /// Every path with the fewest steps.
    pub fn all_shortest_paths(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<impl Iterator<Item = InfoFlowPath<'p>> + '_> {
        let (s, t) = self.endpoints(source, target)?;
        let graph = self.subgraph()?;

        info!("Generating all shortest paths from {} to {}...", source, target);
        Ok(graph
            .all_shortest_paths(s, t)
            .map(move |p| path_steps(graph, &p)))
    }

    /// Every path of at most `maxlen` steps. Expensive beyond a few steps
    /// on large policies.
    pub fn all_paths(
        &mut self,
        source: &str,
        target: &str,
        maxlen: usize,
    ) -> Result<impl Iterator<Item = InfoFlowPath<'p>> + '_> {
        if maxlen < 1 {
            return Err(PolicyError::InvalidValue(
                "Information flow max path length must be positive.".to_string(),
            ));
        }
        let (s, t) = self.endpoints(source, target)?;
        let graph = self.subgraph()?;

        info!(
            "Generating all paths from {} to {}, max len {}...",
            source, target, maxlen
        );
        Ok(graph
            .all_simple_paths(s, t, maxlen)
            .map(move |p| path_steps(graph, &p)))
    }

    /// Direct flows out of a type.
    pub fn flows_out(&mut self, source: &str) -> Result<impl Iterator<Item = InfoFlowStep<'p>> + '_> {
        let s = self.policy.lookup_type(source)?.id;
        let graph = self.subgraph()?;

        info!("Generating all infoflows out of {}...", source);
        Ok(graph
            .out_edges(s)
            .map(move |(t, edge)| InfoFlowStep::from_edge(s, t, edge)))
    }

    /// Direct flows into a type.
    pub fn flows_in(&mut self, target: &str) -> Result<impl Iterator<Item = InfoFlowStep<'p>> + '_> {
        let t = self.policy.lookup_type(target)?.id;
        let graph = self.subgraph()?;

        info!("Generating all infoflows into {}...", target);
        Ok(graph
            .in_edges(t)
            .map(move |(s, edge)| InfoFlowStep::from_edge(s, t, edge)))
    }

    /// Node and edge count of the full graph.
    pub fn stats(&mut self) -> Result<GraphStats> {
        if self.rebuild_graph {
            self.build_graph()?;
        }
        Ok(GraphStats {
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
        })
    }

    // -------------------------------------------------------------------------
    // Graph construction
    // -------------------------------------------------------------------------

    fn endpoints(&self, source: &str, target: &str) -> Result<(TypeId, TypeId)> {
        Ok((
            self.policy.lookup_type(source)?.id,
            self.policy.lookup_type(target)?.id,
        ))
    }

    fn subgraph(&mut self) -> Result<&TypeGraph<FlowEdge<'p>>> {
        if self.rebuild_graph {
            self.build_graph()?;
        }
        if self.rebuild_subgraph {
            self.build_subgraph();
        }
        Ok(&self.subgraph)
    }

    fn build_graph(&mut self) -> Result<()> {
        self.perm_map.map_policy(self.policy);

        info!("Building information flow graph from {}...", self.policy);

        let mut graph: TypeGraph<FlowEdge<'p>> = TypeGraph::new();
        for rule in self.policy.terules() {
            if rule.ruletype != TeRuletype::Allow {
                continue;
            }

            let weight = self.perm_map.rule_weight(self.policy, rule)?;

            for &s in rule.source.expand(self.policy) {
                for &t in rule.target.expand(self.policy) {
                    // flows between a type and itself carry no information
                    if s == t {
                        continue;
                    }
                    if weight.write > 0 {
                        add_flow(&mut graph, s, t, rule, weight.write);
                    }
                    if weight.read > 0 {
                        add_flow(&mut graph, t, s, rule, weight.read);
                    }
                }
            }
        }

        self.graph = graph;
        self.rebuild_graph = false;
        self.rebuild_subgraph = true;

        info!("Completed building information flow graph.");
        debug!(
            "Graph stats: nodes: {}, edges: {}.",
            self.graph.node_count(),
            self.graph.edge_count()
        );
        Ok(())
    }

    fn build_subgraph(&mut self) {
        info!("Building information flow subgraph...");
        debug!("Excluding {:?}", self.exclude);
        debug!("Min weight {}", self.min_weight);

        let mut subgraph = self.graph.clone();
        for &t in &self.exclude {
            subgraph.remove_node(t);
        }

        if self.min_weight > MIN_WEIGHT {
            let min_weight = self.min_weight;
            subgraph.retain_edges(|_, _, edge| edge.weight >= min_weight);
        }

        self.subgraph = subgraph;
        self.rebuild_subgraph = false;

        info!("Completed building information flow subgraph.");
        debug!(
            "Subgraph stats: nodes: {}, edges: {}.",
            self.subgraph.node_count(),
            self.subgraph.edge_count()
        );
    }
}

fn add_flow<'p>(
    graph: &mut TypeGraph<FlowEdge<'p>>,
    source: TypeId,
    target: TypeId,
    rule: &'p TeRule,
    weight: u8,
) {
    let edge = graph.edge_or_default(source, target);
    edge.rules.push(rule);
    edge.weight = edge.weight.max(weight);
}
