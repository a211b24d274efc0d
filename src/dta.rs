//! Domain transition analysis.
//!
//! A process moves from domain `s` to domain `t` either by executing a file
//! (a transition) or by changing its own context at runtime (a dynamic
//! transition). Neither is possible from a single rule; several rules have to
//! line up:
//!
//! | Rule | Role |
//! |------|------|
//! | `allow s t:process transition` | transition permission |
//! | `allow s t:process dyntransition` | dynamic transition permission |
//! | `allow s s:process setexec` | `s` may pick the exec context explicitly |
//! | `allow s s:process setcurrent` | `s` may set its current context |
//! | `allow s e:file execute` | `s` may execute `e` |
//! | `allow t e:file entrypoint` | `e` may enter `t` |
//! | `type_transition s e:process t` | executing `e` from `s` lands in `t` |
//!
//! A transition edge is kept when some entrypoint type `e` is both
//! executable by `s` and an entrypoint of `t`, and either a type_transition
//! or setexec completes it. A dynamic transition edge is kept when `s` also
//! has setcurrent. Types with no remaining edges stay in the graph as
//! isolated nodes.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{PolicyError, Result};
use crate::graph::TypeGraph;
use crate::infoflow::GraphStats;
use crate::policy::{Policy, PolicyDisplay, TeRule, TeRuletype, TypeId};

type Rules<'p> = Vec<&'p TeRule>;
type RuleTable<'p> = BTreeMap<TypeId, Rules<'p>>;

// =============================================================================
// EDGES
// =============================================================================

/// Everything known about one source -> target domain pair.
#[derive(Debug, Clone, Default)]
struct TransitionEdge<'p> {
    transition: Rules<'p>,
    setexec: Rules<'p>,
    dyntransition: Rules<'p>,
    setcurrent: Rules<'p>,
    /// Keyed by entrypoint type.
    entrypoint: RuleTable<'p>,
    execute: RuleTable<'p>,
    type_transition: RuleTable<'p>,
}

impl TransitionEdge<'_> {
    fn has_transition(&self) -> bool {
        !self.transition.is_empty() && !self.entrypoint.is_empty()
    }

    fn has_dyntransition(&self) -> bool {
        !self.dyntransition.is_empty() && !self.setcurrent.is_empty()
    }

    fn is_valid(&self) -> bool {
        self.has_transition() || self.has_dyntransition()
    }

    fn clear_transition(&mut self) {
        self.transition.clear();
        self.setexec.clear();
        self.entrypoint.clear();
        self.execute.clear();
        self.type_transition.clear();
    }

    fn clear_dyntransition(&mut self) {
        self.dyntransition.clear();
        self.setcurrent.clear();
    }
}

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Rules tying one entrypoint type to a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEntrypoint<'p> {
    pub name: TypeId,
    pub entrypoint: Rules<'p>,
    pub execute: Rules<'p>,
    /// Empty when the transition relies on setexec.
    pub type_transition: Rules<'p>,
}

/// One domain transition step.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainTransition<'p> {
    pub source: TypeId,
    pub target: TypeId,
    pub transition: Rules<'p>,
    /// Ordered by entrypoint type.
    pub entrypoints: Vec<DomainEntrypoint<'p>>,
    pub setexec: Rules<'p>,
    pub dyntransition: Rules<'p>,
    pub setcurrent: Rules<'p>,
}

impl<'p> DomainTransition<'p> {
    fn from_edge(source: TypeId, target: TypeId, edge: &TransitionEdge<'p>) -> Self {
        let entrypoints = edge
            .entrypoint
            .iter()
            .map(|(e, rules)| DomainEntrypoint {
                name: *e,
                entrypoint: rules.clone(),
                execute: edge.execute.get(e).cloned().unwrap_or_default(),
                type_transition: edge.type_transition.get(e).cloned().unwrap_or_default(),
            })
            .collect();

        Self {
            source,
            target,
            transition: edge.transition.clone(),
            entrypoints,
            setexec: edge.setexec.clone(),
            dyntransition: edge.dyntransition.clone(),
            setcurrent: edge.setcurrent.clone(),
        }
    }

    /// Render with names and policy-language rules.
    pub fn to_json(&self, policy: &Policy) -> Value {
        let render = |rules: &Rules<'_>| -> Vec<String> {
            rules
                .iter()
                .map(|r| r.display(policy).to_string())
                .collect()
        };

        let entrypoints: Vec<Value> = self
            .entrypoints
            .iter()
            .map(|e| {
                json!({
                    "name": policy.type_(e.name).name,
                    "entrypoint": render(&e.entrypoint),
                    "execute": render(&e.execute),
                    "type_transition": render(&e.type_transition),
                })
            })
            .collect();

        json!({
            "source": policy.type_(self.source).name,
            "target": policy.type_(self.target).name,
            "transition": render(&self.transition),
            "entrypoints": entrypoints,
            "setexec": render(&self.setexec),
            "dyntransition": render(&self.dyntransition),
            "setcurrent": render(&self.setcurrent),
        })
    }
}

/// A path is the ordered list of its transitions.
pub type TransitionPath<'p> = Vec<DomainTransition<'p>>;

// =============================================================================
// ANALYSIS
// =============================================================================

/// Domain transition analysis over one policy.
#[derive(Debug)]
pub struct DomainTransitionAnalysis<'p> {
    policy: &'p Policy,
    reverse: bool,
    exclude: Vec<TypeId>,

    graph: TypeGraph<TransitionEdge<'p>>,
    subgraph: TypeGraph<TransitionEdge<'p>>,
    rebuild_graph: bool,
    rebuild_subgraph: bool,
}

impl<'p> DomainTransitionAnalysis<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            reverse: false,
            exclude: Vec::new(),
            graph: TypeGraph::new(),
            subgraph: TypeGraph::new(),
            rebuild_graph: true,
            rebuild_subgraph: true,
        }
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.set_reverse(reverse);
        self
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

    pub fn reverse(&self) -> bool {
        self.reverse
    }

    /// Analyze transitions backwards: paths run from target to source.
    pub fn set_reverse(&mut self, reverse: bool) {
        self.reverse = reverse;
        self.rebuild_subgraph = true;
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

    // -------------------------------------------------------------------------
    // Analyses
    // -------------------------------------------------------------------------

    /// One transition path with the fewest steps, if any.
    pub fn shortest_path(&mut self, source: &str, target: &str) -> Result<Option<TransitionPath<'p>>> {
        let (s, t) = self.endpoints(source, target)?;
        self.ensure_subgraph();

        info!(
            "Generating one domain transition path from {} to {}...",
            source, target
        );
        Ok(self
            .subgraph
            .shortest_path(s, t)
            .map(|p| self.path_steps(&p)))
    }

    /// Every transition path with the fewest steps.
    pub fn all_shortest_paths(
        &mut self,
        source: &str,
        target: &str,
    ) -> Result<impl Iterator<Item = TransitionPath<'p>> + '_> {
        let (s, t) = self.endpoints(source, target)?;
        self.ensure_subgraph();

        info!(
            "Generating all shortest domain transition paths from {} to {}...",
            source, target
        );
        let this = &*self;
        Ok(this
            .subgraph
            .all_shortest_paths(s, t)
            .map(move |p| this.path_steps(&p)))
    }

    /// Every transition path of at most `maxlen` steps.
    pub fn all_paths(
        &mut self,
        source: &str,
        target: &str,
        maxlen: usize,
    ) -> Result<impl Iterator<Item = TransitionPath<'p>> + '_> {
        if maxlen < 1 {
            return Err(PolicyError::InvalidValue(
                "Domain transition max path length must be positive.".to_string(),
            ));
        }
        let (s, t) = self.endpoints(source, target)?;
        self.ensure_subgraph();

        info!(
            "Generating all domain transition paths from {} to {}, max length {}...",
            source, target, maxlen
        );
        let this = &*self;
        Ok(this
            .subgraph
            .all_simple_paths(s, t, maxlen)
            .map(move |p| this.path_steps(&p)))
    }

    /// Direct transitions out of a domain (into it, when reversed).
    pub fn transitions_out(
        &mut self,
        source: &str,
    ) -> Result<impl Iterator<Item = DomainTransition<'p>> + '_> {
        let s = self.policy.lookup_type(source)?.id;
        self.ensure_subgraph();

        info!("Generating all domain transitions out of {}...", source);
        let this = &*self;
        Ok(this
            .subgraph
            .out_edges(s)
            .map(move |(t, edge)| this.step(s, t, edge)))
    }

    /// Direct transitions into a domain (out of it, when reversed).
    pub fn transitions_in(
        &mut self,
        target: &str,
    ) -> Result<impl Iterator<Item = DomainTransition<'p>> + '_> {
        let t = self.policy.lookup_type(target)?.id;
        self.ensure_subgraph();

        info!("Generating all domain transitions into {}...", target);
        let this = &*self;
        Ok(this
            .subgraph
            .in_edges(t)
            .map(move |(s, edge)| this.step(s, t, edge)))
    }

    /// Node and edge count of the full graph.
    pub fn stats(&mut self) -> GraphStats {
        if self.rebuild_graph {
            self.build_graph();
        }
        GraphStats {
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
        }
    }

    // -------------------------------------------------------------------------
    // Steps
    // -------------------------------------------------------------------------

    fn endpoints(&self, source: &str, target: &str) -> Result<(TypeId, TypeId)> {
        Ok((
            self.policy.lookup_type(source)?.id,
            self.policy.lookup_type(target)?.id,
        ))
    }

    /// Step for a subgraph edge, reported in real transition direction.
    fn step(&self, source: TypeId, target: TypeId, edge: &TransitionEdge<'p>) -> DomainTransition<'p> {
        if self.reverse {
            DomainTransition::from_edge(target, source, edge)
        } else {
            DomainTransition::from_edge(source, target, edge)
        }
    }

    fn path_steps(&self, path: &[TypeId]) -> TransitionPath<'p> {
        path.windows(2)
            .filter_map(|pair| {
                self.subgraph
                    .edge(pair[0], pair[1])
                    .map(|edge| self.step(pair[0], pair[1], edge))
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Graph construction
    // -------------------------------------------------------------------------

    fn ensure_subgraph(&mut self) {
        if self.rebuild_graph {
            self.build_graph();
        }
        if self.rebuild_subgraph {
            self.build_subgraph();
        }
    }

    fn build_graph(&mut self) {
        info!("Building domain transition graph from {}...", self.policy);

        let policy = self.policy;
        let mut graph: TypeGraph<TransitionEdge<'p>> = TypeGraph::new();

        // per source domain
        let mut setexec: FxHashMap<TypeId, Rules<'p>> = FxHashMap::default();
        let mut setcurrent: FxHashMap<TypeId, Rules<'p>> = FxHashMap::default();
        // source -> entrypoint -> rules
        let mut execute: FxHashMap<TypeId, RuleTable<'p>> = FxHashMap::default();
        // target domain -> entrypoint -> rules
        let mut entrypoint: FxHashMap<TypeId, RuleTable<'p>> = FxHashMap::default();
        // source -> entrypoint -> default -> rules
        let mut type_trans: FxHashMap<TypeId, BTreeMap<TypeId, RuleTable<'p>>> =
            FxHashMap::default();

        for rule in policy.terules() {
            let class = policy.class(rule.tclass).name.as_str();
            match rule.ruletype {
                TeRuletype::Allow if class == "process" => {
                    let Ok(perms) = rule.perms() else { continue };
                    let pairs = || {
                        rule.source.expand(policy).iter().flat_map(move |&s| {
                            rule.target
                                .expand(policy)
                                .iter()
                                .filter(move |&&t| t != s)
                                .map(move |&t| (s, t))
                        })
                    };

                    if perms.contains("transition") {
                        for (s, t) in pairs() {
                            graph.edge_or_default(s, t).transition.push(rule);
                        }
                    }
                    if perms.contains("dyntransition") {
                        for (s, t) in pairs() {
                            graph.edge_or_default(s, t).dyntransition.push(rule);
                        }
                    }
                    if perms.contains("setexec") {
                        for &s in rule.source.expand(policy) {
                            setexec.entry(s).or_default().push(rule);
                        }
                    }
                    if perms.contains("setcurrent") {
                        for &s in rule.source.expand(policy) {
                            setcurrent.entry(s).or_default().push(rule);
                        }
                    }
                }
                TeRuletype::Allow if class == "file" => {
                    let Ok(perms) = rule.perms() else { continue };
                    let has_execute = perms.contains("execute");
                    let has_entrypoint = perms.contains("entrypoint");
                    if !has_execute && !has_entrypoint {
                        continue;
                    }

                    for &s in rule.source.expand(policy) {
                        for &e in rule.target.expand(policy) {
                            if has_execute {
                                execute.entry(s).or_default().entry(e).or_default().push(rule);
                            }
                            if has_entrypoint {
                                entrypoint.entry(s).or_default().entry(e).or_default().push(rule);
                            }
                        }
                    }
                }
                TeRuletype::TypeTransition if class == "process" => {
                    let Ok(default) = rule.default() else { continue };
                    for &s in rule.source.expand(policy) {
                        for &e in rule.target.expand(policy) {
                            type_trans
                                .entry(s)
                                .or_default()
                                .entry(e)
                                .or_default()
                                .entry(default)
                                .or_default()
                                .push(rule);
                        }
                    }
                }
                _ => {}
            }
        }

        let empty_table = RuleTable::new();
        let empty_trans = BTreeMap::new();

        graph.retain_edges(|s, t, edge| {
            if !edge.transition.is_empty() {
                let entries = entrypoint.get(&t).unwrap_or(&empty_table);
                let executes = execute.get(&s).unwrap_or(&empty_table);
                let transitions = type_trans.get(&s).unwrap_or(&empty_trans);
                let source_setexec = setexec.get(&s);

                for (e, entry_rules) in entries {
                    let Some(exec_rules) = executes.get(e) else { continue };
                    let trans_rules = transitions.get(e).and_then(|defaults| defaults.get(&t));

                    if source_setexec.is_none() && trans_rules.is_none() {
                        continue;
                    }
                    edge.entrypoint.insert(*e, entry_rules.clone());
                    edge.execute.insert(*e, exec_rules.clone());
                    if let Some(trans_rules) = trans_rules {
                        edge.type_transition.insert(*e, trans_rules.clone());
                    }
                }

                if !edge.entrypoint.is_empty() {
                    if let Some(rules) = source_setexec {
                        edge.setexec.extend(rules.iter().copied());
                    }
                }
            }

            if !edge.dyntransition.is_empty() {
                if let Some(rules) = setcurrent.get(&s) {
                    edge.setcurrent.extend(rules.iter().copied());
                }
            }

            if !edge.has_transition() {
                edge.clear_transition();
            }
            if !edge.has_dyntransition() {
                edge.clear_dyntransition();
            }
            edge.is_valid()
        });

        self.graph = graph;
        self.rebuild_graph = false;
        self.rebuild_subgraph = true;

        info!("Completed building domain transition graph.");
        debug!(
            "Graph stats: nodes: {}, edges: {}.",
            self.graph.node_count(),
            self.graph.edge_count()
        );
    }

    fn build_subgraph(&mut self) {
        info!("Building domain transition subgraph...");
        debug!("Reverse: {}, excluding {:?}", self.reverse, self.exclude);

        let mut subgraph = if self.reverse {
            self.graph.reversed()
        } else {
            self.graph.clone()
        };

        if !self.exclude.is_empty() {
            for &t in &self.exclude {
                subgraph.remove_node(t);
            }

            let exclude = &self.exclude;
            subgraph.retain_edges(|_, _, edge| {
                for e in exclude {
                    edge.entrypoint.remove(e);
                    edge.execute.remove(e);
                    edge.type_transition.remove(e);
                }
                if !edge.has_transition() {
                    edge.clear_transition();
                }
                edge.is_valid()
            });
        }

        self.subgraph = subgraph;
        self.rebuild_subgraph = false;

        info!("Completed building domain transition subgraph.");
        debug!(
            "Subgraph stats: nodes: {}, edges: {}.",
            self.subgraph.node_count(),
            self.subgraph.edge_count()
        );
    }
}
