//! A single configuration option and its soundness / precision partial orders.
//!
//! Each relation is a directed graph over [`Level`] nodes. An edge `A → B`
//! means "A is at least as sound (precise) as B"; queries walk the graph, so
//! the relation is transitive without ever materialising the closure.
//!
//! Numeric options (context depths, access-path lengths) are declared against
//! the sentinel `i` instead of every concrete depth. See [`ConfigOption::resolve_pair`].

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ModelError, ModelResult};
use crate::model::level::{Level, Relation, NUMERIC_SENTINEL, NUMERIC_SENTINEL_BELOW};

/// Directed graph over levels, stored as `from → {to, ...}` adjacency sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RelationGraph {
    edges: BTreeMap<Level, BTreeSet<Level>>,
}

impl RelationGraph {
    fn add_edge(&mut self, from: Level, to: Level) {
        self.edges.entry(to.clone()).or_default();
        self.edges.entry(from).or_default().insert(to);
    }

    fn has_node(&self, level: &Level) -> bool {
        self.edges.contains_key(level)
    }

    fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Whether `to` is a descendant of `from` (iterative DFS).
    fn reaches(&self, from: &Level, to: &Level) -> bool {
        let mut visited: BTreeSet<&Level> = BTreeSet::new();
        let mut stack: Vec<&Level> = self.edges.get(from).into_iter().flatten().collect();

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.edges.get(current) {
                    stack.extend(next.iter());
                }
            }
        }
        false
    }
}

/// One configuration option: its registered levels, default, and partial orders.
#[derive(Debug, Clone)]
pub struct ConfigOption {
    name: String,
    levels: BTreeMap<String, Level>,
    default: Option<Level>,
    precision: RelationGraph,
    soundness: RelationGraph,
}

impl ConfigOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            levels: BTreeMap::new(),
            default: None,
            precision: RelationGraph::default(),
            soundness: RelationGraph::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a level by name. Idempotent.
    pub fn add_level(&mut self, name: &str) {
        self.levels
            .entry(name.to_string())
            .or_insert_with(|| Level::new(&self.name, name));
    }

    /// Register an already-constructed level.
    ///
    /// Re-registering an equal level is a no-op. A level that belongs to a
    /// different option, or that conflicts with the level already registered
    /// under the same name, is rejected with [`ModelError::DuplicateLevel`].
    pub fn add_level_value(&mut self, level: Level) -> ModelResult<()> {
        let conflicting = level.option != self.name
            || self
                .levels
                .get(&level.name)
                .is_some_and(|existing| existing != &level);
        if conflicting {
            return Err(ModelError::DuplicateLevel {
                option: self.name.clone(),
                level: level.name,
            });
        }
        self.levels.entry(level.name.clone()).or_insert(level);
        Ok(())
    }

    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.levels.values()
    }

    pub fn level(&self, name: &str) -> ModelResult<&Level> {
        self.levels.get(name).ok_or_else(|| self.unresolved(name))
    }

    pub fn set_default(&mut self, name: &str) -> ModelResult<()> {
        let level = self.level(name)?.clone();
        self.default = Some(level);
        Ok(())
    }

    pub fn default_level(&self) -> Option<&Level> {
        self.default.as_ref()
    }

    /// Add an edge `a → b` to the named relation.
    pub fn declare(&mut self, relation: Relation, a: &str, b: &str) -> ModelResult<()> {
        match relation {
            Relation::Soundness => self.set_more_sound_than(a, b),
            Relation::Precision => self.set_more_precise_than(a, b),
        }
    }

    /// Declare that `a` is at least as sound as `b`.
    pub fn set_more_sound_than(&mut self, a: &str, b: &str) -> ModelResult<()> {
        let (a, b) = (self.declarable(a)?, self.declarable(b)?);
        self.soundness.add_edge(a, b);
        Ok(())
    }

    /// Declare that `a` is at least as precise as `b`.
    ///
    /// Precision-comparable levels are soundness-equivalent, so this also adds
    /// `a → b` and `b → a` to the soundness graph.
    pub fn set_more_precise_than(&mut self, a: &str, b: &str) -> ModelResult<()> {
        let (a, b) = (self.declarable(a)?, self.declarable(b)?);
        self.precision.add_edge(a.clone(), b.clone());
        self.soundness.add_edge(a.clone(), b.clone());
        self.soundness.add_edge(b, a);
        Ok(())
    }

    /// Whether level `a` is at least as sound as level `b`.
    pub fn is_more_sound(&self, a: &str, b: &str) -> ModelResult<bool> {
        self.is_at_least(Relation::Soundness, a, b)
    }

    /// Whether level `a` is at least as precise as level `b`.
    pub fn is_more_precise(&self, a: &str, b: &str) -> ModelResult<bool> {
        self.is_at_least(Relation::Precision, a, b)
    }

    /// Reachability query on either relation.
    ///
    /// Two names that resolve to the same node compare as `true`.
    pub fn is_at_least(&self, relation: Relation, a: &str, b: &str) -> ModelResult<bool> {
        let graph = self.graph(relation);
        let (node_a, node_b) = self.resolve_pair(relation, a, b)?;
        if node_a == node_b {
            return Ok(true);
        }
        Ok(graph.reaches(&node_a, &node_b))
    }

    /// Map two level names onto nodes of the relation graph.
    ///
    /// A name that is a graph node resolves to itself. An integer name that is
    /// not a node resolves to the sentinel `i` when the graph has one. When two
    /// distinct integers both land on `i`, the smaller one becomes `i-1`.
    pub fn resolve_pair(&self, relation: Relation, a: &str, b: &str) -> ModelResult<(Level, Level)> {
        let graph = self.graph(relation);
        let mut node_a = self.resolve_one(graph, a)?;
        let mut node_b = self.resolve_one(graph, b)?;

        if node_a == node_b {
            if let (Ok(x), Ok(y)) = (a.parse::<i64>(), b.parse::<i64>()) {
                if x < y {
                    node_a = Level::new(&self.name, NUMERIC_SENTINEL_BELOW);
                } else if y < x {
                    node_b = Level::new(&self.name, NUMERIC_SENTINEL_BELOW);
                }
            }
        }
        Ok((node_a, node_b))
    }

    /// Number of declared edges per relation (soundness, precision).
    pub fn edge_counts(&self) -> (usize, usize) {
        (self.soundness.edge_count(), self.precision.edge_count())
    }

    fn resolve_one(&self, graph: &RelationGraph, name: &str) -> ModelResult<Level> {
        let literal = Level::new(&self.name, name);
        if graph.has_node(&literal) {
            return Ok(literal);
        }
        if name.parse::<i64>().is_ok() {
            let sentinel = Level::new(&self.name, NUMERIC_SENTINEL);
            if graph.has_node(&sentinel) {
                return Ok(sentinel);
            }
        }
        Err(self.unresolved(name))
    }

    fn declarable(&self, name: &str) -> ModelResult<Level> {
        let level = Level::new(&self.name, name);
        if level.is_sentinel() || self.levels.contains_key(name) {
            Ok(level)
        } else {
            Err(self.unresolved(name))
        }
    }

    fn graph(&self, relation: Relation) -> &RelationGraph {
        match relation {
            Relation::Soundness => &self.soundness,
            Relation::Precision => &self.precision,
        }
    }

    fn unresolved(&self, name: &str) -> ModelError {
        ModelError::UnresolvedLevel {
            option: self.name.clone(),
            level: name.to_string(),
        }
    }
}

/// Identity is the name plus both edge sets; registered levels and the
/// default are configuration values, not identity.
impl PartialEq for ConfigOption {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.precision == other.precision
            && self.soundness == other.soundness
    }
}

impl Eq for ConfigOption {}
