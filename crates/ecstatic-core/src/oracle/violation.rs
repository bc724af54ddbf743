//! Potential violations: the oracle's verdict on one compared pair.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::job::{FinishedFuzzingJob, FlowSet};
use crate::model::Relation;

/// One applied partial order: `left` is at least as `relation` as `right`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartialOrder {
    pub option: String,
    pub relation: Relation,
    pub left: String,
    pub right: String,
}

impl PartialOrder {
    /// Human-readable label, e.g. `SPARK_more_precision_than_CHA`.
    ///
    /// Only the first space-separated token of each level name is used.
    pub fn label(&self) -> String {
        format!(
            "{}_more_{}_than_{}",
            first_token(&self.left),
            self.relation.as_str(),
            first_token(&self.right)
        )
    }
}

impl fmt::Display for PartialOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.option, self.label())
    }
}

fn first_token(level: &str) -> &str {
    level.split(' ').next().unwrap_or(level)
}

/// The outcome of checking one (subject, partner) pair under one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialViolation {
    /// The subject job (F).
    pub job1: FinishedFuzzingJob,
    /// The partner job (G).
    pub job2: FinishedFuzzingJob,
    pub partial_orders: BTreeSet<PartialOrder>,
    pub violated: bool,
    /// Findings preserved as evidence on the subject's side.
    pub preserve1: FlowSet,
    /// Findings preserved as evidence on the partner's side.
    pub preserve2: FlowSet,
}

impl PotentialViolation {
    /// The relation kinds that justified this comparison.
    pub fn relations(&self) -> BTreeSet<Relation> {
        self.partial_orders.iter().map(|po| po.relation).collect()
    }

    /// The first applied partial order; every violation carries at least one.
    pub fn primary_order(&self) -> Option<&PartialOrder> {
        self.partial_orders.iter().next()
    }

    /// The findings that make up the breach (empty when not violated).
    pub fn offending_flows(&self) -> FlowSet {
        if !self.violated {
            return FlowSet::new();
        }
        self.preserve1.union(&self.preserve2).cloned().collect()
    }

    /// Whether `other` was derived under the same partial-order set.
    pub fn same_partial_orders(&self, other: &PotentialViolation) -> bool {
        self.partial_orders == other.partial_orders
    }

    /// Compact rendering of the partial-order set for logs and errors.
    pub fn partial_orders_display(&self) -> String {
        let parts: Vec<String> = self.partial_orders.iter().map(ToString::to_string).collect();
        format!("{{{}}}", parts.join(", "))
    }
}
