//! When a criteria path opens a new sub-query instead of reusing one.

use labsearch::{CriteriaPath, TermDefinition};
use serde::Deserialize;

/// Facts available when deciding on a sub-query boundary.
#[derive(Debug, Clone, Copy)]
pub struct SubqueryDecision<'a> {
    /// Depth of the node; top-level nodes are at depth 1.
    pub depth: usize,
    /// Term of the node.
    pub term: &'a TermDefinition,
    /// Path being resolved.
    pub path: &'a CriteriaPath,
    /// Whether the node inherited a sub-query from its parent.
    pub has_inherited_scope: bool,
}

/// Rule deciding whether a path starts a new independent sub-query.
///
/// Whatever the rule says, a path is always given a new sub-query when there
/// is no inherited one to reuse.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubqueryPolicy {
    /// New sub-query at depth 1 or when the term asks for one.
    #[default]
    TopLevelOrFlagged,
    /// New sub-query only when the term asks for one.
    FlaggedOnly,
    /// Every path gets its own sub-query.
    Always,
    /// Caller-supplied rule.
    #[serde(skip)]
    Custom(fn(&SubqueryDecision<'_>) -> bool),
}

impl SubqueryPolicy {
    /// Applies the rule.
    pub fn opens_subquery(&self, decision: &SubqueryDecision<'_>) -> bool {
        if !decision.has_inherited_scope {
            return true;
        }
        match self {
            SubqueryPolicy::TopLevelOrFlagged => {
                decision.depth == 1 || decision.term.new_subquery()
            }
            SubqueryPolicy::FlaggedOnly => decision.term.new_subquery(),
            SubqueryPolicy::Always => true,
            SubqueryPolicy::Custom(rule) => rule(decision),
        }
    }
}

impl PartialEq for SubqueryPolicy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SubqueryPolicy::TopLevelOrFlagged, SubqueryPolicy::TopLevelOrFlagged)
            | (SubqueryPolicy::FlaggedOnly, SubqueryPolicy::FlaggedOnly)
            | (SubqueryPolicy::Always, SubqueryPolicy::Always) => true,
            (SubqueryPolicy::Custom(a), SubqueryPolicy::Custom(b)) => *a as usize == *b as usize,
            _ => false,
        }
    }
}

impl Eq for SubqueryPolicy {}
