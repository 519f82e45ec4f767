//! Interpreter for compiled query plans.
//!
//! Sub-queries are evaluated first, deepest scope first, into lists of
//! projected values; nested scopes always have a higher index than the scope
//! that references them. The root scope is then filtered and sorted.

use std::cmp::Ordering;

use labsearch::{OrderDirection, Value};
use labsearch_executor::{CompareOp, CompiledQuery, JoinKind, Predicate, PropertyRef, QueryScope};

use crate::error::MemStoreResult;
use crate::record::Record;
use crate::store::InMemoryStore;

/// One joined row: the scope record plus one target per join.
struct Row<'s> {
    record: &'s Record,
    joins: Vec<Option<&'s Record>>,
}

pub(crate) struct PlanEvaluator<'s> {
    store: &'s InMemoryStore,
    query: &'s CompiledQuery,
    projections: Vec<Vec<Value>>,
}

impl<'s> PlanEvaluator<'s> {
    pub(crate) fn new(store: &'s InMemoryStore, query: &'s CompiledQuery) -> MemStoreResult<Self> {
        let scopes = query.scopes();
        let mut evaluator = Self {
            store,
            query,
            projections: vec![Vec::new(); scopes.len()],
        };
        for index in (1..scopes.len()).rev() {
            let scope = &scopes[index];
            let projected = scope.projected_property().unwrap_or_default();
            let mut values: Vec<Value> = Vec::new();
            for row in evaluator.matching_rows(scope)? {
                if let Some(value) = store.property(row.record, projected) {
                    if !values.iter().any(|v| same(v, &value)) {
                        values.push(value);
                    }
                }
            }
            tracing::trace!(scope = index, values = values.len(), "sub-query evaluated");
            evaluator.projections[index] = values;
        }
        Ok(evaluator)
    }

    /// Distinct matching root records in plan order.
    pub(crate) fn root_records(&self) -> MemStoreResult<Vec<&'s Record>> {
        let mut rows = self.matching_rows(self.query.root())?;
        let order = self.query.order();
        if !order.is_empty() {
            rows.sort_by(|a, b| {
                for key in order {
                    let ord = compare_keys(self.value(a, &key.property), self.value(b, &key.property));
                    let ord = match key.direction {
                        OrderDirection::Asc => ord,
                        OrderDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        Ok(rows.into_iter().map(|row| row.record).collect())
    }

    /// First satisfying row of every record of the scope entity.
    fn matching_rows(&self, scope: &'s QueryScope) -> MemStoreResult<Vec<Row<'s>>> {
        let mut matched = Vec::new();
        for record in self.store.records(scope.entity())? {
            for row in self.rows(record, scope) {
                if self.holds(scope, &row)? {
                    matched.push(row);
                    break;
                }
            }
        }
        Ok(matched)
    }

    fn rows(&self, record: &'s Record, scope: &QueryScope) -> Vec<Row<'s>> {
        let mut partial: Vec<Vec<Option<&'s Record>>> = vec![Vec::with_capacity(scope.joins().len())];
        for join in scope.joins() {
            let mut next = Vec::with_capacity(partial.len());
            for binding in partial {
                let owner = match join.parent {
                    Some(parent) => binding.get(parent.index()).copied().flatten(),
                    None => Some(record),
                };
                let targets: Vec<&'s Record> = owner
                    .map(|o| {
                        o.links(&join.association)
                            .iter()
                            .filter_map(|r| self.store.resolve(r))
                            .collect()
                    })
                    .unwrap_or_default();
                if targets.is_empty() {
                    if join.kind == JoinKind::LeftOuter {
                        let mut extended = binding;
                        extended.push(None);
                        next.push(extended);
                    }
                    continue;
                }
                for target in targets {
                    let mut extended = binding.clone();
                    extended.push(Some(target));
                    next.push(extended);
                }
            }
            partial = next;
        }
        partial
            .into_iter()
            .map(|joins| Row { record, joins })
            .collect()
    }

    fn holds(&self, scope: &QueryScope, row: &Row<'s>) -> MemStoreResult<bool> {
        for condition in scope.conditions() {
            if self.eval(condition, row)? != Some(true) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn value(&self, row: &Row<'s>, property: &PropertyRef) -> Option<Value> {
        let record = match property.join {
            None => Some(row.record),
            Some(join) => row.joins.get(join.index()).copied().flatten(),
        }?;
        self.store.property(record, &property.property)
    }

    /// Three-valued evaluation; `None` is SQL's unknown.
    fn eval(&self, predicate: &Predicate, row: &Row<'s>) -> MemStoreResult<Option<bool>> {
        let result = match predicate {
            Predicate::Compare {
                property,
                op,
                value,
                case_insensitive,
            } => self.value(row, property).and_then(|actual| {
                let ord = if *case_insensitive {
                    match (actual.as_str(), value.as_str()) {
                        (Some(a), Some(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
                        _ => actual.compare(value),
                    }
                } else {
                    actual.compare(value)
                };
                Some(apply(*op, ord?))
            }),
            Predicate::Like { property, pattern } => self
                .value(row, property)
                .map(|actual| like_matches(&plain_text(&actual), pattern)),
            Predicate::Between { property, low, high } => {
                self.value(row, property).and_then(|actual| {
                    Some(actual.compare(low)? != Ordering::Less && actual.compare(high)? != Ordering::Greater)
                })
            }
            Predicate::Range { property, from, until } => {
                self.value(row, property).and_then(|actual| {
                    Some(actual.compare(from)? != Ordering::Less && actual.compare(until)? == Ordering::Less)
                })
            }
            Predicate::In { property, values } => self
                .value(row, property)
                .map(|actual| values.iter().any(|v| same(&actual, v))),
            Predicate::NotNull { property } => Some(self.value(row, property).is_some()),
            Predicate::InSubquery { property, subquery } => {
                let projected = &self.projections[subquery.index()];
                self.value(row, property)
                    .map(|actual| projected.iter().any(|v| same(&actual, v)))
            }
            Predicate::Literal(text) => Some((self.store.literal(text)?)(row.record)),
            Predicate::Not(inner) => self.eval(inner, row)?.map(|b| !b),
            Predicate::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match self.eval(part, row)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Predicate::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match self.eval(part, row)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
        };
        Ok(result)
    }
}

fn apply(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
    }
}

fn same(a: &Value, b: &Value) -> bool {
    a.compare(b) == Some(Ordering::Equal)
}

/// Nulls sort last ascending.
fn compare_keys(a: Option<Value>, b: Option<Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('\'').to_string(),
    }
}

/// Case-insensitive match where `%` stands for any run of characters.
fn like_matches(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let last = parts.len() - 1;
    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            return text.len() >= pos + part.len() && text[pos..].ends_with(part);
        } else {
            match text[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_matches() {
        assert!(like_matches("SM-1234", "%sm-12%"));
        assert!(like_matches("abc", "%%"));
        assert!(like_matches("abc", "a%"));
        assert!(!like_matches("abc", "b%"));
        assert!(like_matches("abc", "%c"));
        assert!(!like_matches("abc", "%b"));
        assert!(like_matches("a-b-c", "a%b%c"));
        assert!(!like_matches("ac", "a%b%c"));
        assert!(like_matches("ABC", "abc"));
        assert!(!like_matches("abcd", "abc"));
    }

    #[test]
    fn test_compare_keys_nulls_last() {
        assert_eq!(compare_keys(Some(Value::Long(1)), None), Ordering::Less);
        assert_eq!(compare_keys(None, Some(Value::Long(1))), Ordering::Greater);
        assert_eq!(
            compare_keys(Some(Value::Long(1)), Some(Value::Long(2))),
            Ordering::Less
        );
    }

    #[test]
    fn test_apply_ops() {
        assert!(apply(CompareOp::Ge, Ordering::Equal));
        assert!(!apply(CompareOp::Gt, Ordering::Equal));
        assert!(apply(CompareOp::Ne, Ordering::Less));
        assert!(apply(CompareOp::Le, Ordering::Less));
    }

    #[test]
    fn test_same_crosses_numeric_types() {
        assert!(same(&Value::Long(2), &Value::Decimal(2.0)));
        assert!(!same(&Value::Long(2), &Value::from("2")));
    }
}
