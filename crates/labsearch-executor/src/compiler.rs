//! Compilation of a search instance into a [`CompiledQuery`].
//!
//! The compiler walks the participating nodes of the predicate tree depth
//! first. For every node it resolves each of the term's criteria paths to a
//! location (scope plus join), builds the terminal comparison, and combines
//! the paths of one term with OR. Sibling nodes end up as separate AND'ed
//! conditions of their scope.
//!
//! ```text
//! node (depth 1) ──► opens sub-query S1 on the path's projection
//!   │                root:  super_property IN S1   (in the node's OR group)
//!   │                S1:    joins for remaining hops + terminal predicate
//!   └─ child (depth 2) ──► reuses S1, joins cached per (scope, hop sequence)
//! ```
//!
//! All per-compile state lives in a `CompileContext` created by
//! [`Compiler::compile`]; the compiler itself only holds configuration.

use std::collections::HashMap;

use chrono::NaiveTime;
use labsearch::{
    ConfigurationError, ConvertedValue, CriteriaPath, FilterOperator, ImmutableTermFilter,
    Operator, OrderDirection, OrderSpec, SearchInstance, TermCatalog, TermDefinition, ValidationError,
    ValidationErrors, Value, ValueId, ValueType,
};

use crate::chunk::{in_predicate, DEFAULT_IN_CHUNK_SIZE, MAX_IN_VALUES};
use crate::config::SearchConfig;
use crate::error::SearchResult;
use crate::policy::{SubqueryDecision, SubqueryPolicy};
use crate::query::{
    CompareOp, CompiledQuery, JoinId, JoinKind, OrderBy, Predicate, PropertyRef, QueryBuilder,
    ScopeId,
};

/// Compiles search instances against one catalog.
///
/// # Example
///
/// ```rust
/// use labsearch::{CriteriaPath, KeyType, ResultEntity, SearchInstance, TermCatalog, TermDefinition};
/// use labsearch_executor::Compiler;
///
/// let catalog = TermCatalog::builder(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long))
///     .term(TermDefinition::builder("Barcode").path(CriteriaPath::root("label")))
///     .build()
///     .unwrap();
///
/// let mut search = SearchInstance::new();
/// let id = search.add_top_level_term("Barcode", &catalog).unwrap();
/// search.value_mut(id).set_values(["0123"]);
///
/// let query = Compiler::new(&catalog).compile(&search, None).unwrap();
/// assert!(query.to_string().contains("s0.label = '0123'"));
/// ```
#[derive(Debug, Clone)]
pub struct Compiler<'a> {
    catalog: &'a TermCatalog,
    policy: SubqueryPolicy,
    in_chunk_size: usize,
}

/// What a node contributes at the end of each of its paths.
enum Terminal {
    Literal(String),
    Values {
        operator: Operator,
        values: Vec<ConvertedValue>,
    },
}

struct CompileContext<'c> {
    instance: &'c SearchInstance,
    participation: Vec<bool>,
    builder: QueryBuilder,
    joins: HashMap<(ScopeId, String), JoinId>,
    errors: Vec<ValidationError>,
}

impl CompileContext<'_> {
    /// Joins `hops` inside `scope`, reusing joins already made for the same
    /// hop sequence.
    fn join_hops(&mut self, scope: ScopeId, hops: &[String], kind: JoinKind) -> Option<JoinId> {
        let mut current = None;
        let mut key = match kind {
            JoinKind::Inner => String::new(),
            JoinKind::LeftOuter => String::from("outer:"),
        };
        for hop in hops {
            key.push_str(hop);
            key.push('|');
            let join = match self.joins.get(&(scope, key.clone())) {
                Some(existing) => {
                    tracing::trace!(scope = scope.index(), hops = %key, "reusing join");
                    *existing
                }
                None => {
                    let created = self.builder.join(scope, current, hop, kind);
                    self.joins.insert((scope, key.clone()), created);
                    created
                }
            };
            current = Some(join);
        }
        current
    }
}

impl<'a> Compiler<'a> {
    /// Creates a compiler with the default policy and chunk size.
    pub fn new(catalog: &'a TermCatalog) -> Self {
        Self {
            catalog,
            policy: SubqueryPolicy::default(),
            in_chunk_size: DEFAULT_IN_CHUNK_SIZE,
        }
    }

    /// Creates a compiler using the policy and chunk size of `config`.
    pub fn from_config(catalog: &'a TermCatalog, config: &SearchConfig) -> Self {
        Self::new(catalog)
            .with_policy(config.subquery_policy)
            .with_in_chunk_size(config.in_chunk_size)
    }

    /// Sets the sub-query policy.
    pub fn with_policy(mut self, policy: SubqueryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the membership chunk size, clamped to `1..=MAX_IN_VALUES`.
    pub fn with_in_chunk_size(mut self, size: usize) -> Self {
        self.in_chunk_size = size.clamp(1, MAX_IN_VALUES);
        self
    }

    /// The catalog compiled against.
    pub fn catalog(&self) -> &'a TermCatalog {
        self.catalog
    }

    /// Compiles a search.
    ///
    /// # Errors
    ///
    /// - `Validation` with every collected [`ValidationError`]; nothing is returned partially
    /// - `Configuration` for unknown names or oversized IN lists
    pub fn compile(
        &self,
        instance: &SearchInstance,
        order: Option<&OrderSpec>,
    ) -> SearchResult<CompiledQuery> {
        let problems = instance.validate(self.catalog)?;
        if let Some(errors) = ValidationErrors::from_vec(problems) {
            return Err(errors.into());
        }

        let mut ctx = CompileContext {
            instance,
            participation: instance.participation(self.catalog)?,
            builder: QueryBuilder::new(self.catalog.result_entity().clone()),
            joins: HashMap::new(),
            errors: Vec::new(),
        };

        for root in instance.roots() {
            self.compile_node(&mut ctx, *root, 1, None)?;
        }

        if let Some(errors) = ValidationErrors::from_vec(std::mem::take(&mut ctx.errors)) {
            return Err(errors.into());
        }

        self.add_order(&mut ctx, order);

        let query = ctx.builder.build();
        tracing::debug!(
            scopes = query.scopes().len(),
            fetch_hints = query.join_fetch().len(),
            "compiled search"
        );
        Ok(query)
    }

    fn compile_node(
        &self,
        ctx: &mut CompileContext<'_>,
        id: ValueId,
        depth: usize,
        inherited: Option<ScopeId>,
    ) -> SearchResult<()> {
        if !ctx.participation[id.index()] {
            return Ok(());
        }
        let instance = ctx.instance;
        let node = instance.value(id);
        let term = self.catalog.resolve_term(node.term())?;
        let terminal = self.terminal(ctx, id, term);
        let paths = term.paths();

        let mut child_scope = inherited;
        if paths.is_empty() {
            if let Some(Terminal::Literal(text)) = terminal {
                let anchor = inherited.unwrap_or(ScopeId::ROOT);
                ctx.builder.attach(anchor, Predicate::Literal(text));
            }
        } else {
            let opens_new = inherited.is_none()
                || paths.iter().any(|path| {
                    !path.is_root_property()
                        && self.policy.opens_subquery(&SubqueryDecision {
                            depth,
                            term,
                            path,
                            has_inherited_scope: inherited.is_some(),
                        })
                });
            let anchor = match inherited {
                Some(scope) if !opens_new => scope,
                _ => ScopeId::ROOT,
            };

            let mut group = Vec::with_capacity(paths.len());
            for path in paths {
                let (member, outer) =
                    self.place_path(ctx, term, path, anchor, opens_new, terminal.as_ref())?;
                group.extend(member);
                child_scope = if outer == ScopeId::ROOT { inherited } else { Some(outer) };
                if path.join_fetch() {
                    if let Some(hint) = path.join_fetch_path() {
                        ctx.builder.join_fetch(hint);
                    }
                }
            }
            if !group.is_empty() {
                ctx.builder.attach(anchor, Predicate::or(group));
            }
        }

        let child_depth = if paths.is_empty() { depth } else { depth + 1 };
        for child in node.children() {
            self.compile_node(ctx, *child, child_depth, child_scope)?;
        }
        Ok(())
    }

    /// Converts a node's values, recording validation problems in the context.
    fn terminal(
        &self,
        ctx: &mut CompileContext<'_>,
        id: ValueId,
        term: &TermDefinition,
    ) -> Option<Terminal> {
        if let Some(literal) = term.literal_restriction() {
            return Some(Terminal::Literal(literal.to_string()));
        }
        let instance = ctx.instance;
        let node = instance.value(id);
        if !node.has_value() {
            return None;
        }

        let values = match instance.convert_values(id, term) {
            Ok(values) => values,
            Err(err) => {
                ctx.errors.push(err);
                return None;
            }
        };
        if matches!(values.first(), Some(ConvertedValue::Drop)) {
            tracing::debug!(term = term.name(), "value converter dropped predicate");
            return None;
        }

        let operator = node.operator();
        let list_input = matches!(values.first(), Some(ConvertedValue::List(_)));
        let count = values.len();
        let (expected, ok) = match operator {
            Operator::Between if !list_input => (2, count == 2),
            Operator::NotNull => (0, true),
            _ => (1, count >= 1),
        };
        if !ok {
            ctx.errors.push(ValidationError::WrongValueCount {
                term: term.name().to_string(),
                operator: operator.to_string(),
                expected,
                actual: count,
            });
            return None;
        }
        Some(Terminal::Values { operator, values })
    }

    /// Resolves one criteria path and returns the predicate for the node's
    /// OR group together with the outermost scope the path landed in.
    fn place_path(
        &self,
        ctx: &mut CompileContext<'_>,
        term: &TermDefinition,
        path: &CriteriaPath,
        anchor: ScopeId,
        opens_new: bool,
        terminal: Option<&Terminal>,
    ) -> SearchResult<(Option<Predicate>, ScopeId)> {
        let segments = path.segments();
        let first = path.first_segment();

        let (outer_scope, outer_join, correlation) = match first.hops().split_first() {
            Some((head, rest)) if opens_new => {
                let projection = self.catalog.resolve_projection(head)?;
                let sub = ctx.builder.open_subquery(
                    ScopeId::ROOT,
                    &projection.name,
                    &projection.entity,
                    &projection.sub_property,
                );
                tracing::debug!(
                    term = term.name(),
                    projection = %projection.name,
                    scope = sub.index(),
                    "opened sub-query"
                );
                let correlation = ctx
                    .builder
                    .correlate(PropertyRef::root(projection.super_property.clone()), sub);
                let join = ctx.join_hops(sub, rest, JoinKind::Inner);
                (sub, join, Some(correlation))
            }
            _ => {
                // A reused sub-query already stands for the first hop.
                let hops = match (ctx.builder.scope_projection(anchor), first.hops().split_first()) {
                    (Some(name), Some((head, rest))) => {
                        if head.as_str() != name {
                            tracing::warn!(
                                term = term.name(),
                                scope = name,
                                hop = head.as_str(),
                                "path starts outside the reused sub-query; first hop skipped"
                            );
                        }
                        rest
                    }
                    _ => first.hops(),
                };
                let join = ctx.join_hops(anchor, hops, JoinKind::Inner);
                (anchor, join, None)
            }
        };

        let mut levels = vec![(outer_scope, outer_join)];
        for segment in segments.iter().skip(1) {
            let (head, rest) = segment.hops().split_first().ok_or_else(|| {
                ConfigurationError::InvalidPath {
                    path: path.to_string(),
                    position: 0,
                    message: "nested segment has no projection".to_string(),
                }
            })?;
            let projection = self.catalog.resolve_projection(head)?;
            let (parent_scope, _) = levels[levels.len() - 1];
            let nested = ctx.builder.open_subquery(
                parent_scope,
                &projection.name,
                &projection.entity,
                &projection.sub_property,
            );
            let join = ctx.join_hops(nested, rest, JoinKind::Inner);
            levels.push((nested, join));
        }

        let (_, inner_join) = levels[levels.len() - 1];
        let mut predicate = match terminal {
            Some(terminal) => Some(self.terminal_predicate(
                term,
                terminal,
                path,
                PropertyRef {
                    join: inner_join,
                    property: path.property().to_string(),
                },
            )?),
            None => None,
        };

        for level in (0..levels.len() - 1).rev() {
            let (inner_scope, _) = levels[level + 1];
            if let Some(p) = predicate.take() {
                ctx.builder.attach(inner_scope, p);
            }
            let (_, join) = levels[level];
            let link = segments[level].link().ok_or_else(|| ConfigurationError::InvalidPath {
                path: path.to_string(),
                position: 0,
                message: "segment has no link property".to_string(),
            })?;
            predicate = Some(ctx.builder.correlate(
                PropertyRef {
                    join,
                    property: link.to_string(),
                },
                inner_scope,
            ));
        }

        let member = match correlation {
            Some(correlation) => {
                if let Some(p) = predicate {
                    ctx.builder.attach(outer_scope, p);
                }
                Some(correlation)
            }
            None => predicate,
        };
        Ok((member, outer_scope))
    }

    fn terminal_predicate(
        &self,
        term: &TermDefinition,
        terminal: &Terminal,
        path: &CriteriaPath,
        property: PropertyRef,
    ) -> SearchResult<Predicate> {
        let main = match terminal {
            Terminal::Literal(text) => Predicate::Literal(text.clone()),
            Terminal::Values { operator, values } => {
                self.operator_predicate(term, *operator, values, &property)?
            }
        };
        if path.filters().is_empty() {
            return Ok(main);
        }
        let mut parts = Vec::with_capacity(path.filters().len() + 1);
        parts.push(main);
        for filter in path.filters() {
            parts.push(self.filter_predicate(filter, property.join)?);
        }
        Ok(Predicate::And(parts))
    }

    fn operator_predicate(
        &self,
        term: &TermDefinition,
        operator: Operator,
        converted: &[ConvertedValue],
        property: &PropertyRef,
    ) -> SearchResult<Predicate> {
        let case_insensitive = term.is_case_insensitive();
        if let Some(ConvertedValue::List(list)) = converted.first() {
            let negate = operator == Operator::NotIn;
            return Ok(in_predicate(property, list, self.in_chunk_size, case_insensitive, negate)?);
        }

        let values: Vec<Value> = converted
            .iter()
            .flat_map(|c| match c {
                ConvertedValue::Single(v) => vec![v.clone()],
                ConvertedValue::List(vs) => vs.clone(),
                ConvertedValue::Drop => Vec::new(),
            })
            .collect();
        // terminal() guarantees the arity checked below.
        let Some(first) = values.first().cloned() else {
            return Ok(Predicate::NotNull {
                property: property.clone(),
            });
        };

        let predicate = match operator {
            Operator::Equals => match first {
                Value::Date(day) => whole_days(property, day, day),
                // A date-time term given only a date matches that whole day.
                Value::DateTime(at)
                    if term.value_type() == ValueType::DateTime && at.time() == NaiveTime::MIN =>
                {
                    whole_days(property, at.date(), at.date())
                }
                value => Predicate::Compare {
                    property: property.clone(),
                    op: CompareOp::Eq,
                    case_insensitive: case_insensitive && value.as_str().is_some(),
                    value,
                },
            },
            Operator::Like => Predicate::Like {
                property: property.clone(),
                pattern: format!("%{}%", plain_text(&first)),
            },
            Operator::Between => {
                let high = values.get(1).cloned().unwrap_or_else(|| first.clone());
                match (&first, &high) {
                    (Value::Date(low), Value::Date(high)) => whole_days(property, *low, *high),
                    _ => Predicate::Between {
                        property: property.clone(),
                        low: first,
                        high,
                    },
                }
            }
            Operator::In | Operator::NotIn => in_predicate(
                property,
                &values,
                self.in_chunk_size,
                case_insensitive,
                operator == Operator::NotIn,
            )?,
            Operator::GreaterThan => compare(property, CompareOp::Gt, first),
            Operator::LessThan => compare(property, CompareOp::Lt, first),
            Operator::NotNull => Predicate::NotNull {
                property: property.clone(),
            },
        };
        Ok(predicate)
    }

    fn filter_predicate(
        &self,
        filter: &ImmutableTermFilter,
        join: Option<JoinId>,
    ) -> SearchResult<Predicate> {
        let property = PropertyRef {
            join,
            property: filter.property.clone(),
        };
        let arity_error = |expected: usize| {
            ConfigurationError::InvalidCatalog(format!(
                "filter {} on '{}' expects {} value(s), got {}",
                filter.operator,
                filter.property,
                expected,
                filter.values.len()
            ))
        };
        let first = || filter.values.first().cloned().ok_or_else(|| arity_error(1));

        let predicate = match filter.operator {
            FilterOperator::Equals => compare(&property, CompareOp::Eq, first()?),
            FilterOperator::NotEquals => compare(&property, CompareOp::Ne, first()?),
            FilterOperator::GreaterThan => compare(&property, CompareOp::Gt, first()?),
            FilterOperator::GreaterThanEqual => compare(&property, CompareOp::Ge, first()?),
            FilterOperator::LessThan => compare(&property, CompareOp::Lt, first()?),
            FilterOperator::LessThanEqual => compare(&property, CompareOp::Le, first()?),
            FilterOperator::Between => match filter.values.as_slice() {
                [low, high] => Predicate::Between {
                    property,
                    low: low.clone(),
                    high: high.clone(),
                },
                _ => return Err(arity_error(2).into()),
            },
            FilterOperator::In | FilterOperator::NotIn => in_predicate(
                &property,
                &filter.values,
                self.in_chunk_size,
                false,
                filter.operator == FilterOperator::NotIn,
            )?,
            FilterOperator::Like => Predicate::Like {
                pattern: format!("%{}%", plain_text(&first()?)),
                property,
            },
            FilterOperator::NotNull => Predicate::NotNull { property },
        };
        Ok(predicate)
    }

    fn add_order(&self, ctx: &mut CompileContext<'_>, order: Option<&OrderSpec>) {
        let id_property = self.catalog.result_entity().id_property.clone();
        let mut on_id = false;
        if let Some(order) = order {
            let join = ctx.join_hops(ScopeId::ROOT, &order.hops, JoinKind::LeftOuter);
            on_id = join.is_none() && order.property == id_property;
            ctx.builder.order_by(OrderBy {
                property: PropertyRef {
                    join,
                    property: order.property.clone(),
                },
                direction: order.direction,
            });
        }
        if !on_id {
            ctx.builder.order_by(OrderBy {
                property: PropertyRef::root(id_property),
                direction: OrderDirection::Asc,
            });
        }
    }
}

/// Convenience wrapper around [`Compiler::compile`] with default settings.
pub fn compile(
    catalog: &TermCatalog,
    instance: &SearchInstance,
    order: Option<&OrderSpec>,
) -> SearchResult<CompiledQuery> {
    Compiler::new(catalog).compile(instance, order)
}

fn compare(property: &PropertyRef, op: CompareOp, value: Value) -> Predicate {
    Predicate::Compare {
        property: property.clone(),
        op,
        value,
        case_insensitive: false,
    }
}

/// `[low 00:00, high + 1 day 00:00)`; dates carry an implied midnight.
fn whole_days(property: &PropertyRef, low: chrono::NaiveDate, high: chrono::NaiveDate) -> Predicate {
    let from = Value::DateTime(low.and_time(NaiveTime::MIN));
    match high.succ_opt() {
        Some(next) => Predicate::Range {
            property: property.clone(),
            from,
            until: Value::DateTime(next.and_time(NaiveTime::MIN)),
        },
        None => compare(property, CompareOp::Ge, from),
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('\'').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchExecutorError;
    use crate::query::ScopeKind;
    use labsearch::{
        ConversionContext, CriteriaProjection, KeyType, ResultEntity, ValueType,
    };

    fn drop_any(raw: &str, _ctx: &ConversionContext<'_>) -> Result<ConvertedValue, ValidationError> {
        Ok(if raw == "Any" {
            ConvertedValue::Drop
        } else {
            ConvertedValue::Single(Value::from(raw))
        })
    }

    fn catalog() -> TermCatalog {
        TermCatalog::builder(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long))
            .projection(CriteriaProjection::new("mercurySamples", "MercurySample", "labVessel", "labVesselId"))
            .projection(CriteriaProjection::new("labBatches", "LabBatch", "labBatchId", "labVesselId"))
            .term(TermDefinition::builder("Barcode").path(CriteriaPath::root("label")))
            .term(TermDefinition::builder("Label CI").case_insensitive(true).path(CriteriaPath::root("label")))
            .term(TermDefinition::builder("Created").value_type(ValueType::Date).path(CriteriaPath::root("createdOn")))
            .term(TermDefinition::builder("Received").value_type(ValueType::DateTime).path(CriteriaPath::root("receivedAt")))
            .term(TermDefinition::builder("Volume").value_type(ValueType::Decimal).path(CriteriaPath::root("volume")))
            .term(
                TermDefinition::builder("Metadata")
                    .path(CriteriaPath::through(["mercurySamples", "metadata"], "key"))
                    .dependent(
                        TermDefinition::builder("Metadata Value")
                            .path(CriteriaPath::through(["mercurySamples", "metadata"], "value")),
                    ),
            )
            .term(
                TermDefinition::builder("Sample or Batch")
                    .path(CriteriaPath::through(["mercurySamples"], "sampleKey"))
                    .path(CriteriaPath::through(["labBatches"], "batchName")),
            )
            .term(TermDefinition::builder("Choice").converter(drop_any).path(CriteriaPath::root("choice"))
                .dependent(TermDefinition::builder("Choice Detail").path(CriteriaPath::root("detail"))))
            .term(TermDefinition::builder("Active").literal_restriction("status = 'ACTIVE'"))
            .build()
            .unwrap()
    }

    fn search(terms: &[(&str, Operator, &[&str])], catalog: &TermCatalog) -> SearchInstance {
        let mut search = SearchInstance::new();
        for (name, op, values) in terms {
            let id = search.add_top_level_term(name, catalog).unwrap();
            search.value_mut(id).set_operator(*op);
            search.value_mut(id).set_values(values.iter().copied());
        }
        search
    }

    fn root_conditions(query: &CompiledQuery) -> &[Predicate] {
        query.root().conditions()
    }

    #[test]
    fn test_root_property_equals() {
        let catalog = catalog();
        let s = search(&[("Barcode", Operator::Equals, &["0123"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Compare {
                property: PropertyRef::root("label"),
                op: CompareOp::Eq,
                value: Value::from("0123"),
                case_insensitive: false,
            }]
        );
        assert_eq!(query.order().len(), 1);
        assert_eq!(query.order()[0].property, PropertyRef::root("labVesselId"));
    }

    #[test]
    fn test_date_equals_is_whole_day() {
        let catalog = catalog();
        let s = search(&[("Created", Operator::Equals, &["03/01/2024"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let next = chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Range {
                property: PropertyRef::root("createdOn"),
                from: Value::DateTime(day.and_time(NaiveTime::MIN)),
                until: Value::DateTime(next.and_time(NaiveTime::MIN)),
            }]
        );
    }

    #[test]
    fn test_datetime_equals_date_only_is_whole_day() {
        let catalog = catalog();
        let s = search(&[("Received", Operator::Equals, &["2024-03-01"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let next = chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Range {
                property: PropertyRef::root("receivedAt"),
                from: Value::DateTime(day.and_time(NaiveTime::MIN)),
                until: Value::DateTime(next.and_time(NaiveTime::MIN)),
            }]
        );
        assert!(query.to_string().contains("2024-03-02"));
    }

    #[test]
    fn test_datetime_equals_with_time_is_exact() {
        let catalog = catalog();
        let s = search(&[("Received", Operator::Equals, &["2024-03-01 12:30:00"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        let at = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Compare {
                property: PropertyRef::root("receivedAt"),
                op: CompareOp::Eq,
                value: Value::DateTime(at),
                case_insensitive: false,
            }]
        );
    }

    #[test]
    fn test_date_between_covers_last_day() {
        let catalog = catalog();
        let s = search(&[("Created", Operator::Between, &["2024-03-01", "2024-03-05"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        match &root_conditions(&query)[0] {
            Predicate::Range { until, .. } => assert_eq!(
                until,
                &Value::DateTime(
                    chrono::NaiveDate::from_ymd_opt(2024, 3, 6).unwrap().and_time(NaiveTime::MIN)
                )
            ),
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_between_numbers_inclusive() {
        let catalog = catalog();
        let s = search(&[("Volume", Operator::Between, &["1.5", "20"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Between {
                property: PropertyRef::root("volume"),
                low: Value::Decimal(1.5),
                high: Value::Decimal(20.0),
            }]
        );
    }

    #[test]
    fn test_between_wrong_count_is_validation_error() {
        let catalog = catalog();
        let s = search(&[("Volume", Operator::Between, &["1.5"])], &catalog);
        let err = Compiler::new(&catalog).compile(&s, None).unwrap_err();
        match err {
            SearchExecutorError::Validation(errors) => assert!(errors.contains(|e| matches!(
                e,
                ValidationError::WrongValueCount { expected: 2, actual: 1, .. }
            ))),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_like_wraps_wildcards() {
        let catalog = catalog();
        let s = search(&[("Barcode", Operator::Like, &["12"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Like {
                property: PropertyRef::root("label"),
                pattern: "%12%".to_string(),
            }]
        );
    }

    #[test]
    fn test_case_insensitive_equals() {
        let catalog = catalog();
        let s = search(&[("Label CI", Operator::Equals, &["abc"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert!(matches!(
            &root_conditions(&query)[0],
            Predicate::Compare { case_insensitive: true, op: CompareOp::Eq, .. }
        ));
    }

    #[test]
    fn test_strict_inequalities() {
        let catalog = catalog();
        let s = search(
            &[("Volume", Operator::GreaterThan, &["1"]), ("Barcode", Operator::LessThan, &["5"])],
            &catalog,
        );
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert!(matches!(&root_conditions(&query)[0], Predicate::Compare { op: CompareOp::Gt, .. }));
        assert!(matches!(&root_conditions(&query)[1], Predicate::Compare { op: CompareOp::Lt, .. }));
    }

    #[test]
    fn test_top_level_hop_opens_subquery() {
        let catalog = catalog();
        let s = search(&[("Metadata", Operator::Equals, &["GENDER"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(query.scopes().len(), 2);
        let sub = query.scope(ScopeId(1));
        assert_eq!(sub.entity(), "MercurySample");
        assert_eq!(
            sub.kind(),
            &ScopeKind::Subquery {
                parent: ScopeId::ROOT,
                projected: "labVessel".to_string(),
                projection: "mercurySamples".to_string(),
            }
        );
        assert_eq!(sub.joins().len(), 1);
        assert_eq!(
            root_conditions(&query),
            &[Predicate::InSubquery {
                property: PropertyRef::root("labVesselId"),
                subquery: ScopeId(1),
            }]
        );
    }

    #[test]
    fn test_child_reuses_parent_scope_and_join() {
        let catalog = catalog();
        let mut s = search(&[("Metadata", Operator::Equals, &["GENDER"])], &catalog);
        let parent = s.roots()[0];
        let child = s.add_child(parent, "Metadata Value", &catalog).unwrap();
        s.value_mut(child).set_values(["Female"]);

        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(query.scopes().len(), 2, "child must not open a new sub-query");
        let sub = query.scope(ScopeId(1));
        assert_eq!(sub.joins().len(), 1, "metadata join must be reused");
        assert_eq!(sub.conditions().len(), 2);
        assert_eq!(
            sub.conditions()[1],
            Predicate::Compare {
                property: PropertyRef::joined(JoinId(0), "value"),
                op: CompareOp::Eq,
                value: Value::from("Female"),
                case_insensitive: false,
            }
        );
    }

    #[test]
    fn test_reused_scope_skips_first_hop() {
        let catalog = TermCatalog::builder(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long))
            .projection(CriteriaProjection::new("mercurySamples", "MercurySample", "labVessel", "labVesselId"))
            .term(
                TermDefinition::builder("Sample")
                    .path(CriteriaPath::through(["mercurySamples"], "sampleKey"))
                    .dependent(
                        TermDefinition::builder("Sample Metadata")
                            .path(CriteriaPath::through(["samples", "metadata"], "value")),
                    ),
            )
            .build()
            .unwrap();
        let mut s = search(&[("Sample", Operator::Equals, &["SM-1"])], &catalog);
        let parent = s.roots()[0];
        let child = s.add_child(parent, "Sample Metadata", &catalog).unwrap();
        s.value_mut(child).set_values(["Female"]);

        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(query.scopes().len(), 2);
        let sub = query.scope(ScopeId(1));
        assert_eq!(sub.joins().len(), 1, "only the metadata hop is joined");
        assert_eq!(sub.joins()[0].association, "metadata");
        assert_eq!(
            sub.conditions()[1],
            Predicate::Compare {
                property: PropertyRef::joined(JoinId(0), "value"),
                op: CompareOp::Eq,
                value: Value::from("Female"),
                case_insensitive: false,
            }
        );
    }

    #[test]
    fn test_always_policy_opens_subquery_for_child() {
        let catalog = catalog();
        let mut s = search(&[("Metadata", Operator::Equals, &["GENDER"])], &catalog);
        let parent = s.roots()[0];
        let child = s.add_child(parent, "Metadata Value", &catalog).unwrap();
        s.value_mut(child).set_values(["Female"]);

        let query = Compiler::new(&catalog)
            .with_policy(SubqueryPolicy::Always)
            .compile(&s, None)
            .unwrap();
        assert_eq!(query.scopes().len(), 3);
        assert_eq!(root_conditions(&query).len(), 2);
    }

    #[test]
    fn test_multiple_paths_form_or_group() {
        let catalog = catalog();
        let s = search(&[("Sample or Batch", Operator::Equals, &["X1"])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(query.scopes().len(), 3);
        match root_conditions(&query) {
            [Predicate::Or(parts)] => {
                assert_eq!(parts.len(), 2);
                assert!(parts.iter().all(|p| matches!(p, Predicate::InSubquery { .. })));
            }
            other => panic!("expected a single OR group, got {other:?}"),
        }
    }

    #[test]
    fn test_siblings_are_separate_conditions() {
        let catalog = catalog();
        let s = search(
            &[("Barcode", Operator::Equals, &["A"]), ("Sample or Batch", Operator::Equals, &["B"])],
            &catalog,
        );
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(root_conditions(&query).len(), 2);
        assert!(matches!(root_conditions(&query)[1], Predicate::Or(_)));
    }

    #[test]
    fn test_dropped_predicate_still_compiles_children() {
        let catalog = catalog();
        let mut s = search(&[("Choice", Operator::Equals, &["Any"])], &catalog);
        let parent = s.roots()[0];
        let child = s.add_child(parent, "Choice Detail", &catalog).unwrap();
        s.value_mut(child).set_values(["d"]);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Compare {
                property: PropertyRef::root("detail"),
                op: CompareOp::Eq,
                value: Value::from("d"),
                case_insensitive: false,
            }]
        );
    }

    #[test]
    fn test_literal_restriction_verbatim() {
        let catalog = catalog();
        let s = search(&[("Active", Operator::Equals, &[])], &catalog);
        let query = Compiler::new(&catalog).compile(&s, None).unwrap();
        assert_eq!(
            root_conditions(&query),
            &[Predicate::Literal("status = 'ACTIVE'".to_string())]
        );
    }

    #[test]
    fn test_in_over_limit_is_configuration_error() {
        let catalog = catalog();
        let values: String = (0..40_000).map(|i| format!("{i}\n")).collect();
        let s = search(&[("Barcode", Operator::In, &[values.as_str()])], &catalog);
        let err = Compiler::new(&catalog).compile(&s, None).unwrap_err();
        assert!(matches!(
            err,
            SearchExecutorError::Configuration(ConfigurationError::InListTooLarge { count: 40_000, .. })
        ));
    }

    #[test]
    fn test_order_by_adds_id_tiebreak() {
        let catalog = catalog();
        let s = search(&[("Barcode", Operator::Equals, &["A"])], &catalog);
        let order = OrderSpec::parse("mercurySamples.sampleKey desc").unwrap();
        let query = Compiler::new(&catalog).compile(&s, Some(&order)).unwrap();
        assert_eq!(query.order().len(), 2);
        assert_eq!(query.order()[0].direction, OrderDirection::Desc);
        assert_eq!(query.root().joins()[0].kind, JoinKind::LeftOuter);
        assert_eq!(query.order()[1].property, PropertyRef::root("labVesselId"));
    }

    #[test]
    fn test_order_by_id_has_no_tiebreak() {
        let catalog = catalog();
        let s = search(&[("Barcode", Operator::Equals, &["A"])], &catalog);
        let order = OrderSpec::new("labVesselId", OrderDirection::Desc);
        let query = Compiler::new(&catalog).compile(&s, Some(&order)).unwrap();
        assert_eq!(query.order().len(), 1);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let catalog = catalog();
        let s = search(
            &[("Metadata", Operator::Equals, &["K"]), ("Sample or Batch", Operator::In, &["a\nb"])],
            &catalog,
        );
        let compiler = Compiler::new(&catalog);
        assert_eq!(compiler.compile(&s, None).unwrap(), compiler.compile(&s, None).unwrap());
    }

    #[test]
    fn test_validation_runs_before_compilation() {
        let catalog = catalog();
        let s = search(&[("Barcode", Operator::Equals, &[])], &catalog);
        let err = compile(&catalog, &s, None).unwrap_err();
        assert!(err.is_validation());
    }
}
