//! The compiled query plan.
//!
//! A [`CompiledQuery`] is a flat arena of [`QueryScope`]s. Scope `0` is the
//! root query over the result entity; every other scope is an independent
//! sub-query whose projected property is compared by set membership from a
//! [`Predicate::InSubquery`] in its parent scope. Joins are likewise stored
//! per scope and referenced by [`JoinId`].
//!
//! The plan is pure data: backends interpret it, and two compilations of the
//! same input compare equal with `==`.

use std::fmt::{self, Write as _};

use labsearch::{OrderDirection, ResultEntity, Value};

/// Index of a scope within a [`CompiledQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub(crate) usize);

impl ScopeId {
    /// The root scope.
    pub const ROOT: ScopeId = ScopeId(0);

    /// Raw arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Index of a join within its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinId(pub(crate) usize);

impl JoinId {
    /// Raw index within the scope's join list.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// How an association is joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Rows without the association are excluded.
    Inner,
    /// Rows without the association are kept; used for ordering.
    LeftOuter,
}

/// One association hop inside a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Association name on the parent.
    pub association: String,
    /// Parent join, or the scope's entity when `None`.
    pub parent: Option<JoinId>,
    /// Join kind.
    pub kind: JoinKind,
}

/// A property of a scope's entity or of one of its joins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    /// Join owning the property, or the scope entity when `None`.
    pub join: Option<JoinId>,
    /// Property name.
    pub property: String,
}

impl PropertyRef {
    /// A property of the scope's own entity.
    pub fn root(property: impl Into<String>) -> Self {
        Self {
            join: None,
            property: property.into(),
        }
    }

    /// A property of a joined association.
    pub fn joined(join: JoinId, property: impl Into<String>) -> Self {
        Self {
            join: Some(join),
            property: property.into(),
        }
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// A boolean condition attached to a scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Binary comparison; case-insensitive comparisons apply to text only.
    Compare {
        /// Compared property.
        property: PropertyRef,
        /// Operator.
        op: CompareOp,
        /// Operand.
        value: Value,
        /// Ignore case.
        case_insensitive: bool,
    },
    /// Case-insensitive pattern match with `%` wildcards.
    Like {
        /// Matched property.
        property: PropertyRef,
        /// Pattern including wildcards.
        pattern: String,
    },
    /// Inclusive range.
    Between {
        /// Compared property.
        property: PropertyRef,
        /// Lower bound, inclusive.
        low: Value,
        /// Upper bound, inclusive.
        high: Value,
    },
    /// Half-open range `[from, until)`.
    Range {
        /// Compared property.
        property: PropertyRef,
        /// Lower bound, inclusive.
        from: Value,
        /// Upper bound, exclusive.
        until: Value,
    },
    /// Membership in a literal list; never longer than the chunk size.
    In {
        /// Compared property.
        property: PropertyRef,
        /// Literal values.
        values: Vec<Value>,
    },
    /// Property has a value.
    NotNull {
        /// Tested property.
        property: PropertyRef,
    },
    /// Membership in the projection of a sub-query scope.
    InSubquery {
        /// Outer property.
        property: PropertyRef,
        /// Correlated sub-query.
        subquery: ScopeId,
    },
    /// Raw restriction passed through verbatim.
    Literal(String),
    /// Negation.
    Not(Box<Predicate>),
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction, collapsing a single operand.
    pub fn and(mut parts: Vec<Predicate>) -> Predicate {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::And(parts)
        }
    }

    /// Disjunction, collapsing a single operand.
    pub fn or(mut parts: Vec<Predicate>) -> Predicate {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::Or(parts)
        }
    }

    /// Negation.
    pub fn not(inner: Predicate) -> Predicate {
        Predicate::Not(Box::new(inner))
    }

    /// Number of literal values in this predicate tree.
    pub fn literal_count(&self) -> usize {
        match self {
            Predicate::In { values, .. } => values.len(),
            Predicate::Not(inner) => inner.literal_count(),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().map(Predicate::literal_count).sum()
            }
            _ => 0,
        }
    }
}

/// Whether a scope is the root or a sub-query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeKind {
    /// The outer query over the result entity.
    Root,
    /// An independent sub-query.
    Subquery {
        /// Scope containing the correlating predicate.
        parent: ScopeId,
        /// Property projected out of this scope.
        projected: String,
        /// Projection name that opened the scope.
        projection: String,
    },
}

/// One query or sub-query over a single entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryScope {
    entity: String,
    kind: ScopeKind,
    joins: Vec<Join>,
    conditions: Vec<Predicate>,
}

impl QueryScope {
    /// Entity type queried.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Root or sub-query.
    pub fn kind(&self) -> &ScopeKind {
        &self.kind
    }

    /// Joins, in creation order; a join's parent always precedes it.
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Returns a join.
    pub fn join(&self, id: JoinId) -> &Join {
        &self.joins[id.0]
    }

    /// Conditions, combined with AND.
    pub fn conditions(&self) -> &[Predicate] {
        &self.conditions
    }

    /// Association names from the scope entity to `join`, outermost first.
    pub fn join_path(&self, join: JoinId) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = Some(join);
        while let Some(id) = current {
            let j = &self.joins[id.0];
            path.push(j.association.as_str());
            current = j.parent;
        }
        path.reverse();
        path
    }

    /// Projected property of a sub-query.
    pub fn projected_property(&self) -> Option<&str> {
        match &self.kind {
            ScopeKind::Root => None,
            ScopeKind::Subquery { projected, .. } => Some(projected),
        }
    }

    /// Name of the projection that opened a sub-query.
    pub fn projection_name(&self) -> Option<&str> {
        match &self.kind {
            ScopeKind::Root => None,
            ScopeKind::Subquery { projection, .. } => Some(projection),
        }
    }
}

/// A sort key on the root scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Sorted property.
    pub property: PropertyRef,
    /// Direction.
    pub direction: OrderDirection,
}

/// An executable search over the result entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    entity: ResultEntity,
    distinct: bool,
    scopes: Vec<QueryScope>,
    order: Vec<OrderBy>,
    join_fetch: Vec<String>,
}

impl CompiledQuery {
    /// The result entity.
    pub fn entity(&self) -> &ResultEntity {
        &self.entity
    }

    /// True when duplicate root rows are removed.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// The root scope.
    pub fn root(&self) -> &QueryScope {
        &self.scopes[0]
    }

    /// Returns a scope.
    pub fn scope(&self, id: ScopeId) -> &QueryScope {
        &self.scopes[id.0]
    }

    /// All scopes; index 0 is the root.
    pub fn scopes(&self) -> &[QueryScope] {
        &self.scopes
    }

    /// Sort keys; the last always orders by id when ordering is requested.
    pub fn order(&self) -> &[OrderBy] {
        &self.order
    }

    /// Association paths to fetch with the entities.
    pub fn join_fetch(&self) -> &[String] {
        &self.join_fetch
    }

    fn render_scope(&self, id: ScopeId, out: &mut String) -> fmt::Result {
        let scope = self.scope(id);
        let alias = scope_alias(id);
        match &scope.kind {
            ScopeKind::Root => {
                let distinct = if self.distinct { "DISTINCT " } else { "" };
                write!(
                    out,
                    "SELECT {}{}.{} FROM {} {}",
                    distinct, alias, self.entity.id_property, scope.entity, alias
                )?;
            }
            ScopeKind::Subquery { projected, .. } => {
                write!(out, "SELECT {}.{} FROM {} {}", alias, projected, scope.entity, alias)?;
            }
        }
        for (i, join) in scope.joins.iter().enumerate() {
            let keyword = match join.kind {
                JoinKind::Inner => "JOIN",
                JoinKind::LeftOuter => "LEFT JOIN",
            };
            let owner = match join.parent {
                Some(parent) => join_alias(id, parent),
                None => alias.clone(),
            };
            write!(
                out,
                " {} {}.{} {}",
                keyword,
                owner,
                join.association,
                join_alias(id, JoinId(i))
            )?;
        }
        if !scope.conditions.is_empty() {
            out.push_str(" WHERE ");
            for (i, condition) in scope.conditions.iter().enumerate() {
                if i > 0 {
                    out.push_str(" AND ");
                }
                self.render_predicate(id, condition, out)?;
            }
        }
        Ok(())
    }

    fn render_predicate(&self, scope: ScopeId, predicate: &Predicate, out: &mut String) -> fmt::Result {
        let prop = |p: &PropertyRef| match p.join {
            Some(join) => format!("{}.{}", join_alias(scope, join), p.property),
            None => format!("{}.{}", scope_alias(scope), p.property),
        };
        match predicate {
            Predicate::Compare {
                property,
                op,
                value,
                case_insensitive,
            } => {
                if *case_insensitive {
                    write!(out, "lower({}) {} lower({})", prop(property), op.symbol(), value)
                } else {
                    write!(out, "{} {} {}", prop(property), op.symbol(), value)
                }
            }
            Predicate::Like { property, pattern } => {
                write!(out, "{} ILIKE '{}'", prop(property), pattern.replace('\'', "''"))
            }
            Predicate::Between { property, low, high } => {
                write!(out, "{} BETWEEN {} AND {}", prop(property), low, high)
            }
            Predicate::Range { property, from, until } => {
                let p = prop(property);
                write!(out, "({} >= {} AND {} < {})", p, from, p, until)
            }
            Predicate::In { property, values } => {
                write!(out, "{} IN (", prop(property))?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write!(out, "{}", v)?;
                }
                out.push(')');
                Ok(())
            }
            Predicate::NotNull { property } => write!(out, "{} IS NOT NULL", prop(property)),
            Predicate::InSubquery { property, subquery } => {
                write!(out, "{} IN (", prop(property))?;
                self.render_scope(*subquery, out)?;
                out.push(')');
                Ok(())
            }
            Predicate::Literal(text) => write!(out, "({})", text),
            Predicate::Not(inner) => {
                out.push_str("NOT (");
                self.render_predicate(scope, inner, out)?;
                out.push(')');
                Ok(())
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                let sep = if matches!(predicate, Predicate::And(_)) { " AND " } else { " OR " };
                out.push('(');
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        out.push_str(sep);
                    }
                    self.render_predicate(scope, part, out)?;
                }
                out.push(')');
                Ok(())
            }
        }
    }
}

fn scope_alias(id: ScopeId) -> String {
    format!("s{}", id.0)
}

fn join_alias(scope: ScopeId, join: JoinId) -> String {
    format!("s{}_j{}", scope.0, join.0)
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render_scope(ScopeId::ROOT, &mut out)?;
        if !self.order.is_empty() {
            out.push_str(" ORDER BY ");
            for (i, order) in self.order.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let owner = match order.property.join {
                    Some(join) => join_alias(ScopeId::ROOT, join),
                    None => scope_alias(ScopeId::ROOT),
                };
                write!(out, "{}.{} {}", owner, order.property.property, order.direction)?;
            }
        }
        f.write_str(&out)
    }
}

/// Incremental builder for [`CompiledQuery`].
///
/// This is the scope-manipulation surface the compiler drives: open
/// sub-queries, join associations, attach conditions and correlate a
/// sub-query with an outer property.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    entity: ResultEntity,
    scopes: Vec<QueryScope>,
    order: Vec<OrderBy>,
    join_fetch: Vec<String>,
}

impl QueryBuilder {
    /// Starts a distinct query over the result entity.
    pub fn new(entity: ResultEntity) -> Self {
        let root = QueryScope {
            entity: entity.name.clone(),
            kind: ScopeKind::Root,
            joins: Vec::new(),
            conditions: Vec::new(),
        };
        Self {
            entity,
            scopes: vec![root],
            order: Vec::new(),
            join_fetch: Vec::new(),
        }
    }

    /// Opens a sub-query on `entity` projecting `projected`.
    pub fn open_subquery(
        &mut self,
        parent: ScopeId,
        projection: &str,
        entity: &str,
        projected: &str,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(QueryScope {
            entity: entity.to_string(),
            kind: ScopeKind::Subquery {
                parent,
                projected: projected.to_string(),
                projection: projection.to_string(),
            },
            joins: Vec::new(),
            conditions: Vec::new(),
        });
        id
    }

    /// Builds the membership test `outer IN subquery`.
    pub fn correlate(&self, outer: PropertyRef, subquery: ScopeId) -> Predicate {
        Predicate::InSubquery {
            property: outer,
            subquery,
        }
    }

    /// Appends a join to a scope.
    pub fn join(
        &mut self,
        scope: ScopeId,
        parent: Option<JoinId>,
        association: &str,
        kind: JoinKind,
    ) -> JoinId {
        let joins = &mut self.scopes[scope.0].joins;
        let id = JoinId(joins.len());
        joins.push(Join {
            association: association.to_string(),
            parent,
            kind,
        });
        id
    }

    /// Adds a condition to a scope.
    pub fn attach(&mut self, scope: ScopeId, predicate: Predicate) {
        self.scopes[scope.0].conditions.push(predicate);
    }

    /// Entity type of a scope.
    pub fn scope_entity(&self, scope: ScopeId) -> &str {
        &self.scopes[scope.0].entity
    }

    /// Projection name of a sub-query scope.
    pub fn scope_projection(&self, scope: ScopeId) -> Option<&str> {
        self.scopes[scope.0].projection_name()
    }

    /// Appends a sort key.
    pub fn order_by(&mut self, order: OrderBy) {
        self.order.push(order);
    }

    /// Records a fetch hint once.
    pub fn join_fetch(&mut self, path: String) {
        if !self.join_fetch.contains(&path) {
            self.join_fetch.push(path);
        }
    }

    /// Freezes the plan.
    pub fn build(self) -> CompiledQuery {
        CompiledQuery {
            entity: self.entity,
            distinct: true,
            scopes: self.scopes,
            order: self.order,
            join_fetch: self.join_fetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsearch::KeyType;

    fn entity() -> ResultEntity {
        ResultEntity::new("LabVessel", "labVesselId", KeyType::Long)
    }

    #[test]
    fn test_builder_root_only() {
        let mut builder = QueryBuilder::new(entity());
        builder.attach(
            ScopeId::ROOT,
            Predicate::Compare {
                property: PropertyRef::root("label"),
                op: CompareOp::Eq,
                value: Value::from("0123"),
                case_insensitive: false,
            },
        );
        let query = builder.build();
        assert!(query.is_distinct());
        assert_eq!(query.scopes().len(), 1);
        assert_eq!(
            query.to_string(),
            "SELECT DISTINCT s0.labVesselId FROM LabVessel s0 WHERE s0.label = '0123'"
        );
    }

    #[test]
    fn test_builder_subquery_and_joins() {
        let mut builder = QueryBuilder::new(entity());
        let sub = builder.open_subquery(ScopeId::ROOT, "mercurySamples", "MercurySample", "labVessel");
        let meta = builder.join(sub, None, "metadata", JoinKind::Inner);
        builder.attach(
            sub,
            Predicate::Like {
                property: PropertyRef::joined(meta, "value"),
                pattern: "%abc%".to_string(),
            },
        );
        let correlation = builder.correlate(PropertyRef::root("labVesselId"), sub);
        builder.attach(ScopeId::ROOT, correlation);
        builder.order_by(OrderBy {
            property: PropertyRef::root("labVesselId"),
            direction: OrderDirection::Asc,
        });
        let query = builder.build();

        assert_eq!(query.scope(sub).projected_property(), Some("labVessel"));
        assert_eq!(query.scope(sub).projection_name(), Some("mercurySamples"));
        assert_eq!(query.scope(sub).join_path(meta), vec!["metadata"]);
        assert_eq!(
            query.to_string(),
            "SELECT DISTINCT s0.labVesselId FROM LabVessel s0 WHERE s0.labVesselId IN \
             (SELECT s1.labVessel FROM MercurySample s1 JOIN s1.metadata s1_j0 \
             WHERE s1_j0.value ILIKE '%abc%') ORDER BY s0.labVesselId ASC"
        );
    }

    #[test]
    fn test_join_path_is_outermost_first() {
        let mut builder = QueryBuilder::new(entity());
        let a = builder.join(ScopeId::ROOT, None, "containers", JoinKind::Inner);
        let b = builder.join(ScopeId::ROOT, Some(a), "events", JoinKind::Inner);
        let query = builder.build();
        assert_eq!(query.root().join_path(b), vec!["containers", "events"]);
    }

    #[test]
    fn test_predicate_helpers_collapse_single() {
        let p = Predicate::Literal("x".to_string());
        assert_eq!(Predicate::or(vec![p.clone()]), p);
        assert_eq!(Predicate::and(vec![p.clone()]), p);
        assert!(matches!(Predicate::or(vec![p.clone(), p]), Predicate::Or(_)));
    }

    #[test]
    fn test_literal_count() {
        let in_pred = |n: i64| Predicate::In {
            property: PropertyRef::root("id"),
            values: (0..n).map(Value::Long).collect(),
        };
        let p = Predicate::not(Predicate::or(vec![in_pred(3), in_pred(2)]));
        assert_eq!(p.literal_count(), 5);
    }

    #[test]
    fn test_join_fetch_deduplicated() {
        let mut builder = QueryBuilder::new(entity());
        builder.join_fetch("mercurySamples".to_string());
        builder.join_fetch("mercurySamples".to_string());
        assert_eq!(builder.build().join_fetch(), ["mercurySamples".to_string()]);
    }
}
