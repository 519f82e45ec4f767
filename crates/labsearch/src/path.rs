//! Criteria paths, immutable filters and order specifications.
//!
//! A [`CriteriaPath`] is stored as a flat arena of [`PathSegment`]s. Segment
//! `0` is resolved from the scope the term is compiled in; every following
//! segment is a nested sub-query whose projected property is compared against
//! the `link` property of its parent segment.
//!
//! ```text
//! bucketEntries.labBatch -> labBatches.batchName
//! └──── segment 0 ─────┘    └──── segment 1 ───┘
//!   hops: [bucketEntries]     hops: [labBatches]
//!   link: labBatch            property: batchName
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CatalogResult;
use crate::operator::FilterOperator;
use crate::parser;
use crate::value::Value;

/// One hop sequence within a criteria path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    hops: Vec<String>,
    link: Option<String>,
    parent: Option<usize>,
}

impl PathSegment {
    pub(crate) fn new(hops: Vec<String>, link: Option<String>, parent: Option<usize>) -> Self {
        Self { hops, link, parent }
    }

    /// Hop names, in order. For a nested segment the first hop names a projection.
    pub fn hops(&self) -> &[String] {
        &self.hops
    }

    /// Property correlated with the nested segment's sub-query.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    /// Index of the enclosing segment.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }
}

/// A filter that is always applied alongside a term's predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableTermFilter {
    /// Property on the same scope as the term's property.
    pub property: String,
    /// Comparison operator.
    pub operator: FilterOperator,
    /// Literal operands.
    #[serde(default)]
    pub values: Vec<Value>,
}

impl ImmutableTermFilter {
    /// Creates a filter.
    pub fn new(property: impl Into<String>, operator: FilterOperator, values: Vec<Value>) -> Self {
        Self {
            property: property.into(),
            operator,
            values,
        }
    }
}

/// The route from a scope to the property a term filters on.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaPath {
    segments: Vec<PathSegment>,
    property: String,
    filters: Vec<ImmutableTermFilter>,
    join_fetch: bool,
}

impl CriteriaPath {
    pub(crate) fn from_parts(segments: Vec<PathSegment>, property: String) -> Self {
        Self {
            segments,
            property,
            filters: Vec::new(),
            join_fetch: false,
        }
    }

    /// Parses the compact `hop.hop.property -> projection.property` form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigurationError::InvalidPath`] for malformed text.
    pub fn parse(text: &str) -> CatalogResult<Self> {
        parser::parse_criteria_path(text)
    }

    /// A property directly on the scope the term is compiled in.
    pub fn root(property: impl Into<String>) -> Self {
        Self::from_parts(
            vec![PathSegment::new(Vec::new(), None, None)],
            property.into(),
        )
    }

    /// A property reached through the given hops.
    pub fn through<I, S>(hops: I, property: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hops = hops.into_iter().map(Into::into).collect();
        Self::from_parts(vec![PathSegment::new(hops, None, None)], property.into())
    }

    /// Adds an immutable filter.
    pub fn with_filter(mut self, filter: ImmutableTermFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Sets the join-fetch hint.
    pub fn with_join_fetch(mut self, join_fetch: bool) -> Self {
        self.join_fetch = join_fetch;
        self
    }

    /// All segments, outermost first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The outermost segment.
    pub fn first_segment(&self) -> &PathSegment {
        // Construction guarantees at least one segment.
        &self.segments[0]
    }

    /// The compared property of the innermost segment.
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Immutable filters applied with the term's predicate.
    pub fn filters(&self) -> &[ImmutableTermFilter] {
        &self.filters
    }

    /// True when the entity should be fetched together with this association.
    pub fn join_fetch(&self) -> bool {
        self.join_fetch
    }

    /// True when the property sits directly on the compiling scope.
    pub fn is_root_property(&self) -> bool {
        self.segments.len() == 1 && self.segments[0].hops.is_empty()
    }

    /// True when the path crosses into at least one nested sub-query.
    pub fn is_nested(&self) -> bool {
        self.segments.len() > 1
    }

    /// Dotted association path for fetch hints, if the path has hops.
    pub fn join_fetch_path(&self) -> Option<String> {
        let hops = &self.first_segment().hops;
        if hops.is_empty() {
            None
        } else {
            Some(hops.join("."))
        }
    }

    /// Names of every projection this path references, in order.
    pub fn projection_names(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter_map(|segment| segment.hops.first().map(String::as_str))
    }
}

impl fmt::Display for CriteriaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.segments.len().saturating_sub(1);
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            for hop in &segment.hops {
                write!(f, "{}.", hop)?;
            }
            if i == last {
                write!(f, "{}", self.property)?;
            } else if let Some(link) = &segment.link {
                write!(f, "{}", link)?;
            }
        }
        Ok(())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => f.write_str("ASC"),
            OrderDirection::Desc => f.write_str("DESC"),
        }
    }
}

/// A requested sort: a dotted property path and a direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Association hops before the property.
    pub hops: Vec<String>,
    /// Sorted property.
    pub property: String,
    /// Direction.
    #[serde(default)]
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Sort by a property of the result entity.
    pub fn new(property: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            hops: Vec::new(),
            property: property.into(),
            direction,
        }
    }

    /// Parses `a.b.property [ASC|DESC]`.
    pub fn parse(text: &str) -> CatalogResult<Self> {
        parser::parse_order_spec(text)
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hop in &self.hops {
            write!(f, "{}.", hop)?;
        }
        write!(f, "{} {}", self.property, self.direction)
    }
}
