//! Term definitions and the function hooks attached to them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::TermCatalog;
use crate::error::ValidationError;
use crate::operator::Operator;
use crate::path::CriteriaPath;
use crate::value::{ConvertedValue, ValueType};

/// Index of a term inside its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(pub(crate) usize);

impl TermId {
    /// Raw arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Context handed to a [`ValueConverter`].
#[derive(Debug, Clone, Copy)]
pub struct ConversionContext<'a> {
    /// Term being converted.
    pub term: &'a str,
    /// Operator chosen by the user.
    pub operator: Operator,
    /// Declared value type of the term.
    pub value_type: ValueType,
    /// Every raw value of the search value, after line splitting.
    pub raw_values: &'a [String],
}

/// Converts one raw value; authoritative over the declared value type.
pub type ValueConverter =
    fn(&str, &ConversionContext<'_>) -> Result<ConvertedValue, ValidationError>;

/// Context handed to a [`ConstrainedValuesProvider`].
#[derive(Debug, Clone, Copy)]
pub struct ConstraintContext<'a> {
    /// Term whose choices are requested.
    pub term: &'a str,
    /// Raw values of the parent search value, if any.
    pub parent_values: &'a [String],
}

/// One selectable choice for a constrained term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstrainedValue {
    /// Value submitted with the search.
    pub code: String,
    /// Value shown to the user.
    pub label: String,
}

impl ConstrainedValue {
    /// Creates a choice.
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Lists the permitted values of a term.
pub type ConstrainedValuesProvider = fn(&ConstraintContext<'_>) -> Vec<ConstrainedValue>;

/// A named, reusable search criterion.
#[derive(Debug, Clone)]
pub struct TermDefinition {
    pub(crate) name: String,
    pub(crate) paths: Vec<CriteriaPath>,
    pub(crate) value_type: ValueType,
    pub(crate) required: bool,
    pub(crate) nested_parent: bool,
    pub(crate) exclusive: bool,
    pub(crate) new_subquery: bool,
    pub(crate) case_insensitive: bool,
    pub(crate) literal_restriction: Option<String>,
    pub(crate) constant_value: Option<String>,
    pub(crate) converter: Option<ValueConverter>,
    pub(crate) constrained_values: Option<ConstrainedValuesProvider>,
    pub(crate) alternate_definition: Option<Arc<TermCatalog>>,
    pub(crate) parent: Option<TermId>,
    pub(crate) dependents: Vec<TermId>,
}

impl TermDefinition {
    /// Starts building a term.
    pub fn builder(name: impl Into<String>) -> TermBuilder {
        TermBuilder::new(name)
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Criteria paths; a match on any of them satisfies the term.
    pub fn paths(&self) -> &[CriteriaPath] {
        &self.paths
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Whether a value must be supplied.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the term groups nested children in the UI.
    pub fn is_nested_parent(&self) -> bool {
        self.nested_parent
    }

    /// Whether the term must be the only top-level term.
    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Whether every path always starts a new sub-query.
    pub fn new_subquery(&self) -> bool {
        self.new_subquery
    }

    /// Whether comparisons ignore case.
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Raw restriction contributed verbatim.
    pub fn literal_restriction(&self) -> Option<&str> {
        self.literal_restriction.as_deref()
    }

    /// Value assigned automatically when the term is added.
    pub fn constant_value(&self) -> Option<&str> {
        self.constant_value.as_deref()
    }

    /// Registered value converter.
    pub fn converter(&self) -> Option<ValueConverter> {
        self.converter
    }

    /// Registered constrained-values provider.
    pub fn constrained_values_provider(&self) -> Option<ConstrainedValuesProvider> {
        self.constrained_values
    }

    /// Catalog searched instead when this term is the only top-level term.
    ///
    /// The alternate catalog defines a term of the same name with its own
    /// paths; its results are mapped back to this catalog's result entity.
    pub fn alternate_definition(&self) -> Option<&Arc<TermCatalog>> {
        self.alternate_definition.as_ref()
    }

    /// Term this one depends on.
    pub fn parent(&self) -> Option<TermId> {
        self.parent
    }

    /// Dependent child terms.
    pub fn dependents(&self) -> &[TermId] {
        &self.dependents
    }

    /// True when the term contributes to the query at all.
    pub fn has_criteria(&self) -> bool {
        !self.paths.is_empty() || self.literal_restriction.is_some()
    }

    /// Join-fetch hints of every path that asks for one.
    pub fn join_fetch_paths(&self) -> Vec<String> {
        self.paths
            .iter()
            .filter(|p| p.join_fetch())
            .filter_map(CriteriaPath::join_fetch_path)
            .collect()
    }
}

/// Builder for [`TermDefinition`].
///
/// # Example
///
/// ```rust
/// use labsearch::{CriteriaPath, TermDefinition, ValueType};
///
/// let term = TermDefinition::builder("Sample ID")
///     .path(CriteriaPath::through(["mercurySamples"], "sampleKey"))
///     .value_type(ValueType::String)
///     .case_insensitive(true);
/// ```
#[derive(Debug, Clone)]
pub struct TermBuilder {
    pub(crate) definition: TermDefinition,
    pub(crate) dependents: Vec<TermBuilder>,
}

impl TermBuilder {
    /// Creates a builder for a term with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            definition: TermDefinition {
                name: name.into(),
                paths: Vec::new(),
                value_type: ValueType::String,
                required: false,
                nested_parent: false,
                exclusive: false,
                new_subquery: false,
                case_insensitive: false,
                literal_restriction: None,
                constant_value: None,
                converter: None,
                constrained_values: None,
                alternate_definition: None,
                parent: None,
                dependents: Vec::new(),
            },
            dependents: Vec::new(),
        }
    }

    /// Adds a criteria path.
    pub fn path(mut self, path: CriteriaPath) -> Self {
        self.definition.paths.push(path);
        self
    }

    /// Sets the value type.
    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.definition.value_type = value_type;
        self
    }

    /// Marks the term as required.
    pub fn required(mut self, required: bool) -> Self {
        self.definition.required = required;
        self
    }

    /// Marks the term as a nested parent.
    pub fn nested_parent(mut self, nested_parent: bool) -> Self {
        self.definition.nested_parent = nested_parent;
        self
    }

    /// Marks the term as exclusive.
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.definition.exclusive = exclusive;
        self
    }

    /// Forces a new sub-query for every path.
    pub fn new_subquery(mut self, new_subquery: bool) -> Self {
        self.definition.new_subquery = new_subquery;
        self
    }

    /// Makes comparisons case-insensitive.
    pub fn case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.definition.case_insensitive = case_insensitive;
        self
    }

    /// Attaches a literal restriction.
    pub fn literal_restriction(mut self, literal: impl Into<String>) -> Self {
        self.definition.literal_restriction = Some(literal.into());
        self
    }

    /// Sets a constant value.
    pub fn constant_value(mut self, value: impl Into<String>) -> Self {
        self.definition.constant_value = Some(value.into());
        self
    }

    /// Registers a value converter.
    pub fn converter(mut self, converter: ValueConverter) -> Self {
        self.definition.converter = Some(converter);
        self
    }

    /// Registers a constrained-values provider.
    pub fn constrained_values(mut self, provider: ConstrainedValuesProvider) -> Self {
        self.definition.constrained_values = Some(provider);
        self
    }

    /// Searches `catalog` instead when this term stands alone; implies exclusive.
    pub fn alternate_definition(mut self, catalog: Arc<TermCatalog>) -> Self {
        self.definition.alternate_definition = Some(catalog);
        self.definition.exclusive = true;
        self
    }

    /// Adds a dependent child term.
    pub fn dependent(mut self, child: TermBuilder) -> Self {
        self.dependents.push(child);
        self
    }

    /// Name of the term under construction.
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_upper(raw: &str, _ctx: &ConversionContext<'_>) -> Result<ConvertedValue, ValidationError> {
        Ok(ConvertedValue::Single(raw.to_uppercase().into()))
    }

    fn no_choices(_ctx: &ConstraintContext<'_>) -> Vec<ConstrainedValue> {
        Vec::new()
    }

    #[test]
    fn test_builder_sets_flags() {
        let builder = TermDefinition::builder("Batch")
            .path(CriteriaPath::through(["labBatches"], "batchName").with_join_fetch(true))
            .required(true)
            .exclusive(true)
            .new_subquery(true)
            .case_insensitive(true)
            .converter(to_upper)
            .constrained_values(no_choices);
        let term = builder.definition;
        assert_eq!(term.name(), "Batch");
        assert!(term.is_required());
        assert!(term.is_exclusive());
        assert!(term.new_subquery());
        assert!(term.is_case_insensitive());
        assert!(term.converter().is_some());
        assert!(term.constrained_values_provider().is_some());
        assert!(term.has_criteria());
        assert_eq!(term.join_fetch_paths(), vec!["labBatches".to_string()]);
    }

    #[test]
    fn test_term_without_paths_has_no_criteria() {
        let term = TermDefinition::builder("Group").definition;
        assert!(!term.has_criteria());
        let literal = TermDefinition::builder("Active")
            .literal_restriction("status = 'ACTIVE'")
            .definition;
        assert!(literal.has_criteria());
        assert_eq!(literal.literal_restriction(), Some("status = 'ACTIVE'"));
    }

    #[test]
    fn test_converter_is_callable() {
        let term = TermDefinition::builder("Name").converter(to_upper).definition;
        let raw = vec!["abc".to_string()];
        let ctx = ConversionContext {
            term: term.name(),
            operator: Operator::Equals,
            value_type: term.value_type(),
            raw_values: &raw,
        };
        let converted = (term.converter().unwrap())("abc", &ctx).unwrap();
        assert_eq!(converted, ConvertedValue::Single("ABC".into()));
    }
}
