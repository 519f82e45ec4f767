//! The user-populated predicate tree of one search request.
//!
//! A [`SearchInstance`] stores its [`SearchValue`] nodes in an arena indexed
//! by [`ValueId`]. Nodes mirror the dependent-term tree of the catalog: a
//! child node may only be attached under a node whose term declares the
//! child's term as a dependent.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::TermCatalog;
use crate::error::{CatalogResult, ConfigurationError, ValidationError};
use crate::operator::Operator;
use crate::term::{ConstrainedValue, ConstraintContext, ConversionContext, TermDefinition};
use crate::value::{convert_raw, ConvertedValue};

/// Placeholder submitted by an untouched drop-down.
pub const CHOOSE_VALUE: &str = "(Choose one)";

/// Constrained lists at least this long are shown as free text.
pub const CONSTRAINED_DISPLAY_LIMIT: usize = 1000;

/// Index of a node inside its [`SearchInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(usize);

impl ValueId {
    /// Raw arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Direction of a lineage traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards the sources of transfers.
    Ancestors,
    /// Towards the targets of transfers.
    Descendants,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ancestors => f.write_str("ancestors"),
            Direction::Descendants => f.write_str("descendants"),
        }
    }
}

/// A custom traversal option chosen alongside the search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTraversal {
    /// Registry key of the custom evaluator.
    pub option: String,
    /// Direction to walk.
    pub direction: Direction,
}

/// One node of the predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchValue {
    term: String,
    #[serde(default)]
    operator: Operator,
    #[serde(default)]
    values: Vec<String>,
    parent: Option<ValueId>,
    #[serde(default)]
    children: Vec<ValueId>,
    #[serde(skip)]
    participates: bool,
}

impl SearchValue {
    fn new(term: &str, parent: Option<ValueId>) -> Self {
        Self {
            term: term.to_string(),
            operator: Operator::Equals,
            values: Vec::new(),
            parent,
            children: Vec::new(),
            participates: false,
        }
    }

    /// Name of the referenced term.
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Chosen operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Raw values as entered.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Parent node.
    pub fn parent(&self) -> Option<ValueId> {
        self.parent
    }

    /// Child nodes.
    pub fn children(&self) -> &[ValueId] {
        &self.children
    }

    /// Flag stored by the last [`SearchInstance::check_values`].
    pub fn participates(&self) -> bool {
        self.participates
    }

    /// Sets the operator.
    pub fn set_operator(&mut self, operator: Operator) {
        self.operator = operator;
    }

    /// Replaces the raw values.
    pub fn set_values<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
    }

    /// True when the first value is neither blank nor the placeholder.
    pub fn has_value(&self) -> bool {
        match self.values.first() {
            Some(first) => !first.trim().is_empty() && first != CHOOSE_VALUE,
            None => false,
        }
    }
}

/// A search request: predicate tree plus traversal choices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchInstance {
    nodes: Vec<SearchValue>,
    roots: Vec<ValueId>,
    #[serde(default)]
    traversals: BTreeMap<String, bool>,
    #[serde(default)]
    custom_traversal: Option<CustomTraversal>,
    #[serde(default)]
    exclude_initial_entities: bool,
    #[serde(default)]
    page_size: Option<usize>,
}

impl SearchInstance {
    /// Creates an empty search.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Tree construction
    // ------------------------------------------------------------------

    /// Adds a top-level node for `name`.
    ///
    /// A term with a constant value is populated immediately, with the
    /// EQUALS operator and nodes for its dependent terms.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnknownTerm`] if the term is not in the catalog.
    pub fn add_top_level_term(&mut self, name: &str, catalog: &TermCatalog) -> CatalogResult<ValueId> {
        let term = catalog.resolve_term(name)?;
        let id = self.push(term.name(), None);
        self.roots.push(id);
        self.apply_constant(id, term, catalog);
        Ok(id)
    }

    /// Adds a child node under `parent`.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnknownTerm`] or [`ConfigurationError::NotADependent`].
    pub fn add_child(
        &mut self,
        parent: ValueId,
        name: &str,
        catalog: &TermCatalog,
    ) -> CatalogResult<ValueId> {
        let term = catalog.resolve_term(name)?;
        let parent_term = self.nodes[parent.0].term.clone();
        if !catalog.is_dependent(&parent_term, term.name()) {
            return Err(ConfigurationError::NotADependent {
                parent: parent_term,
                child: term.name().to_string(),
            });
        }
        let id = self.push(term.name(), Some(parent));
        self.nodes[parent.0].children.push(id);
        self.apply_constant(id, term, catalog);
        Ok(id)
    }

    /// Adds a child node for every dependent term of the node's term.
    pub fn add_dependent_values(&mut self, id: ValueId, catalog: &TermCatalog) -> CatalogResult<Vec<ValueId>> {
        let term = catalog.resolve_term(&self.nodes[id.0].term)?;
        let names: Vec<String> = catalog
            .dependents_of(term)
            .map(|t| t.name().to_string())
            .collect();
        names
            .iter()
            .map(|name| self.add_child(id, name, catalog))
            .collect()
    }

    /// Adds a top-level node for every required term not yet present.
    pub fn add_required(&mut self, catalog: &TermCatalog) -> CatalogResult<()> {
        let missing: Vec<String> = catalog
            .top_level_terms()
            .filter(|t| t.is_required())
            .filter(|t| !self.roots.iter().any(|r| self.nodes[r.0].term == t.name()))
            .map(|t| t.name().to_string())
            .collect();
        for name in missing {
            self.add_top_level_term(&name, catalog)?;
        }
        Ok(())
    }

    fn push(&mut self, term: &str, parent: Option<ValueId>) -> ValueId {
        let id = ValueId(self.nodes.len());
        self.nodes.push(SearchValue::new(term, parent));
        id
    }

    fn apply_constant(&mut self, id: ValueId, term: &TermDefinition, catalog: &TermCatalog) {
        let Some(constant) = term.constant_value() else {
            return;
        };
        let node = &mut self.nodes[id.0];
        node.values = vec![constant.to_string()];
        node.operator = Operator::Equals;
        let dependents: Vec<String> = catalog
            .dependents_of(term)
            .map(|t| t.name().to_string())
            .collect();
        for name in dependents {
            // Dependents come from the catalog itself, so they always resolve.
            if let Ok(child) = catalog.resolve_term(&name) {
                let child_id = self.push(child.name(), Some(id));
                self.nodes[id.0].children.push(child_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Top-level nodes in insertion order.
    pub fn roots(&self) -> &[ValueId] {
        &self.roots
    }

    /// Returns the node at `id`.
    pub fn value(&self, id: ValueId) -> &SearchValue {
        &self.nodes[id.0]
    }

    /// Returns the node at `id` for editing.
    pub fn value_mut(&mut self, id: ValueId) -> &mut SearchValue {
        &mut self.nodes[id.0]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the search has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds the first node referencing `term`.
    pub fn find(&self, term: &str) -> Option<ValueId> {
        self.nodes
            .iter()
            .position(|n| n.term == term)
            .map(ValueId)
    }

    // ------------------------------------------------------------------
    // Participation and validation
    // ------------------------------------------------------------------

    /// Computes which nodes participate, without storing the result.
    ///
    /// A node participates when it has a value, carries a literal
    /// restriction, or has at least one participating child.
    pub fn participation(&self, catalog: &TermCatalog) -> CatalogResult<Vec<bool>> {
        let mut flags = vec![false; self.nodes.len()];
        for root in &self.roots {
            self.mark(*root, catalog, &mut flags)?;
        }
        Ok(flags)
    }

    fn mark(&self, id: ValueId, catalog: &TermCatalog, flags: &mut [bool]) -> CatalogResult<bool> {
        let node = &self.nodes[id.0];
        let term = catalog.resolve_term(&node.term)?;
        let mut any_child = false;
        for child in &node.children {
            // Every child is visited so its own flag is stored.
            if self.mark(*child, catalog, flags)? {
                any_child = true;
            }
        }
        let participates =
            node.has_value() || term.literal_restriction().is_some() || any_child;
        flags[id.0] = participates;
        Ok(participates)
    }

    /// Computes and stores participation; returns true if any top-level node participates.
    pub fn check_values(&mut self, catalog: &TermCatalog) -> CatalogResult<bool> {
        let flags = self.participation(catalog)?;
        for (node, flag) in self.nodes.iter_mut().zip(&flags) {
            node.participates = *flag;
        }
        Ok(self.roots.iter().any(|r| flags[r.0]))
    }

    /// Collects every validation problem of the search.
    ///
    /// The outer result carries configuration errors such as unknown term
    /// names; the inner list is empty for a valid search.
    pub fn validate(&self, catalog: &TermCatalog) -> CatalogResult<Vec<ValidationError>> {
        let flags = self.participation(catalog)?;
        let mut errors = Vec::new();

        if !self.roots.iter().any(|r| flags[r.0]) {
            errors.push(ValidationError::NoSearchValues);
        }

        for (i, node) in self.nodes.iter().enumerate() {
            let term = catalog.resolve_term(&node.term)?;
            if term.is_required() && !flags[i] {
                errors.push(ValidationError::MissingRequiredValue(node.term.clone()));
            }
        }
        for term in catalog.top_level_terms().filter(|t| t.is_required()) {
            if !self.roots.iter().any(|r| self.nodes[r.0].term == term.name()) {
                errors.push(ValidationError::MissingRequiredValue(term.name().to_string()));
            }
        }

        if self.roots.len() > 1 {
            for root in &self.roots {
                let term = catalog.resolve_term(&self.nodes[root.0].term)?;
                if term.is_exclusive() {
                    errors.push(ValidationError::ExclusiveViolation(term.name().to_string()));
                }
            }
        }
        Ok(errors)
    }

    /// Alternate catalog to search instead of `catalog`.
    ///
    /// Only a search with a single top-level node whose term carries an
    /// alternate definition has one.
    pub fn alternate_definition<'c>(
        &self,
        catalog: &'c TermCatalog,
    ) -> CatalogResult<Option<&'c Arc<TermCatalog>>> {
        match self.roots.as_slice() {
            [only] => Ok(catalog
                .resolve_term(&self.nodes[only.0].term)?
                .alternate_definition()),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Value conversion
    // ------------------------------------------------------------------

    /// Lists the permitted values for a node's term, if it is constrained.
    pub fn constrained_values(
        &self,
        id: ValueId,
        catalog: &TermCatalog,
    ) -> CatalogResult<Vec<ConstrainedValue>> {
        let term = catalog.resolve_term(&self.nodes[id.0].term)?;
        Ok(self.constrained_for(id, term))
    }

    fn constrained_for(&self, id: ValueId, term: &TermDefinition) -> Vec<ConstrainedValue> {
        let Some(provider) = term.constrained_values_provider() else {
            return Vec::new();
        };
        let parent_values = self.nodes[id.0]
            .parent
            .map(|p| self.nodes[p.0].values.as_slice())
            .unwrap_or(&[]);
        provider(&ConstraintContext {
            term: term.name(),
            parent_values,
        })
    }

    /// Raw values after splitting free-text lists on line breaks.
    pub fn effective_raw_values(&self, id: ValueId, term: &TermDefinition) -> Vec<String> {
        let node = &self.nodes[id.0];
        if node.operator.is_list() && node.values.len() == 1 {
            let choices = self.constrained_for(id, term);
            let shows_list = !choices.is_empty() && choices.len() < CONSTRAINED_DISPLAY_LIMIT;
            if !shows_list {
                return node.values[0]
                    .lines()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect();
            }
        }
        node.values.clone()
    }

    /// Converts a node's raw values to typed values.
    ///
    /// A registered converter is authoritative; otherwise the term's value
    /// type decides.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] produced by a conversion.
    pub fn convert_values(
        &self,
        id: ValueId,
        term: &TermDefinition,
    ) -> Result<Vec<ConvertedValue>, ValidationError> {
        let raw_values = self.effective_raw_values(id, term);
        let operator = self.nodes[id.0].operator;
        match term.converter() {
            Some(converter) => {
                let ctx = ConversionContext {
                    term: term.name(),
                    operator,
                    value_type: term.value_type(),
                    raw_values: &raw_values,
                };
                raw_values.iter().map(|raw| converter(raw, &ctx)).collect()
            }
            None => raw_values
                .iter()
                .map(|raw| convert_raw(term.name(), raw, term.value_type()).map(ConvertedValue::Single))
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Traversal choices
    // ------------------------------------------------------------------

    /// Ticks or unticks a standard traversal evaluator.
    pub fn select_traversal(&mut self, key: impl Into<String>, selected: bool) {
        self.traversals.insert(key.into(), selected);
    }

    /// Keys of ticked standard evaluators, in key order.
    pub fn selected_traversals(&self) -> impl Iterator<Item = &str> {
        self.traversals
            .iter()
            .filter(|(_, selected)| **selected)
            .map(|(key, _)| key.as_str())
    }

    /// Chooses a custom traversal option.
    pub fn set_custom_traversal(&mut self, custom: Option<CustomTraversal>) {
        self.custom_traversal = custom;
    }

    /// The chosen custom traversal option.
    pub fn custom_traversal(&self) -> Option<&CustomTraversal> {
        self.custom_traversal.as_ref()
    }

    /// True when any traversal, standard or custom, is selected.
    pub fn is_traversal_selected(&self) -> bool {
        self.selected_traversals().next().is_some() || self.custom_traversal.is_some()
    }

    /// Whether the initial result entities are left out of traversal results.
    pub fn exclude_initial_entities(&self) -> bool {
        self.exclude_initial_entities
    }

    /// Sets whether the initial result entities are left out of traversal results.
    pub fn set_exclude_initial_entities(&mut self, exclude: bool) {
        self.exclude_initial_entities = exclude;
    }

    /// Requested page size.
    pub fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    /// Sets the requested page size.
    pub fn set_page_size(&mut self, page_size: Option<usize>) {
        self.page_size = page_size;
    }
}
