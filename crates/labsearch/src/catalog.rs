//! The immutable term catalog and its declarative source.
//!
//! A catalog is built once with [`CatalogBuilder::build`] and shared by
//! reference afterwards. Lookups are plain hash-map reads; there is no lazy
//! initialisation and no interior mutability.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogResult, ConfigurationError};
use crate::path::{CriteriaPath, ImmutableTermFilter};
use crate::term::{
    ConstrainedValuesProvider, TermBuilder, TermDefinition, TermId, ValueConverter,
};
use crate::value::{KeyType, ValueType};

/// The root entity every search returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntity {
    /// Entity type name.
    pub name: String,
    /// Primary-key property.
    pub id_property: String,
    /// Native key type.
    #[serde(default)]
    pub key_type: KeyType,
}

impl ResultEntity {
    /// Creates a result entity descriptor.
    pub fn new(name: impl Into<String>, id_property: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            id_property: id_property.into(),
            key_type,
        }
    }
}

/// How to materialise an independent sub-query.
///
/// The compiled shape is
/// `outer.super_property IN (SELECT sub_property FROM entity WHERE ...)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaProjection {
    /// Name referenced by the first hop of a criteria path.
    pub name: String,
    /// Entity type queried by the sub-query.
    pub entity: String,
    /// Property projected out of the sub-query.
    pub sub_property: String,
    /// Outer property compared against the projection.
    pub super_property: String,
}

impl CriteriaProjection {
    /// Creates a projection.
    pub fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        sub_property: impl Into<String>,
        super_property: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity: entity.into(),
            sub_property: sub_property.into(),
            super_property: super_property.into(),
        }
    }
}

/// Immutable collection of terms and projections for one result entity.
#[derive(Debug, Clone)]
pub struct TermCatalog {
    result_entity: ResultEntity,
    terms: Vec<TermDefinition>,
    by_name: HashMap<String, TermId>,
    top_level: Vec<TermId>,
    projections: HashMap<String, CriteriaProjection>,
}

impl TermCatalog {
    /// Starts building a catalog for the given result entity.
    pub fn builder(result_entity: ResultEntity) -> CatalogBuilder {
        CatalogBuilder::new(result_entity)
    }

    /// The root entity of the catalog.
    pub fn result_entity(&self) -> &ResultEntity {
        &self.result_entity
    }

    /// Looks up a term by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownTerm`] if the name is not defined.
    pub fn resolve_term(&self, name: &str) -> CatalogResult<&TermDefinition> {
        self.term_id(name).map(|id| self.term(id))
    }

    /// Looks up a term's arena id by name.
    pub fn term_id(&self, name: &str) -> CatalogResult<TermId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigurationError::UnknownTerm(name.to_string()))
    }

    /// Looks up a projection by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownProjection`] if the name is not defined.
    pub fn resolve_projection(&self, name: &str) -> CatalogResult<&CriteriaProjection> {
        self.projections
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownProjection(name.to_string()))
    }

    /// Returns the term stored at `id`.
    pub fn term(&self, id: TermId) -> &TermDefinition {
        &self.terms[id.0]
    }

    /// Terms without a parent, in declaration order.
    pub fn top_level_terms(&self) -> impl Iterator<Item = &TermDefinition> {
        self.top_level.iter().map(|id| self.term(*id))
    }

    /// Every required term, at any depth.
    pub fn required_terms(&self) -> impl Iterator<Item = &TermDefinition> {
        self.terms.iter().filter(|t| t.is_required())
    }

    /// Dependent terms of `term`.
    pub fn dependents_of<'a>(
        &'a self,
        term: &'a TermDefinition,
    ) -> impl Iterator<Item = &'a TermDefinition> + 'a {
        term.dependents().iter().map(|id| self.term(*id))
    }

    /// Returns true if `child` is declared as a dependent of `parent`.
    pub fn is_dependent(&self, parent: &str, child: &str) -> bool {
        match (self.by_name.get(parent), self.by_name.get(child)) {
            (Some(p), Some(c)) => self.term(*c).parent() == Some(*p),
            _ => false,
        }
    }

    /// Number of terms, including dependents.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns true if the catalog has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Builder that validates and freezes a [`TermCatalog`].
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    result_entity: ResultEntity,
    projections: Vec<CriteriaProjection>,
    terms: Vec<TermBuilder>,
    converters: Vec<(String, ValueConverter)>,
    providers: Vec<(String, ConstrainedValuesProvider)>,
}

impl CatalogBuilder {
    /// Creates an empty builder.
    pub fn new(result_entity: ResultEntity) -> Self {
        Self {
            result_entity,
            projections: Vec::new(),
            terms: Vec::new(),
            converters: Vec::new(),
            providers: Vec::new(),
        }
    }

    /// Reads a builder from the JSON form of [`CatalogSource`].
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let source: CatalogSource = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidCatalog(e.to_string()))?;
        Self::from_source(source)
    }

    /// Reads a builder from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::InvalidCatalog(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Converts a deserialized source into a builder.
    pub fn from_source(source: CatalogSource) -> CatalogResult<Self> {
        let mut builder = Self::new(source.result_entity);
        builder.projections = source.projections;
        for term in source.terms {
            builder.terms.push(term.into_builder()?);
        }
        Ok(builder)
    }

    /// Adds a projection.
    pub fn projection(mut self, projection: CriteriaProjection) -> Self {
        self.projections.push(projection);
        self
    }

    /// Adds a top-level term, with its dependents.
    pub fn term(mut self, term: TermBuilder) -> Self {
        self.terms.push(term);
        self
    }

    /// Attaches a value converter to a term by name.
    pub fn with_converter(mut self, term: impl Into<String>, converter: ValueConverter) -> Self {
        self.converters.push((term.into(), converter));
        self
    }

    /// Attaches a constrained-values provider to a term by name.
    pub fn with_constrained_values(
        mut self,
        term: impl Into<String>,
        provider: ConstrainedValuesProvider,
    ) -> Self {
        self.providers.push((term.into(), provider));
        self
    }

    /// Validates the definitions and returns the frozen catalog.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::DuplicateTerm`] / [`ConfigurationError::DuplicateProjection`]
    /// - [`ConfigurationError::UnknownProjection`] for a nested segment naming no projection
    /// - [`ConfigurationError::UnknownTerm`] for a hook attached to an undefined term
    pub fn build(self) -> CatalogResult<TermCatalog> {
        let mut projections = HashMap::with_capacity(self.projections.len());
        for projection in self.projections {
            if projections.contains_key(&projection.name) {
                return Err(ConfigurationError::DuplicateProjection(projection.name));
            }
            projections.insert(projection.name.clone(), projection);
        }

        let mut catalog = TermCatalog {
            result_entity: self.result_entity,
            terms: Vec::new(),
            by_name: HashMap::new(),
            top_level: Vec::new(),
            projections,
        };

        for term in self.terms {
            let id = flatten(&mut catalog, term, None)?;
            catalog.top_level.push(id);
        }

        for (name, converter) in self.converters {
            let id = catalog.term_id(&name)?;
            catalog.terms[id.0].converter = Some(converter);
        }
        for (name, provider) in self.providers {
            let id = catalog.term_id(&name)?;
            catalog.terms[id.0].constrained_values = Some(provider);
        }

        for term in &catalog.terms {
            for path in term.paths() {
                for segment in path.segments().iter().skip(1) {
                    if let Some(name) = segment.hops().first() {
                        catalog.resolve_projection(name)?;
                    }
                }
            }
        }

        tracing::debug!(
            terms = catalog.terms.len(),
            projections = catalog.projections.len(),
            "term catalog built"
        );
        Ok(catalog)
    }
}

fn flatten(
    catalog: &mut TermCatalog,
    builder: TermBuilder,
    parent: Option<TermId>,
) -> CatalogResult<TermId> {
    let TermBuilder {
        mut definition,
        dependents,
    } = builder;

    if catalog.by_name.contains_key(&definition.name) {
        return Err(ConfigurationError::DuplicateTerm(definition.name));
    }

    let id = TermId(catalog.terms.len());
    definition.parent = parent;
    definition.dependents.clear();
    catalog.by_name.insert(definition.name.clone(), id);
    catalog.terms.push(definition);

    for child in dependents {
        let child_id = flatten(catalog, child, Some(id))?;
        catalog.terms[id.0].dependents.push(child_id);
    }
    Ok(id)
}

// ============================================================================
// Declarative source
// ============================================================================

/// Serializable description of a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSource {
    /// Root entity.
    pub result_entity: ResultEntity,
    /// Sub-query projections.
    #[serde(default)]
    pub projections: Vec<CriteriaProjection>,
    /// Top-level terms.
    pub terms: Vec<TermSource>,
}

/// Serializable description of one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermSource {
    /// Unique name.
    pub name: String,
    /// Criteria paths.
    #[serde(default)]
    pub paths: Vec<PathSource>,
    /// Value type.
    #[serde(default)]
    pub value_type: ValueType,
    /// Required flag.
    #[serde(default)]
    pub required: bool,
    /// Nested-parent flag.
    #[serde(default)]
    pub nested_parent: bool,
    /// Exclusive flag.
    #[serde(default)]
    pub exclusive: bool,
    /// Always-new-sub-query flag.
    #[serde(default)]
    pub new_subquery: bool,
    /// Case-insensitive flag.
    #[serde(default)]
    pub case_insensitive: bool,
    /// Literal restriction.
    #[serde(default)]
    pub literal_restriction: Option<String>,
    /// Constant value.
    #[serde(default)]
    pub constant_value: Option<String>,
    /// Dependent terms.
    #[serde(default)]
    pub dependents: Vec<TermSource>,
}

/// Serializable description of one criteria path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSource {
    /// Compact path text.
    pub path: String,
    /// Immutable filters.
    #[serde(default)]
    pub filters: Vec<ImmutableTermFilter>,
    /// Join-fetch hint.
    #[serde(default)]
    pub join_fetch: bool,
}

impl TermSource {
    fn into_builder(self) -> CatalogResult<TermBuilder> {
        let mut builder = TermBuilder::new(self.name)
            .value_type(self.value_type)
            .required(self.required)
            .nested_parent(self.nested_parent)
            .exclusive(self.exclusive)
            .new_subquery(self.new_subquery)
            .case_insensitive(self.case_insensitive);

        for source in self.paths {
            let mut path = CriteriaPath::parse(&source.path)?.with_join_fetch(source.join_fetch);
            for filter in source.filters {
                path = path.with_filter(filter);
            }
            builder = builder.path(path);
        }
        if let Some(literal) = self.literal_restriction {
            builder = builder.literal_restriction(literal);
        }
        if let Some(constant) = self.constant_value {
            builder = builder.constant_value(constant);
        }
        for child in self.dependents {
            builder = builder.dependent(child.into_builder()?);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ValidationError;
    use crate::operator::FilterOperator;
    use crate::term::{ConstrainedValue, ConstraintContext, ConversionContext};
    use crate::value::{ConvertedValue, Value};

    fn vessel() -> ResultEntity {
        ResultEntity::new("LabVessel", "labVesselId", KeyType::Long)
    }

    fn drop_all(_raw: &str, _ctx: &ConversionContext<'_>) -> Result<ConvertedValue, ValidationError> {
        Ok(ConvertedValue::Drop)
    }

    fn yes_no(_ctx: &ConstraintContext<'_>) -> Vec<ConstrainedValue> {
        vec![ConstrainedValue::new("Y", "Yes"), ConstrainedValue::new("N", "No")]
    }

    fn sample_catalog() -> TermCatalog {
        TermCatalog::builder(vessel())
            .projection(CriteriaProjection::new(
                "mercurySamples",
                "MercurySample",
                "labVessel",
                "labVesselId",
            ))
            .term(TermDefinition::builder("Barcode").path(CriteriaPath::root("label")))
            .term(
                TermDefinition::builder("Metadata")
                    .path(CriteriaPath::through(["mercurySamples", "metadata"], "key"))
                    .dependent(
                        TermDefinition::builder("Metadata Value")
                            .path(CriteriaPath::through(["mercurySamples", "metadata"], "value")),
                    ),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_term_and_projection() {
        let catalog = sample_catalog();
        assert_eq!(catalog.resolve_term("Barcode").unwrap().name(), "Barcode");
        assert_eq!(
            catalog.resolve_projection("mercurySamples").unwrap().entity,
            "MercurySample"
        );
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_unknown_names_are_configuration_errors() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.resolve_term("Nope").unwrap_err(),
            ConfigurationError::UnknownTerm("Nope".to_string())
        );
        assert_eq!(
            catalog.resolve_projection("nope").unwrap_err(),
            ConfigurationError::UnknownProjection("nope".to_string())
        );
    }

    #[test]
    fn test_dependents_are_indexed() {
        let catalog = sample_catalog();
        let metadata = catalog.resolve_term("Metadata").unwrap();
        let names: Vec<_> = catalog.dependents_of(metadata).map(|t| t.name()).collect();
        assert_eq!(names, vec!["Metadata Value"]);
        assert!(catalog.is_dependent("Metadata", "Metadata Value"));
        assert!(!catalog.is_dependent("Barcode", "Metadata Value"));
        let top: Vec<_> = catalog.top_level_terms().map(|t| t.name()).collect();
        assert_eq!(top, vec!["Barcode", "Metadata"]);
    }

    #[test]
    fn test_duplicate_term_rejected_across_levels() {
        let err = TermCatalog::builder(vessel())
            .term(
                TermDefinition::builder("A").dependent(TermDefinition::builder("B")),
            )
            .term(TermDefinition::builder("B"))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateTerm("B".to_string()));
    }

    #[test]
    fn test_duplicate_projection_rejected() {
        let p = CriteriaProjection::new("p", "E", "a", "b");
        let err = TermCatalog::builder(vessel())
            .projection(p.clone())
            .projection(p)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateProjection("p".to_string()));
    }

    #[test]
    fn test_nested_segment_must_name_projection() {
        let err = TermCatalog::builder(vessel())
            .term(
                TermDefinition::builder("Batch")
                    .path(CriteriaPath::parse("bucketEntries.labBatch -> missing.batchName").unwrap()),
            )
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownProjection("missing".to_string()));
    }

    #[test]
    fn test_hooks_attached_by_name() {
        let catalog = TermCatalog::builder(vessel())
            .term(TermDefinition::builder("Flag").path(CriteriaPath::root("flag")))
            .with_converter("Flag", drop_all)
            .with_constrained_values("Flag", yes_no)
            .build()
            .unwrap();
        let term = catalog.resolve_term("Flag").unwrap();
        assert!(term.converter().is_some());
        assert!(term.constrained_values_provider().is_some());
    }

    #[test]
    fn test_hook_for_unknown_term_rejected() {
        let err = TermCatalog::builder(vessel())
            .with_converter("Ghost", drop_all)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownTerm("Ghost".to_string()));
    }

    const CATALOG_JSON: &str = r#"{
        "result_entity": {"name": "LabVessel", "id_property": "labVesselId", "key_type": "long"},
        "projections": [
            {"name": "bucketEntries", "entity": "BucketEntry", "sub_property": "labVessel", "super_property": "labVesselId"},
            {"name": "labBatches", "entity": "LabBatch", "sub_property": "labBatchId", "super_property": "labBatchId"}
        ],
        "terms": [
            {"name": "Barcode", "paths": [{"path": "label"}], "case_insensitive": true},
            {"name": "Batch",
             "paths": [{"path": "bucketEntries.labBatch -> labBatches.batchName",
                        "filters": [{"property": "labBatchType", "operator": "EQUALS", "values": ["WORKFLOW"]}],
                        "join_fetch": true}],
             "dependents": [{"name": "Batch Created", "value_type": "date",
                             "paths": [{"path": "bucketEntries.labBatch -> labBatches.createdOn"}]}]}
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let catalog = CatalogBuilder::from_json(CATALOG_JSON).unwrap().build().unwrap();
        assert_eq!(catalog.result_entity().id_property, "labVesselId");
        let batch = catalog.resolve_term("Batch").unwrap();
        let path = &batch.paths()[0];
        assert!(path.is_nested());
        assert!(path.join_fetch());
        assert_eq!(
            path.filters()[0],
            ImmutableTermFilter::new("labBatchType", FilterOperator::Equals, vec![Value::from("WORKFLOW")])
        );
        assert_eq!(
            catalog.resolve_term("Batch Created").unwrap().value_type(),
            ValueType::Date
        );
        assert!(catalog.resolve_term("Barcode").unwrap().is_case_insensitive());
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let err = CatalogBuilder::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCatalog(_)));
    }

    #[test]
    fn test_from_json_rejects_bad_path() {
        let json = r#"{"result_entity": {"name": "E", "id_property": "id"},
                       "terms": [{"name": "T", "paths": [{"path": "a..b"}]}]}"#;
        let err = CatalogBuilder::from_json(json).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPath { .. }));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG_JSON.as_bytes()).unwrap();
        let catalog = CatalogBuilder::from_path(file.path()).unwrap().build().unwrap();
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = CatalogBuilder::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCatalog(_)));
    }
}
