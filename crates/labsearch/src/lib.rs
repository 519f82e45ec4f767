//! # labsearch
//!
//! Declarative search terms and user predicate trees for laboratory entity
//! search.
//!
//! This crate provides:
//! - **Term Catalog**: immutable named terms with criteria paths into the entity graph
//! - **Criteria Paths**: a compact `hop.hop.property -> projection.property` notation
//! - **Search Instance**: the user-populated tree of term/operator/value nodes
//!
//! Compilation into an executable query lives in `labsearch-executor`.
//!
//! ## Catalog Usage
//!
//! ```rust
//! use labsearch::{
//!     CriteriaPath, CriteriaProjection, KeyType, ResultEntity, TermCatalog, TermDefinition,
//! };
//!
//! let catalog = TermCatalog::builder(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long))
//!     .projection(CriteriaProjection::new(
//!         "mercurySamples", "MercurySample", "labVessel", "labVesselId",
//!     ))
//!     .term(TermDefinition::builder("Barcode").path(CriteriaPath::root("label")))
//!     .term(
//!         TermDefinition::builder("Sample ID")
//!             .path(CriteriaPath::parse("mercurySamples.sampleKey").unwrap()),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(catalog.resolve_term("Barcode").is_ok());
//! ```
//!
//! ## Search Usage
//!
//! ```rust
//! # use labsearch::{CriteriaPath, KeyType, ResultEntity, TermCatalog, TermDefinition};
//! use labsearch::{Operator, SearchInstance};
//! # let catalog = TermCatalog::builder(ResultEntity::new("LabVessel", "labVesselId", KeyType::Long))
//! #     .term(TermDefinition::builder("Barcode").path(CriteriaPath::root("label")))
//! #     .build()
//! #     .unwrap();
//!
//! let mut search = SearchInstance::new();
//! let barcode = search.add_top_level_term("Barcode", &catalog).unwrap();
//! search.value_mut(barcode).set_operator(Operator::In);
//! search.value_mut(barcode).set_values(["0123\n0124"]);
//! assert!(search.check_values(&catalog).unwrap());
//! ```
//!
//! ## Path Notation
//!
//! | Text | Meaning |
//! |------|---------|
//! | `label` | Property of the compiling scope |
//! | `mercurySamples.sampleKey` | Through hop `mercurySamples` |
//! | `bucketEntries.labBatch -> labBatches.batchName` | `labBatch` IN nested sub-query on `labBatches` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod catalog;
mod error;
mod instance;
mod operator;
mod parser;
mod path;
mod term;
mod value;

pub use catalog::{
    CatalogBuilder, CatalogSource, CriteriaProjection, PathSource, ResultEntity, TermCatalog,
    TermSource,
};
pub use error::{CatalogResult, ConfigurationError, ValidationError, ValidationErrors};
pub use instance::{
    CustomTraversal, Direction, SearchInstance, SearchValue, ValueId, CHOOSE_VALUE,
    CONSTRAINED_DISPLAY_LIMIT,
};
pub use operator::{FilterOperator, Operator};
pub use parser::{parse_criteria_path, parse_order_spec};
pub use path::{CriteriaPath, ImmutableTermFilter, OrderDirection, OrderSpec, PathSegment};
pub use term::{
    ConstrainedValue, ConstrainedValuesProvider, ConstraintContext, ConversionContext,
    TermBuilder, TermDefinition, TermId, ValueConverter,
};
pub use value::{convert_raw, parse_date, ConvertedValue, EntityId, KeyType, Value, ValueType};
