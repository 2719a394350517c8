//! Relex Extractor - Relation extraction between entity mentions
//!
//! Given a sentence's syntax tree, propositions and entity mentions, decides
//! whether two mentions are related and assigns a relation type.
//!
//! - [`prop_link`] resolves the proposition linking a mention pair
//! - [`observation`] gathers the lexical and syntactic context of a pair
//! - [`instance`] is the fixed-arity summary encoded in training vectors
//! - [`feature`] turns observations into typed feature tuples
//! - [`maxent`] trains and scores maximum-entropy models
//! - [`model`] is the two-stage relation model over training vectors
//! - [`trainer`] trains observation models from an annotated corpus

pub mod alt_models;
pub mod collector;
pub mod corpus;
pub mod feature;
pub mod instance;
pub mod inventory;
pub mod language;
pub mod maxent;
pub mod metrics;
pub mod model;
pub mod observation;
pub mod prop_link;
pub mod tag_set;
pub mod theory;
pub mod tokens;
pub mod trainer;
pub mod vector_file;
pub mod word_clusters;

#[cfg(test)]
mod test_support;

pub use instance::{InstanceLayout, RelationInstance};
pub use inventory::{EntityTypeSet, RelationTypeRef, RelationTypeSet};
pub use maxent::{MaxEntEvent, MaxEntModel, TrainingParams};
pub use model::{RankedRelation, RelationInventory, RelationModel, TestSummary};
pub use observation::{ObservationContext, ObservationResources, RelationObservation};
pub use prop_link::PropLink;
pub use theory::SentenceTheory;
pub use trainer::{ObservationModel, RelationTrainer};
