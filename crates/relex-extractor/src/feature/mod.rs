//! Feature-type framework
//!
//! A [`FeatureType`] turns a [`RelationObservation`] plus a candidate tag into
//! zero or more [`FeatureTuple`]s. Types are looked up by name in an explicit
//! registry and grouped into a [`FeatureTypeSet`] for a model.

mod types;

use std::fmt;
use std::path::Path;

use tracing::warn;

use relex_core::{RelexError, Result, Symbol};

use crate::observation::RelationObservation;
use crate::tokens::TokenReader;

pub use types::{registry, NP_CHUNK_FEATURES};

/// One field of a feature tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureValue {
    Sym(Symbol),
    Int(i64),
}

impl FeatureValue {
    fn is_null(&self) -> bool {
        match self {
            Self::Sym(s) => s.is_null() || s.as_str().is_empty(),
            Self::Int(_) => false,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sym(s) => write!(f, "{}", s),
            Self::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<Symbol> for FeatureValue {
    fn from(s: Symbol) -> Self {
        Self::Sym(s)
    }
}

impl From<&Symbol> for FeatureValue {
    fn from(s: &Symbol) -> Self {
        Self::Sym(s.clone())
    }
}

impl From<i64> for FeatureValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

// ============================================================================
// Feature tuples
// ============================================================================

/// Typed, tagged feature; field 0 is always the outcome tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureTuple {
    feature_type: &'static str,
    values: Vec<FeatureValue>,
}

impl FeatureTuple {
    /// Null or empty fields are rejected
    pub fn new(feature_type: &'static str, tag: Symbol, fields: Vec<FeatureValue>) -> Result<Self> {
        let mut values = Vec::with_capacity(fields.len() + 1);
        values.push(FeatureValue::Sym(tag));
        values.extend(fields);
        if let Some(pos) = values.iter().position(FeatureValue::is_null) {
            return Err(RelexError::InternalInconsistency(format!(
                "feature '{}' built with a null value in field {}",
                feature_type, pos
            )));
        }
        Ok(Self {
            feature_type,
            values,
        })
    }

    /// Placeholder with every slot, tag included, set to `NULL`
    pub fn empty(feature_type: &'static str, arity: usize) -> Self {
        Self {
            feature_type,
            values: vec![FeatureValue::Sym(relex_core::symbols::NULL.clone()); arity + 1],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(FeatureValue::is_null)
    }

    pub fn feature_type(&self) -> &'static str {
        self.feature_type
    }

    pub fn tag(&self) -> &FeatureValue {
        &self.values[0]
    }

    /// Fields after the tag
    pub fn fields(&self) -> &[FeatureValue] {
        &self.values[1..]
    }

    /// Equality/hash key ignoring the tag
    pub fn predicate(&self) -> FeaturePredicate<'_> {
        FeaturePredicate(self)
    }
}

/// View of a tuple without its tag field
#[derive(Debug, Clone, Copy)]
pub struct FeaturePredicate<'a>(&'a FeatureTuple);

impl PartialEq for FeaturePredicate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.feature_type == other.0.feature_type && self.0.fields() == other.0.fields()
    }
}

impl Eq for FeaturePredicate<'_> {}

impl std::hash::Hash for FeaturePredicate<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.feature_type.hash(state);
        self.0.fields().hash(state);
    }
}

impl FeaturePredicate<'_> {
    pub fn to_symbol(&self) -> Symbol {
        Symbol::new(&self.to_string())
    }
}

impl fmt::Display for FeaturePredicate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.feature_type)?;
        for value in self.0.fields() {
            write!(f, "|{}", value)?;
        }
        Ok(())
    }
}

impl fmt::Display for FeatureTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.feature_type)?;
        for value in &self.values {
            write!(f, " {}", value)?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Feature types
// ============================================================================

/// A named extractor of feature tuples
pub trait FeatureType: Send + Sync {
    fn name(&self) -> &'static str;

    fn model_family(&self) -> &'static str {
        "relation"
    }

    /// Number of fields after the tag
    fn arity(&self) -> usize;

    /// Raw field values; an empty result means the type declines to fire
    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>>;

    /// Canonical tuple of this type with every slot `NULL`
    fn empty_feature(&self) -> FeatureTuple {
        FeatureTuple::empty(self.name(), self.arity())
    }

    /// Tag the raw values, drop repeats and apply the soft cap
    fn extract(
        &self,
        obs: &RelationObservation<'_>,
        tag: &Symbol,
        max_outputs: usize,
    ) -> Result<Vec<FeatureTuple>> {
        let mut tuples: Vec<FeatureTuple> = Vec::new();
        for fields in self.features(obs)? {
            let tuple = FeatureTuple::new(self.name(), tag.clone(), fields)?;
            if !tuples.contains(&tuple) {
                tuples.push(tuple);
            }
        }
        if tuples.len() > max_outputs {
            warn!(
                "Feature type {} produced {} features; keeping the first {}",
                self.name(),
                tuples.len(),
                max_outputs
            );
            tuples.truncate(max_outputs);
        }
        Ok(tuples)
    }
}

pub type Constructor = fn() -> Box<dyn FeatureType>;

/// Every known feature type, by name
pub struct FeatureRegistry {
    entries: Vec<(&'static str, Constructor)>,
}

impl FeatureRegistry {
    pub fn new(entries: Vec<(&'static str, Constructor)>) -> Self {
        Self { entries }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn FeatureType>> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, make)| make())
            .ok_or_else(|| RelexError::Config(format!("unknown feature type '{}'", name)))
    }
}

/// Feature types selected for one model, in file order
pub struct FeatureTypeSet {
    types: Vec<Box<dyn FeatureType>>,
    max_per_extraction: usize,
}

impl fmt::Debug for FeatureTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.iter().map(|t| t.name())).finish()
    }
}

impl FeatureTypeSet {
    pub fn from_names<S: AsRef<str>>(
        registry: &FeatureRegistry,
        names: &[S],
        max_per_extraction: usize,
    ) -> Result<Self> {
        let types = names
            .iter()
            .map(|n| registry.create(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            types,
            max_per_extraction,
        })
    }

    /// Features file: a count, then one feature-type name per line
    pub fn from_file(
        registry: &FeatureRegistry,
        path: impl AsRef<Path>,
        max_per_extraction: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = TokenReader::open(path)?.with_comments();
        let expected: usize = reader.parse_next("feature type count")?;
        let mut names = Vec::with_capacity(expected);
        while let Some(name) = reader.next_token()? {
            names.push(name);
        }
        if names.len() != expected {
            return Err(RelexError::Config(format!(
                "{} lists {} feature types but declares {}",
                path.display(),
                names.len(),
                expected
            )));
        }
        let set = Self::from_names(registry, &names, max_per_extraction)?;
        tracing::info!("Loaded {} feature types from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn FeatureType> {
        self.types.iter().map(|t| t.as_ref())
    }

    /// Check that a stored model predicate was produced by one of these types.
    /// Field values may themselves contain `|`, so only a shortfall is an error.
    pub fn check_predicate(&self, predicate: &Symbol) -> Result<()> {
        let mut parts = predicate.as_str().split('|');
        let name = parts.next().unwrap_or_default();
        let feature_type = self.types.iter().find(|t| t.name() == name).ok_or_else(|| {
            RelexError::Config(format!(
                "model predicate '{}' comes from feature type '{}', which is not configured",
                predicate, name
            ))
        })?;
        let expected = feature_type.empty_feature().fields().len();
        let found = parts.count();
        if found < expected {
            return Err(RelexError::MalformedInput(format!(
                "model predicate '{}' has {} fields; {} expects {}",
                predicate, found, name, expected
            )));
        }
        Ok(())
    }

    /// True when some registered type reads NP-chunk facts
    pub fn requires_np_chunks(&self) -> bool {
        self.types
            .iter()
            .any(|t| NP_CHUNK_FEATURES.contains(&t.name()))
    }

    /// Features of every type for one tag, in type order
    pub fn extract_all(
        &self,
        obs: &RelationObservation<'_>,
        tag: &Symbol,
    ) -> Result<Vec<FeatureTuple>> {
        let mut all = Vec::new();
        for feature_type in &self.types {
            all.extend(feature_type.extract(obs, tag, self.max_per_extraction)?);
        }
        Ok(all)
    }
}
