//! Observation-based relation trainer
//!
//! Walks a sentence corpus, pairs every two relation-eligible mentions,
//! builds a [`RelationObservation`] per pair and trains a maximum-entropy
//! model over a [`TagSet`] whose context predicates are feature tuples
//! without their tag field.
//!
//! The same walk drives development testing and decoding.

use std::fs::File;
use std::io::{BufRead, Write};
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use relex_core::{RelexError, Result, Symbol, TrainerConfig};

use crate::feature::FeatureTypeSet;
use crate::maxent::{MaxEntEvent, MaxEntModel, TrainingParams};
use crate::metrics::{DevTestCounts, Outcome};
use crate::observation::{ObservationContext, ObservationResources, RelationObservation};
use crate::tag_set::TagSet;
use crate::theory::SentenceTheory;
use crate::tokens::TokenReader;

fn write_err(e: std::io::Error) -> RelexError {
    RelexError::Other(anyhow::Error::new(e))
}

// ============================================================================
// Observation model
// ============================================================================

pub struct ObservationModel {
    tag_set: TagSet,
    features: FeatureTypeSet,
    model: MaxEntModel,
}

impl ObservationModel {
    pub fn new(tag_set: TagSet, features: FeatureTypeSet, params: TrainingParams) -> Self {
        let model = MaxEntModel::new(tag_set.tags().to_vec(), params);
        Self {
            tag_set,
            features,
            model,
        }
    }

    /// Read a model file; its outcomes must all belong to the tag set
    pub fn load(path: impl AsRef<Path>, tag_set: TagSet, features: FeatureTypeSet) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = TokenReader::open(path)?.with_comments();
        let model = Self::read_from(&mut reader, tag_set, features)?;
        info!("Loaded observation model from {}", path.display());
        Ok(model)
    }

    pub fn read_from<R: BufRead>(
        reader: &mut TokenReader<R>,
        tag_set: TagSet,
        features: FeatureTypeSet,
    ) -> Result<Self> {
        let model = MaxEntModel::read_from(reader)?;
        if let Some(unknown) = model
            .outcomes()
            .iter()
            .find(|o| tag_set.tag_index(o).is_none())
        {
            return Err(RelexError::Config(format!(
                "model outcome {} is not in the tag set",
                unknown
            )));
        }
        for predicate in model.predicates() {
            features.check_predicate(predicate)?;
        }
        Ok(Self {
            tag_set,
            features,
            model,
        })
    }

    pub fn tag_set(&self) -> &TagSet {
        &self.tag_set
    }

    pub fn features(&self) -> &FeatureTypeSet {
        &self.features
    }

    pub fn maxent(&self) -> &MaxEntModel {
        &self.model
    }

    fn predicates(&self, obs: &RelationObservation<'_>, tag: &Symbol) -> Result<Vec<Symbol>> {
        Ok(self
            .features
            .extract_all(obs, tag)?
            .iter()
            .map(|t| t.predicate().to_symbol())
            .collect())
    }

    pub fn add_to_training(&mut self, obs: &RelationObservation<'_>, tag: &Symbol) -> Result<()> {
        let predicates = self.predicates(obs, tag)?;
        self.model
            .add_event(&MaxEntEvent::new(predicates, tag.clone()), 1)
    }

    pub fn derive(&mut self, pruning_cutoff: u32, threshold: f64) -> Result<()> {
        self.model.derive_model(pruning_cutoff, threshold)
    }

    /// Tags by descending probability, extracting features once per tag
    pub fn n_best(&self, obs: &RelationObservation<'_>, n: usize) -> Result<Vec<(Symbol, f64)>> {
        let mut scored = Vec::with_capacity(self.tag_set.len());
        for tag in self.tag_set.tags() {
            let predicates = self.predicates(obs, tag)?;
            scored.push((tag.clone(), self.model.score_outcome(&predicates, tag)));
        }
        let top = scored
            .iter()
            .map(|(_, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let total: f64 = scored.iter().map(|(_, s)| (s - top).exp()).sum();
        let mut ranked: Vec<(Symbol, f64)> = scored
            .into_iter()
            .map(|(tag, s)| (tag, (s - top).exp() / total))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        Ok(ranked)
    }

    pub fn decode(&self, obs: &RelationObservation<'_>) -> Result<Symbol> {
        Ok(self
            .n_best(obs, 1)?
            .into_iter()
            .next()
            .map(|(tag, _)| tag)
            .unwrap_or_else(|| self.tag_set.none_tag().clone()))
    }

    /// Model file with a dated `#` parameter header
    pub fn write_to(&self, out: &mut impl Write, parameters: &[(&str, String)]) -> Result<()> {
        let mut header = format!("# Trained {}\n# Parameters:\n", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        for (key, value) in parameters {
            header.push_str(&format!("#   {} {}\n", key, value));
        }
        let names: Vec<&str> = self.features.iter().map(|f| f.name()).collect();
        header.push_str(&format!("#   features {}\n", names.join(",")));
        out.write_all(header.as_bytes()).map_err(write_err)?;
        self.model.write_to(out)
    }

    pub fn save(&self, path: impl AsRef<Path>, parameters: &[(&str, String)]) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path).map_err(|e| RelexError::io(path, e))?;
        self.write_to(&mut file, parameters)?;
        info!("Wrote observation model to {}", path.display());
        Ok(())
    }
}

// ============================================================================
// Trainer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedRelation {
    pub sentence: usize,
    pub left: usize,
    pub right: usize,
    pub left_head: Symbol,
    pub right_head: Symbol,
    pub relation_type: Symbol,
    pub probability: f64,
}

pub struct RelationTrainer {
    config: TrainerConfig,
    resources: ObservationResources,
    tag_set: TagSet,
    /// Every relation tag collapses onto this one in filter mode
    filter_tag: Option<Symbol>,
}

impl RelationTrainer {
    pub fn new(config: TrainerConfig, resources: ObservationResources, tag_set: TagSet) -> Result<Self> {
        config.validate()?;
        let filter_tag = config.filter_mode.then(|| tag_set.last_tag().clone());
        if let Some(tag) = &filter_tag {
            info!("Filter mode: relations collapse onto {}", tag);
        }
        Ok(Self {
            config,
            resources,
            tag_set,
            filter_tag,
        })
    }

    pub fn tag_set(&self) -> &TagSet {
        &self.tag_set
    }

    /// Tag a gold symbol is trained and scored under
    pub fn model_tag(&self, gold: &Symbol) -> Symbol {
        match &self.filter_tag {
            Some(filter) if gold != self.tag_set.none_tag() => filter.clone(),
            _ => gold.clone(),
        }
    }

    /// Mention pairs `i < j` that may hold a relation
    pub fn candidate_pairs(&self, sentence: &SentenceTheory) -> Vec<(usize, usize)> {
        let theory = &sentence.primary;
        let eligible = |index: usize| {
            theory.mentions.get(index).map_or(false, |m| {
                self.resources.entity_types.is_recognized(&m.entity_type)
                    && !m.mention_type.is_structural()
            })
        };
        let n = theory.mentions.len();
        let mut pairs = Vec::new();
        for i in (0..n).filter(|&i| eligible(i)) {
            for j in (i + 1..n).filter(|&j| eligible(j)) {
                if self.resources.utilities.valid_relation_args(theory, i, j) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    fn gold_tag(&self, sentence: &SentenceTheory, i: usize, j: usize) -> Result<Symbol> {
        let gold = sentence
            .gold_relation(i, j)
            .map(|(relation, _)| relation)
            .unwrap_or_else(|| self.tag_set.none_tag().clone());
        let tag = self.model_tag(&gold);
        if self.tag_set.tag_index(&tag).is_none() {
            return Err(RelexError::MalformedInput(format!(
                "unknown relation type in training: {}",
                gold
            )));
        }
        Ok(tag)
    }

    fn resources_for(&self, features: &FeatureTypeSet) -> ObservationResources {
        self.resources
            .clone()
            .with_np_chunks(features.requires_np_chunks())
    }

    pub fn train(&self, corpus: &[SentenceTheory], features: FeatureTypeSet) -> Result<ObservationModel> {
        let resources = self.resources_for(&features);
        let mut model = ObservationModel::new(
            self.tag_set.clone(),
            features,
            TrainingParams::from_trainer_config(&self.config),
        );
        let mut n_pairs = 0;
        for sentence in corpus {
            let context = ObservationContext::reset_for_sentence(&resources, sentence);
            for (i, j) in self.candidate_pairs(sentence) {
                let obs = context.populate(i, j)?;
                let tag = self.gold_tag(sentence, i, j)?;
                model.add_to_training(&obs, &tag)?;
                n_pairs += 1;
            }
        }
        info!(
            "Collected {} training pairs from {} sentences",
            n_pairs,
            corpus.len()
        );
        model.derive(self.config.pruning_cutoff, self.config.min_likelihood_delta)?;
        Ok(model)
    }

    /// Decode every candidate pair against gold, writing a per-pair report
    pub fn dev_test(
        &self,
        corpus: &[SentenceTheory],
        model: &ObservationModel,
        report: &mut impl Write,
    ) -> Result<DevTestCounts> {
        let resources = self.resources_for(model.features());
        let none = self.tag_set.none_tag();
        let mut counts = DevTestCounts::default();
        for (index, sentence) in corpus.iter().enumerate() {
            let theory = &sentence.primary;
            let text: Vec<&str> = theory.parse.tokens().iter().map(|t| t.as_str()).collect();
            writeln!(report, "Sentence {}: {}", index, text.join(" ")).map_err(write_err)?;

            let context = ObservationContext::reset_for_sentence(&resources, sentence);
            for (n, (i, j)) in self.candidate_pairs(sentence).into_iter().enumerate() {
                let obs = context.populate(i, j)?;
                let gold = self.gold_tag(sentence, i, j)?;
                let hypothesis = model.decode(&obs)?;
                let Some(outcome) = counts.record(&gold, &hypothesis, none) else {
                    continue;
                };
                let mut line = format!(
                    "{}: {} & {}: {} {}",
                    n + 1,
                    theory.head_word(i),
                    theory.head_word(j),
                    hypothesis,
                    outcome
                );
                if matches!(outcome, Outcome::Missed | Outcome::WrongType) {
                    line.push_str(&format!(" ({})", gold));
                }
                writeln!(report, "{}", line).map_err(write_err)?;
            }
            writeln!(report).map_err(write_err)?;
        }
        writeln!(report, "{}", counts).map_err(write_err)?;
        info!(
            "Dev test: recall {:.4}, precision {:.4}",
            counts.recall(),
            counts.precision()
        );
        Ok(counts)
    }

    /// Non-NONE decisions for every candidate pair
    pub fn decode(
        &self,
        corpus: &[SentenceTheory],
        model: &ObservationModel,
    ) -> Result<Vec<DecodedRelation>> {
        let resources = self.resources_for(model.features());
        let mut decoded = Vec::new();
        for (index, sentence) in corpus.iter().enumerate() {
            let context = ObservationContext::reset_for_sentence(&resources, sentence);
            for (i, j) in self.candidate_pairs(sentence) {
                let obs = context.populate(i, j)?;
                let ranked = model.n_best(&obs, self.config.n_best)?;
                let Some((relation_type, probability)) = ranked.into_iter().next() else {
                    continue;
                };
                debug!("Sentence {} pair ({}, {}): {}", index, i, j, relation_type);
                if relation_type == *self.tag_set.none_tag() {
                    continue;
                }
                decoded.push(DecodedRelation {
                    sentence: index,
                    left: i,
                    right: j,
                    left_head: sentence.primary.head_word(i),
                    right_head: sentence.primary.head_word(j),
                    relation_type,
                    probability,
                });
            }
        }
        Ok(decoded)
    }

    /// Settings recorded in a model file header
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        let c = &self.config;
        vec![
            ("mode", c.mode.to_string()),
            ("pruning_cutoff", c.pruning_cutoff.to_string()),
            ("percent_held_out", c.percent_held_out.to_string()),
            ("max_iterations", c.max_iterations.to_string()),
            ("gaussian_variance", c.gaussian_variance.to_string()),
            ("min_likelihood_delta", c.min_likelihood_delta.to_string()),
            ("stop_check_frequency", c.stop_check_frequency.to_string()),
            ("filter_mode", c.filter_mode.to_string()),
            (
                "use_alt_models",
                self.resources.config.use_alt_models.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::registry;
    use crate::test_support::{distant_sentence, resources, visit_sentence};

    fn features() -> FeatureTypeSet {
        FeatureTypeSet::from_names(&registry(), &["entity-types", "prop-predicate", "wb-words"], 8)
            .unwrap()
    }

    fn trainer(filter_mode: bool, tags: &[&str]) -> RelationTrainer {
        let config = TrainerConfig {
            max_iterations: 200,
            filter_mode,
            ..TrainerConfig::default()
        };
        RelationTrainer::new(config, resources(), TagSet::new(tags)).unwrap()
    }

    fn corpus() -> Vec<SentenceTheory> {
        vec![visit_sentence(Some(("PHYS", 0, 1))), distant_sentence()]
    }

    #[test]
    fn test_candidate_pairs() {
        let t = trainer(false, &["PHYS"]);
        assert_eq!(t.candidate_pairs(&visit_sentence(None)), vec![(0, 1)]);
    }

    #[test]
    fn test_unknown_gold_type_is_fatal() {
        let t = trainer(false, &["PHYS"]);
        let err = t
            .train(&[visit_sentence(Some(("ART", 0, 1)))], features())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Malformed input: unknown relation type in training: ART"
        );
    }

    #[test]
    fn test_filter_mode_collapses_tags() {
        let t = trainer(true, &["RELATION"]);
        assert_eq!(t.model_tag(&Symbol::new("PHYS")), "RELATION");
        assert_eq!(t.model_tag(&Symbol::new("NONE")), "NONE");
    }

    #[test]
    fn test_train_and_dev_test() {
        let t = trainer(false, &["PHYS", "PER-SOC"]);
        let model = t.train(&corpus(), features()).unwrap();

        let mut report = Vec::new();
        let counts = t.dev_test(&corpus(), &model, &mut report).unwrap();
        assert_eq!(counts.correct, 1);
        assert_eq!(counts.spurious, 0);
        let text = String::from_utf8(report).unwrap();
        assert!(text.contains("Smith & Paris: PHYS CORRECT"));
        assert!(text.contains("RECALL: 1.0000"));

        let decoded = t.decode(&corpus(), &model).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].relation_type, "PHYS");
        assert_eq!(decoded[0].sentence, 0);
    }

    #[test]
    fn test_model_file_round_trip() {
        let t = trainer(false, &["PHYS", "PER-SOC"]);
        let model = t.train(&corpus(), features()).unwrap();
        let mut buffer = Vec::new();
        model.write_to(&mut buffer, &t.parameters()).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("# Trained "));
        assert!(text.contains("#   mode GIS"));

        let mut reader = TokenReader::new(buffer.as_slice()).with_comments();
        let loaded = ObservationModel::read_from(&mut reader, TagSet::new(&["PHYS", "PER-SOC"]), features())
            .unwrap();
        assert_eq!(loaded.maxent().outcomes(), model.maxent().outcomes());

        let mut reader = TokenReader::new(buffer.as_slice()).with_comments();
        let err = ObservationModel::read_from(&mut reader, TagSet::new(&["PHYS"]), features())
            .err()
            .unwrap();
        assert!(matches!(err, RelexError::Config(_)));
    }

    #[test]
    fn test_model_from_other_feature_types_is_rejected() {
        let t = trainer(false, &["PHYS"]);
        let model = t.train(&corpus(), features()).unwrap();
        assert!(model
            .maxent()
            .predicates()
            .any(|p| p.as_str().starts_with("entity-types|")));
        let mut buffer = Vec::new();
        model.write_to(&mut buffer, &[]).unwrap();

        let narrower = FeatureTypeSet::from_names(&registry(), &["wb-words"], 8).unwrap();
        let mut reader = TokenReader::new(buffer.as_slice()).with_comments();
        let err = ObservationModel::read_from(&mut reader, TagSet::new(&["PHYS"]), narrower)
            .err()
            .unwrap();
        assert!(matches!(err, RelexError::Config(_)));
        assert!(err.to_string().contains("entity-types"));
    }
}
