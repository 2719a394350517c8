//! Relation model driver
//!
//! Scores relation instances with a maximum-entropy type model, optionally
//! gated by a binary existence model (`NO_RELATION` / `IS_RELATION`).
//! Asymmetric types compete in both directions; the reverse direction is its
//! own outcome (`TYPE:REV`).

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use relex_core::{symbols, ModelConfig, RelexError, Result, Symbol};

use crate::instance::{ExtensionField, InstanceLayout, RelationInstance};
use crate::inventory::{EntityTypeSet, RelationTypeRef, RelationTypeSet};
use crate::maxent::{MaxEntEvent, MaxEntModel, TrainingParams};
use crate::tokens::TokenReader;
use crate::vector_file::{TrainingVector, VectorFileReader};
use crate::word_clusters::WordClusterTable;

/// Initial best score of a top-1 search
const MIN_SCORE: f64 = -1000.0;
/// Predicate clusters used as predicate substitutes
const PREDICATE_CLUSTERS: usize = 3;
/// Hypotheses checked by `test_model`
const TEST_N_BEST: usize = 5;

/// Shared inventories a relation model reads
#[derive(Clone)]
pub struct RelationInventory {
    pub relation_types: Arc<RelationTypeSet>,
    pub entity_types: Arc<EntityTypeSet>,
    pub word_clusters: Arc<WordClusterTable>,
    pub layout: InstanceLayout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedRelation {
    pub relation: RelationTypeRef,
    pub score: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestSummary {
    pub correct: usize,
    pub yes_no_correct: usize,
    pub total: usize,
}

pub struct RelationModel {
    inventory: RelationInventory,
    split_level: bool,
    type_model: MaxEntModel,
    existence_model: Option<MaxEntModel>,
    pruning_cutoff: u32,
    threshold: f64,
}

impl RelationModel {
    /// Untrained model; every required training setting must be configured
    pub fn new(config: &ModelConfig, inventory: RelationInventory) -> Result<Self> {
        let params = TrainingParams::from_model_config(config)?;
        let split_level = required_split_level(config)?;
        let types = &inventory.relation_types;
        let mut outcomes = Vec::new();
        for (index, symbol) in types.iter() {
            if split_level && types.is_null(index) {
                continue;
            }
            outcomes.push(symbol.clone());
            if !types.is_symmetric(index) && !types.is_null(index) {
                outcomes.push(types.reverse_symbol(index).clone());
            }
        }
        let existence_model = split_level.then(|| {
            MaxEntModel::new(
                vec![symbols::NO_RELATION.clone(), symbols::IS_RELATION.clone()],
                params.clone(),
            )
        });
        Ok(Self {
            inventory,
            split_level,
            type_model: MaxEntModel::new(outcomes, params),
            existence_model,
            pruning_cutoff: config.pruning_cutoff,
            threshold: config.threshold,
        })
    }

    /// Read a trained model; the existence model comes first in split mode
    pub fn load(
        path: impl AsRef<Path>,
        config: &ModelConfig,
        inventory: RelationInventory,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = TokenReader::open(path)?.with_comments();
        let model = Self::read_from(&mut reader, config, inventory)?;
        info!("Loaded relation model from {}", path.display());
        Ok(model)
    }

    pub fn read_from<R: BufRead>(
        reader: &mut TokenReader<R>,
        config: &ModelConfig,
        inventory: RelationInventory,
    ) -> Result<Self> {
        let split_level = required_split_level(config)?;
        let existence_model = if split_level {
            Some(MaxEntModel::read_from(reader)?)
        } else {
            None
        };
        let type_model = MaxEntModel::read_from(reader)?;
        Ok(Self {
            inventory,
            split_level,
            type_model,
            existence_model,
            pruning_cutoff: config.pruning_cutoff,
            threshold: config.threshold,
        })
    }

    pub fn is_split_level(&self) -> bool {
        self.split_level
    }

    pub fn type_outcomes(&self) -> &[Symbol] {
        self.type_model.outcomes()
    }

    pub fn inventory(&self) -> &RelationInventory {
        &self.inventory
    }

    // ========================================================================
    // Training
    // ========================================================================

    pub fn train(&mut self, vector_file: impl AsRef<Path>) -> Result<()> {
        let path = vector_file.as_ref();
        info!("Reading training vectors from {}", path.display());
        let mut reader = VectorFileReader::open(path, self.inventory.layout.width())?;
        while let Some(vector) = reader.next_vector()? {
            self.add_vector(&vector)?;
        }
        self.derive()
    }

    /// Normalize one vector and feed it to the models
    pub fn add_vector(&mut self, vector: &TrainingVector) -> Result<()> {
        let types = Arc::clone(&self.inventory.relation_types);
        let mut inst =
            RelationInstance::from_training_vector(&vector.labels, &self.inventory.layout, &types)?;
        for entity_type in [inst.left_entity_type(), inst.right_entity_type()] {
            if !self.inventory.entity_types.can_be_rel_arg(entity_type) {
                return Err(RelexError::InvalidRelationArg(entity_type.to_string()));
            }
        }
        let relation = normalize_direction(&mut inst, &types)?;

        let mut event = self.type_event(&inst);
        if let Some(existence) = &mut self.existence_model {
            event.set_outcome(existence_outcome(&types, relation));
            existence.add_event(&event, vector.count)?;
            if types.is_null(relation.index) {
                return Ok(());
            }
        }
        event.set_outcome(types.outcome_symbol(relation).clone());
        self.type_model.add_event(&event, vector.count)
    }

    /// Fit every sub-model
    pub fn derive(&mut self) -> Result<()> {
        if let Some(existence) = &mut self.existence_model {
            info!("Deriving relation existence model");
            existence.derive_model(self.pruning_cutoff, self.threshold)?;
        }
        info!("Deriving relation type model");
        self.type_model
            .derive_model(self.pruning_cutoff, self.threshold)
    }

    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        if let Some(existence) = &self.existence_model {
            existence.write_to(out)?;
        }
        self.type_model.write_to(out)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = std::fs::File::create(path).map_err(|e| RelexError::io(path, e))?;
        self.write_to(&mut file)?;
        info!("Wrote relation model to {}", path.display());
        Ok(())
    }

    // ========================================================================
    // Decoding
    // ========================================================================

    /// Scores of (NO_RELATION, IS_RELATION), when split
    fn existence_scores(&self, predicates: &[Symbol]) -> Option<(f64, f64)> {
        self.existence_model.as_ref().map(|model| {
            (
                model.score_outcome(predicates, &symbols::NO_RELATION),
                model.score_outcome(predicates, &symbols::IS_RELATION),
            )
        })
    }

    /// Every competing directed type, in enumeration order
    fn candidates(&self) -> Vec<RelationTypeRef> {
        let types = &self.inventory.relation_types;
        let mut out = Vec::new();
        for (index, _) in types.iter() {
            if self.split_level && types.is_null(index) {
                continue;
            }
            out.push(RelationTypeRef {
                index,
                reversed: false,
            });
            if !types.is_symmetric(index) {
                out.push(RelationTypeRef {
                    index,
                    reversed: true,
                });
            }
        }
        out
    }

    /// Highest-scoring directed relation type
    pub fn find_best_relation_type(&self, instance: &RelationInstance) -> RelationTypeRef {
        let types = &self.inventory.relation_types;
        let event = self.type_event(instance);
        if let Some((no, yes)) = self.existence_scores(event.predicates()) {
            if no > yes {
                return types.null_ref();
            }
        }
        let mut best = types.null_ref();
        let mut best_score = MIN_SCORE;
        for candidate in self.candidates() {
            let score = self
                .type_model
                .score_outcome(event.predicates(), types.outcome_symbol(candidate));
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        debug!(
            "Best relation {} ({:.4})",
            types.outcome_symbol(best),
            best_score
        );
        best
    }

    /// Up to `n` directed types by descending score, with probabilities
    /// normalized over every scored outcome
    pub fn find_n_best_relation_types(
        &self,
        instance: &RelationInstance,
        n: usize,
    ) -> Vec<RankedRelation> {
        let types = &self.inventory.relation_types;
        let event = self.type_event(instance);
        if let Some((no, yes)) = self.existence_scores(event.predicates()) {
            if no > yes {
                let top = no.max(yes);
                let probability = (no - top).exp() / ((yes - top).exp() + (no - top).exp());
                return vec![RankedRelation {
                    relation: types.null_ref(),
                    score: no,
                    probability,
                }];
            }
        }

        let mut ranked: Vec<RankedRelation> = Vec::with_capacity(n + 1);
        let mut all_scores = Vec::new();
        for candidate in self.candidates() {
            let score = self
                .type_model
                .score_outcome(event.predicates(), types.outcome_symbol(candidate));
            all_scores.push(score);
            let position = ranked
                .iter()
                .position(|r| score > r.score)
                .unwrap_or(ranked.len());
            if position < n {
                ranked.insert(
                    position,
                    RankedRelation {
                        relation: candidate,
                        score,
                        probability: 0.0,
                    },
                );
                ranked.truncate(n);
            }
        }

        let top = all_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let total: f64 = all_scores.iter().map(|s| (s - top).exp()).sum();
        for r in &mut ranked {
            r.probability = (r.score - top).exp() / total;
        }
        ranked
    }

    /// Decode every vector of a file and count top-1 hits
    pub fn test_model(&self, vector_file: impl AsRef<Path>) -> Result<TestSummary> {
        let path = vector_file.as_ref();
        let mut reader = VectorFileReader::open(path, self.inventory.layout.width())?;
        let mut vectors = Vec::new();
        while let Some(vector) = reader.next_vector()? {
            vectors.push(vector);
        }
        let summary = self.test_vectors(&vectors)?;
        info!(
            "{} out of {} total instances correct",
            summary.correct, summary.total
        );
        info!(
            "{} out of {} yes/no decisions correct",
            summary.yes_no_correct, summary.total
        );
        Ok(summary)
    }

    pub fn test_vectors(&self, vectors: &[TrainingVector]) -> Result<TestSummary> {
        let types = &self.inventory.relation_types;
        let mut summary = TestSummary::default();
        for vector in vectors {
            let mut inst = RelationInstance::from_training_vector(
                &vector.labels,
                &self.inventory.layout,
                types,
            )?;
            let gold = normalize_direction(&mut inst, types)?;
            let ranked = self.find_n_best_relation_types(&inst, TEST_N_BEST);
            let predicted = ranked
                .first()
                .map(|r| r.relation)
                .unwrap_or_else(|| types.null_ref());

            if predicted == gold {
                summary.correct += 1;
            }
            let gold_none = types.is_null(gold.index);
            let predicted_none = types.is_null(predicted.index);
            if (gold_none && predicted == gold) || (!gold_none && !predicted_none) {
                summary.yes_no_correct += 1;
            }
            summary.total += 1;
        }
        Ok(summary)
    }

    // ========================================================================
    // Event composition
    // ========================================================================

    fn extension_atom(
        &self,
        instance: &RelationInstance,
        field: ExtensionField,
        prefix: &str,
    ) -> Option<Symbol> {
        if !self.inventory.layout.extensions().contains(&field) {
            return None;
        }
        let value = match field {
            ExtensionField::LeftMentionType => instance.left_mention_type(),
            ExtensionField::RightMentionType => instance.right_mention_type(),
            ExtensionField::LeftMetonymy => instance.left_metonymy(),
            ExtensionField::RightMetonymy => instance.right_metonymy(),
        };
        optional_atom(prefix, value)
    }

    /// Context predicates of an instance; the outcome is its relation type
    pub fn type_event(&self, inst: &RelationInstance) -> MaxEntEvent {
        let predicate = inst.predicate();
        let p = atom("p", predicate);
        let lh = atom("lh", inst.left_headword());
        let rh = atom("rh", inst.right_headword());
        let nw = optional_atom("nw", inst.nested_word());
        let lt = atom("lt", inst.left_entity_type());
        let rt = atom("rt", inst.right_entity_type());
        let lr = atom("lr", inst.left_role());
        let rr = atom("rr", inst.right_role());
        let nr = optional_atom("nr", inst.nested_role());
        let lc = if predicate.is_null() {
            None
        } else {
            predicate.last_char().map(|c| atom("lc", &c))
        };
        let lmt = self.extension_atom(inst, ExtensionField::LeftMentionType, "lmt");
        let rmt = self.extension_atom(inst, ExtensionField::RightMentionType, "rmt");
        let lm = self.extension_atom(inst, ExtensionField::LeftMetonymy, "lm");
        let rm = self.extension_atom(inst, ExtensionField::RightMetonymy, "rm");

        let clusters: Vec<Symbol> = if predicate.is_null() {
            Vec::new()
        } else {
            self.inventory
                .word_clusters
                .clusters(predicate)
                .iter()
                .take(PREDICATE_CLUSTERS)
                .enumerate()
                .map(|(i, id)| Symbol::new(&format!("pc{}:{}", i, id)))
                .collect()
        };

        let mut event = EventBuilder::default();
        let slots: [Option<&Symbol>; 14] = [
            Some(&p),
            Some(&lh),
            Some(&rh),
            nw.as_ref(),
            Some(&lt),
            Some(&rt),
            Some(&lr),
            Some(&rr),
            nr.as_ref(),
            lc.as_ref(),
            lmt.as_ref(),
            rmt.as_ref(),
            lm.as_ref(),
            rm.as_ref(),
        ];
        // the nested role only appears in combinations
        for (i, slot) in slots.iter().enumerate() {
            match slot {
                Some(value) if i != 8 => event.add((*value).clone()),
                _ => {}
            }
        }
        for (i, first) in slots.iter().enumerate() {
            let Some(first) = *first else { continue };
            for &second in slots[i + 1..].iter().flatten() {
                event.compose(&[Some(first), Some(second)]);
            }
        }

        let mut variants: Vec<&Symbol> = vec![&p];
        variants.extend(lc.as_ref());
        variants.extend(clusters.iter());
        let nested = match (&nw, &nr) {
            (Some(w), Some(r)) => Some((w, r)),
            _ => None,
        };

        // types, roles, predicate, nested role
        for &v in &variants {
            event.compose(&[Some(&lt), Some(&rt), Some(&lr), Some(&rr), Some(v), nr.as_ref()]);
        }
        event.compose(&[Some(&lt), Some(&rt), Some(&lr), Some(&rr), nr.as_ref()]);

        // headwords, roles, nested word and role
        match nested {
            Some((w, r)) => event.compose(&[Some(&lh), Some(&rh), Some(&lr), Some(&rr), Some(w), Some(r)]),
            None => event.compose(&[Some(&lh), Some(&rh), Some(&lr), Some(&rr)]),
        }

        for &v in &variants {
            // headwords, roles, predicate, nested word and role
            match nested {
                Some((w, r)) => event.compose(&[
                    Some(&lh),
                    Some(&rh),
                    Some(&lr),
                    Some(&rr),
                    Some(v),
                    Some(w),
                    Some(r),
                ]),
                None => event.compose(&[Some(&lh), Some(&rh), Some(&lr), Some(&rr), Some(v)]),
            }
            // headwords, types, predicate, nested word
            event.compose(&[Some(&lh), Some(&rh), Some(&lt), Some(&rt), Some(v), nw.as_ref()]);
            // headwords, predicate, nested word
            event.compose(&[Some(&lh), Some(&rh), Some(v), nw.as_ref()]);
            // types, predicate
            event.compose(&[Some(&lt), Some(&rt), Some(v)]);
            // roles, predicate, nested role
            event.compose(&[Some(&lr), Some(&rr), Some(v), nr.as_ref()]);
        }

        if let Some((w, r)) = nested {
            for &v in &variants {
                event.compose(&[Some(r), Some(w), Some(&rr), Some(&lt), Some(&rt), Some(v)]);
            }
            event.compose(&[Some(r), Some(w), Some(&rr), Some(&lt), Some(&rt)]);

            for &v in &variants {
                event.compose(&[
                    Some(r),
                    Some(w),
                    Some(&rr),
                    Some(&lt),
                    Some(&rt),
                    lmt.as_ref(),
                    rmt.as_ref(),
                    Some(v),
                ]);
            }
            event.compose(&[
                Some(r),
                Some(w),
                Some(&rr),
                Some(&lt),
                Some(&rt),
                lmt.as_ref(),
                rmt.as_ref(),
            ]);
        }

        if lm.is_some() || rm.is_some() {
            for &v in &variants {
                event.compose(&[Some(&lt), Some(&rt), lm.as_ref(), rm.as_ref(), Some(v)]);
            }
        }

        for &v in &variants {
            event.compose(&[
                Some(&lt),
                Some(&rt),
                Some(&lr),
                Some(&rr),
                lmt.as_ref(),
                rmt.as_ref(),
                Some(v),
                nr.as_ref(),
            ]);
            event.compose(&[lmt.as_ref(), rmt.as_ref(), Some(&lt), Some(&rt), Some(v)]);
        }
        event.compose(&[
            Some(&lt),
            Some(&rt),
            Some(&lr),
            Some(&rr),
            lmt.as_ref(),
            rmt.as_ref(),
            nr.as_ref(),
        ]);

        MaxEntEvent::new(event.predicates, inst.relation_type().clone())
    }
}

fn required_split_level(config: &ModelConfig) -> Result<bool> {
    config
        .is_split_level_decision
        .ok_or_else(|| RelexError::Config("is_split_level_decision is required".to_string()))
}

/// Fold a reversed asymmetric type into its reverse outcome and clear the flag
fn normalize_direction(
    inst: &mut RelationInstance,
    types: &RelationTypeSet,
) -> Result<RelationTypeRef> {
    let mut relation = types
        .lookup(inst.relation_type())
        .ok_or_else(|| RelexError::InvalidRelationType(inst.relation_type().to_string()))?;
    if inst.is_reversed() && !types.is_symmetric(relation.index) {
        relation.reversed = !relation.reversed;
    }
    inst.set_relation_type(types.outcome_symbol(relation), types);
    inst.set_reversed(false, types);
    Ok(relation)
}

fn existence_outcome(types: &RelationTypeSet, relation: RelationTypeRef) -> Symbol {
    if types.is_null(relation.index) {
        symbols::NO_RELATION.clone()
    } else {
        symbols::IS_RELATION.clone()
    }
}

fn atom(prefix: &str, value: &Symbol) -> Symbol {
    Symbol::new(&format!("{}:{}", prefix, value))
}

fn optional_atom(prefix: &str, value: &Symbol) -> Option<Symbol> {
    (!value.is_null()).then(|| atom(prefix, value))
}

/// Ordered, duplicate-free predicate list
#[derive(Default)]
struct EventBuilder {
    predicates: Vec<Symbol>,
    seen: HashSet<Symbol>,
}

impl EventBuilder {
    fn add(&mut self, predicate: Symbol) {
        if self.seen.insert(predicate.clone()) {
            self.predicates.push(predicate);
        }
    }

    fn compose(&mut self, parts: &[Option<&Symbol>]) {
        let joined: Vec<&str> = parts.iter().flatten().map(|s| s.as_str()).collect();
        self.add(Symbol::new(&joined.join("|")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::NGRAM_SIZE;
    use crate::test_support::relation_types;
    use relex_core::{StopCriterion, TrainMode};

    fn config(split: bool) -> ModelConfig {
        ModelConfig {
            is_split_level_decision: Some(split),
            train_mode: Some(TrainMode::Gis),
            stop_criterion: Some(StopCriterion::ProbsConverge),
            percent_held_out: Some(0),
            max_iterations: 200,
            ..ModelConfig::default()
        }
    }

    fn inventory() -> RelationInventory {
        RelationInventory {
            relation_types: Arc::new(relation_types()),
            entity_types: Arc::new(EntityTypeSet::new(&["PER", "GPE", "ORG"], &["PER", "GPE", "ORG"])),
            word_clusters: Arc::new(WordClusterTable::default()),
            layout: InstanceLayout::default(),
        }
    }

    /// relation type, predicate, left head, right head, types, roles, reversed
    fn vector(fields: [&str; 9], count: u64) -> TrainingVector {
        let [rel, pred, lh, rh, lt, rt, lr, rr, rev] = fields;
        let labels = [
            rel, pred, pred, lh, rh, "NULL", lt, rt, lr, rr, "NULL", rev, "MULTI_PLACE",
        ];
        assert_eq!(labels.len(), NGRAM_SIZE);
        TrainingVector {
            labels: labels.iter().map(|s| Symbol::new(s)).collect(),
            count,
        }
    }

    fn training_vectors() -> Vec<TrainingVector> {
        vec![
            vector(["PHYS", "visited", "Smith", "Paris", "PER", "GPE", "<sub>", "<obj>", "NULL"], 6),
            vector(["PHYS", "visited", "Paris", "Smith", "GPE", "PER", "<obj>", "<sub>", "reversed"], 4),
            vector(["PER-SOC", "met", "Smith", "Jones", "PER", "PER", "<sub>", "<obj>", "NULL"], 5),
            vector(["NONE", "NULL", "Acme", "Paris", "ORG", "GPE", "NULL", "NULL", "NULL"], 6),
        ]
    }

    fn trained(split: bool) -> RelationModel {
        let mut model = RelationModel::new(&config(split), inventory()).unwrap();
        for v in training_vectors() {
            model.add_vector(&v).unwrap();
        }
        model.derive().unwrap();
        model
    }

    fn instance(v: &TrainingVector) -> RelationInstance {
        let inv = inventory();
        RelationInstance::from_training_vector(&v.labels, &inv.layout, &inv.relation_types).unwrap()
    }

    #[test]
    fn test_missing_required_configuration() {
        let mut cfg = config(true);
        cfg.train_mode = None;
        assert!(matches!(
            RelationModel::new(&cfg, inventory()),
            Err(RelexError::Config(_))
        ));
        let mut cfg = config(true);
        cfg.is_split_level_decision = None;
        assert!(RelationModel::new(&cfg, inventory()).is_err());
    }

    #[test]
    fn test_type_outcomes() {
        let split = RelationModel::new(&config(true), inventory()).unwrap();
        let names: Vec<&str> = split.type_outcomes().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["PHYS", "PHYS:REV", "PER-SOC"]);
        let single = RelationModel::new(&config(false), inventory()).unwrap();
        assert_eq!(single.type_outcomes()[0], "NONE");
        assert_eq!(single.type_outcomes().len(), 4);
    }

    #[test]
    fn test_invalid_relation_type_is_fatal() {
        let mut model = RelationModel::new(&config(false), inventory()).unwrap();
        let v = vector(["BOGUS", "x", "a", "b", "PER", "GPE", "NULL", "NULL", "NULL"], 1);
        let err = model.add_vector(&v).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Relation Type: BOGUS");
    }

    #[test]
    fn test_entity_type_must_be_relation_arg() {
        let mut model = RelationModel::new(&config(false), inventory()).unwrap();
        let v = vector(["PHYS", "x", "a", "b", "PER", "DATE", "NULL", "NULL", "NULL"], 1);
        assert!(matches!(
            model.add_vector(&v).unwrap_err(),
            RelexError::InvalidRelationArg(_)
        ));
    }

    #[test]
    fn test_event_composition() {
        let model = RelationModel::new(&config(false), inventory()).unwrap();
        let event = model.type_event(&instance(&training_vectors()[0]));
        let has = |p: &str| event.predicates().iter().any(|s| s == p);
        assert!(has("p:visited"));
        assert!(has("lc:d"));
        assert!(has("p:visited|lh:Smith"));
        assert!(has("lt:PER|rt:GPE|p:visited"));
        assert!(has("lt:PER|rt:GPE|lc:d"));
        assert!(!event.predicates().iter().any(|s| s.as_str().starts_with("nw:")));
        let unique: HashSet<_> = event.predicates().iter().collect();
        assert_eq!(unique.len(), event.predicates().len());
    }

    #[test]
    fn test_top_one_considers_reverse() {
        let model = trained(false);
        let vectors = training_vectors();
        let forward = model.find_best_relation_type(&instance(&vectors[0]));
        assert_eq!(model.inventory().relation_types.outcome_symbol(forward), "PHYS");
        let reverse = model.find_best_relation_type(&instance(&vectors[1]));
        assert_eq!(
            model.inventory().relation_types.outcome_symbol(reverse),
            "PHYS:REV"
        );
    }

    #[test]
    fn test_n_best_is_sorted_and_normalized() {
        let model = trained(false);
        let ranked = model.find_n_best_relation_types(&instance(&training_vectors()[2]), 10);
        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let total: f64 = ranked.iter().map(|r| r.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
        let unique: HashSet<_> = ranked.iter().map(|r| r.relation).collect();
        assert_eq!(unique.len(), ranked.len());

        let top2 = model.find_n_best_relation_types(&instance(&training_vectors()[2]), 2);
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].relation, ranked[0].relation);
    }

    #[test]
    fn test_split_level_short_circuits_none() {
        let model = trained(true);
        let none = instance(&training_vectors()[3]);
        let best = model.find_best_relation_type(&none);
        assert!(model.inventory().relation_types.is_null(best.index));
        let ranked = model.find_n_best_relation_types(&none, 5);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].probability > 0.5);
    }

    #[test]
    fn test_save_load_round_trip() {
        let model = trained(true);
        let mut buffer = Vec::new();
        model.write_to(&mut buffer).unwrap();
        let mut reader = TokenReader::new(buffer.as_slice());
        let loaded = RelationModel::read_from(&mut reader, &config(true), inventory()).unwrap();
        for v in training_vectors() {
            let inst = instance(&v);
            assert_eq!(
                loaded.find_best_relation_type(&inst),
                model.find_best_relation_type(&inst)
            );
        }
    }

    #[test]
    fn test_vectors_summary() {
        let model = trained(false);
        let summary = model.test_vectors(&training_vectors()).unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.correct, 4);
        assert_eq!(summary.yes_no_correct, 4);
    }
}
