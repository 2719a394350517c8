//! Maximum-entropy classifier
//!
//! A model moves through `Untrained -> Accumulating -> Derived`; a model read
//! back from a file starts in `Scoring`. Events are bags of predicate symbols
//! paired with one outcome. Weights are fit with GIS or IIS (optionally with a
//! Gaussian prior or incremental feature selection) and scored as
//! log-linear sums.
//!
//! # Example
//!
//! ```no_run
//! use relex_core::Symbol;
//! use relex_extractor::maxent::{MaxEntEvent, MaxEntModel, TrainingParams};
//!
//! let outcomes = vec![Symbol::new("NO_RELATION"), Symbol::new("IS_RELATION")];
//! let mut model = MaxEntModel::new(outcomes, TrainingParams::default());
//! let event = MaxEntEvent::new(vec![Symbol::new("p:visit")], Symbol::new("IS_RELATION"));
//! model.add_event(&event, 3)?;
//! model.derive_model(0, 0.0001)?;
//! let p = model.probability(&event);
//! # Ok::<(), relex_core::RelexError>(())
//! ```

mod event_set;
mod training;

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{info, warn};

use relex_core::{
    ModelConfig, RelexError, Result, StopCriterion, Symbol, TrainMode, TrainerConfig,
};

use crate::tokens::TokenReader;
use event_set::EventSet;
use training::IterativeScaling;

pub(crate) use training::softmax_in_place;

/// Stand-in for the logarithm of zero
pub const LOG_OF_ZERO: f64 = -10000.0;

/// Natural log with `LOG(0) = -10000`
pub fn log(x: f64) -> f64 {
    if x <= 0.0 {
        LOG_OF_ZERO
    } else {
        x.ln()
    }
}

// ============================================================================
// Events and parameters
// ============================================================================

/// A bag of predicates observed with one outcome
#[derive(Debug, Clone, PartialEq)]
pub struct MaxEntEvent {
    predicates: Vec<Symbol>,
    outcome: Symbol,
}

impl MaxEntEvent {
    pub fn new(predicates: Vec<Symbol>, outcome: Symbol) -> Self {
        Self {
            predicates,
            outcome,
        }
    }

    pub fn predicates(&self) -> &[Symbol] {
        &self.predicates
    }

    pub fn outcome(&self) -> &Symbol {
        &self.outcome
    }

    pub fn set_outcome(&mut self, outcome: Symbol) {
        self.outcome = outcome;
    }

    pub fn push_predicate(&mut self, predicate: Symbol) {
        self.predicates.push(predicate);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams {
    pub mode: TrainMode,
    pub stop_criterion: StopCriterion,
    pub percent_held_out: u32,
    pub max_iterations: usize,
    pub stop_check_frequency: usize,
    /// Gaussian prior variance; zero disables the prior
    pub variance: f64,
    pub n_features_to_add: usize,
    /// Held-out likelihood changes at or below this count as converged
    pub min_likelihood_delta: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            mode: TrainMode::Gis,
            stop_criterion: StopCriterion::ProbsConverge,
            percent_held_out: 0,
            max_iterations: 1000,
            stop_check_frequency: 1,
            variance: 0.0,
            n_features_to_add: 1,
            min_likelihood_delta: 0.0001,
        }
    }
}

impl TrainingParams {
    /// Parameters of the training-vector driver; required settings must be present
    pub fn from_model_config(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        let mode = config
            .train_mode
            .ok_or_else(|| RelexError::Config("relation_train_mode is required".to_string()))?;
        let stop_criterion = config.stop_criterion.ok_or_else(|| {
            RelexError::Config("relation_train_stop_criterion is required".to_string())
        })?;
        let percent_held_out = config.percent_held_out.ok_or_else(|| {
            RelexError::Config("relation_train_percent_held_out is required".to_string())
        })?;
        Ok(Self {
            mode,
            stop_criterion,
            percent_held_out,
            max_iterations: config.max_iterations,
            stop_check_frequency: config.stop_check_frequency,
            variance: config.gaussian_variance.unwrap_or(0.0),
            n_features_to_add: config.num_features_to_add,
            min_likelihood_delta: config.threshold,
        })
    }

    /// Parameters of the observation trainer; held-out data selects the stop rule
    pub fn from_trainer_config(config: &TrainerConfig) -> Self {
        let stop_criterion = if config.percent_held_out > 0 {
            StopCriterion::HeldOutLikelihood
        } else {
            StopCriterion::ProbsConverge
        };
        Self {
            mode: config.mode,
            stop_criterion,
            percent_held_out: config.percent_held_out,
            max_iterations: config.max_iterations,
            stop_check_frequency: config.stop_check_frequency,
            variance: config.gaussian_variance,
            n_features_to_add: 1,
            min_likelihood_delta: config.min_likelihood_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Untrained,
    Accumulating,
    Derived,
    Scoring,
}

// ============================================================================
// Model
// ============================================================================

pub struct MaxEntModel {
    outcomes: Vec<Symbol>,
    outcome_index: HashMap<Symbol, usize>,
    params: TrainingParams,
    state: ModelState,
    training: EventSet,
    held_out: EventSet,
    n_events_added: u64,
    constant_c: usize,
    correction_alpha: f64,
    alphas: HashMap<Symbol, Vec<(usize, f64)>>,
}

impl MaxEntModel {
    pub fn new(outcomes: Vec<Symbol>, params: TrainingParams) -> Self {
        let outcome_index = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| (o.clone(), i))
            .collect();
        let n = outcomes.len();
        Self {
            outcomes,
            outcome_index,
            params,
            state: ModelState::Untrained,
            training: EventSet::new(n),
            held_out: EventSet::new(n),
            n_events_added: 0,
            constant_c: 0,
            correction_alpha: 0.0,
            alphas: HashMap::new(),
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn outcomes(&self) -> &[Symbol] {
        &self.outcomes
    }

    pub fn n_outcomes(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcome_index(&self, outcome: &Symbol) -> Option<usize> {
        self.outcome_index.get(outcome).copied()
    }

    pub fn constant_c(&self) -> usize {
        self.constant_c
    }

    pub fn correction_alpha(&self) -> f64 {
        self.correction_alpha
    }

    /// Predicates carrying at least one fitted weight
    pub fn predicates(&self) -> impl Iterator<Item = &Symbol> {
        self.alphas.keys()
    }

    /// Number of (predicate, outcome) weights in the fitted table
    pub fn n_weights(&self) -> usize {
        self.alphas.values().map(Vec::len).sum()
    }

    pub fn n_training_events(&self) -> u64 {
        self.training.n_events()
    }

    pub fn n_held_out_events(&self) -> u64 {
        self.held_out.n_events()
    }

    /// Accumulate `count` copies of an event, diverting a share to held-out data
    pub fn add_event(&mut self, event: &MaxEntEvent, count: u64) -> Result<()> {
        if matches!(self.state, ModelState::Derived | ModelState::Scoring) {
            return Err(RelexError::InternalInconsistency(
                "cannot add events to a model that has already been derived".to_string(),
            ));
        }
        let outcome = self.outcome_index(event.outcome()).ok_or_else(|| {
            RelexError::MalformedInput(format!("unknown outcome '{}'", event.outcome()))
        })?;
        let (held_out, training) = self.split_count(count);
        if held_out > 0 {
            self.held_out.add(event.predicates(), outcome, held_out);
        }
        if training > 0 {
            self.training.add(event.predicates(), outcome, training);
        }
        self.n_events_added += count;
        self.state = ModelState::Accumulating;
        Ok(())
    }

    /// Returns (held-out, training) shares of `count`
    fn split_count(&self, count: u64) -> (u64, u64) {
        let percent = self.params.percent_held_out as u64;
        if percent == 0 || count == 0 {
            return (0, count);
        }
        let n = (100 / percent).max(1);
        let slot = self.n_events_added % n;
        let held_out = if slot == 0 {
            if count == 1 {
                1
            } else {
                count.div_ceil(n)
            }
        } else if slot + count > n {
            (slot + count) / n
        } else {
            0
        };
        let held_out = held_out.min(count);
        (held_out, count - held_out)
    }

    /// Prune rare features and fit the weights
    pub fn derive_model(&mut self, pruning_cutoff: u32, threshold: f64) -> Result<()> {
        if matches!(self.state, ModelState::Derived | ModelState::Scoring) {
            return Err(RelexError::InternalInconsistency(
                "model has already been derived".to_string(),
            ));
        }
        self.training.prune(pruning_cutoff as u64)?;
        if self.training.n_events() == 0 {
            warn!("No training events; deriving an empty model");
            self.state = ModelState::Derived;
            return Ok(());
        }
        info!(
            "Deriving model from {} training and {} held-out events",
            self.training.n_events(),
            self.held_out.n_events()
        );
        let weights =
            IterativeScaling::new(&self.params, &self.training, &self.held_out, threshold).fit();
        self.constant_c = weights.constant_c;
        self.correction_alpha = weights.correction_alpha;
        self.alphas = weights.alphas;
        self.training = EventSet::new(self.outcomes.len());
        self.held_out = EventSet::new(self.outcomes.len());
        self.state = ModelState::Derived;
        Ok(())
    }

    fn alpha(&self, predicate: &Symbol, outcome: usize) -> f64 {
        self.alphas
            .get(predicate)
            .and_then(|entries| entries.iter().find(|(o, _)| *o == outcome))
            .map(|(_, a)| *a)
            .unwrap_or(0.0)
    }

    fn score_index(&self, predicates: &[Symbol], outcome: Option<usize>) -> f64 {
        let mut score = 0.0;
        let mut used = 0usize;
        if let Some(outcome) = outcome {
            for predicate in predicates {
                if used >= self.constant_c {
                    break;
                }
                let alpha = self.alpha(predicate, outcome);
                if alpha == 0.0 {
                    continue;
                }
                score += alpha;
                used += 1;
            }
        }
        if used < self.constant_c {
            score += (self.constant_c - used) as f64 * self.correction_alpha;
        }
        score
    }

    /// Unnormalized log score of the event's outcome
    pub fn score(&self, event: &MaxEntEvent) -> f64 {
        self.score_index(event.predicates(), self.outcome_index(event.outcome()))
    }

    pub fn score_outcome(&self, predicates: &[Symbol], outcome: &Symbol) -> f64 {
        self.score_index(predicates, self.outcome_index(outcome))
    }

    /// Scores of every outcome, in outcome order
    pub fn scores(&self, predicates: &[Symbol]) -> Vec<f64> {
        (0..self.outcomes.len())
            .map(|o| self.score_index(predicates, Some(o)))
            .collect()
    }

    /// Probability of the event's outcome under a softmax over all outcomes
    pub fn probability(&self, event: &MaxEntEvent) -> f64 {
        let Some(outcome) = self.outcome_index(event.outcome()) else {
            return 0.0;
        };
        let mut scores = self.scores(event.predicates());
        softmax_in_place(&mut scores);
        scores[outcome]
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        let mut body = String::new();
        body.push_str(&format!(
            "{}\n{}\n{}\n",
            self.constant_c,
            self.correction_alpha,
            self.outcomes.len()
        ));
        for outcome in &self.outcomes {
            body.push_str(outcome.as_str());
            body.push('\n');
        }
        let mut predicates: Vec<&Symbol> = self.alphas.keys().collect();
        predicates.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        body.push_str(&format!("{}\n", predicates.len()));
        for predicate in predicates {
            let entries = &self.alphas[predicate];
            body.push_str(&format!("{} {}", predicate, entries.len()));
            for (outcome, alpha) in entries {
                body.push_str(&format!(" {} {}", outcome, alpha));
            }
            body.push('\n');
        }
        out.write_all(body.as_bytes())
            .map_err(|e| RelexError::Other(anyhow::Error::new(e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = std::fs::File::create(path).map_err(|e| RelexError::io(path, e))?;
        self.write_to(&mut file)
    }

    /// Read one model; further models may follow in the same stream
    pub fn read_from<R: BufRead>(reader: &mut TokenReader<R>) -> Result<Self> {
        let constant_c: usize = reader.parse_next("model constant C")?;
        let correction_alpha: f64 = reader.parse_next("correction alpha")?;
        let n_outcomes: usize = reader.parse_next("outcome count")?;
        let mut outcomes = Vec::with_capacity(n_outcomes);
        for _ in 0..n_outcomes {
            outcomes.push(Symbol::new(&reader.expect_token("outcome")?));
        }
        let mut model = Self::new(outcomes, TrainingParams::default());
        let n_predicates: usize = reader.parse_next("predicate count")?;
        for _ in 0..n_predicates {
            let predicate = Symbol::new(&reader.expect_token("predicate")?);
            let n_entries: usize = reader.parse_next("weight count")?;
            let mut entries = Vec::with_capacity(n_entries);
            for _ in 0..n_entries {
                let outcome: usize = reader.parse_next("outcome index")?;
                if outcome >= n_outcomes {
                    return Err(RelexError::MalformedInput(format!(
                        "outcome index {} out of range for predicate '{}'",
                        outcome, predicate
                    )));
                }
                let alpha: f64 = reader.parse_next("alpha")?;
                entries.push((outcome, alpha));
            }
            model.alphas.insert(predicate, entries);
        }
        model.constant_c = constant_c;
        model.correction_alpha = correction_alpha;
        model.state = ModelState::Scoring;
        Ok(model)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = TokenReader::open(path)?.with_comments();
        Self::read_from(&mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    fn event(predicates: &[&str], outcome: &str) -> MaxEntEvent {
        MaxEntEvent::new(predicates.iter().map(|p| sym(p)).collect(), sym(outcome))
    }

    fn outcomes() -> Vec<Symbol> {
        vec![sym("yes"), sym("no")]
    }

    fn train(params: TrainingParams) -> MaxEntModel {
        let mut model = MaxEntModel::new(outcomes(), params);
        model.add_event(&event(&["a", "x"], "yes"), 8).unwrap();
        model.add_event(&event(&["a", "y"], "yes"), 4).unwrap();
        model.add_event(&event(&["b", "x"], "no"), 8).unwrap();
        model.add_event(&event(&["b", "y"], "no"), 3).unwrap();
        model.add_event(&event(&["a", "y"], "no"), 1).unwrap();
        model.derive_model(0, 0.0001).unwrap();
        model
    }

    #[test]
    fn test_states() {
        let mut model = MaxEntModel::new(outcomes(), TrainingParams::default());
        assert_eq!(model.state(), ModelState::Untrained);
        model.add_event(&event(&["a"], "yes"), 1).unwrap();
        assert_eq!(model.state(), ModelState::Accumulating);
        model.derive_model(0, 0.001).unwrap();
        assert_eq!(model.state(), ModelState::Derived);
        assert!(model.add_event(&event(&["a"], "yes"), 1).is_err());
    }

    #[test]
    fn test_unknown_outcome_rejected_when_training() {
        let mut model = MaxEntModel::new(outcomes(), TrainingParams::default());
        let err = model.add_event(&event(&["a"], "maybe"), 1).unwrap_err();
        assert!(matches!(err, RelexError::MalformedInput(_)));
    }

    #[test]
    fn test_held_out_split() {
        let params = TrainingParams {
            percent_held_out: 25,
            ..TrainingParams::default()
        };
        let mut model = MaxEntModel::new(outcomes(), params);
        for _ in 0..8 {
            model.add_event(&event(&["a"], "yes"), 1).unwrap();
        }
        // every fourth single event is held out
        assert_eq!(model.n_held_out_events(), 2);
        assert_eq!(model.n_training_events(), 6);

        // slot 0 with count 6: ceil(6/4) held out
        model.add_event(&event(&["b"], "no"), 6).unwrap();
        assert_eq!(model.n_held_out_events(), 4);
        // slot 2 with count 3 crosses a boundary: floor(5/4) held out
        model.add_event(&event(&["b"], "no"), 3).unwrap();
        assert_eq!(model.n_held_out_events(), 5);
        assert_eq!(model.n_training_events(), 12);
    }

    #[test]
    fn test_gis_prefers_observed_outcome() {
        let model = train(TrainingParams::default());
        assert!(model.constant_c() == 2);
        let p_yes = model.probability(&event(&["a", "x"], "yes"));
        let p_no = model.probability(&event(&["a", "x"], "no"));
        assert!(p_yes > 0.5, "p(yes|a,x) = {}", p_yes);
        assert!((p_yes + p_no - 1.0).abs() < 1e-9);
        assert!(model.probability(&event(&["b", "x"], "no")) > 0.5);
    }

    #[test]
    fn test_iis_variants_prefer_observed_outcome() {
        for mode in [TrainMode::Iis, TrainMode::IisGaussian, TrainMode::IisFeatureSelection] {
            let params = TrainingParams {
                mode,
                variance: if mode == TrainMode::IisGaussian { 1.0 } else { 0.0 },
                n_features_to_add: 2,
                max_iterations: 200,
                ..TrainingParams::default()
            };
            let model = train(params);
            let p = model.probability(&event(&["a", "x"], "yes"));
            assert!(p > 0.5, "{}: p(yes|a,x) = {}", mode, p);
        }
    }

    #[test]
    fn test_feature_selection_with_held_out_terminates() {
        let params = TrainingParams {
            mode: TrainMode::IisFeatureSelection,
            stop_criterion: StopCriterion::HeldOutLikelihood,
            percent_held_out: 20,
            max_iterations: 50,
            ..TrainingParams::default()
        };
        let model = train(params);
        assert_eq!(model.state(), ModelState::Derived);
        assert!(model.n_weights() > 0);
    }

    #[test]
    fn test_unknown_outcome_gets_default_score() {
        let model = train(TrainingParams::default());
        let default = model.constant_c() as f64 * model.correction_alpha();
        let score = model.score(&event(&["a", "x"], "maybe"));
        assert!((score - default).abs() < 1e-12);
        assert_eq!(model.probability(&event(&["a"], "maybe")), 0.0);
    }

    #[test]
    fn test_unseen_predicates_fall_back_to_correction() {
        let model = train(TrainingParams::default());
        let yes = model.score(&event(&["never-seen"], "yes"));
        let no = model.score(&event(&["never-seen"], "no"));
        assert_eq!(yes, no);
    }

    #[test]
    fn test_save_and_reload_preserves_scores() {
        let model = train(TrainingParams::default());
        let mut buffer = Vec::new();
        model.write_to(&mut buffer).unwrap();
        model.write_to(&mut buffer).unwrap();

        let mut reader = TokenReader::new(buffer.as_slice());
        let first = MaxEntModel::read_from(&mut reader).unwrap();
        let second = MaxEntModel::read_from(&mut reader).unwrap();
        assert_eq!(first.state(), ModelState::Scoring);
        for e in [event(&["a", "x"], "yes"), event(&["b", "y"], "no")] {
            assert_eq!(first.score(&e), model.score(&e));
            assert_eq!(second.score(&e), model.score(&e));
        }
    }

    #[test]
    fn test_truncated_model_is_malformed() {
        let mut reader = TokenReader::new("2\n0.5\n2\nyes\n".as_bytes());
        let err = MaxEntModel::read_from(&mut reader).err().unwrap();
        assert!(matches!(err, RelexError::MalformedInput(_)));
    }

    #[test]
    fn test_log_of_zero() {
        assert_eq!(log(0.0), LOG_OF_ZERO);
        assert_eq!(log(1.0), 0.0);
    }

    #[test]
    fn test_params_require_model_settings() {
        let config = ModelConfig::default();
        assert!(matches!(
            TrainingParams::from_model_config(&config),
            Err(RelexError::Config(_))
        ));
    }
}
