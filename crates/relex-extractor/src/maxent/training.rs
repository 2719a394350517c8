//! Iterative scaling
//!
//! Dense `ndarray` tables indexed by context and outcome hold the predicted
//! distribution and the number of active features firing for each pair. The
//! last slot of the per-feature vectors belongs to the GIS correction feature.

use std::collections::{HashMap, VecDeque};

use ndarray::{Array1, Array2};
use tracing::{debug, info};

use relex_core::{StopCriterion, Symbol, TrainMode};

use super::event_set::EventSet;
use super::{log, TrainingParams};

const NEWTON_START: f64 = 1.1;
const NEWTON_TOLERANCE: f64 = 1e-4;
const NEWTON_MAX_STEPS: usize = 100;
/// Held-out likelihood seeds the feature-selection history
const INITIAL_HELD_OUT_LIKELIHOOD: f64 = -1000.0;
const SELECTION_HISTORY: usize = 10;

/// Weights produced by a fit
#[derive(Debug, Clone, Default)]
pub(crate) struct FittedWeights {
    pub constant_c: usize,
    pub correction_alpha: f64,
    /// predicate -> (outcome, alpha) for every active feature
    pub alphas: HashMap<Symbol, Vec<(usize, f64)>>,
}

pub(crate) struct IterativeScaling<'a> {
    params: &'a TrainingParams,
    training: &'a EventSet,
    threshold: f64,
    n_outcomes: usize,
    n_features: usize,
    constant_c: usize,
    inverse_c: f64,
    /// (outcome, feature) pairs that fire in each training context
    context_features: Vec<Vec<(usize, usize)>>,
    context_prob: Array1<f64>,
    /// training contexts that contain each feature's predicate
    feature_contexts: Vec<Vec<usize>>,
    active: Vec<bool>,
    active_counts: Array2<usize>,
    log_alpha: Array1<f64>,
    observed: Array1<f64>,
    expected: Array1<f64>,
    predicted: Array2<f64>,
    last_predicted: Array2<f64>,
    held_out_features: Vec<Vec<(usize, usize)>>,
    held_out_observed: Array2<f64>,
}

impl<'a> IterativeScaling<'a> {
    pub fn new(
        params: &'a TrainingParams,
        training: &'a EventSet,
        held_out: &EventSet,
        threshold: f64,
    ) -> Self {
        let n_outcomes = training.n_outcomes();
        let n_contexts = training.contexts().len();
        let n_features = training.features().len();
        let n_events = training.n_events() as f64;
        let constant_c = training.max_context_predicates();
        let inverse_c = if constant_c == 0 {
            0.0
        } else {
            1.0 / constant_c as f64
        };

        let mut context_features = Vec::with_capacity(n_contexts);
        let mut context_prob = Array1::zeros(n_contexts);
        let mut feature_contexts = vec![Vec::new(); n_features];
        for (c, context) in training.contexts().iter().enumerate() {
            let mut fired = Vec::new();
            for &p in &context.predicates {
                for o in 0..n_outcomes {
                    if let Some(f) = training.feature_id(p, o) {
                        fired.push((o, f));
                        feature_contexts[f].push(c);
                    }
                }
            }
            context_features.push(fired);
            context_prob[c] = context.total() as f64 / n_events;
        }

        let mut observed = Array1::zeros(n_features + 1);
        for (f, feature) in training.features().iter().enumerate() {
            observed[f] = feature.count as f64 / n_events;
        }

        let held_out_events = held_out.n_events().max(1) as f64;
        let mut held_out_features = Vec::with_capacity(held_out.contexts().len());
        let mut held_out_observed = Array2::zeros((held_out.contexts().len(), n_outcomes));
        for (c, context) in held_out.contexts().iter().enumerate() {
            let mut fired = Vec::new();
            for symbol in held_out.context_symbols(context) {
                let Some(p) = training.predicate_id(&symbol) else {
                    continue;
                };
                for o in 0..n_outcomes {
                    if let Some(f) = training.feature_id(p, o) {
                        fired.push((o, f));
                    }
                }
            }
            held_out_features.push(fired);
            for (o, &count) in context.outcome_counts.iter().enumerate() {
                held_out_observed[[c, o]] = count as f64 / held_out_events;
            }
        }

        let selecting = params.mode == TrainMode::IisFeatureSelection;
        let mut scaling = Self {
            params,
            training,
            threshold,
            n_outcomes,
            n_features,
            constant_c,
            inverse_c,
            context_features,
            context_prob,
            feature_contexts,
            active: vec![!selecting; n_features],
            active_counts: Array2::zeros((n_contexts, n_outcomes)),
            log_alpha: Array1::zeros(n_features + 1),
            observed,
            expected: Array1::zeros(n_features + 1),
            predicted: Array2::zeros((n_contexts, n_outcomes)),
            last_predicted: Array2::zeros((n_contexts, n_outcomes)),
            held_out_features,
            held_out_observed,
        };
        scaling.count_active_features();
        if params.mode == TrainMode::Gis {
            scaling.observed[n_features] = scaling.observed_correction();
        }
        scaling
    }

    fn count_active_features(&mut self) {
        self.active_counts.fill(0);
        for (c, fired) in self.context_features.iter().enumerate() {
            for &(o, f) in fired {
                if self.active[f] {
                    self.active_counts[[c, o]] += 1;
                }
            }
        }
    }

    fn observed_correction(&self) -> f64 {
        if self.constant_c == 0 {
            return 0.0;
        }
        let mut total = 0.0;
        for (c, context) in self.training.contexts().iter().enumerate() {
            for (o, &count) in context.outcome_counts.iter().enumerate() {
                let slack = self.constant_c - self.active_counts[[c, o]];
                total += (slack as f64) * count as f64;
            }
        }
        total / (self.training.n_events() as f64 * self.constant_c as f64)
    }

    fn correction(&self) -> usize {
        self.n_features
    }

    pub fn fit(mut self) -> FittedWeights {
        info!(
            "Training {} model: {} features, {} contexts, {} outcomes, C = {}",
            self.params.mode,
            self.n_features,
            self.context_features.len(),
            self.n_outcomes,
            self.constant_c
        );
        let selecting = self.params.mode == TrainMode::IisFeatureSelection;
        let mut round = 0usize;
        let mut last_likelihood = INITIAL_HELD_OUT_LIKELIHOOD;
        let mut history: VecDeque<f64> = std::iter::repeat(0.0).take(SELECTION_HISTORY).collect();

        loop {
            if selecting && round > 0 {
                let added = self.add_best_features();
                if added == 0 {
                    info!("No inactive features remain after {} rounds", round);
                    break;
                }
            }
            let likelihood = self.scale();
            if !selecting {
                break;
            }
            let diff = likelihood - last_likelihood;
            last_likelihood = likelihood;
            history.pop_back();
            history.push_front(diff);
            debug!(
                "Selection round {}: held-out likelihood {:.6} ({:+.6})",
                round, likelihood, diff
            );
            if history.iter().all(|d| *d <= 0.0)
                && round >= SELECTION_HISTORY
                && round > 2 * self.n_outcomes
            {
                info!("Held-out likelihood stopped improving after {} rounds", round);
                break;
            }
            round += 1;
        }
        self.into_weights()
    }

    /// Inner scaling loop; returns the final held-out log-likelihood
    fn scale(&mut self) -> f64 {
        self.last_predicted.fill(0.0);
        let mut last_likelihood = log(0.0);
        let mut likelihood = 0.0;
        let frequency = self.params.stop_check_frequency.max(1);
        for iteration in 0..self.params.max_iterations {
            if iteration > 0 {
                self.find_alphas();
            }
            let probs_changed = self.find_predicted_probs();
            self.find_expectations();
            likelihood = self.held_out_likelihood();
            let likelihood_changed =
                (likelihood - last_likelihood).abs() > self.params.min_likelihood_delta;
            last_likelihood = likelihood;

            let changing = match self.params.stop_criterion {
                StopCriterion::ProbsConverge => probs_changed,
                StopCriterion::HeldOutLikelihood => likelihood_changed,
            };
            if iteration % 100 == 0 {
                debug!("Iteration {}: held-out likelihood {:.6}", iteration, likelihood);
            }
            if iteration % frequency == 0 && !changing {
                debug!("Converged after {} iterations", iteration + 1);
                break;
            }
        }
        likelihood
    }

    fn find_predicted_probs(&mut self) -> bool {
        let gis = self.params.mode == TrainMode::Gis;
        let correction_alpha = self.log_alpha[self.correction()];
        let mut changed = false;
        let mut scores = vec![0.0; self.n_outcomes];
        for (c, fired) in self.context_features.iter().enumerate() {
            scores.iter_mut().for_each(|s| *s = 0.0);
            for &(o, f) in fired {
                if self.active[f] {
                    scores[o] += self.log_alpha[f];
                }
            }
            if gis {
                for (o, score) in scores.iter_mut().enumerate() {
                    let slack = self.constant_c - self.active_counts[[c, o]];
                    *score += slack as f64 * correction_alpha;
                }
            }
            softmax_in_place(&mut scores);
            for (o, &p) in scores.iter().enumerate() {
                self.predicted[[c, o]] = p;
                if (p - self.last_predicted[[c, o]]).abs() > self.threshold {
                    changed = true;
                    self.last_predicted[[c, o]] = p;
                }
            }
        }
        changed
    }

    fn find_expectations(&mut self) {
        let gis = self.params.mode == TrainMode::Gis;
        let correction = self.correction();
        self.expected.fill(0.0);
        for (c, fired) in self.context_features.iter().enumerate() {
            let weight = self.context_prob[c];
            for &(o, f) in fired {
                self.expected[f] += weight * self.predicted[[c, o]];
            }
            if gis {
                for o in 0..self.n_outcomes {
                    let slack = (self.constant_c - self.active_counts[[c, o]]) as f64;
                    self.expected[correction] +=
                        slack * self.inverse_c * weight * self.predicted[[c, o]];
                }
            }
        }
    }

    fn find_alphas(&mut self) {
        match self.params.mode {
            TrainMode::Gis => {
                for f in 0..=self.n_features {
                    self.log_alpha[f] +=
                        self.inverse_c * (log(self.observed[f]) - log(self.expected[f]));
                }
            }
            TrainMode::Iis | TrainMode::IisGaussian | TrainMode::IisFeatureSelection => {
                for f in 0..self.n_features {
                    if self.active[f] {
                        self.log_alpha[f] += self.newton_step(f);
                    }
                }
            }
        }
    }

    /// Solve for the IIS update of one feature; returns log(gamma)
    fn newton_step(&self, f: usize) -> f64 {
        let outcome = self.training.features()[f].outcome;
        let variance = match self.params.mode {
            TrainMode::IisGaussian => self.params.variance,
            _ => 0.0,
        };
        let observed = self.observed[f];
        let mut gamma = NEWTON_START;
        for _ in 0..NEWTON_MAX_STEPS {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for &c in &self.feature_contexts[f] {
                let weight = self.context_prob[c] * self.predicted[[c, outcome]];
                let k = self.active_counts[[c, outcome]] as i32;
                numerator += weight * gamma.powi(k);
                denominator += weight * k as f64 * gamma.powi(k - 1);
            }
            if variance != 0.0 {
                numerator += (self.log_alpha[f] + gamma.ln()) / variance;
                denominator += 1.0 / (variance * gamma);
            }
            if denominator == 0.0 || !denominator.is_finite() {
                break;
            }
            let mut next = gamma + (observed - numerator) / denominator;
            if next <= 0.0 || !next.is_finite() {
                next = gamma / 2.0;
            }
            let step = (next - gamma).abs();
            gamma = next;
            if step < NEWTON_TOLERANCE {
                break;
            }
        }
        log(gamma)
    }

    fn held_out_likelihood(&self) -> f64 {
        let mut total = 0.0;
        let mut scores = vec![0.0; self.n_outcomes];
        for (c, fired) in self.held_out_features.iter().enumerate() {
            scores.iter_mut().for_each(|s| *s = 0.0);
            for &(o, f) in fired {
                if self.active[f] {
                    scores[o] += self.log_alpha[f];
                }
            }
            softmax_in_place(&mut scores);
            for (o, &p) in scores.iter().enumerate() {
                let observed = self.held_out_observed[[c, o]];
                if observed > 0.0 {
                    total += observed * log(p);
                }
            }
        }
        total
    }

    /// Activate the inactive features with the highest gain
    fn add_best_features(&mut self) -> usize {
        let wanted = self.params.n_features_to_add.max(1);
        let mut best: Vec<(usize, f64, f64)> = Vec::with_capacity(wanted + 1);
        for f in 0..self.n_features {
            if self.active[f] {
                continue;
            }
            let Some((alpha, gain)) = self.feature_gain(f) else {
                continue;
            };
            let position = best
                .iter()
                .position(|&(_, _, g)| gain > g)
                .unwrap_or(best.len());
            if position < wanted {
                best.insert(position, (f, alpha, gain));
                best.truncate(wanted);
            }
        }
        for &(f, alpha, gain) in &best {
            debug!(
                "Adding feature {} / outcome {} (gain {:.6})",
                self.training.predicate(self.training.features()[f].predicate),
                self.training.features()[f].outcome,
                gain
            );
            self.active[f] = true;
            self.log_alpha[f] = alpha;
        }
        self.count_active_features();
        best.len()
    }

    fn feature_gain(&self, f: usize) -> Option<(f64, f64)> {
        let observed = self.observed[f];
        let predicted = self.expected[f];
        if observed <= 0.0 || observed >= 1.0 || predicted <= 0.0 || predicted >= 1.0 {
            return None;
        }
        let alpha = log(observed * (1.0 - predicted) / (predicted * (1.0 - observed)));
        let outcome = self.training.features()[f].outcome;
        let mut gain = alpha * observed;
        for &c in &self.feature_contexts[f] {
            let p = self.predicted[[c, outcome]];
            let z = 1.0 - p + p * alpha.exp();
            gain -= self.context_prob[c] * log(z);
        }
        Some((alpha, gain))
    }

    fn into_weights(self) -> FittedWeights {
        let mut alphas: HashMap<Symbol, Vec<(usize, f64)>> = HashMap::new();
        for (f, feature) in self.training.features().iter().enumerate() {
            if !self.active[f] || self.log_alpha[f] == 0.0 {
                continue;
            }
            alphas
                .entry(self.training.predicate(feature.predicate).clone())
                .or_default()
                .push((feature.outcome, self.log_alpha[f]));
        }
        let correction_alpha = match self.params.mode {
            TrainMode::Gis => self.log_alpha[self.correction()],
            _ => 0.0,
        };
        FittedWeights {
            constant_c: self.constant_c,
            correction_alpha,
            alphas,
        }
    }
}

/// Numerically stable softmax over raw scores
pub(crate) fn softmax_in_place(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        let uniform = 1.0 / scores.len().max(1) as f64;
        scores.iter_mut().for_each(|s| *s = uniform);
        return;
    }
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    scores.iter_mut().for_each(|s| *s /= sum);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let mut scores = vec![1.0, 2.0, -3.0];
        softmax_in_place(&mut scores);
        let total: f64 = scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(scores[1] > scores[0] && scores[0] > scores[2]);
    }

    #[test]
    fn test_softmax_handles_large_magnitudes() {
        let mut scores = vec![-20000.0, -20001.0];
        softmax_in_place(&mut scores);
        assert!(scores.iter().all(|p| p.is_finite()));
        assert!(scores[0] > scores[1]);
    }
}
