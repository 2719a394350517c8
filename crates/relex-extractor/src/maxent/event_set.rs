//! Event accumulation
//!
//! Events are grouped into contexts (distinct predicate sets) with a count
//! per outcome. A feature is a (predicate, outcome) pair seen in training.

use std::collections::HashMap;

use relex_core::{RelexError, Result, Symbol};

#[derive(Debug, Clone)]
pub(crate) struct EventContext {
    /// Sorted, distinct predicate ids
    pub predicates: Vec<usize>,
    pub outcome_counts: Vec<u64>,
}

impl EventContext {
    pub fn total(&self) -> u64 {
        self.outcome_counts.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Feature {
    pub predicate: usize,
    pub outcome: usize,
    pub count: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct EventSet {
    n_outcomes: usize,
    predicates: Vec<Symbol>,
    predicate_index: HashMap<Symbol, usize>,
    contexts: Vec<EventContext>,
    context_index: HashMap<Vec<usize>, usize>,
    features: Vec<Feature>,
    feature_index: HashMap<(usize, usize), usize>,
    n_events: u64,
}

impl EventSet {
    pub fn new(n_outcomes: usize) -> Self {
        Self {
            n_outcomes,
            predicates: Vec::new(),
            predicate_index: HashMap::new(),
            contexts: Vec::new(),
            context_index: HashMap::new(),
            features: Vec::new(),
            feature_index: HashMap::new(),
            n_events: 0,
        }
    }

    fn intern_predicate(&mut self, predicate: &Symbol) -> usize {
        if let Some(&id) = self.predicate_index.get(predicate) {
            return id;
        }
        let id = self.predicates.len();
        self.predicates.push(predicate.clone());
        self.predicate_index.insert(predicate.clone(), id);
        id
    }

    pub fn add(&mut self, predicates: &[Symbol], outcome: usize, count: u64) {
        if count == 0 {
            return;
        }
        let mut ids: Vec<usize> = predicates.iter().map(|p| self.intern_predicate(p)).collect();
        ids.sort_unstable();
        ids.dedup();
        for &p in &ids {
            let next_id = self.features.len();
            let id = *self.feature_index.entry((p, outcome)).or_insert(next_id);
            if id == next_id {
                self.features.push(Feature {
                    predicate: p,
                    outcome,
                    count: 0,
                });
            }
            self.features[id].count += count;
        }
        self.merge_context(ids, outcome, count);
        self.n_events += count;
    }

    fn merge_context(&mut self, ids: Vec<usize>, outcome: usize, count: u64) {
        match self.context_index.get(&ids) {
            Some(&c) => self.contexts[c].outcome_counts[outcome] += count,
            None => {
                let mut outcome_counts = vec![0; self.n_outcomes];
                outcome_counts[outcome] = count;
                self.context_index.insert(ids.clone(), self.contexts.len());
                self.contexts.push(EventContext {
                    predicates: ids,
                    outcome_counts,
                });
            }
        }
    }

    /// Drop features seen fewer than `threshold` times and merge contexts
    /// that no longer differ
    pub fn prune(&mut self, threshold: u64) -> Result<()> {
        if threshold <= 1 {
            return Ok(());
        }
        let before = self.features.len();
        self.features.retain(|f| f.count >= threshold);
        self.feature_index = self
            .features
            .iter()
            .enumerate()
            .map(|(id, f)| ((f.predicate, f.outcome), id))
            .collect();

        let mut live = vec![false; self.predicates.len()];
        for f in &self.features {
            live[f.predicate] = true;
        }

        let old_contexts = std::mem::take(&mut self.contexts);
        self.context_index.clear();
        for context in old_contexts {
            let kept: Vec<usize> = context
                .predicates
                .iter()
                .copied()
                .filter(|&p| live[p])
                .collect();
            if kept.is_empty() {
                return Err(RelexError::MalformedInput(
                    "No active predicates in training event after pruning".to_string(),
                ));
            }
            for (outcome, &count) in context.outcome_counts.iter().enumerate() {
                if count > 0 {
                    self.merge_context(kept.clone(), outcome, count);
                }
            }
        }

        for context in &self.contexts {
            for (outcome, &count) in context.outcome_counts.iter().enumerate() {
                if count == 0 || count >= threshold {
                    continue;
                }
                let covered = context
                    .predicates
                    .iter()
                    .any(|&p| self.feature_index.contains_key(&(p, outcome)));
                if !covered {
                    return Err(RelexError::MalformedInput(
                        "No active features in training event after pruning".to_string(),
                    ));
                }
            }
        }
        tracing::debug!(
            "Pruned {} of {} features below count {}",
            before - self.features.len(),
            before,
            threshold
        );
        Ok(())
    }

    pub fn n_events(&self) -> u64 {
        self.n_events
    }

    pub fn n_outcomes(&self) -> usize {
        self.n_outcomes
    }

    pub fn contexts(&self) -> &[EventContext] {
        &self.contexts
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn feature_id(&self, predicate: usize, outcome: usize) -> Option<usize> {
        self.feature_index.get(&(predicate, outcome)).copied()
    }

    pub fn predicate_id(&self, predicate: &Symbol) -> Option<usize> {
        self.predicate_index.get(predicate).copied()
    }

    pub fn predicate(&self, id: usize) -> &Symbol {
        &self.predicates[id]
    }

    /// Largest number of predicates in one context
    pub fn max_context_predicates(&self) -> usize {
        self.contexts
            .iter()
            .map(|c| c.predicates.len())
            .max()
            .unwrap_or(0)
    }

    /// Predicate symbols of a context
    pub fn context_symbols(&self, context: &EventContext) -> Vec<Symbol> {
        context
            .predicates
            .iter()
            .map(|&p| self.predicates[p].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|n| Symbol::new(n)).collect()
    }

    #[test]
    fn test_contexts_merge_regardless_of_order() {
        let mut set = EventSet::new(2);
        set.add(&syms(&["a", "b"]), 0, 2);
        set.add(&syms(&["b", "a", "a"]), 1, 1);
        assert_eq!(set.contexts().len(), 1);
        assert_eq!(set.contexts()[0].outcome_counts, vec![2, 1]);
        assert_eq!(set.n_events(), 3);
        assert_eq!(set.features().len(), 4);
        assert_eq!(set.max_context_predicates(), 2);
    }

    #[test]
    fn test_prune_merges_contexts() {
        let mut set = EventSet::new(2);
        set.add(&syms(&["a", "rare1"]), 0, 3);
        set.add(&syms(&["a", "rare2"]), 0, 2);
        set.add(&syms(&["b"]), 1, 4);
        set.prune(3).unwrap();
        // "a" with outcome 0 was seen 5 times; the rare predicates are gone
        assert_eq!(set.contexts().len(), 2);
        assert!(set.contexts().iter().any(|c| c.outcome_counts == vec![5, 0]));
        assert_eq!(set.features().len(), 2);
    }

    #[test]
    fn test_prune_without_surviving_predicates() {
        let mut set = EventSet::new(1);
        set.add(&syms(&["a"]), 0, 5);
        set.add(&syms(&["rare"]), 0, 1);
        let err = set.prune(2).unwrap_err();
        assert!(err.to_string().contains("No active predicates"));
    }

    #[test]
    fn test_prune_without_surviving_feature_for_outcome() {
        let mut set = EventSet::new(2);
        set.add(&syms(&["a"]), 0, 5);
        set.add(&syms(&["a"]), 1, 1);
        let err = set.prune(2).unwrap_err();
        assert!(err.to_string().contains("No active features"));
    }

    #[test]
    fn test_prune_threshold_one_is_noop() {
        let mut set = EventSet::new(1);
        set.add(&syms(&["a"]), 0, 1);
        set.prune(1).unwrap();
        assert_eq!(set.features().len(), 1);
    }
}
