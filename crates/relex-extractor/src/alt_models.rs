//! Alternate relation models
//!
//! A small bank of secondary decoders whose top predictions are exposed to
//! feature types as `(model name, predicted outcome)` pairs.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use relex_core::{AltModelSpec, ModelConfig, RelexError, Result, Symbol};

use crate::instance::RelationInstance;
use crate::model::{RelationInventory, RelationModel};

/// Largest number of decoders a bank accepts
pub const MAX_ALT_MODELS: usize = 5;

/// A secondary model that labels relation instances
pub trait AltDecoder: Send + Sync {
    fn name(&self) -> &Symbol;

    /// Top outcome for the instance
    fn decode(&self, instance: &RelationInstance) -> Result<Symbol>;
}

#[derive(Default)]
pub struct AltModelBank {
    decoders: Vec<Box<dyn AltDecoder>>,
}

impl fmt::Debug for AltModelBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decoders.iter().map(|d| d.name()))
            .finish()
    }
}

impl AltModelBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every configured vector model against a shared inventory
    pub fn from_specs(specs: &[AltModelSpec], inventory: &RelationInventory) -> Result<Self> {
        let mut bank = Self::new();
        for spec in specs {
            let config = ModelConfig {
                is_split_level_decision: Some(spec.is_split_level_decision),
                ..ModelConfig::default()
            };
            let model = RelationModel::load(&spec.model_file, &config, inventory.clone())?;
            bank.add(Box::new(VectorModelDecoder::new(&spec.name, model)))?;
        }
        if !bank.is_empty() {
            info!("Loaded {} alt models: {:?}", bank.len(), bank);
        }
        Ok(bank)
    }

    pub fn add(&mut self, decoder: Box<dyn AltDecoder>) -> Result<()> {
        if self.decoders.len() == MAX_ALT_MODELS {
            return Err(RelexError::Config(format!(
                "cannot add alt model {}: at most {} are supported",
                decoder.name(),
                MAX_ALT_MODELS
            )));
        }
        self.decoders.push(decoder);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// `(name, prediction)` for each decoder, in insertion order
    pub fn predictions(&self, instance: &RelationInstance) -> Result<Vec<(Symbol, Symbol)>> {
        self.decoders
            .iter()
            .map(|d| Ok((d.name().clone(), d.decode(instance)?)))
            .collect()
    }
}

/// Alt decoder backed by a trained relation model
pub struct VectorModelDecoder {
    name: Symbol,
    model: Arc<RelationModel>,
}

impl VectorModelDecoder {
    pub fn new(name: &str, model: RelationModel) -> Self {
        Self {
            name: Symbol::new(name),
            model: Arc::new(model),
        }
    }
}

impl AltDecoder for VectorModelDecoder {
    fn name(&self) -> &Symbol {
        &self.name
    }

    fn decode(&self, instance: &RelationInstance) -> Result<Symbol> {
        let best = self.model.find_best_relation_type(instance);
        Ok(self
            .model
            .inventory()
            .relation_types
            .outcome_symbol(best)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Symbol, &'static str);

    impl AltDecoder for Fixed {
        fn name(&self) -> &Symbol {
            &self.0
        }

        fn decode(&self, _instance: &RelationInstance) -> Result<Symbol> {
            Ok(Symbol::new(self.1))
        }
    }

    #[test]
    fn test_predictions_in_order() {
        let mut bank = AltModelBank::new();
        bank.add(Box::new(Fixed(Symbol::new("a"), "PHYS"))).unwrap();
        bank.add(Box::new(Fixed(Symbol::new("b"), "NONE"))).unwrap();
        let predictions = bank.predictions(&RelationInstance::default()).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].0, "a");
        assert_eq!(predictions[0].1, "PHYS");
        assert_eq!(predictions[1].1, "NONE");
    }

    #[test]
    fn test_bank_capacity() {
        let mut bank = AltModelBank::new();
        for i in 0..MAX_ALT_MODELS {
            bank.add(Box::new(Fixed(Symbol::new(&format!("m{}", i)), "NONE")))
                .unwrap();
        }
        let err = bank
            .add(Box::new(Fixed(Symbol::new("extra"), "NONE")))
            .unwrap_err();
        assert!(matches!(err, RelexError::Config(_)));
        assert_eq!(bank.len(), MAX_ALT_MODELS);
    }

    #[test]
    fn test_empty_bank() {
        let bank = AltModelBank::default();
        assert!(bank.predictions(&RelationInstance::default()).unwrap().is_empty());
    }
}
