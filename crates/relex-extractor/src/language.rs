//! Per-language relation utilities
//!
//! One capability interface with a concrete implementation per language,
//! selected from configuration at startup.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use relex_core::{symbols, Language, RelexError, ResourceConfig, Result, Symbol};

use crate::theory::{MentionType, PredType, TheoryBundle};

/// Language-specific knowledge used while building observations and instances
pub trait RelationUtilities: Send + Sync {
    fn language(&self) -> Language;

    /// Canonical form of a proposition predicate
    fn stem_predicate(&self, predicate: &Symbol, pred_type: PredType) -> Result<Symbol>;

    /// Canonical form of a token given its POS tag
    fn stem_word(&self, word: &Symbol, pos: &Symbol) -> Symbol;

    fn stem_noun(&self, word: &Symbol) -> Symbol {
        self.stem_word(word, &Symbol::new("NN"))
    }

    fn stem_verb(&self, word: &Symbol) -> Symbol {
        self.stem_word(word, &Symbol::new("VB"))
    }

    /// Whether a direct link between two mentions is really a stack of
    /// prepositional phrases that should hang off the first mention
    fn is_prep_stack(
        &self,
        _theory: &TheoryBundle,
        _left: usize,
        _right: usize,
        _left_role: &Symbol,
        _right_role: &Symbol,
    ) -> bool {
        false
    }

    /// Whether two mentions may be paired as relation arguments
    fn valid_relation_args(&self, theory: &TheoryBundle, left: usize, right: usize) -> bool {
        default_valid_relation_args(theory, left, right)
    }

    fn is_verb_tag(&self, tag: &Symbol) -> bool {
        tag.as_str().starts_with('V')
    }

    fn is_np_tag(&self, tag: &Symbol) -> bool {
        tag.as_str() == "NP"
    }

    fn is_preposition_tag(&self, tag: &Symbol) -> bool {
        tag.as_str() == "IN"
    }

    /// Number of tokens strictly between two mentions
    fn mention_distance(&self, theory: &TheoryBundle, left: usize, right: usize) -> usize {
        let (first, second) = if theory.mention_start(left) <= theory.mention_start(right) {
            (left, right)
        } else {
            (right, left)
        };
        theory
            .mention_start(second)
            .saturating_sub(theory.mention_end(first) + 1)
    }
}

fn default_valid_relation_args(theory: &TheoryBundle, left: usize, right: usize) -> bool {
    if left == right {
        return false;
    }
    let (Some(m1), Some(m2)) = (theory.mentions.get(left), theory.mentions.get(right)) else {
        return false;
    };
    if m1.mention_type.is_structural() || m2.mention_type.is_structural() {
        return false;
    }
    if let (Some(e1), Some(e2)) = (m1.entity_id, m2.entity_id) {
        if e1 == e2 {
            return false;
        }
    }
    m1.parent != Some(right) && m2.parent != Some(left)
}

/// Build the utilities for the configured language
pub fn relation_utilities(config: &ResourceConfig) -> Result<Arc<dyn RelationUtilities>> {
    let utilities: Arc<dyn RelationUtilities> = match config.language {
        Language::English => Arc::new(EnglishRelationUtilities),
        Language::Chinese => Arc::new(ChineseRelationUtilities),
        Language::Arabic => match &config.segmentation_table {
            Some(path) => Arc::new(ArabicRelationUtilities::from_file(path)?),
            None => Arc::new(ArabicRelationUtilities::default()),
        },
        Language::Generic => Arc::new(GenericRelationUtilities),
    };
    tracing::debug!("Using {} relation utilities", config.language.as_str());
    Ok(utilities)
}

// ============================================================================
// Generic
// ============================================================================

/// Identity stemming, no prep stacking
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericRelationUtilities;

impl RelationUtilities for GenericRelationUtilities {
    fn language(&self) -> Language {
        Language::Generic
    }

    fn stem_predicate(&self, predicate: &Symbol, _pred_type: PredType) -> Result<Symbol> {
        Ok(predicate.clone())
    }

    fn stem_word(&self, word: &Symbol, _pos: &Symbol) -> Symbol {
        word.clone()
    }
}

// ============================================================================
// English
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishRelationUtilities;

impl EnglishRelationUtilities {
    fn stem_english_noun(word: &str) -> String {
        let lower = word.to_lowercase();
        if lower.len() > 4 && lower.ends_with("ies") {
            return format!("{}y", &lower[..lower.len() - 3]);
        }
        for suffix in ["sses", "ches", "shes", "xes", "zes"] {
            if lower.ends_with(suffix) {
                return lower[..lower.len() - 2].to_string();
            }
        }
        if lower.len() > 3 && lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us")
        {
            return lower[..lower.len() - 1].to_string();
        }
        lower
    }

    fn stem_english_verb(word: &str) -> String {
        let lower = word.to_lowercase();
        let undouble = |stem: &str| -> String {
            let bytes = stem.as_bytes();
            let n = bytes.len();
            if n >= 3
                && bytes[n - 1] == bytes[n - 2]
                && !matches!(bytes[n - 1], b'l' | b's' | b'z' | b'f')
                && bytes[n - 1].is_ascii_alphabetic()
            {
                stem[..n - 1].to_string()
            } else {
                stem.to_string()
            }
        };
        if lower.len() > 4 && (lower.ends_with("ies") || lower.ends_with("ied")) {
            return format!("{}y", &lower[..lower.len() - 3]);
        }
        if lower.len() > 5 && lower.ends_with("ing") {
            return undouble(&lower[..lower.len() - 3]);
        }
        if lower.len() > 4 && lower.ends_with("ed") {
            return undouble(&lower[..lower.len() - 2]);
        }
        for suffix in ["ches", "shes", "sses", "xes", "zes"] {
            if lower.ends_with(suffix) {
                return lower[..lower.len() - 2].to_string();
            }
        }
        if lower.len() > 3 && lower.ends_with('s') && !lower.ends_with("ss") {
            return lower[..lower.len() - 1].to_string();
        }
        lower
    }
}

impl RelationUtilities for EnglishRelationUtilities {
    fn language(&self) -> Language {
        Language::English
    }

    fn stem_predicate(&self, predicate: &Symbol, pred_type: PredType) -> Result<Symbol> {
        Ok(match pred_type {
            PredType::Verb | PredType::Copula => self.stem_verb(predicate),
            PredType::Noun | PredType::Poss => self.stem_noun(predicate),
            _ => Symbol::new(&predicate.as_str().to_lowercase()),
        })
    }

    fn stem_word(&self, word: &Symbol, pos: &Symbol) -> Symbol {
        let tag = pos.as_str();
        if tag.starts_with("NNP") {
            word.clone()
        } else if tag.starts_with('N') {
            Symbol::new(&Self::stem_english_noun(word.as_str()))
        } else if tag.starts_with('V') {
            Symbol::new(&Self::stem_english_verb(word.as_str()))
        } else {
            Symbol::new(&word.as_str().to_lowercase())
        }
    }

    fn stem_noun(&self, word: &Symbol) -> Symbol {
        Symbol::new(&Self::stem_english_noun(word.as_str()))
    }

    fn stem_verb(&self, word: &Symbol) -> Symbol {
        Symbol::new(&Self::stem_english_verb(word.as_str()))
    }

    fn is_prep_stack(
        &self,
        theory: &TheoryBundle,
        left: usize,
        right: usize,
        _left_role: &Symbol,
        _right_role: &Symbol,
    ) -> bool {
        let (Some(m1), Some(m2)) = (theory.mentions.get(left), theory.mentions.get(right)) else {
            return false;
        };
        let parse = &theory.parse;
        let (Some(first_pp), Some(second_pp)) = (parse.parent(m1.node), parse.parent(m2.node))
        else {
            return false;
        };
        if parse.node(first_pp).tag != "PP" || parse.node(second_pp).tag != "PP" {
            return false;
        }
        let Some(parent) = parse.parent(first_pp) else {
            return false;
        };
        if parse.parent(second_pp) != Some(parent) {
            return false;
        }
        let children = &parse.node(parent).children;
        let adjacent = children
            .windows(2)
            .any(|pair| pair[0] == first_pp && pair[1] == second_pp);
        if !adjacent {
            return false;
        }

        let left_ok = ["FAC", "GPE", "LOC", "ORG", "PER"].contains(&m1.entity_type.as_str());
        let right_ok = ["FAC", "GPE", "LOC", "ORG"].contains(&m2.entity_type.as_str());
        if !left_ok || !right_ok {
            return false;
        }
        // names rarely stack under descriptors
        !(m1.mention_type == MentionType::Name && m2.mention_type == MentionType::Desc)
    }
}

// ============================================================================
// Chinese
// ============================================================================

/// Chinese words are not inflected; stems are the words themselves
#[derive(Debug, Clone, Copy, Default)]
pub struct ChineseRelationUtilities;

impl RelationUtilities for ChineseRelationUtilities {
    fn language(&self) -> Language {
        Language::Chinese
    }

    fn stem_predicate(&self, predicate: &Symbol, _pred_type: PredType) -> Result<Symbol> {
        Ok(predicate.clone())
    }

    fn stem_word(&self, word: &Symbol, _pos: &Symbol) -> Symbol {
        word.clone()
    }

    fn is_verb_tag(&self, tag: &Symbol) -> bool {
        matches!(tag.as_str(), "VV" | "VA" | "VC" | "VE" | "VP") || tag.as_str().starts_with('V')
    }

    fn is_preposition_tag(&self, tag: &Symbol) -> bool {
        matches!(tag.as_str(), "P" | "IN")
    }
}

// ============================================================================
// Arabic
// ============================================================================

/// Stems through a `surface root` segmentation table
#[derive(Debug, Clone, Default)]
pub struct ArabicRelationUtilities {
    segmentation: Option<HashMap<Symbol, Symbol>>,
}

impl ArabicRelationUtilities {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| RelexError::io(path, e))?;
        let mut table = HashMap::new();
        for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| RelexError::io(path, e))?;
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(surface), Some(root)) => {
                    table.insert(Symbol::new(surface), Symbol::new(root));
                }
                (None, _) => {}
                (Some(_), None) => {
                    tracing::warn!(
                        "Skipping segmentation line {} in {}: missing root",
                        line_no + 1,
                        path.display()
                    );
                }
            }
        }
        Ok(Self::with_table(table))
    }

    pub fn with_table(table: HashMap<Symbol, Symbol>) -> Self {
        Self {
            segmentation: Some(table),
        }
    }
}

impl RelationUtilities for ArabicRelationUtilities {
    fn language(&self) -> Language {
        Language::Arabic
    }

    fn stem_predicate(&self, predicate: &Symbol, _pred_type: PredType) -> Result<Symbol> {
        if *predicate == *symbols::NULL {
            return Ok(predicate.clone());
        }
        let table = self.segmentation.as_ref().ok_or_else(|| {
            RelexError::InternalInconsistency(format!(
                "no morphological segmentation available to stem predicate '{}'",
                predicate
            ))
        })?;
        Ok(table.get(predicate).cloned().unwrap_or_else(|| predicate.clone()))
    }

    fn stem_word(&self, word: &Symbol, _pos: &Symbol) -> Symbol {
        self.segmentation
            .as_ref()
            .and_then(|table| table.get(word).cloned())
            .unwrap_or_else(|| word.clone())
    }
}
