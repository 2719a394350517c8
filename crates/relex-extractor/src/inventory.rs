//! Relation and entity type inventories

use std::collections::{HashMap, HashSet};
use std::path::Path;

use relex_core::{symbols, RelexError, ResourceConfig, Result, Symbol};

use crate::tokens::TokenReader;

// ============================================================================
// Relation types
// ============================================================================

/// Suffix used to name the reverse outcome of an asymmetric type
pub const REVERSE_SUFFIX: &str = ":REV";

#[derive(Debug, Clone)]
struct RelationTypeEntry {
    name: Symbol,
    symmetric: bool,
    reverse: Symbol,
}

/// A relation type together with its direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationTypeRef {
    pub index: usize,
    pub reversed: bool,
}

/// Ordered relation type inventory with exactly one null type
#[derive(Debug, Clone)]
pub struct RelationTypeSet {
    entries: Vec<RelationTypeEntry>,
    by_name: HashMap<Symbol, RelationTypeRef>,
    null_index: usize,
}

impl RelationTypeSet {
    /// Build from `(name, symmetric)` pairs. A `NONE` type is added in
    /// front when the list does not contain one.
    pub fn from_pairs(pairs: &[(&str, bool)]) -> Result<Self> {
        let owned: Vec<(Symbol, bool, Option<Symbol>)> = pairs
            .iter()
            .map(|(name, symmetric)| (Symbol::new(name), *symmetric, None))
            .collect();
        Self::build(owned)
    }

    fn build(mut raw: Vec<(Symbol, bool, Option<Symbol>)>) -> Result<Self> {
        if !raw.iter().any(|(name, _, _)| *name == *symbols::NONE) {
            raw.insert(0, (symbols::NONE.clone(), true, None));
        }

        let mut entries = Vec::with_capacity(raw.len());
        let mut by_name = HashMap::new();
        let mut null_index = 0;
        for (index, (name, symmetric, reverse)) in raw.into_iter().enumerate() {
            let is_null = name == *symbols::NONE;
            if is_null {
                null_index = index;
            }
            let symmetric = symmetric || is_null;
            let reverse = match reverse {
                Some(r) => r,
                None if symmetric => name.clone(),
                None => Symbol::new(&format!("{}{}", name, REVERSE_SUFFIX)),
            };
            let forward = RelationTypeRef {
                index,
                reversed: false,
            };
            if by_name.insert(name.clone(), forward).is_some() {
                return Err(RelexError::MalformedInput(format!(
                    "duplicate relation type: {}",
                    name
                )));
            }
            if !symmetric {
                by_name.insert(
                    reverse.clone(),
                    RelationTypeRef {
                        index,
                        reversed: true,
                    },
                );
            }
            entries.push(RelationTypeEntry {
                name,
                symmetric,
                reverse,
            });
        }

        Ok(Self {
            entries,
            by_name,
            null_index,
        })
    }

    /// Read a relation type file: a count, then `NAME symmetric|asymmetric [REVERSE]`
    /// per line
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = TokenReader::open(path)?;
        let count: usize = reader.parse_next("relation type count")?;
        let mut raw = Vec::with_capacity(count);
        for _ in 0..count {
            let line = reader.next_line()?.ok_or_else(|| {
                RelexError::MalformedInput(format!(
                    "{}: expected {} relation types",
                    path.display(),
                    count
                ))
            })?;
            let mut fields = line.split_whitespace();
            let name = fields
                .next()
                .ok_or_else(|| RelexError::MalformedInput("empty relation type line".to_string()))?;
            let symmetric = match fields.next().map(|s| s.to_lowercase()) {
                None => false,
                Some(s) if s == "symmetric" => true,
                Some(s) if s == "asymmetric" => false,
                Some(other) => {
                    return Err(RelexError::MalformedInput(format!(
                        "relation type {}: expected symmetric or asymmetric, found {}",
                        name, other
                    )))
                }
            };
            let reverse = fields.next().map(Symbol::new);
            raw.push((Symbol::new(name), symmetric, reverse));
        }
        tracing::info!("Loaded {} relation types from {}", raw.len(), path.display());
        Self::build(raw)
    }

    /// Number of base types (reverse outcomes are not counted)
    pub fn n_types(&self) -> usize {
        self.entries.len()
    }

    pub fn null_index(&self) -> usize {
        self.null_index
    }

    pub fn null_ref(&self) -> RelationTypeRef {
        RelationTypeRef {
            index: self.null_index,
            reversed: false,
        }
    }

    pub fn is_null(&self, index: usize) -> bool {
        index == self.null_index
    }

    pub fn is_symmetric(&self, index: usize) -> bool {
        self.entries.get(index).map_or(true, |e| e.symmetric)
    }

    pub fn type_symbol(&self, index: usize) -> &Symbol {
        &self.entries[index].name
    }

    pub fn reverse_symbol(&self, index: usize) -> &Symbol {
        &self.entries[index].reverse
    }

    /// Outcome symbol for a directed type
    pub fn outcome_symbol(&self, relation: RelationTypeRef) -> &Symbol {
        if relation.reversed && !self.is_symmetric(relation.index) {
            self.reverse_symbol(relation.index)
        } else {
            self.type_symbol(relation.index)
        }
    }

    /// Resolve a type or reverse-outcome symbol
    pub fn lookup(&self, symbol: &Symbol) -> Option<RelationTypeRef> {
        self.by_name.get(symbol).copied()
    }

    /// True when the symbol names a type or a reverse outcome
    pub fn is_valid(&self, symbol: &Symbol) -> bool {
        self.by_name.contains_key(symbol)
    }

    /// True when `symbol` names a symmetric type (unknown symbols are not)
    pub fn is_symmetric_symbol(&self, symbol: &Symbol) -> bool {
        self.lookup(symbol)
            .map_or(false, |r| self.entries[r.index].symmetric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Symbol)> {
        self.entries.iter().enumerate().map(|(i, e)| (i, &e.name))
    }
}

// ============================================================================
// Entity types
// ============================================================================

/// Entity types known to the mention finder and those allowed as relation args
#[derive(Debug, Clone)]
pub struct EntityTypeSet {
    recognized: HashSet<Symbol>,
    relation_args: HashSet<Symbol>,
}

impl EntityTypeSet {
    pub fn new(recognized: &[&str], relation_args: &[&str]) -> Self {
        Self {
            recognized: recognized.iter().map(|s| Symbol::new(s)).collect(),
            relation_args: relation_args.iter().map(|s| Symbol::new(s)).collect(),
        }
    }

    pub fn from_config(config: &ResourceConfig) -> Self {
        Self {
            recognized: config
                .recognized_entity_types
                .iter()
                .map(|s| Symbol::new(s))
                .collect(),
            relation_args: config
                .relation_arg_entity_types
                .iter()
                .map(|s| Symbol::new(s))
                .collect(),
        }
    }

    pub fn is_recognized(&self, entity_type: &Symbol) -> bool {
        self.recognized.contains(entity_type)
    }

    pub fn can_be_rel_arg(&self, entity_type: &Symbol) -> bool {
        self.relation_args.contains(entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> RelationTypeSet {
        RelationTypeSet::from_pairs(&[("EMP-ORG", false), ("PER-SOC", true)]).unwrap()
    }

    #[test]
    fn test_null_type_added() {
        let types = sample();
        assert_eq!(types.n_types(), 3);
        assert_eq!(types.null_index(), 0);
        assert!(types.is_symmetric(0));
        assert_eq!(types.type_symbol(0), &*symbols::NONE);
    }

    #[test]
    fn test_reverse_lookup() {
        let types = sample();
        let emp = types.lookup(&Symbol::new("EMP-ORG")).unwrap();
        assert!(!emp.reversed);
        let rev = types.lookup(&Symbol::new("EMP-ORG:REV")).unwrap();
        assert_eq!(rev.index, emp.index);
        assert!(rev.reversed);
        assert_eq!(types.outcome_symbol(rev), "EMP-ORG:REV");

        let soc = types.lookup(&Symbol::new("PER-SOC")).unwrap();
        assert!(types.is_symmetric(soc.index));
        assert!(types.lookup(&Symbol::new("PER-SOC:REV")).is_none());
        let forced = RelationTypeRef {
            index: soc.index,
            reversed: true,
        };
        assert_eq!(types.outcome_symbol(forced), "PER-SOC");
    }

    #[test]
    fn test_duplicate_type_rejected() {
        assert!(RelationTypeSet::from_pairs(&[("A", false), ("A", true)]).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3").unwrap();
        writeln!(file, "NONE symmetric").unwrap();
        writeln!(file, "PART-WHOLE asymmetric WHOLE-PART").unwrap();
        writeln!(file, "NEAR symmetric").unwrap();
        let types = RelationTypeSet::from_file(file.path()).unwrap();
        assert_eq!(types.n_types(), 3);
        let rev = types.lookup(&Symbol::new("WHOLE-PART")).unwrap();
        assert!(rev.reversed);
        assert_eq!(types.type_symbol(rev.index), "PART-WHOLE");
    }

    #[test]
    fn test_entity_types() {
        let set = EntityTypeSet::new(&["PER", "ORG", "TIME"], &["PER", "ORG"]);
        assert!(set.is_recognized(&Symbol::new("TIME")));
        assert!(!set.can_be_rel_arg(&Symbol::new("TIME")));
        assert!(!set.is_recognized(&Symbol::new("UNDET")));
    }
}
