//! Word cluster table
//!
//! Reads `word bitstring` lines (Brown-style clusters) and derives one
//! cluster id per configured prefix length. A prefix is only used when it
//! is strictly shorter than the word's full bitstring.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use relex_core::{RelexError, Result, Symbol};

static BITSTRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[01]+$").expect("bitstring pattern is valid"));

/// Longest prefix that still fits a leading-one encoding in an `i64`
const MAX_PREFIX_BITS: usize = 62;

#[derive(Debug, Clone, Default)]
pub struct WordClusterTable {
    prefix_lengths: Vec<usize>,
    clusters: HashMap<Symbol, Vec<i64>>,
}

impl WordClusterTable {
    pub fn new(prefix_lengths: &[usize]) -> Self {
        Self {
            prefix_lengths: prefix_lengths.to_vec(),
            clusters: HashMap::new(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>, prefix_lengths: &[usize]) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| RelexError::io(path, e))?;
        let table = Self::from_reader(std::io::BufReader::new(file), prefix_lengths)?;
        tracing::info!(
            "Loaded {} word clusters from {}",
            table.clusters.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader(reader: impl BufRead, prefix_lengths: &[usize]) -> Result<Self> {
        let mut table = Self::new(prefix_lengths);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| RelexError::Other(anyhow::Error::new(e)))?;
            let mut fields = line.split_whitespace();
            let (Some(word), Some(bits)) = (fields.next(), fields.next()) else {
                if !line.trim().is_empty() {
                    tracing::warn!("Skipping malformed cluster line {}", line_no + 1);
                }
                continue;
            };
            if !BITSTRING.is_match(bits) {
                tracing::warn!(
                    "Skipping cluster line {}: '{}' is not a bitstring",
                    line_no + 1,
                    bits
                );
                continue;
            }
            table.insert(word, bits);
        }
        Ok(table)
    }

    pub fn insert(&mut self, word: &str, bits: &str) {
        let ids = self
            .prefix_lengths
            .iter()
            .filter(|&&len| len < bits.len() && len <= MAX_PREFIX_BITS)
            .filter_map(|&len| prefix_id(&bits[..len]))
            .collect();
        self.clusters.insert(Symbol::new(word), ids);
    }

    /// Cluster ids of a word, longest prefix first; empty when unknown
    pub fn clusters(&self, word: &Symbol) -> &[i64] {
        self.clusters.get(word).map(|ids| ids.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Encode a prefix with a leading one so prefixes of different length differ
fn prefix_id(bits: &str) -> Option<i64> {
    i64::from_str_radix(&format!("1{}", bits), 2).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_shorter_than_bitstring() {
        let text = "officials 1011001110\nmet 10\n";
        let table = WordClusterTable::from_reader(text.as_bytes(), &[8, 4, 2]).unwrap();
        let ids = table.clusters(&Symbol::new("officials"));
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], 0b1_1011_0011);
        assert_eq!(ids[2], 0b1_10);
        // "10" has length 2, so no prefix of length 2 or longer applies
        assert!(table.clusters(&Symbol::new("met")).is_empty());
        assert!(table.clusters(&Symbol::new("unknown")).is_empty());
    }

    #[test]
    fn test_distinct_lengths_do_not_collide() {
        let mut table = WordClusterTable::new(&[2, 1]);
        table.insert("a", "000");
        let ids = table.clusters(&Symbol::new("a"));
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let text = "good 0101\nbad 01x1\nlonely\n";
        let table = WordClusterTable::from_reader(text.as_bytes(), &[2]).unwrap();
        assert_eq!(table.len(), 1);
    }
}
