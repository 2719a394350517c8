//! Training-vector files
//!
//! ```text
//! 2
//! ((PHYS visited visit Smith Paris NULL PER GPE <sub> <obj> NULL NULL MULTI_PLACE) 3)
//! ((NONE NULL NULL Smith Jones NULL PER PER NULL NULL NULL NULL MULTI_PLACE) 1)
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use relex_core::{RelexError, Result, Symbol};

use crate::tokens::TokenReader;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingVector {
    pub labels: Vec<Symbol>,
    pub count: u64,
}

pub struct VectorFileReader<R> {
    tokens: TokenReader<R>,
    width: usize,
    declared: usize,
    read: usize,
}

impl VectorFileReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, width: usize) -> Result<Self> {
        Self::new(TokenReader::open(path)?, width)
    }
}

impl<R: BufRead> VectorFileReader<R> {
    pub fn new(tokens: TokenReader<R>, width: usize) -> Result<Self> {
        let mut tokens = tokens.with_parens();
        let declared = tokens.parse_next("training vector count")?;
        Ok(Self {
            tokens,
            width,
            declared,
            read: 0,
        })
    }

    /// Number of records announced in the header
    pub fn declared(&self) -> usize {
        self.declared
    }

    fn expect_paren(&mut self, paren: &str, name: &str) -> Result<()> {
        let token = self.tokens.expect_token(paren)?;
        if token != paren {
            return Err(RelexError::MalformedInput(format!(
                "ERROR: ill-formed training vector. Token: {}. Expected {} parenthesis.",
                token, name
            )));
        }
        Ok(())
    }

    /// Next record, or `None` once the declared count has been read
    pub fn next_vector(&mut self) -> Result<Option<TrainingVector>> {
        if self.read == self.declared {
            return Ok(None);
        }
        self.expect_paren("(", "left")?;
        self.expect_paren("(", "left")?;
        let mut labels = Vec::with_capacity(self.width);
        for _ in 0..self.width {
            let token = self.tokens.expect_token("label")?;
            if token == "(" || token == ")" {
                return Err(RelexError::MalformedInput(format!(
                    "training vector {} has fewer than {} labels",
                    self.read + 1,
                    self.width
                )));
            }
            labels.push(Symbol::new(&token));
        }
        self.expect_paren(")", "right")?;
        let count = self.tokens.parse_next("training vector count")?;
        self.expect_paren(")", "right")?;
        self.read += 1;
        Ok(Some(TrainingVector { labels, count }))
    }

    pub fn read_all(mut self) -> Result<Vec<TrainingVector>> {
        let mut out = Vec::with_capacity(self.declared);
        while let Some(vector) = self.next_vector()? {
            out.push(vector);
        }
        Ok(out)
    }
}

/// Distinct training vectors with accumulated counts, in first-seen order
#[derive(Debug, Default)]
pub struct VectorTable {
    index: HashMap<Vec<Symbol>, usize>,
    entries: Vec<TrainingVector>,
}

impl VectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, labels: Vec<Symbol>, count: u64) {
        match self.index.get(&labels) {
            Some(&i) => self.entries[i].count += count,
            None => {
                self.index.insert(labels.clone(), self.entries.len());
                self.entries.push(TrainingVector { labels, count });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainingVector> {
        self.entries.iter()
    }

    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        let mut text = format!("{}\n", self.entries.len());
        for vector in &self.entries {
            let labels: Vec<&str> = vector.labels.iter().map(Symbol::as_str).collect();
            text.push_str(&format!("(({}) {})\n", labels.join(" "), vector.count));
        }
        out.write_all(text.as_bytes())
            .map_err(|e| RelexError::Other(anyhow::Error::new(e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path).map_err(|e| RelexError::io(path, e))?;
        self.write_to(&mut file)?;
        tracing::info!("Wrote {} training vectors to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str, width: usize) -> VectorFileReader<&[u8]> {
        VectorFileReader::new(TokenReader::new(text.as_bytes()), width).unwrap()
    }

    #[test]
    fn test_read_records() {
        let vectors = reader("2\n((a b c) 3)\n((d e f) 1)\n", 3).read_all().unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].labels[2], "c");
        assert_eq!(vectors[0].count, 3);
    }

    #[test]
    fn test_missing_left_paren() {
        let err = reader("1\n(a b c) 3)\n", 3).read_all().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed input: ERROR: ill-formed training vector. Token: a. Expected left parenthesis."
        );
    }

    #[test]
    fn test_missing_right_paren() {
        let err = reader("1\n((a b c 3)\n", 3).read_all().unwrap_err();
        assert!(err.to_string().contains("Token: 3. Expected right parenthesis."));
    }

    #[test]
    fn test_short_record() {
        let err = reader("1\n((a b) 3)\n", 3).read_all().unwrap_err();
        assert!(matches!(err, RelexError::MalformedInput(_)));
    }

    #[test]
    fn test_table_merges_duplicates_and_writes_back() {
        let mut table = VectorTable::new();
        let labels: Vec<Symbol> = ["a", "b"].iter().map(|s| Symbol::new(s)).collect();
        table.add(labels.clone(), 2);
        table.add(vec![Symbol::new("c"), Symbol::new("d")], 1);
        table.add(labels, 3);
        assert_eq!(table.len(), 2);

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "2\n((a b) 5)\n((c d) 1)\n");

        let back = reader(&text, 2).read_all().unwrap();
        assert_eq!(back[0].count, 5);
    }
}
