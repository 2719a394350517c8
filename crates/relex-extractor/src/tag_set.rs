//! Outcome tags of the observation model

use std::collections::HashMap;
use std::path::Path;

use relex_core::{symbols, RelexError, Result, Symbol};

use crate::tokens::TokenReader;

/// Ordered tags; the `NONE` tag is always index 0
#[derive(Debug, Clone)]
pub struct TagSet {
    tags: Vec<Symbol>,
    index: HashMap<Symbol, usize>,
}

impl TagSet {
    pub fn new<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut set = Self {
            tags: Vec::new(),
            index: HashMap::new(),
        };
        set.push(symbols::NONE.clone());
        for tag in tags {
            set.push(Symbol::new(tag.as_ref()));
        }
        set
    }

    fn push(&mut self, tag: Symbol) {
        if !self.index.contains_key(&tag) {
            self.index.insert(tag.clone(), self.tags.len());
            self.tags.push(tag);
        }
    }

    /// Tag file: a count, then that many tags
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = TokenReader::open(path)?.with_comments();
        let count: usize = reader.parse_next("tag count")?;
        let mut tags = Vec::with_capacity(count);
        for _ in 0..count {
            tags.push(reader.expect_token("tag")?);
        }
        if tags.is_empty() {
            return Err(RelexError::Config(format!(
                "tag set file {} declares no tags",
                path.display()
            )));
        }
        Ok(Self::new(&tags))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn none_tag(&self) -> &Symbol {
        &self.tags[0]
    }

    pub fn tag(&self, index: usize) -> Option<&Symbol> {
        self.tags.get(index)
    }

    pub fn tag_index(&self, tag: &Symbol) -> Option<usize> {
        self.index.get(tag).copied()
    }

    /// Last tag in file order; the collapsed tag of filter mode
    pub fn last_tag(&self) -> &Symbol {
        &self.tags[self.tags.len() - 1]
    }

    pub fn tags(&self) -> &[Symbol] {
        &self.tags
    }
}
