//! Interned labels
//!
//! Every label that flows through observations, instances, features and
//! models is a `Symbol`. Symbols are interned in a process-wide table so
//! that clones are cheap and equality usually short-circuits on pointer
//! identity.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

static INTERNER: Lazy<RwLock<HashSet<Arc<str>>>> = Lazy::new(|| RwLock::new(HashSet::new()));

/// An interned, immutable label
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Intern `text` and return its symbol
    pub fn new(text: &str) -> Self {
        {
            let table = INTERNER.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(existing) = table.get(text) {
                return Self(existing.clone());
            }
        }
        let mut table = INTERNER.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = table.get(text) {
            return Self(existing.clone());
        }
        let interned: Arc<str> = Arc::from(text);
        table.insert(interned.clone());
        Self(interned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for the reserved `NULL` label
    pub fn is_null(&self) -> bool {
        *self == *symbols::NULL
    }

    /// Last character of the label as its own symbol
    pub fn last_char(&self) -> Option<Symbol> {
        self.0.chars().last().map(|c| Symbol::new(c.encode_utf8(&mut [0u8; 4])))
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(text: &str) -> Self {
        Symbol::new(text)
    }
}

impl From<String> for Symbol {
    fn from(text: String) -> Self {
        Symbol::new(&text)
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", &*self.0)
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Symbol::new(&text))
    }
}

/// Reserved vocabulary shared by instances, observations and models
pub mod symbols {
    use super::Symbol;
    use once_cell::sync::Lazy;

    macro_rules! reserved {
        ($($name:ident => $text:expr),* $(,)?) => {
            $(pub static $name: Lazy<Symbol> = Lazy::new(|| Symbol::new($text));)*
        };
    }

    reserved! {
        NULL => "NULL",
        CONFUSED => ":CONFUSED",
        TOO_LONG => ":TOO_LONG",
        ADJACENT => ":ADJACENT",
        ONE_PLACE => "ONE_PLACE",
        MULTI_PLACE => "MULTI_PLACE",
        NONE => "NONE",
        REVERSED => "reversed",
        SET => ":SET",
        COMP => ":COMP",
        PARTITIVE_TOP => "partitive_top",
        PARTITIVE_BOTTOM => "partitive_bottom",
        IS_RELATION => "IS_RELATION",
        NO_RELATION => "NO_RELATION",
        POSSESSIVE_CLITIC => "'s",

        // argument roles
        REF_ROLE => "<ref>",
        SUB_ROLE => "<sub>",
        OBJ_ROLE => "<obj>",
        IOBJ_ROLE => "<iobj>",
        POSS_ROLE => "<poss>",
        TEMP_ROLE => "<temp>",
        LOC_ROLE => "<loc>",
        MEMBER_ROLE => "<member>",
        UNKNOWN_ROLE => "<unknown>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interning_shares_storage() {
        let a = Symbol::new("EMP-ORG");
        let b = Symbol::from("EMP-ORG".to_string());
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn test_reserved_symbols() {
        assert!(symbols::NULL.is_null());
        assert_eq!(symbols::REF_ROLE.as_str(), "<ref>");
        assert_eq!(*symbols::CONFUSED, ":CONFUSED");
    }

    #[test]
    fn test_last_char() {
        assert_eq!(Symbol::new("公司").last_char(), Some(Symbol::new("司")));
        assert_eq!(Symbol::new("").last_char(), None);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let sym = Symbol::new("officials");
        let json = serde_json::to_string(&sym).unwrap();
        assert_eq!(json, "\"officials\"");
        let back: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sym);
    }

    proptest! {
        #[test]
        fn prop_equality_matches_text(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
            prop_assert_eq!(Symbol::new(&a) == Symbol::new(&b), a == b);
        }
    }
}
