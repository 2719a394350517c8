//! JSON-lines sentence corpus
//!
//! One sentence per line:
//!
//! ```json
//! {"tree": "(S (NP (NNP^ Smith)) (VBD^ visited) (NP (NNP^ Paris)))",
//!  "mentions": [{"start": 0, "end": 0, "label": "NP", "type": "NAME", "entity_type": "PER"},
//!               {"start": 2, "end": 2, "label": "NP", "type": "NAME", "entity_type": "GPE"}],
//!  "propositions": [{"type": "verb", "predicate": "visited",
//!                    "args": [{"role": "<sub>", "mention": 0}, {"role": "<obj>", "mention": 1}]}],
//!  "relations": [{"left": 0, "right": 1, "type": "PHYS"}]}
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use relex_core::{RelexError, Result, Symbol};

use crate::theory::{
    ArgPayload, Argument, GoldRelation, Mention, MentionSet, MentionType, Parse, PredType,
    Proposition, PropositionSet, SentenceTheory, TheoryBundle,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionRecord {
    /// First token of the mention node
    pub start: usize,
    /// Last token of the mention node
    pub end: usize,
    /// Node label, to pick among nodes with the same span
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub mention_type: MentionType,
    pub entity_type: Symbol,
    #[serde(default)]
    pub child: Option<usize>,
    #[serde(default)]
    pub next: Option<usize>,
    #[serde(default)]
    pub metonymy: Option<Symbol>,
    #[serde(default)]
    pub entity_id: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentRecord {
    pub role: String,
    #[serde(default)]
    pub mention: Option<usize>,
    #[serde(default)]
    pub proposition: Option<usize>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropositionRecord {
    #[serde(rename = "type")]
    pub pred_type: PredType,
    #[serde(default)]
    pub predicate: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgumentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TheoryRecord {
    pub tree: String,
    #[serde(default)]
    pub mentions: Vec<MentionRecord>,
    #[serde(default)]
    pub propositions: Vec<PropositionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceRecord {
    #[serde(flatten)]
    pub primary: TheoryRecord,
    #[serde(default)]
    pub alternates: Vec<TheoryRecord>,
    #[serde(default)]
    pub relations: Vec<GoldRelation>,
}

impl ArgumentRecord {
    fn to_argument(&self) -> Result<Argument> {
        let payload = match (self.mention, self.proposition, &self.text) {
            (Some(m), None, None) => ArgPayload::Mention(m),
            (None, Some(p), None) => ArgPayload::Proposition(p),
            (None, None, Some(t)) => ArgPayload::Text(Symbol::new(t)),
            _ => {
                return Err(RelexError::MalformedInput(format!(
                    "argument {} must have exactly one of mention, proposition or text",
                    self.role
                )))
            }
        };
        Ok(Argument {
            role: Symbol::new(&self.role),
            payload,
        })
    }
}

impl TheoryRecord {
    pub fn to_bundle(&self) -> Result<TheoryBundle> {
        let parse = Parse::from_bracketed(&self.tree)?;
        let mentions = self
            .mentions
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let node = parse
                    .find_node(m.start, m.end, m.label.as_deref())
                    .ok_or_else(|| {
                        RelexError::MalformedInput(format!(
                            "mention {} spans tokens {}..{} but no such node exists",
                            i, m.start, m.end
                        ))
                    })?;
                Ok(Mention {
                    index: i,
                    node,
                    mention_type: m.mention_type,
                    entity_type: m.entity_type.clone(),
                    child: m.child,
                    next: m.next,
                    parent: None,
                    metonymy: m.metonymy.clone(),
                    entity_id: m.entity_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let props = self
            .propositions
            .iter()
            .map(|p| {
                let args = p
                    .args
                    .iter()
                    .map(ArgumentRecord::to_argument)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Proposition::new(p.pred_type, p.predicate.as_deref(), args))
            })
            .collect::<Result<Vec<_>>>()?;
        TheoryBundle::new(parse, MentionSet::new(mentions)?, PropositionSet::new(props)?)
    }
}

impl SentenceRecord {
    pub fn to_theory(&self) -> Result<SentenceTheory> {
        let mut sentence = SentenceTheory::new(self.primary.to_bundle()?);
        for alternate in &self.alternates {
            sentence.alternates.push(alternate.to_bundle()?);
        }
        let n = sentence.primary.mentions.len();
        for relation in &self.relations {
            if relation.left >= n || relation.right >= n {
                return Err(RelexError::MalformedInput(format!(
                    "relation {} refers to a missing mention",
                    relation.relation_type
                )));
            }
        }
        sentence.relations = self.relations.clone();
        Ok(sentence)
    }
}

/// Parse every non-blank line of a corpus
pub fn read_corpus(reader: impl BufRead) -> Result<Vec<SentenceTheory>> {
    let mut sentences = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RelexError::Other(anyhow::Error::new(e)))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: SentenceRecord = serde_json::from_str(line).map_err(|e| {
            RelexError::MalformedInput(format!("corpus line {}: {}", line_no + 1, e))
        })?;
        let sentence = record.to_theory().map_err(|e| match e {
            RelexError::MalformedInput(msg) => {
                RelexError::MalformedInput(format!("corpus line {}: {}", line_no + 1, msg))
            }
            other => other,
        })?;
        sentences.push(sentence);
    }
    Ok(sentences)
}

pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<SentenceTheory>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| RelexError::io(path, e))?;
    let sentences = read_corpus(BufReader::new(file))?;
    info!("Loaded {} sentences from {}", sentences.len(), path.display());
    Ok(sentences)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"{"tree": "(S (NP (NNP^ Smith)) (VBD^ visited) (NP (NNP^ Paris)))",
        "mentions": [{"start": 0, "end": 0, "label": "NP", "type": "NAME", "entity_type": "PER"},
                     {"start": 2, "end": 2, "label": "NP", "type": "NAME", "entity_type": "GPE"}],
        "propositions": [{"type": "verb", "predicate": "visited",
                          "args": [{"role": "<sub>", "mention": 0}, {"role": "<obj>", "mention": 1}]}],
        "relations": [{"left": 1, "right": 0, "type": "PHYS"}]}"#;

    fn one_line(text: &str) -> String {
        text.replace('\n', " ")
    }

    #[test]
    fn test_read_sentence() {
        let text = format!("{}\n\n", one_line(LINE));
        let sentences = read_corpus(text.as_bytes()).unwrap();
        assert_eq!(sentences.len(), 1);
        let s = &sentences[0];
        assert_eq!(s.primary.mentions.len(), 2);
        assert_eq!(s.primary.head_word(1), "Paris");
        assert_eq!(s.primary.props.len(), 1);
        let (relation, reversed) = s.gold_relation(0, 1).unwrap();
        assert_eq!(relation, "PHYS");
        assert!(reversed);
    }

    #[test]
    fn test_bad_mention_span() {
        let text = one_line(LINE).replace(r#""start": 2, "end": 2"#, r#""start": 1, "end": 2"#);
        let err = read_corpus(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("corpus line 1"));
    }

    #[test]
    fn test_ambiguous_argument() {
        let text = one_line(LINE).replace(
            r#"{"role": "<sub>", "mention": 0}"#,
            r#"{"role": "<sub>", "mention": 0, "text": "x"}"#,
        );
        assert!(matches!(
            read_corpus(text.as_bytes()).unwrap_err(),
            RelexError::MalformedInput(_)
        ));
    }

    #[test]
    fn test_invalid_json() {
        let err = read_corpus("{not json".as_bytes()).unwrap_err();
        assert!(matches!(err, RelexError::MalformedInput(_)));
    }
}
