//! Relation observations
//!
//! An `ObservationContext` is built once per sentence and hands out a fresh
//! `RelationObservation` for every ordered mention pair. The observation
//! carries everything feature extraction looks at:
//! - the proposition link of the pair in every theory of the sentence
//! - mention names and the words, POS tags and stems between the mentions
//! - NP-chunk facts (possessives, PP attachment, verb-prop), computed only
//!   when a registered feature type needs them
//! - the derived relation instance and the alt-model predictions

use std::sync::Arc;

use relex_core::{symbols, ObservationConfig, RelexError, Result, Symbol};

use crate::alt_models::AltModelBank;
use crate::instance::RelationInstance;
use crate::inventory::EntityTypeSet;
use crate::language::RelationUtilities;
use crate::prop_link::{PropLink, PropLinkResolver, PropTree};
use crate::theory::{Mention, NodeId, SentenceTheory, TheoryBundle};
use crate::word_clusters::WordClusterTable;

// ============================================================================
// Shared resources
// ============================================================================

/// Read-only collaborators shared by every observation
#[derive(Clone)]
pub struct ObservationResources {
    pub utilities: Arc<dyn RelationUtilities>,
    pub entity_types: Arc<EntityTypeSet>,
    pub word_clusters: Arc<WordClusterTable>,
    pub alt_models: Arc<AltModelBank>,
    pub config: ObservationConfig,
    /// Compute NP-chunk facts; set when a chunk feature type is registered
    pub use_np_chunks: bool,
}

impl ObservationResources {
    pub fn new(utilities: Arc<dyn RelationUtilities>, entity_types: Arc<EntityTypeSet>) -> Self {
        Self {
            utilities,
            entity_types,
            word_clusters: Arc::new(WordClusterTable::default()),
            alt_models: Arc::new(AltModelBank::default()),
            config: ObservationConfig::default(),
            use_np_chunks: false,
        }
    }

    pub fn with_word_clusters(mut self, word_clusters: Arc<WordClusterTable>) -> Self {
        self.word_clusters = word_clusters;
        self
    }

    pub fn with_alt_models(mut self, alt_models: Arc<AltModelBank>) -> Self {
        self.alt_models = alt_models;
        self
    }

    pub fn with_config(mut self, config: ObservationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_np_chunks(mut self, use_np_chunks: bool) -> Self {
        self.use_np_chunks = use_np_chunks;
        self
    }
}

// ============================================================================
// Chunk facts
// ============================================================================

/// Prepositional attachment between two sibling chunks
#[derive(Debug, Clone, PartialEq)]
pub struct PpRelation {
    pub preposition: Symbol,
    /// Stemmed verb seen between the chunks
    pub verb: Option<Symbol>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkFacts {
    pub stemmed_left_head: Option<Symbol>,
    pub stemmed_right_head: Option<Symbol>,
    /// The right mention starts with the possessive clitic right after the left one
    pub possessive: bool,
    /// The possessive clitic follows the right mention
    pub possessive_after_right: bool,
    pub pp_relation: Option<PpRelation>,
    /// Stemmed verb linking the chunks (subject-verb-object)
    pub verb_prop: Option<Symbol>,
}

// ============================================================================
// Per-sentence context
// ============================================================================

pub struct ObservationContext<'s> {
    resources: &'s ObservationResources,
    sentence: &'s SentenceTheory,
    /// One proposition tree per theory, when tree simulation is on
    trees: Vec<Option<PropTree>>,
}

impl<'s> ObservationContext<'s> {
    /// Precompute per-sentence structures for every theory
    pub fn reset_for_sentence(
        resources: &'s ObservationResources,
        sentence: &'s SentenceTheory,
    ) -> Self {
        let trees = sentence
            .theories()
            .map(|theory| {
                resources.config.simulate_props_from_proptrees.then(|| {
                    PropTree::build(
                        &theory.props,
                        resources.config.legacy_ancestor_distance_swap,
                    )
                })
            })
            .collect();
        Self {
            resources,
            sentence,
            trees,
        }
    }

    pub fn sentence(&self) -> &'s SentenceTheory {
        self.sentence
    }

    /// Build the observation for a mention pair of the primary theory
    pub fn populate(&self, first: usize, second: usize) -> Result<RelationObservation<'s>> {
        let primary: &'s TheoryBundle = &self.sentence.primary;
        let missing = |index: usize| {
            RelexError::InternalInconsistency(format!(
                "observation over missing mention {}",
                index
            ))
        };
        primary.mentions.get(first).ok_or_else(|| missing(first))?;
        primary.mentions.get(second).ok_or_else(|| missing(second))?;
        let (left, right) = if primary.head_end_token(first) > primary.head_end_token(second) {
            (second, first)
        } else {
            (first, second)
        };
        let left_mention = primary.mentions.get(left).ok_or_else(|| missing(left))?;
        let right_mention = primary.mentions.get(right).ok_or_else(|| missing(right))?;

        let utilities = self.resources.utilities.as_ref();
        let links = self
            .sentence
            .theories()
            .enumerate()
            .map(|(i, theory)| {
                let pair = if i == 0 {
                    Some((left, right))
                } else {
                    self.align(theory, left, right)
                };
                match pair {
                    Some((l, r)) => PropLinkResolver::new(theory, utilities)
                        .with_tree(self.trees.get(i).and_then(|t| t.as_ref()))
                        .resolve(l, r),
                    None => PropLink::Empty,
                }
            })
            .collect::<Vec<_>>();

        let between = self.words_between(primary, left, right);
        let chunk_facts = if self.resources.use_np_chunks {
            self.chunk_facts(primary, left, right)?
        } else {
            ChunkFacts::default()
        };

        let instance = RelationInstance::standard(primary, utilities, left, right, &links[0])?;
        let alt_predictions = if self.resources.config.use_alt_models {
            self.resources.alt_models.predictions(&instance)?
        } else {
            Vec::new()
        };

        Ok(RelationObservation {
            resources: self.resources,
            sentence: self.sentence,
            left,
            right,
            left_mention,
            right_mention,
            links,
            left_name: self.mention_name(primary, left),
            right_name: self.mention_name(primary, right),
            words_between: between.words,
            pos_between: between.pos,
            stemmed_between: between.stemmed,
            chunk_facts,
            instance,
            alt_predictions,
        })
    }

    /// Alternate-theory mentions sharing the primary pair's head end tokens;
    /// the last match wins and a mention matching the left head is not
    /// considered for the right one
    fn align(&self, theory: &TheoryBundle, left: usize, right: usize) -> Option<(usize, usize)> {
        let primary = &self.sentence.primary;
        let (left_end, right_end) = (primary.head_end_token(left), primary.head_end_token(right));
        let (mut mapped_left, mut mapped_right) = (None, None);
        for m in theory.mentions.iter().filter(|m| !m.mention_type.is_structural()) {
            let end = theory.head_end_token(m.index);
            if end == left_end {
                mapped_left = Some(m.index);
            } else if end == right_end {
                mapped_right = Some(m.index);
            }
        }
        mapped_left.zip(mapped_right)
    }

    fn mention_name(&self, theory: &TheoryBundle, index: usize) -> Vec<Symbol> {
        match theory.mentions.get(index) {
            Some(m) => theory.parse.terminal_symbols(m.node),
            None => Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Words between
    // ------------------------------------------------------------------

    fn words_between(&self, theory: &TheoryBundle, left: usize, right: usize) -> Between {
        let parse = &theory.parse;
        let (Some(m1), Some(m2)) = (theory.mentions.get(left), theory.mentions.get(right)) else {
            return Between::sentinel(&symbols::CONFUSED);
        };
        let (n1, n2) = (m1.node, m2.node);
        let (hp1, hp2) = (parse.head_preterminal(n1), parse.head_preterminal(n2));

        let starts_with_clitic = parse
            .token(parse.node(n2).start_token)
            .map_or(false, |t| *t == *symbols::POSSESSIVE_CLITIC);
        if self.resources.use_np_chunks
            && parse.node(n1).end_token + 1 == parse.node(n2).start_token
            && starts_with_clitic
        {
            return self.make_words_between(
                theory,
                parse.node(hp1).end_token + 1,
                parse.node(hp2).start_token,
            );
        }

        // a mention is its own head preterminal, or the head's parent stands in
        let lift = |node: NodeId, head: NodeId| {
            if node == head {
                node
            } else {
                parse.parent(head).unwrap_or(head)
            }
        };
        let (node1, node2) = (lift(n1, hp1), lift(n2, hp2));
        let candidates = [
            (n1, n2),
            (node1, node2),
            (node1, hp2),
            (hp1, node2),
            (hp1, hp2),
        ];
        for (a, b) in candidates {
            let end = parse.node(a).end_token;
            let start = parse.node(b).start_token;
            if end < start {
                return self.make_words_between(theory, end + 1, start);
            }
        }
        Between::sentinel(&symbols::CONFUSED)
    }

    /// Words, tags and stems of tokens `start..end`, with intervening
    /// recognized mentions collapsed to their entity type
    fn make_words_between(&self, theory: &TheoryBundle, start: usize, end: usize) -> Between {
        let Some(count) = end.checked_sub(start) else {
            return Between::sentinel(&symbols::CONFUSED);
        };
        if count > self.resources.config.max_words_between {
            return Between::sentinel(&symbols::TOO_LONG);
        }
        if count == 0 {
            return Between::sentinel(&symbols::ADJACENT);
        }

        let parse = &theory.parse;
        let utilities = self.resources.utilities.as_ref();
        let mut words = Vec::with_capacity(count);
        let mut tags = Vec::with_capacity(count);
        let mut stems = Vec::with_capacity(count);
        let mut i = start;
        while i < end {
            if let Some(m) = self.intervening_mention(theory, i, end) {
                let label = m.entity_type.as_str().to_string();
                words.push(label.clone());
                tags.push(label.clone());
                stems.push(label);
                i = theory.mention_end(m.index) + 1;
                continue;
            }
            let (Some(token), Some(pos)) = (parse.token(i), parse.pos(i)) else {
                break;
            };
            words.push(token.as_str().to_string());
            tags.push(pos.as_str().to_string());
            stems.push(utilities.stem_word(token, pos).as_str().to_string());
            i += 1;
        }
        Between {
            words: Symbol::new(&words.join("_")),
            pos: Symbol::new(&tags.join("_")),
            stemmed: Symbol::new(&stems.join("_")),
        }
    }

    /// Longest recognized mention starting at `token` and ending before `end`
    fn intervening_mention<'t>(
        &self,
        theory: &'t TheoryBundle,
        token: usize,
        end: usize,
    ) -> Option<&'t Mention> {
        theory
            .mentions
            .iter()
            .filter(|m| {
                !m.mention_type.is_structural()
                    && self.resources.entity_types.is_recognized(&m.entity_type)
                    && theory.mention_start(m.index) == token
                    && theory.mention_end(m.index) < end
            })
            .max_by_key(|m| theory.mention_end(m.index))
    }

    // ------------------------------------------------------------------
    // NP-chunk facts
    // ------------------------------------------------------------------

    fn chunk_facts(&self, theory: &TheoryBundle, left: usize, right: usize) -> Result<ChunkFacts> {
        let parse = &theory.parse;
        let utilities = self.resources.utilities.as_ref();
        let clitic = |index: usize| {
            parse
                .token(index)
                .map_or(false, |t| *t == *symbols::POSSESSIVE_CLITIC)
        };
        let start2 = theory.mention_start(right);
        let end2 = theory.mention_end(right);

        let mut facts = ChunkFacts {
            stemmed_left_head: Some(utilities.stem_noun(&theory.head_word(left))),
            stemmed_right_head: Some(utilities.stem_noun(&theory.head_word(right))),
            possessive: theory.mention_end(left) + 1 == start2 && clitic(start2),
            possessive_after_right: clitic(end2 + 1),
            ..ChunkFacts::default()
        };

        let (Some(m1), Some(m2)) = (theory.mentions.get(left), theory.mentions.get(right)) else {
            return Ok(facts);
        };
        let (Some((c1, p1)), Some((c2, p2))) =
            (self.chunk_of(theory, m1.node)?, self.chunk_of(theory, m2.node)?)
        else {
            return Ok(facts);
        };
        if p1 != p2 {
            return Ok(facts);
        }
        let children = &parse.node(p1).children;
        let (Some(i1), Some(i2)) = (
            children.iter().position(|&c| c == c1),
            children.iter().position(|&c| c == c2),
        ) else {
            return Ok(facts);
        };
        if i1 >= i2 {
            return Ok(facts);
        }
        let between = &children[i1 + 1..i2];

        facts.pp_relation = self.pp_relation(theory, between, start2);
        facts.verb_prop = self.verb_prop(theory, between);
        Ok(facts)
    }

    /// The chunk holding a mention's head and the chunk's parent
    fn chunk_of(&self, theory: &TheoryBundle, node: NodeId) -> Result<Option<(NodeId, NodeId)>> {
        let parse = &theory.parse;
        let preterminal = parse.head_preterminal(node);
        let Some(chunk) = parse.parent(preterminal) else {
            return Ok(None);
        };
        if chunk == parse.root() {
            return Ok(None);
        }
        match parse.parent(chunk) {
            Some(parent) => Ok(Some((chunk, parent))),
            None => Err(RelexError::InternalInconsistency(format!(
                "NP chunk '{}' has no parent",
                parse.node(chunk).tag
            ))),
        }
    }

    fn pp_relation(
        &self,
        theory: &TheoryBundle,
        between: &[NodeId],
        start2: usize,
    ) -> Option<PpRelation> {
        let parse = &theory.parse;
        let utilities = self.resources.utilities.as_ref();
        let before = start2.checked_sub(1)?;
        if !utilities.is_preposition_tag(parse.pos(before)?) {
            return None;
        }
        let mut verb = None;
        for &sibling in between {
            let tag = &parse.node(sibling).tag;
            if utilities.is_np_tag(tag) {
                return None;
            }
            if utilities.is_verb_tag(tag) {
                verb = Some(utilities.stem_verb(&parse.head_word(sibling)));
            }
        }
        Some(PpRelation {
            preposition: parse.token(before)?.clone(),
            verb,
        })
    }

    fn verb_prop(&self, theory: &TheoryBundle, between: &[NodeId]) -> Option<Symbol> {
        let parse = &theory.parse;
        let utilities = self.resources.utilities.as_ref();
        let mut verb = None;
        for &sibling in between {
            let tag = &parse.node(sibling).tag;
            if utilities.is_verb_tag(tag) {
                verb = Some(utilities.stem_verb(&parse.head_word(sibling)));
            } else if verb.is_none() {
                if utilities.is_np_tag(tag) || *tag == "TO" {
                    return None;
                }
            } else if utilities.is_np_tag(tag) || utilities.is_preposition_tag(tag) {
                verb = None;
            }
        }
        verb
    }
}

struct Between {
    words: Symbol,
    pos: Symbol,
    stemmed: Symbol,
}

impl Between {
    fn sentinel(symbol: &Symbol) -> Self {
        Self {
            words: symbol.clone(),
            pos: symbol.clone(),
            stemmed: symbol.clone(),
        }
    }
}

// ============================================================================
// Observation
// ============================================================================

/// Everything feature extraction knows about one ordered mention pair
pub struct RelationObservation<'a> {
    resources: &'a ObservationResources,
    sentence: &'a SentenceTheory,
    left: usize,
    right: usize,
    left_mention: &'a Mention,
    right_mention: &'a Mention,
    links: Vec<PropLink>,
    left_name: Vec<Symbol>,
    right_name: Vec<Symbol>,
    words_between: Symbol,
    pos_between: Symbol,
    stemmed_between: Symbol,
    chunk_facts: ChunkFacts,
    instance: RelationInstance,
    alt_predictions: Vec<(Symbol, Symbol)>,
}

impl<'a> RelationObservation<'a> {
    pub fn theory(&self) -> &'a TheoryBundle {
        &self.sentence.primary
    }

    pub fn sentence(&self) -> &'a SentenceTheory {
        self.sentence
    }

    pub fn utilities(&self) -> &'a dyn RelationUtilities {
        self.resources.utilities.as_ref()
    }

    pub fn word_clusters(&self) -> &'a WordClusterTable {
        self.resources.word_clusters.as_ref()
    }

    pub fn left(&self) -> usize {
        self.left
    }

    pub fn right(&self) -> usize {
        self.right
    }

    pub fn left_mention(&self) -> &'a Mention {
        self.left_mention
    }

    pub fn right_mention(&self) -> &'a Mention {
        self.right_mention
    }

    /// Link in the primary theory
    pub fn link(&self) -> &PropLink {
        &self.links[0]
    }

    /// Links of every theory, primary first
    pub fn links(&self) -> &[PropLink] {
        &self.links
    }

    pub fn left_name(&self) -> &[Symbol] {
        &self.left_name
    }

    pub fn right_name(&self) -> &[Symbol] {
        &self.right_name
    }

    pub fn words_between(&self) -> &Symbol {
        &self.words_between
    }

    pub fn pos_between(&self) -> &Symbol {
        &self.pos_between
    }

    pub fn stemmed_between(&self) -> &Symbol {
        &self.stemmed_between
    }

    pub fn chunk_facts(&self) -> &ChunkFacts {
        &self.chunk_facts
    }

    pub fn instance(&self) -> &RelationInstance {
        &self.instance
    }

    /// `(model name, top prediction)` per alt model
    pub fn alt_predictions(&self) -> &[(Symbol, Symbol)] {
        &self.alt_predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::GenericRelationUtilities;
    use crate::theory::{Argument, MentionSet, MentionType, Parse, PredType, Proposition, PropositionSet};

    /// "Smith 's aides met in Beijing" as a flat chunk parse
    const CHUNKS: &str =
        "(S (NP (NNP^ Smith)) (NP (POS 's) (NNS^ aides)) (VBD^ met) (IN in) (NP (NNP^ Beijing)))";

    fn mention(node: NodeId, mention_type: MentionType, entity_type: &str) -> Mention {
        Mention {
            index: 0,
            node,
            mention_type,
            entity_type: Symbol::new(entity_type),
            child: None,
            next: None,
            parent: None,
            metonymy: None,
            entity_id: None,
        }
    }

    fn chunk_theory(props: Vec<Proposition>) -> TheoryBundle {
        let parse = Parse::from_bracketed(CHUNKS).unwrap();
        let smith = parse.find_node(0, 0, Some("NP")).unwrap();
        let aides = parse.find_node(1, 2, None).unwrap();
        let beijing = parse.find_node(5, 5, Some("NP")).unwrap();
        let mentions = MentionSet::new(vec![
            mention(smith, MentionType::Name, "PER"),
            mention(aides, MentionType::Desc, "PER"),
            mention(beijing, MentionType::Name, "GPE"),
        ])
        .unwrap();
        TheoryBundle::new(parse, mentions, PropositionSet::new(props).unwrap()).unwrap()
    }

    fn resources() -> ObservationResources {
        ObservationResources::new(
            Arc::new(GenericRelationUtilities),
            Arc::new(EntityTypeSet::new(&["PER", "GPE"], &["PER", "GPE"])),
        )
    }

    #[test]
    fn test_pair_is_ordered_by_head() {
        let sentence = SentenceTheory::new(chunk_theory(vec![]));
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(2, 0).unwrap();
        assert_eq!((obs.left(), obs.right()), (0, 2));
        assert_eq!(obs.left_name().len(), 1);
        assert_eq!(obs.right_name()[0], "Beijing");
        assert!(obs.link().is_empty());
    }

    #[test]
    fn test_words_between_sentinels_and_mentions() {
        let sentence = SentenceTheory::new(chunk_theory(vec![]));
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);

        let adjacent = context.populate(0, 1).unwrap();
        assert_eq!(adjacent.words_between(), &*symbols::ADJACENT);
        assert_eq!(adjacent.pos_between(), &*symbols::ADJACENT);

        let spanning = context.populate(0, 2).unwrap();
        assert_eq!(spanning.words_between(), "PER_met_in");
        assert_eq!(spanning.pos_between(), "PER_VBD_IN");

        let near = context.populate(1, 2).unwrap();
        assert_eq!(near.words_between(), "met_in");

        let mut config = ObservationConfig::default();
        config.max_words_between = 1;
        let short = resources.clone().with_config(config);
        let context = ObservationContext::reset_for_sentence(&short, &sentence);
        assert_eq!(context.populate(1, 2).unwrap().words_between(), &*symbols::TOO_LONG);
    }

    fn distant_names(gap: usize) -> SentenceTheory {
        let filler: String = (0..gap).map(|i| format!(" (NN w{})", i)).collect();
        let parse =
            Parse::from_bracketed(&format!("(S (NP (NNP^ Smith)){} (NP (NNP^ Paris)))", filler))
                .unwrap();
        let smith = parse.find_node(0, 0, Some("NP")).unwrap();
        let paris = parse.find_node(gap + 1, gap + 1, Some("NP")).unwrap();
        let mentions = MentionSet::new(vec![
            mention(smith, MentionType::Name, "PER"),
            mention(paris, MentionType::Name, "GPE"),
        ])
        .unwrap();
        SentenceTheory::new(TheoryBundle::new(parse, mentions, PropositionSet::default()).unwrap())
    }

    #[test]
    fn test_words_between_length_limit() {
        let resources = resources();

        let ten = distant_names(10);
        let context = ObservationContext::reset_for_sentence(&resources, &ten);
        let expected: Vec<String> = (0..10).map(|i| format!("w{}", i)).collect();
        assert_eq!(context.populate(0, 1).unwrap().words_between(), expected.join("_").as_str());

        let eleven = distant_names(11);
        let context = ObservationContext::reset_for_sentence(&resources, &eleven);
        assert_eq!(context.populate(0, 1).unwrap().words_between(), &*symbols::TOO_LONG);
    }

    #[test]
    fn test_words_between_preterminal_inside_larger_mention() {
        let parse =
            Parse::from_bracketed("(S (NP (NNP Smith) (NP^ (DT the) (NN^ city))) (VBD^ slept))")
                .unwrap();
        let smith = parse.find_node(0, 0, Some("NNP")).unwrap();
        let outer = parse.find_node(0, 2, Some("NP")).unwrap();
        let mentions = MentionSet::new(vec![
            mention(smith, MentionType::Name, "PER"),
            mention(outer, MentionType::Desc, "GPE"),
        ])
        .unwrap();
        let theory = TheoryBundle::new(parse, mentions, PropositionSet::default()).unwrap();
        let sentence = SentenceTheory::new(theory);
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        // the preterminal against the parent of the outer mention's head
        assert_eq!(context.populate(0, 1).unwrap().words_between(), &*symbols::ADJACENT);
    }

    #[test]
    fn test_overlapping_mentions_are_confused() {
        let parse = Parse::from_bracketed(CHUNKS).unwrap();
        let np = parse.find_node(1, 2, None).unwrap();
        let head = parse.head_preterminal(np);
        let mentions = MentionSet::new(vec![
            mention(np, MentionType::Desc, "PER"),
            mention(head, MentionType::Desc, "ORG"),
        ])
        .unwrap();
        let theory = TheoryBundle::new(parse, mentions, PropositionSet::default()).unwrap();
        let sentence = SentenceTheory::new(theory);
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 1).unwrap();
        assert_eq!(obs.words_between(), &*symbols::CONFUSED);
        assert_eq!(obs.stemmed_between(), &*symbols::CONFUSED);
    }

    #[test]
    fn test_chunk_facts() {
        let sentence = SentenceTheory::new(chunk_theory(vec![]));
        let resources = resources().with_np_chunks(true);
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);

        let poss = context.populate(0, 1).unwrap();
        assert!(poss.chunk_facts().possessive);
        // clitic case uses head preterminals, so the clitic itself is between
        assert_eq!(poss.words_between(), "'s");

        let pp = context.populate(1, 2).unwrap();
        let facts = pp.chunk_facts();
        assert!(!facts.possessive);
        assert_eq!(facts.stemmed_left_head.as_ref().unwrap(), "aides");
        let relation = facts.pp_relation.as_ref().unwrap();
        assert_eq!(relation.preposition, "in");
        assert_eq!(relation.verb.as_ref().unwrap(), "met");
        // the preposition after the verb clears it
        assert!(facts.verb_prop.is_none());

        // an NP chunk before any verb blocks both
        let blocked = context.populate(0, 2).unwrap();
        assert!(blocked.chunk_facts().pp_relation.is_none());
        assert!(blocked.chunk_facts().verb_prop.is_none());
    }

    #[test]
    fn test_verb_prop() {
        let parse =
            Parse::from_bracketed("(S (NP (NNP^ Smith)) (VBD^ visited) (NP (NNP^ Paris)))").unwrap();
        let smith = parse.find_node(0, 0, None).unwrap();
        let paris = parse.find_node(2, 2, None).unwrap();
        let mentions = MentionSet::new(vec![
            mention(smith, MentionType::Name, "PER"),
            mention(paris, MentionType::Name, "GPE"),
        ])
        .unwrap();
        let theory = TheoryBundle::new(parse, mentions, PropositionSet::default()).unwrap();
        let sentence = SentenceTheory::new(theory);
        let resources = resources().with_np_chunks(true);
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 1).unwrap();
        assert_eq!(obs.chunk_facts().verb_prop.as_ref().unwrap(), "visited");
        assert!(obs.chunk_facts().pp_relation.is_none());
    }

    #[test]
    fn test_alternate_theory_links() {
        let mut sentence = SentenceTheory::new(chunk_theory(vec![]));
        let parse = Parse::from_bracketed(CHUNKS).unwrap();
        let smith = parse.find_node(0, 0, Some("NP")).unwrap();
        let beijing = parse.find_node(5, 5, Some("NP")).unwrap();
        let mentions = MentionSet::new(vec![
            mention(beijing, MentionType::Name, "GPE"),
            mention(smith, MentionType::Name, "PER"),
        ])
        .unwrap();
        let props = PropositionSet::new(vec![Proposition::new(
            PredType::Verb,
            Some("met"),
            vec![Argument::mention("<sub>", 1), Argument::mention("in", 0)],
        )])
        .unwrap();
        sentence
            .alternates
            .push(TheoryBundle::new(parse, mentions, props).unwrap());

        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 2).unwrap();
        assert_eq!(obs.links().len(), 2);
        assert!(obs.link().is_empty());
        assert_eq!(obs.links()[1].left_role().unwrap(), "<sub>");
        assert_eq!(obs.links()[1].right_role().unwrap(), "in");
        // unaligned mentions give an empty alternate link
        assert!(context.populate(0, 1).unwrap().links()[1].is_empty());
    }

    #[test]
    fn test_alternate_alignment_last_match_wins() {
        let mut sentence = SentenceTheory::new(chunk_theory(vec![]));
        let parse = Parse::from_bracketed(CHUNKS).unwrap();
        let smith = parse.find_node(0, 0, Some("NP")).unwrap();
        let smith_head = parse.head_preterminal(smith);
        let beijing = parse.find_node(5, 5, Some("NP")).unwrap();
        let mentions = MentionSet::new(vec![
            mention(smith, MentionType::Name, "PER"),
            mention(smith_head, MentionType::Name, "PER"),
            mention(beijing, MentionType::Name, "GPE"),
        ])
        .unwrap();
        let props = PropositionSet::new(vec![Proposition::new(
            PredType::Verb,
            Some("met"),
            vec![Argument::mention("<sub>", 1), Argument::mention("in", 2)],
        )])
        .unwrap();
        sentence
            .alternates
            .push(TheoryBundle::new(parse, mentions, props).unwrap());

        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 2).unwrap();
        assert_eq!(obs.links()[1].left_role().unwrap(), "<sub>");
    }

    #[test]
    fn test_missing_mention_is_internal_error() {
        let sentence = SentenceTheory::new(chunk_theory(vec![]));
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let err = context.populate(0, 7).err().unwrap();
        assert!(err.is_internal());
    }
}
