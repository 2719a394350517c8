//! Sentence fixtures for unit tests

use std::sync::Arc;

use relex_core::Symbol;

use crate::inventory::{EntityTypeSet, RelationTypeSet};
use crate::language::GenericRelationUtilities;
use crate::observation::ObservationResources;
use crate::theory::{
    Argument, GoldRelation, Mention, MentionSet, MentionType, NodeId, Parse, PredType,
    Proposition, PropositionSet, SentenceTheory, TheoryBundle,
};

pub fn mention(node: NodeId, mention_type: MentionType, entity_type: &str) -> Mention {
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

pub fn resources() -> ObservationResources {
    ObservationResources::new(
        Arc::new(GenericRelationUtilities),
        Arc::new(EntityTypeSet::new(&["PER", "GPE", "ORG"], &["PER", "GPE", "ORG"])),
    )
}

pub fn relation_types() -> RelationTypeSet {
    RelationTypeSet::from_pairs(&[("PHYS", false), ("PER-SOC", true)]).unwrap()
}

/// "Smith visited Paris" with a verb proposition linking both names
pub fn visit_sentence(gold: Option<(&str, usize, usize)>) -> SentenceTheory {
    let parse =
        Parse::from_bracketed("(S (NP (NNP^ Smith)) (VBD^ visited) (NP (NNP^ Paris)))").unwrap();
    let smith = parse.find_node(0, 0, Some("NP")).unwrap();
    let paris = parse.find_node(2, 2, Some("NP")).unwrap();
    let mentions = MentionSet::new(vec![
        mention(smith, MentionType::Name, "PER"),
        mention(paris, MentionType::Name, "GPE"),
    ])
    .unwrap();
    let props = PropositionSet::new(vec![Proposition::new(
        PredType::Verb,
        Some("visited"),
        vec![Argument::mention("<sub>", 0), Argument::mention("<obj>", 1)],
    )])
    .unwrap();
    let mut sentence = SentenceTheory::new(TheoryBundle::new(parse, mentions, props).unwrap());
    if let Some((relation_type, left, right)) = gold {
        sentence.relations.push(GoldRelation {
            left,
            right,
            relation_type: Symbol::new(relation_type),
        });
    }
    sentence
}

/// Two names twelve tokens apart with no proposition between them
pub fn distant_sentence() -> SentenceTheory {
    let filler: String = (0..12).map(|i| format!(" (NN w{})", i)).collect();
    let text = format!("(S (NP (NNP^ Smith)){} (NP (NNP^ Paris)))", filler);
    let parse = Parse::from_bracketed(&text).unwrap();
    let smith = parse.find_node(0, 0, Some("NP")).unwrap();
    let paris = parse.find_node(13, 13, Some("NP")).unwrap();
    let mentions = MentionSet::new(vec![
        mention(smith, MentionType::Name, "PER"),
        mention(paris, MentionType::Name, "GPE"),
    ])
    .unwrap();
    SentenceTheory::new(TheoryBundle::new(parse, mentions, PropositionSet::default()).unwrap())
}
