//! Standard relation feature types

use relex_core::{symbols, Result, Symbol};

use super::{Constructor, FeatureRegistry, FeatureType, FeatureValue};
use crate::observation::RelationObservation;
use crate::prop_link::PropLink;

/// Feature types that read NP-chunk facts
pub const NP_CHUNK_FEATURES: &[&str] = &[
    "poss-relation",
    "poss-after-ment2",
    "poss-wordnet",
    "mixtype-pp-relation-head",
    "mixtype-simple-pp-relation",
    "verb-prop",
    "verb-prop-wordnet",
    "verb-prop-wc",
];

fn boxed<T: FeatureType + Default + 'static>() -> Box<dyn FeatureType> {
    Box::new(T::default())
}

macro_rules! feature_types {
    ($($name:literal => $ty:ty),* $(,)?) => {
        vec![$(($name, boxed::<$ty> as Constructor)),*]
    };
}

/// Registry of every standard feature type
pub fn registry() -> FeatureRegistry {
    FeatureRegistry::new(feature_types![
        "entity-types" => EntityTypes,
        "head-words" => HeadWords,
        "mention-types" => MentionTypes,
        "prop-predicate" => PropPredicate,
        "prop-stemmed-predicate" => PropStemmedPredicate,
        "prop-roles-types" => PropRolesTypes,
        "nested-word" => NestedWord,
        "wb-words" => WordsBetween,
        "wb-pos" => PosBetween,
        "wb-stemmed" => StemmedBetween,
        "wb-types" => WordsBetweenTypes,
        "predicate-cluster" => PredicateCluster,
        "poss-relation" => PossRelation,
        "poss-after-ment2" => PossAfterSecond,
        "mixtype-simple-pp-relation" => SimplePpRelation,
        "mixtype-pp-relation-head" => PpRelationHead,
        "verb-prop" => VerbProp,
        "verb-prop-wc" => VerbPropCluster,
        "alt-model" => AltModel,
        "alt-prop-predicate" => AltPropPredicate,
        "prop-tree-path" => PropTreePath,
        "prop-tree-distance" => PropTreeDistance,
    ])
}

fn sym(s: &Symbol) -> FeatureValue {
    FeatureValue::Sym(s.clone())
}

fn types(obs: &RelationObservation<'_>) -> [FeatureValue; 2] {
    let instance = obs.instance();
    [
        sym(instance.left_entity_type()),
        sym(instance.right_entity_type()),
    ]
}

fn with_types(obs: &RelationObservation<'_>, mut fields: Vec<FeatureValue>) -> Vec<FeatureValue> {
    fields.extend(types(obs));
    fields
}

/// Words-between strings that are safe to emit as feature values
fn usable_between(value: &Symbol) -> bool {
    value != &*symbols::TOO_LONG && value != &*symbols::CONFUSED
}

/// Both roles of the linked pair, when known
fn roles(obs: &RelationObservation<'_>) -> Option<[FeatureValue; 2]> {
    let instance = obs.instance();
    let (left, right) = (instance.left_role(), instance.right_role());
    (!left.is_null() && !right.is_null()).then(|| [sym(left), sym(right)])
}

fn linked_predicate<'a>(obs: &'a RelationObservation<'_>) -> Option<&'a Symbol> {
    let predicate = obs.instance().predicate();
    (!obs.link().is_empty() && !predicate.is_null()).then_some(predicate)
}

// ============================================================================
// Mention pair
// ============================================================================

#[derive(Default)]
struct EntityTypes;

impl FeatureType for EntityTypes {
    fn name(&self) -> &'static str {
        "entity-types"
    }

    fn arity(&self) -> usize {
        2
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        Ok(vec![types(obs).to_vec()])
    }
}

#[derive(Default)]
struct HeadWords;

impl FeatureType for HeadWords {
    fn name(&self) -> &'static str {
        "head-words"
    }

    fn arity(&self) -> usize {
        2
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let instance = obs.instance();
        Ok(vec![vec![
            sym(instance.left_headword()),
            sym(instance.right_headword()),
        ]])
    }
}

#[derive(Default)]
struct MentionTypes;

impl FeatureType for MentionTypes {
    fn name(&self) -> &'static str {
        "mention-types"
    }

    fn arity(&self) -> usize {
        4
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let left = Symbol::new(obs.left_mention().mention_type.as_str());
        let right = Symbol::new(obs.right_mention().mention_type.as_str());
        Ok(vec![with_types(obs, vec![sym(&left), sym(&right)])])
    }
}

// ============================================================================
// Proposition link
// ============================================================================

#[derive(Default)]
struct PropPredicate;

impl FeatureType for PropPredicate {
    fn name(&self) -> &'static str {
        "prop-predicate"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let (Some(predicate), Some([left, right])) = (linked_predicate(obs), roles(obs)) else {
            return Ok(vec![]);
        };
        Ok(vec![vec![sym(predicate), left, right]])
    }
}

#[derive(Default)]
struct PropStemmedPredicate;

impl FeatureType for PropStemmedPredicate {
    fn name(&self) -> &'static str {
        "prop-stemmed-predicate"
    }

    fn arity(&self) -> usize {
        5
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let instance = obs.instance();
        let (Some(_), Some([left, right])) = (linked_predicate(obs), roles(obs)) else {
            return Ok(vec![]);
        };
        if instance.stemmed_predicate().is_null() {
            return Ok(vec![]);
        }
        Ok(vec![with_types(
            obs,
            vec![sym(instance.stemmed_predicate()), left, right],
        )])
    }
}

#[derive(Default)]
struct PropRolesTypes;

impl FeatureType for PropRolesTypes {
    fn name(&self) -> &'static str {
        "prop-roles-types"
    }

    fn arity(&self) -> usize {
        5
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let (false, Some([left, right])) = (obs.link().is_empty(), roles(obs)) else {
            return Ok(vec![]);
        };
        Ok(vec![with_types(
            obs,
            vec![left, right, sym(obs.instance().predication_type())],
        )])
    }
}

#[derive(Default)]
struct NestedWord;

impl FeatureType for NestedWord {
    fn name(&self) -> &'static str {
        "nested-word"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let instance = obs.instance();
        let Some(predicate) = linked_predicate(obs) else {
            return Ok(vec![]);
        };
        if instance.nested_word().is_null() || instance.nested_role().is_null() {
            return Ok(vec![]);
        }
        Ok(vec![vec![
            sym(predicate),
            sym(instance.nested_word()),
            sym(instance.nested_role()),
        ]])
    }
}

#[derive(Default)]
struct PredicateCluster;

impl FeatureType for PredicateCluster {
    fn name(&self) -> &'static str {
        "predicate-cluster"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let (Some(predicate), Some([left, right])) = (linked_predicate(obs), roles(obs)) else {
            return Ok(vec![]);
        };
        Ok(obs
            .word_clusters()
            .clusters(predicate)
            .iter()
            .map(|&cluster| vec![FeatureValue::Int(cluster), left.clone(), right.clone()])
            .collect())
    }
}

// ============================================================================
// Words between
// ============================================================================

#[derive(Default)]
struct WordsBetween;

impl FeatureType for WordsBetween {
    fn name(&self) -> &'static str {
        "wb-words"
    }

    fn arity(&self) -> usize {
        1
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let words = obs.words_between();
        if !usable_between(words) {
            return Ok(vec![]);
        }
        Ok(vec![vec![sym(words)]])
    }
}

#[derive(Default)]
struct PosBetween;

impl FeatureType for PosBetween {
    fn name(&self) -> &'static str {
        "wb-pos"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let pos = obs.pos_between();
        if !usable_between(pos) {
            return Ok(vec![]);
        }
        Ok(vec![with_types(obs, vec![sym(pos)])])
    }
}

#[derive(Default)]
struct StemmedBetween;

impl FeatureType for StemmedBetween {
    fn name(&self) -> &'static str {
        "wb-stemmed"
    }

    fn arity(&self) -> usize {
        1
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let stemmed = obs.stemmed_between();
        if !usable_between(stemmed) {
            return Ok(vec![]);
        }
        Ok(vec![vec![sym(stemmed)]])
    }
}

#[derive(Default)]
struct WordsBetweenTypes;

impl FeatureType for WordsBetweenTypes {
    fn name(&self) -> &'static str {
        "wb-types"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let words = obs.words_between();
        if !usable_between(words) {
            return Ok(vec![]);
        }
        Ok(vec![with_types(obs, vec![sym(words)])])
    }
}

// ============================================================================
// NP chunks
// ============================================================================

#[derive(Default)]
struct PossRelation;

impl FeatureType for PossRelation {
    fn name(&self) -> &'static str {
        "poss-relation"
    }

    fn arity(&self) -> usize {
        2
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        if !obs.chunk_facts().possessive {
            return Ok(vec![]);
        }
        Ok(vec![types(obs).to_vec()])
    }
}

#[derive(Default)]
struct PossAfterSecond;

impl FeatureType for PossAfterSecond {
    fn name(&self) -> &'static str {
        "poss-after-ment2"
    }

    fn arity(&self) -> usize {
        2
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        if !obs.chunk_facts().possessive_after_right {
            return Ok(vec![]);
        }
        Ok(vec![types(obs).to_vec()])
    }
}

#[derive(Default)]
struct SimplePpRelation;

impl FeatureType for SimplePpRelation {
    fn name(&self) -> &'static str {
        "mixtype-simple-pp-relation"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let Some(pp) = &obs.chunk_facts().pp_relation else {
            return Ok(vec![]);
        };
        Ok(vec![with_types(obs, vec![sym(&pp.preposition)])])
    }
}

#[derive(Default)]
struct PpRelationHead;

impl FeatureType for PpRelationHead {
    fn name(&self) -> &'static str {
        "mixtype-pp-relation-head"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let facts = obs.chunk_facts();
        let (Some(pp), Some(left), Some(right)) = (
            &facts.pp_relation,
            &facts.stemmed_left_head,
            &facts.stemmed_right_head,
        ) else {
            return Ok(vec![]);
        };
        let mut out = vec![vec![sym(left), sym(&pp.preposition), sym(right)]];
        if let Some(verb) = &pp.verb {
            out.push(vec![sym(verb), sym(&pp.preposition), sym(right)]);
        }
        Ok(out)
    }
}

#[derive(Default)]
struct VerbProp;

impl FeatureType for VerbProp {
    fn name(&self) -> &'static str {
        "verb-prop"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let Some(verb) = &obs.chunk_facts().verb_prop else {
            return Ok(vec![]);
        };
        Ok(vec![with_types(obs, vec![sym(verb)])])
    }
}

#[derive(Default)]
struct VerbPropCluster;

impl FeatureType for VerbPropCluster {
    fn name(&self) -> &'static str {
        "verb-prop-wc"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let Some(verb) = &obs.chunk_facts().verb_prop else {
            return Ok(vec![]);
        };
        let [left, right] = types(obs);
        Ok(obs
            .word_clusters()
            .clusters(verb)
            .iter()
            .map(|&c| vec![FeatureValue::Int(c), left.clone(), right.clone()])
            .collect())
    }
}

// ============================================================================
// Alt models and alternate theories
// ============================================================================

#[derive(Default)]
struct AltModel;

impl FeatureType for AltModel {
    fn name(&self) -> &'static str {
        "alt-model"
    }

    fn arity(&self) -> usize {
        2
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        Ok(obs
            .alt_predictions()
            .iter()
            .map(|(model, prediction)| vec![sym(model), sym(prediction)])
            .collect())
    }
}

/// Predicate linking the pair in each alternate theory
#[derive(Default)]
struct AltPropPredicate;

impl FeatureType for AltPropPredicate {
    fn name(&self) -> &'static str {
        "alt-prop-predicate"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let mut out = Vec::new();
        let alternates = &obs.sentence().alternates;
        for (link, theory) in obs.links().iter().skip(1).zip(alternates) {
            let (Some(prop), Some(left), Some(right)) = (
                link.top_proposition(&theory.props),
                link.left_role(),
                link.right_role(),
            ) else {
                continue;
            };
            let predicate = prop.pred_symbol();
            if predicate.is_null() {
                continue;
            }
            out.push(vec![sym(&predicate), sym(left), sym(right)]);
        }
        Ok(out)
    }
}

// ============================================================================
// Proposition trees
// ============================================================================

fn tree_link<'o>(obs: &'o RelationObservation<'_>) -> Option<&'o crate::prop_link::TreeLink> {
    match obs.link() {
        PropLink::Tree(tree) if !tree.predicate.is_null() => Some(tree),
        _ => None,
    }
}

fn role_path(roles: &[Symbol]) -> Symbol {
    if roles.is_empty() {
        return symbols::NULL.clone();
    }
    let joined: Vec<&str> = roles.iter().map(Symbol::as_str).collect();
    Symbol::new(&joined.join("_"))
}

#[derive(Default)]
struct PropTreePath;

impl FeatureType for PropTreePath {
    fn name(&self) -> &'static str {
        "prop-tree-path"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let Some(tree) = tree_link(obs) else {
            return Ok(vec![]);
        };
        let (left, right) = (role_path(&tree.left_roles), role_path(&tree.right_roles));
        if left.is_null() || right.is_null() {
            return Ok(vec![]);
        }
        Ok(vec![vec![sym(&tree.predicate), sym(&left), sym(&right)]])
    }
}

#[derive(Default)]
struct PropTreeDistance;

impl FeatureType for PropTreeDistance {
    fn name(&self) -> &'static str {
        "prop-tree-distance"
    }

    fn arity(&self) -> usize {
        3
    }

    fn features(&self, obs: &RelationObservation<'_>) -> Result<Vec<Vec<FeatureValue>>> {
        let Some(tree) = tree_link(obs) else {
            return Ok(vec![]);
        };
        Ok(vec![vec![
            sym(&tree.predicate),
            FeatureValue::Int(tree.left_distance as i64),
            FeatureValue::Int(tree.right_distance as i64),
        ]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureTypeSet;
    use crate::observation::ObservationContext;
    use crate::test_support::{distant_sentence, resources, visit_sentence};
    use crate::word_clusters::WordClusterTable;
    use std::sync::Arc;

    fn tag() -> Symbol {
        Symbol::new("PHYS")
    }

    #[test]
    fn test_linked_pair_features() {
        let sentence = visit_sentence(None);
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 1).unwrap();

        let set = FeatureTypeSet::from_names(
            &registry(),
            &["entity-types", "prop-predicate", "wb-words", "nested-word"],
            8,
        )
        .unwrap();
        let tuples = set.extract_all(&obs, &tag()).unwrap();
        let rendered: Vec<String> = tuples.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "(entity-types PHYS PER GPE)",
                "(prop-predicate PHYS visited <sub> <obj>)",
                "(wb-words PHYS visited)",
            ]
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let sentence = visit_sentence(None);
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 1).unwrap();
        let reg = registry();
        let names: Vec<&str> = reg.names().collect();
        let set = FeatureTypeSet::from_names(&reg, &names, 8).unwrap();
        let first = set.extract_all(&obs, &tag()).unwrap();
        let second = set.extract_all(&obs, &tag()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_too_long_declines_words_between() {
        let sentence = distant_sentence();
        let resources = resources();
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 1).unwrap();
        assert_eq!(obs.words_between(), &*symbols::TOO_LONG);
        assert!(obs.link().is_empty());
        assert!(obs.instance().predicate().is_null());
        assert!(!obs.instance().is_one_place());

        for name in ["wb-words", "wb-pos", "wb-stemmed", "wb-types", "prop-predicate"] {
            let feature_type = registry().create(name).unwrap();
            let tuples = feature_type.extract(&obs, &tag(), 8).unwrap();
            assert!(tuples.is_empty(), "{} fired on a distant pair", name);
        }
    }

    #[test]
    fn test_cluster_features_are_capped() {
        let mut clusters = WordClusterTable::new(&[6, 5, 4, 3, 2, 1]);
        clusters.insert("visited", "1011011");
        let resources = resources().with_word_clusters(Arc::new(clusters));
        let sentence = visit_sentence(None);
        let context = ObservationContext::reset_for_sentence(&resources, &sentence);
        let obs = context.populate(0, 1).unwrap();

        let feature_type = registry().create("predicate-cluster").unwrap();
        assert_eq!(feature_type.extract(&obs, &tag(), 8).unwrap().len(), 6);
        let capped = feature_type.extract(&obs, &tag(), 4).unwrap();
        assert_eq!(capped.len(), 4);
        assert_eq!(capped[0].fields()[0], FeatureValue::Int(0b1_101101));
    }

    #[test]
    fn test_empty_feature_width() {
        let feature_type = registry().create("prop-predicate").unwrap();
        let empty = feature_type.empty_feature();
        assert_eq!(empty.feature_type(), "prop-predicate");
        assert_eq!(empty.fields().len(), 3);
        assert!(empty.is_empty());
        assert_eq!(feature_type.model_family(), "relation");
    }
}
