//! Relation instances
//!
//! The canonical fixed-arity view of a mention pair, used both for
//! training-vector export and as the input of the vector relation model.
//! The first thirteen fields are fixed; languages may append trailing
//! fields through an [`InstanceLayout`].

use std::fmt;
use std::str::FromStr;

use relex_core::{symbols, RelexError, Result, Symbol};

use crate::inventory::RelationTypeSet;
use crate::language::RelationUtilities;
use crate::observation::RelationObservation;
use crate::prop_link::PropLink;
use crate::theory::{Argument, MentionType, PredType, Proposition, TheoryBundle};

pub const NGRAM_SIZE: usize = 13;

pub const RELATION_TYPE: usize = 0;
pub const PREDICATE: usize = 1;
pub const STEMMED_PREDICATE: usize = 2;
pub const LEFT_HEADWORD: usize = 3;
pub const RIGHT_HEADWORD: usize = 4;
pub const NESTED_WORD: usize = 5;
pub const LEFT_ENTITY_TYPE: usize = 6;
pub const RIGHT_ENTITY_TYPE: usize = 7;
pub const LEFT_ROLE: usize = 8;
pub const RIGHT_ROLE: usize = 9;
pub const NESTED_ROLE: usize = 10;
pub const REVERSED: usize = 11;
pub const PREDICATION_TYPE: usize = 12;

// ============================================================================
// Layout
// ============================================================================

/// Optional trailing fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionField {
    LeftMentionType,
    RightMentionType,
    LeftMetonymy,
    RightMetonymy,
}

impl ExtensionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeftMentionType => "left-mention-type",
            Self::RightMentionType => "right-mention-type",
            Self::LeftMetonymy => "left-metonymy",
            Self::RightMetonymy => "right-metonymy",
        }
    }
}

impl FromStr for ExtensionField {
    type Err = RelexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left-mention-type" => Ok(Self::LeftMentionType),
            "right-mention-type" => Ok(Self::RightMentionType),
            "left-metonymy" => Ok(Self::LeftMetonymy),
            "right-metonymy" => Ok(Self::RightMetonymy),
            _ => Err(RelexError::Config(format!(
                "unknown instance extension field: {}",
                s
            ))),
        }
    }
}

/// Which trailing fields a training vector carries, in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceLayout {
    extensions: Vec<ExtensionField>,
}

impl InstanceLayout {
    pub fn new(extensions: Vec<ExtensionField>) -> Self {
        Self { extensions }
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let extensions = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { extensions })
    }

    pub fn extensions(&self) -> &[ExtensionField] {
        &self.extensions
    }

    /// Number of labels in a training vector
    pub fn width(&self) -> usize {
        NGRAM_SIZE + self.extensions.len()
    }
}

/// Side of a mention pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSide {
    Left,
    Right,
}

// ============================================================================
// Instance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationInstance {
    ngram: [Symbol; NGRAM_SIZE],
    left_mention_type: Symbol,
    right_mention_type: Symbol,
    left_metonymy: Symbol,
    right_metonymy: Symbol,
}

impl Default for RelationInstance {
    fn default() -> Self {
        let null = symbols::NULL.clone();
        Self {
            ngram: std::array::from_fn(|_| null.clone()),
            left_mention_type: null.clone(),
            right_mention_type: null.clone(),
            left_metonymy: null.clone(),
            right_metonymy: null,
        }
    }
}

/// Predicate symbol for a proposition kind
fn map_predicate(pred_type: PredType, predicate: Symbol) -> Symbol {
    match pred_type {
        PredType::Noun | PredType::Verb | PredType::Copula | PredType::Modifier | PredType::Poss => {
            predicate
        }
        PredType::Set => symbols::SET.clone(),
        PredType::Comp => symbols::COMP.clone(),
        other => {
            tracing::warn!(
                "Predicate '{}' of type {} mapped to {}",
                predicate,
                other,
                *symbols::CONFUSED
            );
            symbols::CONFUSED.clone()
        }
    }
}

fn is_reserved_predicate(symbol: &Symbol) -> bool {
    *symbol == *symbols::NULL
        || *symbol == *symbols::SET
        || *symbol == *symbols::COMP
        || *symbol == *symbols::CONFUSED
}

fn stem_mapped(
    utilities: &dyn RelationUtilities,
    predicate: &Symbol,
    pred_type: PredType,
) -> Result<Symbol> {
    if is_reserved_predicate(predicate) {
        Ok(predicate.clone())
    } else {
        utilities.stem_predicate(predicate, pred_type)
    }
}

impl RelationInstance {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    fn with_mentions(theory: &TheoryBundle, left: usize, right: usize) -> Result<Self> {
        let (Some(m1), Some(m2)) = (theory.mentions.get(left), theory.mentions.get(right)) else {
            return Err(RelexError::InternalInconsistency(format!(
                "relation instance over missing mentions {} and {}",
                left, right
            )));
        };
        let mut inst = Self::default();
        inst.ngram[RELATION_TYPE] = symbols::NONE.clone();
        inst.ngram[LEFT_HEADWORD] = theory.head_word(left);
        inst.ngram[RIGHT_HEADWORD] = theory.head_word(right);
        inst.ngram[LEFT_ENTITY_TYPE] = m1.entity_type.clone();
        inst.ngram[RIGHT_ENTITY_TYPE] = m2.entity_type.clone();
        inst.left_mention_type = Symbol::new(m1.mention_type.as_str());
        inst.right_mention_type = Symbol::new(m2.mention_type.as_str());
        if let Some(met) = &m1.metonymy {
            inst.left_metonymy = met.clone();
        }
        if let Some(met) = &m2.metonymy {
            inst.right_metonymy = met.clone();
        }
        Ok(inst)
    }

    fn set_link_predicate(
        &mut self,
        utilities: &dyn RelationUtilities,
        pred_type: PredType,
        predicate: Symbol,
        left_role: &Symbol,
        right_role: &Symbol,
    ) -> Result<()> {
        let mapped = map_predicate(pred_type, predicate);
        self.ngram[STEMMED_PREDICATE] = stem_mapped(utilities, &mapped, pred_type)?;
        self.ngram[PREDICATE] = mapped;
        self.ngram[LEFT_ROLE] = left_role.clone();
        self.ngram[RIGHT_ROLE] = right_role.clone();
        self.ngram[PREDICATION_TYPE] = if *left_role == *symbols::REF_ROLE {
            symbols::ONE_PLACE.clone()
        } else {
            symbols::MULTI_PLACE.clone()
        };
        Ok(())
    }

    fn set_nested(
        &mut self,
        utilities: &dyn RelationUtilities,
        inner: &Proposition,
        intermediate_role: &Symbol,
    ) -> Result<()> {
        self.ngram[NESTED_WORD] = match inner.pred_type {
            PredType::Noun | PredType::Modifier | PredType::Verb => {
                utilities.stem_predicate(&inner.pred_symbol(), inner.pred_type)?
            }
            _ => symbols::CONFUSED.clone(),
        };
        self.ngram[NESTED_ROLE] = intermediate_role.clone();
        Ok(())
    }

    /// Standard instance for a mention pair and its resolved link
    pub fn standard(
        theory: &TheoryBundle,
        utilities: &dyn RelationUtilities,
        left: usize,
        right: usize,
        link: &PropLink,
    ) -> Result<Self> {
        let mut inst = Self::with_mentions(theory, left, right)?;
        match link {
            PropLink::Empty => {
                inst.ngram[PREDICATION_TYPE] = symbols::MULTI_PLACE.clone();
            }
            PropLink::Direct(d) => {
                let prop = theory.props.get(d.top).ok_or_else(|| {
                    RelexError::InternalInconsistency(format!("link to missing proposition {}", d.top))
                })?;
                inst.set_link_predicate(
                    utilities,
                    prop.pred_type,
                    prop.pred_symbol(),
                    &d.left_role,
                    &d.right_role,
                )?;
            }
            PropLink::Nested(n) => {
                let (Some(outer), Some(inner)) = (theory.props.get(n.outer), theory.props.get(n.inner))
                else {
                    return Err(RelexError::InternalInconsistency(format!(
                        "nested link to missing propositions {} and {}",
                        n.outer, n.inner
                    )));
                };
                inst.set_link_predicate(
                    utilities,
                    outer.pred_type,
                    outer.pred_symbol(),
                    &n.left_role,
                    &n.right_role,
                )?;
                inst.set_nested(utilities, inner, &n.intermediate_role)?;
            }
            PropLink::Tree(t) => {
                let null = symbols::NULL.clone();
                let left_role = t.left_roles.first().unwrap_or(&null);
                let right_role = t.right_roles.first().unwrap_or(&null);
                inst.set_link_predicate(
                    utilities,
                    t.pred_type,
                    t.predicate.clone(),
                    left_role,
                    right_role,
                )?;
            }
        }
        Ok(inst)
    }

    /// Instance for the observation's mention pair and primary link
    pub fn from_observation(obs: &RelationObservation<'_>) -> Result<Self> {
        Self::standard(
            obs.theory(),
            obs.utilities(),
            obs.left(),
            obs.right(),
            obs.link(),
        )
    }

    /// Instance for two mention arguments of one proposition
    pub fn from_arguments(
        theory: &TheoryBundle,
        utilities: &dyn RelationUtilities,
        prop: &Proposition,
        left: &Argument,
        right: &Argument,
    ) -> Result<Self> {
        let (Some(l), Some(r)) = (left.mention_index(), right.mention_index()) else {
            return Err(RelexError::InternalInconsistency(
                "relation instance from non-mention arguments".to_string(),
            ));
        };
        let mut inst = Self::with_mentions(theory, l, r)?;
        inst.set_link_predicate(
            utilities,
            prop.pred_type,
            prop.pred_symbol(),
            &left.role,
            &right.role,
        )?;
        Ok(inst)
    }

    /// Instance where `second` is an argument of `inner`, which hangs off
    /// `outer` through `intermediate`
    pub fn nested(
        theory: &TheoryBundle,
        utilities: &dyn RelationUtilities,
        outer: &Proposition,
        first: &Argument,
        inner: &Proposition,
        intermediate: &Argument,
        second: &Argument,
    ) -> Result<Self> {
        let mut inst = Self::from_arguments(theory, utilities, outer, first, second)?;
        inst.set_nested(utilities, inner, &intermediate.role)?;
        Ok(inst)
    }

    /// Partitive instance ("some of the soldiers"): the part mention on the
    /// left, the whole on the right, both typed as the whole
    pub fn partitive(
        theory: &TheoryBundle,
        utilities: &dyn RelationUtilities,
        top: usize,
        bottom: usize,
    ) -> Result<Self> {
        let mut inst = Self::with_mentions(theory, top, bottom)?;
        let top_head = inst.ngram[LEFT_HEADWORD].clone();
        let entity_type = inst.ngram[RIGHT_ENTITY_TYPE].clone();
        inst.ngram[PREDICATE] = top_head.clone();
        inst.ngram[STEMMED_PREDICATE] = utilities.stem_predicate(&top_head, PredType::Noun)?;
        inst.ngram[PREDICATION_TYPE] = symbols::ONE_PLACE.clone();
        inst.ngram[LEFT_ROLE] = symbols::PARTITIVE_TOP.clone();
        inst.ngram[RIGHT_ROLE] = symbols::PARTITIVE_BOTTOM.clone();
        inst.ngram[LEFT_ENTITY_TYPE] = entity_type.clone();
        inst.ngram[RIGHT_ENTITY_TYPE] = entity_type;
        Ok(inst)
    }

    /// Replace one side with a member of a list or set mention
    pub fn with_member(mut self, theory: &TheoryBundle, side: ArgSide, member: usize) -> Result<Self> {
        let m = theory.mentions.get(member).ok_or_else(|| {
            RelexError::InternalInconsistency(format!("missing member mention {}", member))
        })?;
        let head = theory.head_word(member);
        let mention_type = Symbol::new(m.mention_type.as_str());
        match side {
            ArgSide::Left => {
                self.ngram[LEFT_HEADWORD] = head;
                self.ngram[LEFT_ENTITY_TYPE] = m.entity_type.clone();
                self.left_mention_type = mention_type;
            }
            ArgSide::Right => {
                self.ngram[RIGHT_HEADWORD] = head;
                self.ngram[RIGHT_ENTITY_TYPE] = m.entity_type.clone();
                self.right_mention_type = mention_type;
            }
        }
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Training vectors
    // ------------------------------------------------------------------

    pub fn from_training_vector(
        labels: &[Symbol],
        layout: &InstanceLayout,
        types: &RelationTypeSet,
    ) -> Result<Self> {
        if labels.len() != layout.width() {
            return Err(RelexError::MalformedInput(format!(
                "training vector has {} labels, expected {}",
                labels.len(),
                layout.width()
            )));
        }
        let mut inst = Self::default();
        for (slot, label) in inst.ngram.iter_mut().zip(labels) {
            *slot = label.clone();
        }
        for (field, label) in layout.extensions().iter().zip(&labels[NGRAM_SIZE..]) {
            *inst.extension_mut(*field) = label.clone();
        }
        let reversed = labels[REVERSED] == *symbols::REVERSED;
        inst.set_reversed(reversed, types);
        Ok(inst)
    }

    pub fn to_training_vector(&self, layout: &InstanceLayout) -> Vec<Symbol> {
        let mut out = Vec::with_capacity(layout.width());
        out.extend(self.ngram.iter().cloned());
        out.extend(layout.extensions().iter().map(|f| self.extension(*f).clone()));
        out
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Set the relation type, clearing the reversal of a symmetric type
    pub fn set_relation_type(&mut self, relation_type: &Symbol, types: &RelationTypeSet) {
        self.ngram[RELATION_TYPE] = relation_type.clone();
        if types.is_symmetric_symbol(relation_type) {
            self.ngram[REVERSED] = symbols::NULL.clone();
        }
    }

    /// Set the reversal flag; symmetric types never carry one
    pub fn set_reversed(&mut self, reversed: bool, types: &RelationTypeSet) {
        self.ngram[REVERSED] = if reversed && !types.is_symmetric_symbol(&self.ngram[RELATION_TYPE]) {
            symbols::REVERSED.clone()
        } else {
            symbols::NULL.clone()
        };
    }

    fn extension(&self, field: ExtensionField) -> &Symbol {
        match field {
            ExtensionField::LeftMentionType => &self.left_mention_type,
            ExtensionField::RightMentionType => &self.right_mention_type,
            ExtensionField::LeftMetonymy => &self.left_metonymy,
            ExtensionField::RightMetonymy => &self.right_metonymy,
        }
    }

    fn extension_mut(&mut self, field: ExtensionField) -> &mut Symbol {
        match field {
            ExtensionField::LeftMentionType => &mut self.left_mention_type,
            ExtensionField::RightMentionType => &mut self.right_mention_type,
            ExtensionField::LeftMetonymy => &mut self.left_metonymy,
            ExtensionField::RightMetonymy => &mut self.right_metonymy,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn ngram(&self) -> &[Symbol; NGRAM_SIZE] {
        &self.ngram
    }

    pub fn relation_type(&self) -> &Symbol {
        &self.ngram[RELATION_TYPE]
    }

    pub fn predicate(&self) -> &Symbol {
        &self.ngram[PREDICATE]
    }

    pub fn stemmed_predicate(&self) -> &Symbol {
        &self.ngram[STEMMED_PREDICATE]
    }

    pub fn left_headword(&self) -> &Symbol {
        &self.ngram[LEFT_HEADWORD]
    }

    pub fn right_headword(&self) -> &Symbol {
        &self.ngram[RIGHT_HEADWORD]
    }

    pub fn nested_word(&self) -> &Symbol {
        &self.ngram[NESTED_WORD]
    }

    pub fn left_entity_type(&self) -> &Symbol {
        &self.ngram[LEFT_ENTITY_TYPE]
    }

    pub fn right_entity_type(&self) -> &Symbol {
        &self.ngram[RIGHT_ENTITY_TYPE]
    }

    pub fn left_role(&self) -> &Symbol {
        &self.ngram[LEFT_ROLE]
    }

    pub fn right_role(&self) -> &Symbol {
        &self.ngram[RIGHT_ROLE]
    }

    pub fn nested_role(&self) -> &Symbol {
        &self.ngram[NESTED_ROLE]
    }

    pub fn is_reversed(&self) -> bool {
        self.ngram[REVERSED] == *symbols::REVERSED
    }

    pub fn predication_type(&self) -> &Symbol {
        &self.ngram[PREDICATION_TYPE]
    }

    pub fn is_one_place(&self) -> bool {
        self.ngram[PREDICATION_TYPE] == *symbols::ONE_PLACE
    }

    pub fn left_mention_type(&self) -> &Symbol {
        &self.left_mention_type
    }

    pub fn right_mention_type(&self) -> &Symbol {
        &self.right_mention_type
    }

    pub fn left_metonymy(&self) -> &Symbol {
        &self.left_metonymy
    }

    pub fn right_metonymy(&self) -> &Symbol {
        &self.right_metonymy
    }

    /// True when the mention on `side` is a list
    pub fn is_list_side(&self, side: ArgSide) -> bool {
        let mention_type = match side {
            ArgSide::Left => &self.left_mention_type,
            ArgSide::Right => &self.right_mention_type,
        };
        *mention_type == MentionType::List.as_str()
    }
}

impl fmt::Display for RelationInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.ngram.iter().map(|s| s.as_str()).collect();
        write!(f, "({})", labels.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::GenericRelationUtilities;
    use crate::prop_link::{DirectLink, NestDirection, NestedLink};
    use crate::theory::{Mention, MentionSet, Parse, PropositionSet};
    use proptest::prelude::*;

    fn types() -> RelationTypeSet {
        RelationTypeSet::from_pairs(&[("EMP-ORG", false), ("PER-SOC", true)]).unwrap()
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    /// "the 15 officials government" with mentions over both noun phrases
    fn theory(props: Vec<Proposition>) -> TheoryBundle {
        let parse = Parse::from_bracketed(
            "(NP (NP (DT the) (CD 15) (NNS^ officials)) (NP^ (NN government)))",
        )
        .unwrap();
        let first = parse.find_node(0, 2, None).unwrap();
        let second = parse.find_node(3, 3, None).unwrap();
        let mention = |node, mention_type, entity_type: &str| Mention {
            index: 0,
            node,
            mention_type,
            entity_type: sym(entity_type),
            child: None,
            next: None,
            parent: None,
            metonymy: None,
            entity_id: None,
        };
        let mentions = MentionSet::new(vec![
            mention(first, MentionType::Name, "PER"),
            mention(second, MentionType::Desc, "GPE"),
        ])
        .unwrap();
        TheoryBundle::new(parse, mentions, PropositionSet::new(props).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_link_instance() {
        let theory = theory(vec![]);
        let inst =
            RelationInstance::standard(&theory, &GenericRelationUtilities, 0, 1, &PropLink::Empty)
                .unwrap();
        assert_eq!(inst.relation_type(), &*symbols::NONE);
        assert_eq!(inst.predicate(), &*symbols::NULL);
        assert_eq!(inst.left_headword(), "officials");
        assert_eq!(inst.right_headword(), "government");
        assert_eq!(inst.predication_type(), &*symbols::MULTI_PLACE);
        assert!(!inst.is_reversed());
    }

    #[test]
    fn test_predicate_mapping_and_arity() {
        let theory = theory(vec![
            Proposition::new(
                PredType::Noun,
                Some("officials"),
                vec![Argument::mention("<ref>", 0), Argument::mention("of", 1)],
            ),
            Proposition::new(
                PredType::Set,
                None,
                vec![Argument::mention("<ref>", 0), Argument::mention("<member>", 1)],
            ),
            Proposition::new(
                PredType::Loc,
                Some("in"),
                vec![Argument::mention("<sub>", 0), Argument::mention("<obj>", 1)],
            ),
        ]);
        let link = |top| {
            let prop = theory.props.get(top).unwrap();
            PropLink::Direct(DirectLink {
                top,
                left_role: prop.args[0].role.clone(),
                right_role: prop.args[1].role.clone(),
                stacked: false,
            })
        };
        let utilities = GenericRelationUtilities;

        let noun = RelationInstance::standard(&theory, &utilities, 0, 1, &link(0)).unwrap();
        assert_eq!(noun.predicate(), "officials");
        assert!(noun.is_one_place());

        let set = RelationInstance::standard(&theory, &utilities, 0, 1, &link(1)).unwrap();
        assert_eq!(set.predicate(), &*symbols::SET);
        assert_eq!(set.stemmed_predicate(), &*symbols::SET);

        let loc = RelationInstance::standard(&theory, &utilities, 0, 1, &link(2)).unwrap();
        assert_eq!(loc.predicate(), &*symbols::CONFUSED);
        assert_eq!(loc.predication_type(), &*symbols::MULTI_PLACE);
    }

    #[test]
    fn test_nested_word() {
        let theory = theory(vec![
            Proposition::new(
                PredType::Verb,
                Some("met"),
                vec![Argument::mention("<sub>", 0), Argument::proposition("<obj>", 1)],
            ),
            Proposition::new(PredType::Noun, Some("head"), vec![Argument::mention("of", 1)]),
        ]);
        let link = PropLink::Nested(NestedLink {
            outer: 0,
            inner: 1,
            left_role: sym("<sub>"),
            right_role: sym("of"),
            intermediate_role: sym("<obj>"),
            direction: NestDirection::Right,
        });
        let inst = RelationInstance::standard(&theory, &GenericRelationUtilities, 0, 1, &link)
            .unwrap();
        assert_eq!(inst.predicate(), "met");
        assert_eq!(inst.nested_word(), "head");
        assert_eq!(inst.nested_role(), "<obj>");
    }

    #[test]
    fn test_partitive() {
        let theory = theory(vec![]);
        let inst = RelationInstance::partitive(&theory, &GenericRelationUtilities, 0, 1).unwrap();
        assert_eq!(inst.predicate(), "officials");
        assert_eq!(inst.left_role(), &*symbols::PARTITIVE_TOP);
        assert_eq!(inst.right_role(), &*symbols::PARTITIVE_BOTTOM);
        assert_eq!(inst.left_entity_type(), "GPE");
        assert!(inst.is_one_place());
    }

    #[test]
    fn test_symmetric_type_strips_reversal() {
        let types = types();
        let mut inst = RelationInstance::default();
        inst.set_relation_type(&sym("EMP-ORG"), &types);
        inst.set_reversed(true, &types);
        assert!(inst.is_reversed());

        inst.set_relation_type(&sym("PER-SOC"), &types);
        assert!(!inst.is_reversed());
        inst.set_reversed(true, &types);
        assert!(!inst.is_reversed());
    }

    #[test]
    fn test_training_vector_width_checked() {
        let layout = InstanceLayout::default();
        let labels = vec![sym("NONE"); 12];
        assert!(matches!(
            RelationInstance::from_training_vector(&labels, &layout, &types()),
            Err(RelexError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_layout_names() {
        let layout = InstanceLayout::from_names(&["left-mention-type", "right-metonymy"]).unwrap();
        assert_eq!(layout.width(), 15);
        assert!(InstanceLayout::from_names(&["last-char"]).is_err());
    }

    fn label() -> impl Strategy<Value = Symbol> {
        "[A-Za-z<>:_-]{1,8}".prop_map(|s| Symbol::new(&s))
    }

    proptest! {
        #[test]
        fn prop_training_vector_round_trip(
            labels in proptest::collection::vec(label(), NGRAM_SIZE + 2),
            reversed in any::<bool>(),
            rel in prop_oneof![Just("EMP-ORG"), Just("PER-SOC"), Just("NONE")],
        ) {
            let types = types();
            let layout = InstanceLayout::new(vec![
                ExtensionField::LeftMentionType,
                ExtensionField::RightMetonymy,
            ]);
            let mut labels = labels;
            labels[RELATION_TYPE] = sym(rel);
            labels[REVERSED] = if reversed { symbols::REVERSED.clone() } else { symbols::NULL.clone() };
            let inst = RelationInstance::from_training_vector(&labels, &layout, &types).unwrap();
            let back = RelationInstance::from_training_vector(
                &inst.to_training_vector(&layout), &layout, &types,
            ).unwrap();
            prop_assert_eq!(&back, &inst);
            if types.is_symmetric_symbol(&sym(rel)) {
                prop_assert!(!inst.is_reversed());
            }
        }
    }
}
