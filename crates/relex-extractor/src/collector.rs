//! Potential relation collector
//!
//! Enumerates candidate relation instances from a sentence's propositions,
//! labels them from gold relations and accumulates training vectors.
//!
//! Pairs come from arguments of one proposition, from arguments reached
//! through a nested proposition, from members of lists and sets, and from
//! partitive mentions. A mention pair is collected at most once per sentence.

use std::collections::HashSet;

use tracing::{debug, info};

use relex_core::{symbols, RelexError, Result, Symbol};

use crate::instance::{ArgSide, InstanceLayout, RelationInstance};
use crate::inventory::{EntityTypeSet, RelationTypeSet};
use crate::language::RelationUtilities;
use crate::theory::{Argument, MentionType, PredType, Proposition, SentenceTheory, TheoryBundle};
use crate::vector_file::VectorTable;

/// Guards recursion through proposition-valued arguments
const MAX_NESTING: usize = 8;

/// A labeled candidate pair
#[derive(Debug, Clone)]
pub struct PotentialRelation {
    pub left: usize,
    pub right: usize,
    pub instance: RelationInstance,
}

pub struct PotentialRelationCollector<'r> {
    utilities: &'r dyn RelationUtilities,
    entity_types: &'r EntityTypeSet,
    relation_types: &'r RelationTypeSet,
    layout: &'r InstanceLayout,
}

impl<'r> PotentialRelationCollector<'r> {
    pub fn new(
        utilities: &'r dyn RelationUtilities,
        entity_types: &'r EntityTypeSet,
        relation_types: &'r RelationTypeSet,
        layout: &'r InstanceLayout,
    ) -> Self {
        Self {
            utilities,
            entity_types,
            relation_types,
            layout,
        }
    }

    /// Candidates of one sentence, labeled from its gold relations
    pub fn collect_sentence(&self, sentence: &SentenceTheory) -> Result<Vec<PotentialRelation>> {
        let mut walk = SentenceWalk {
            collector: self,
            theory: &sentence.primary,
            seen: HashSet::new(),
            found: Vec::new(),
        };
        walk.run()?;
        let mut relations = walk.found;
        for relation in &mut relations {
            self.label(sentence, relation)?;
        }
        Ok(relations)
    }

    fn label(&self, sentence: &SentenceTheory, relation: &mut PotentialRelation) -> Result<()> {
        let Some((relation_type, reversed)) = sentence.gold_relation(relation.left, relation.right)
        else {
            return Ok(());
        };
        if !self.relation_types.is_valid(&relation_type) {
            return Err(RelexError::InvalidRelationType(relation_type.to_string()));
        }
        relation
            .instance
            .set_relation_type(&relation_type, self.relation_types);
        relation.instance.set_reversed(reversed, self.relation_types);
        Ok(())
    }

    /// Training vectors for a whole corpus, duplicates merged into counts
    pub fn collect_corpus<'s>(
        &self,
        corpus: impl IntoIterator<Item = &'s SentenceTheory>,
    ) -> Result<VectorTable> {
        let mut table = VectorTable::new();
        let mut n_candidates = 0;
        let mut n_related = 0;
        for sentence in corpus {
            for relation in self.collect_sentence(sentence)? {
                if *relation.instance.relation_type() != *symbols::NONE {
                    n_related += 1;
                }
                n_candidates += 1;
                table.add(relation.instance.to_training_vector(self.layout), 1);
            }
        }
        info!(
            "Collected {} candidate pairs ({} related) as {} distinct vectors",
            n_candidates,
            n_related,
            table.len()
        );
        Ok(table)
    }
}

// ============================================================================
// Per-sentence walk
// ============================================================================

struct SentenceWalk<'c, 'r, 't> {
    collector: &'c PotentialRelationCollector<'r>,
    theory: &'t TheoryBundle,
    seen: HashSet<(usize, usize)>,
    found: Vec<PotentialRelation>,
}

impl<'t> SentenceWalk<'_, '_, 't> {
    fn is_recognized(&self, mention: usize) -> bool {
        self.theory
            .mentions
            .get(mention)
            .map_or(false, |m| self.collector.entity_types.is_recognized(&m.entity_type))
    }

    fn mention_type(&self, mention: usize) -> Option<MentionType> {
        self.theory.mentions.get(mention).map(|m| m.mention_type)
    }

    fn same_entity(&self, a: usize, b: usize) -> bool {
        let id = |i: usize| self.theory.mentions.get(i).and_then(|m| m.entity_id);
        matches!((id(a), id(b)), (Some(x), Some(y)) if x == y)
    }

    fn set_definition(&self, mention: usize) -> Option<&'t Proposition> {
        self.theory
            .props
            .definition(mention)
            .filter(|p| p.pred_type == PredType::Set)
    }

    fn proposition(&self, arg: &Argument) -> Option<&'t Proposition> {
        arg.proposition_index().and_then(|p| self.theory.props.get(p))
    }

    /// Record a pair once; false when it was already collected
    fn claim(&mut self, left: usize, right: usize) -> bool {
        let key = (left.min(right), left.max(right));
        self.seen.insert(key)
    }

    fn push(&mut self, left: usize, right: usize, instance: RelationInstance) {
        debug!("Potential relation {} / {}: {}", left, right, instance);
        self.found.push(PotentialRelation {
            left,
            right,
            instance,
        });
    }

    fn run(&mut self) -> Result<()> {
        let theory = self.theory;
        for prop in theory.props.iter() {
            match prop.pred_type {
                PredType::Copula => self.copula(prop)?,
                PredType::Set => self.set(prop)?,
                PredType::Comp => self.comp(prop)?,
                PredType::Verb | PredType::Poss | PredType::Modifier | PredType::Noun => {
                    self.proposition_pairs(prop)?
                }
                _ => {}
            }
        }
        self.partitives()
    }

    fn copula(&mut self, prop: &'t Proposition) -> Result<()> {
        let has_role = |role: &Symbol| {
            prop.args
                .iter()
                .any(|a| a.role == *role && a.mention_index().is_some())
        };
        if has_role(&symbols::SUB_ROLE) && has_role(&symbols::OBJ_ROLE) {
            self.proposition_pairs(prop)?;
        }
        Ok(())
    }

    fn set(&mut self, prop: &'t Proposition) -> Result<()> {
        let members: Vec<&Argument> = prop
            .args
            .iter()
            .skip(1)
            .filter(|a| a.mention_index().is_some())
            .collect();
        for (i, left) in members.iter().enumerate() {
            for right in &members[i + 1..] {
                self.argument_pair(left, right, prop)?;
            }
        }
        Ok(())
    }

    fn comp(&mut self, prop: &'t Proposition) -> Result<()> {
        for (i, first) in prop.args.iter().enumerate() {
            for second in &prop.args[i + 1..] {
                match (first.mention_index(), second.proposition_index()) {
                    (Some(_), Some(_)) => self.prop_argument_pair(first, second, prop, false, 0)?,
                    _ => {
                        if first.proposition_index().is_some() && second.mention_index().is_some() {
                            self.prop_argument_pair(first, second, prop, true, 0)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn proposition_pairs(&mut self, prop: &'t Proposition) -> Result<()> {
        // no nesting through the definition of a recognized mention
        let defines_entity = prop.pred_type == PredType::Noun
            && prop
                .arg(0)
                .and_then(Argument::mention_index)
                .map_or(false, |m| self.is_recognized(m));
        for (i, first) in prop.args.iter().enumerate() {
            if first.mention_index().is_none() && first.proposition_index().is_none() {
                continue;
            }
            if defines_entity && i > 0 {
                return Ok(());
            }
            for second in &prop.args[i + 1..] {
                if first.mention_index().is_some() {
                    if second.mention_index().is_some() {
                        self.argument_pair(first, second, prop)?;
                    } else if second.proposition_index().is_some() {
                        self.prop_argument_pair(first, second, prop, false, 0)?;
                    }
                } else if second.mention_index().is_some() {
                    self.prop_argument_pair(first, second, prop, true, 0)?;
                }
            }
        }
        Ok(())
    }

    fn argument_pair(&mut self, left: &Argument, right: &Argument, prop: &'t Proposition) -> Result<()> {
        let (Some(l), Some(r)) = (left.mention_index(), right.mention_index()) else {
            return Ok(());
        };
        match (self.is_recognized(l), self.is_recognized(r)) {
            (true, true) => self.add(left, right, prop),
            (true, false) if self.mention_type(r) == Some(MentionType::List) => {
                self.list_members(left, right, prop, ArgSide::Right)
            }
            (false, true) if self.mention_type(l) == Some(MentionType::List) => {
                self.list_members(left, right, prop, ArgSide::Left)
            }
            (true, false) => self.nested_through(left, right, prop),
            _ => Ok(()),
        }
    }

    fn list_members(
        &mut self,
        left: &Argument,
        right: &Argument,
        prop: &'t Proposition,
        list_side: ArgSide,
    ) -> Result<()> {
        let (Some(l), Some(r)) = (left.mention_index(), right.mention_index()) else {
            return Ok(());
        };
        let list = match list_side {
            ArgSide::Left => l,
            ArgSide::Right => r,
        };
        for member in self.theory.mentions.children(list) {
            if !self.is_recognized(member) {
                continue;
            }
            let (ml, mr) = match list_side {
                ArgSide::Left => (member, r),
                ArgSide::Right => (l, member),
            };
            if ml == mr || self.same_entity(ml, mr) || !self.claim(ml, mr) {
                continue;
            }
            let instance = RelationInstance::from_arguments(
                self.theory,
                self.collector.utilities,
                prop,
                left,
                right,
            )?
            .with_member(self.theory, list_side, member)?;
            self.push(ml, mr, instance);
        }
        Ok(())
    }

    /// `first` relates to an argument of the proposition defining `intermediate`
    fn nested_through(
        &mut self,
        first: &Argument,
        intermediate: &Argument,
        prop: &'t Proposition,
    ) -> Result<()> {
        let core_role = first.role == *symbols::SUB_ROLE
            || first.role == *symbols::OBJ_ROLE
            || first.role == *symbols::REF_ROLE;
        if !core_role {
            return Ok(());
        }
        let Some(inner) = intermediate
            .mention_index()
            .and_then(|m| self.theory.props.definition(m))
        else {
            return Ok(());
        };
        for arg in inner.args.iter().skip(1) {
            if arg.proposition_index().is_some() {
                self.prop_argument_pair(first, arg, prop, false, 1)?;
            }
            if arg.mention_index().map_or(false, |m| self.is_recognized(m)) {
                self.add_nested(first, intermediate, arg, prop, inner)?;
            }
        }
        Ok(())
    }

    /// One side is a proposition argument; pair the other side with the
    /// recognized mentions inside it
    fn prop_argument_pair(
        &mut self,
        left: &Argument,
        right: &Argument,
        prop: &'t Proposition,
        left_is_prop: bool,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_NESTING {
            return Ok(());
        }
        let (prop_arg, mention_arg) = if left_is_prop { (left, right) } else { (right, left) };
        let Some(inner) = self.proposition(prop_arg) else {
            return Ok(());
        };
        if !mention_arg
            .mention_index()
            .map_or(false, |m| self.is_recognized(m))
        {
            return Ok(());
        }
        for arg in &inner.args {
            if arg.proposition_index().is_some() {
                if left_is_prop {
                    self.prop_argument_pair(arg, right, prop, true, depth + 1)?;
                } else {
                    self.prop_argument_pair(left, arg, prop, false, depth + 1)?;
                }
            }
            if arg.mention_index().map_or(false, |m| self.is_recognized(m)) {
                self.add_nested(mention_arg, prop_arg, arg, prop, inner)?;
            }
        }
        Ok(())
    }

    fn add(&mut self, first: &Argument, second: &Argument, prop: &'t Proposition) -> Result<()> {
        let (Some(a), Some(b)) = (first.mention_index(), second.mention_index()) else {
            return Ok(());
        };
        if a == b || self.same_entity(a, b) {
            return Ok(());
        }
        if let Some(set) = self.set_definition(a) {
            for member in set.args.iter().skip(1) {
                if member.mention_index().map_or(false, |m| self.is_recognized(m) && m != a) {
                    self.add(member, second, prop)?;
                }
            }
            return Ok(());
        }
        if let Some(set) = self.set_definition(b) {
            for member in set.args.iter().skip(1) {
                if member.mention_index().map_or(false, |m| self.is_recognized(m) && m != b) {
                    self.add(first, member, prop)?;
                }
            }
            return Ok(());
        }
        if !self.claim(a, b) {
            return Ok(());
        }
        let instance =
            RelationInstance::from_arguments(self.theory, self.collector.utilities, prop, first, second)?;
        self.push(a, b, instance);
        Ok(())
    }

    fn add_nested(
        &mut self,
        first: &Argument,
        intermediate: &Argument,
        nested: &Argument,
        outer: &'t Proposition,
        inner: &'t Proposition,
    ) -> Result<()> {
        let (Some(a), Some(b)) = (first.mention_index(), nested.mention_index()) else {
            return Ok(());
        };
        if a == b || self.same_entity(a, b) {
            return Ok(());
        }
        if let Some(set) = self.set_definition(a) {
            for member in set.args.iter().skip(1) {
                if member.mention_index().map_or(false, |m| self.is_recognized(m) && m != a) {
                    self.add_nested(member, intermediate, nested, outer, inner)?;
                }
            }
            return Ok(());
        }
        if let Some(set) = self.set_definition(b) {
            for member in set.args.iter().skip(1) {
                if member.mention_index().map_or(false, |m| self.is_recognized(m) && m != b) {
                    self.add_nested(first, intermediate, member, outer, inner)?;
                }
            }
            return Ok(());
        }
        if !self.claim(a, b) {
            return Ok(());
        }
        let instance = RelationInstance::nested(
            self.theory,
            self.collector.utilities,
            outer,
            first,
            inner,
            intermediate,
            nested,
        )?;
        self.push(a, b, instance);
        Ok(())
    }

    /// Part mentions paired with the whole they select from
    fn partitives(&mut self) -> Result<()> {
        let theory = self.theory;
        for mention in theory.mentions.iter() {
            if mention.mention_type != MentionType::Part {
                continue;
            }
            let Some(whole) = mention.child else { continue };
            if !self.is_recognized(whole) || !self.claim(mention.index, whole) {
                continue;
            }
            let instance =
                RelationInstance::partitive(theory, self.collector.utilities, mention.index, whole)?;
            self.push(mention.index, whole, instance);
        }
        Ok(())
    }
}
