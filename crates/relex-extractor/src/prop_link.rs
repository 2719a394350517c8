//! Proposition-link resolution
//!
//! Finds the proposition structure connecting two mentions:
//! - `Direct`: one proposition takes both mentions as arguments, possibly
//!   through a set (conjunction) argument
//! - `Nested`: one mention hangs off a proposition that is itself reached
//!   through an intermediate argument of the proposition holding the other
//! - `Tree`: nearest common predicate-argument ancestor in the
//!   proposition tree, used when propositions are simulated from trees
//! - `Empty`: nothing connects them

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use relex_core::{symbols, Symbol};

use crate::language::RelationUtilities;
use crate::theory::{Argument, PredType, Proposition, PropositionSet, TheoryBundle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestDirection {
    /// The left mention sits inside the intermediate proposition
    Left,
    /// The right mention sits inside the intermediate proposition
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectLink {
    pub top: usize,
    pub left_role: Symbol,
    pub right_role: Symbol,
    /// Re-anchored on the left mention's definition (stacked prepositions)
    pub stacked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedLink {
    pub outer: usize,
    pub inner: usize,
    pub left_role: Symbol,
    pub right_role: Symbol,
    pub intermediate_role: Symbol,
    pub direction: NestDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeLink {
    pub top_link: usize,
    pub predicate: Symbol,
    pub pred_type: PredType,
    /// Roles from the top proposition down to the left mention
    pub left_roles: Vec<Symbol>,
    /// Roles from the top proposition down to the right mention
    pub right_roles: Vec<Symbol>,
    pub left_distance: usize,
    pub right_distance: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum PropLink {
    #[default]
    Empty,
    Direct(DirectLink),
    Nested(NestedLink),
    Tree(TreeLink),
}

impl PropLink {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, Self::Nested(_))
    }

    /// The proposition whose predicate describes the pair
    pub fn top_proposition<'a>(&self, props: &'a PropositionSet) -> Option<&'a Proposition> {
        match self {
            Self::Direct(d) => props.get(d.top),
            Self::Nested(n) => props.get(n.outer),
            Self::Tree(t) => props.get(t.top_link),
            Self::Empty => None,
        }
    }

    pub fn left_role(&self) -> Option<&Symbol> {
        match self {
            Self::Direct(d) => Some(&d.left_role),
            Self::Nested(n) => Some(&n.left_role),
            Self::Tree(t) => t.left_roles.first(),
            Self::Empty => None,
        }
    }

    pub fn right_role(&self) -> Option<&Symbol> {
        match self {
            Self::Direct(d) => Some(&d.right_role),
            Self::Nested(n) => Some(&n.right_role),
            Self::Tree(t) => t.right_roles.first(),
            Self::Empty => None,
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct PropLinkResolver<'a> {
    theory: &'a TheoryBundle,
    utilities: &'a dyn RelationUtilities,
    tree: Option<&'a PropTree>,
}

impl<'a> PropLinkResolver<'a> {
    pub fn new(theory: &'a TheoryBundle, utilities: &'a dyn RelationUtilities) -> Self {
        Self {
            theory,
            utilities,
            tree: None,
        }
    }

    /// Fall back to tree paths when no proposition connects a pair
    pub fn with_tree(mut self, tree: Option<&'a PropTree>) -> Self {
        self.tree = tree;
        self
    }

    /// Resolve the link between two mentions of this theory
    pub fn resolve(&self, left: usize, right: usize) -> PropLink {
        let props = &self.theory.props;
        if props.is_empty() || left == right {
            return PropLink::Empty;
        }
        if let Some(link) = self.find_direct(left, right) {
            return link;
        }
        if let Some(link) = self.find_nested(left, right) {
            return link;
        }
        if let Some(tree) = self.tree {
            if let Some(link) = tree.link(left, right, props) {
                return PropLink::Tree(link);
            }
        }
        PropLink::Empty
    }

    /// Whichever of `left` or `right` comes first among the set's members
    fn first_set_member(&self, arg: &Argument, left: usize, right: usize) -> Option<usize> {
        let m = arg.mention_index()?;
        let def = self.theory.props.definition(m)?;
        if def.pred_type != PredType::Set {
            return None;
        }
        def.args
            .iter()
            .skip(1)
            .filter_map(Argument::mention_index)
            .find(|&member| member == left || member == right)
    }

    fn find_direct(&self, left: usize, right: usize) -> Option<PropLink> {
        let props = &self.theory.props;
        for prop in props.iter() {
            let mut a1: Option<&Argument> = None;
            let mut a2: Option<&Argument> = None;
            for arg in &prop.args {
                match arg.mention_index() {
                    Some(m) if m == left => a1 = Some(arg),
                    Some(m) if m == right => a2 = Some(arg),
                    // a set argument fills at most one side
                    Some(_) => match self.first_set_member(arg, left, right) {
                        Some(m) if m == left => a1 = Some(arg),
                        Some(_) => a2 = Some(arg),
                        None => {}
                    },
                    None => {}
                }
            }
            let (Some(a1), Some(a2)) = (a1, a2) else {
                continue;
            };
            let mut link = DirectLink {
                top: prop.index,
                left_role: a1.role.clone(),
                right_role: a2.role.clone(),
                stacked: false,
            };
            if self
                .utilities
                .is_prep_stack(self.theory, left, right, &link.left_role, &link.right_role)
            {
                let definition = a1.mention_index().and_then(|m| props.definition(m));
                if let Some(def) = definition {
                    if let Some(def_arg0) = def.arg(0) {
                        link = DirectLink {
                            top: def.index,
                            left_role: def_arg0.role.clone(),
                            right_role: a2.role.clone(),
                            stacked: true,
                        };
                    }
                }
            }
            return Some(PropLink::Direct(link));
        }
        None
    }

    /// Proposition reached through `arg`: a mention's non-set definition or
    /// a proposition-valued argument
    fn intermediate_of(&self, arg: &Argument) -> Option<&'a Proposition> {
        let props = &self.theory.props;
        if let Some(p) = arg.proposition_index() {
            return props.get(p);
        }
        let def = props.definition(arg.mention_index()?)?;
        (def.pred_type != PredType::Set).then_some(def)
    }

    fn find_nested(&self, left: usize, right: usize) -> Option<PropLink> {
        let props = &self.theory.props;
        for prop in props.iter() {
            let mut a1: Option<&Argument> = None;
            let mut a2: Option<&Argument> = None;
            let mut nested: Option<(&Argument, &Proposition, NestDirection)> = None;
            for arg in &prop.args {
                match arg.mention_index() {
                    Some(m) if m == left => {
                        a1 = Some(arg);
                        continue;
                    }
                    Some(m) if m == right => {
                        a2 = Some(arg);
                        continue;
                    }
                    _ => {}
                }
                if nested.is_some() {
                    continue;
                }
                let Some(inner) = self.intermediate_of(arg) else {
                    continue;
                };
                if inner.index == prop.index {
                    continue;
                }
                for inner_arg in inner.args.iter().skip(1) {
                    match inner_arg.mention_index() {
                        Some(m) if m == left => {
                            a1 = Some(inner_arg);
                            nested = Some((arg, inner, NestDirection::Left));
                            break;
                        }
                        Some(m) if m == right => {
                            a2 = Some(inner_arg);
                            nested = Some((arg, inner, NestDirection::Right));
                            break;
                        }
                        _ => {}
                    }
                }
            }
            if let (Some(a1), Some(a2), Some((intermediate, inner, direction))) = (a1, a2, nested)
            {
                return Some(PropLink::Nested(NestedLink {
                    outer: prop.index,
                    inner: inner.index,
                    left_role: a1.role.clone(),
                    right_role: a2.role.clone(),
                    intermediate_role: intermediate.role.clone(),
                    direction,
                }));
            }
        }
        None
    }
}

// ============================================================================
// Proposition tree
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TreeNode {
    Prop(usize),
    Mention(usize),
}

/// Directed predicate-argument graph: propositions point at their
/// arguments and a defined mention points at its definition
#[derive(Debug, Clone)]
pub struct PropTree {
    graph: DiGraph<TreeNode, Symbol>,
    index: HashMap<TreeNode, NodeIndex>,
    legacy_distance_swap: bool,
}

#[derive(Debug, Clone)]
struct Ancestor {
    distance: usize,
    roles: Vec<Symbol>,
}

impl PropTree {
    pub fn build(props: &PropositionSet, legacy_distance_swap: bool) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut node_for = |graph: &mut DiGraph<TreeNode, Symbol>, node: TreeNode| {
            *index.entry(node).or_insert_with(|| graph.add_node(node))
        };

        for prop in props.iter() {
            let from = node_for(&mut graph, TreeNode::Prop(prop.index));
            for (i, arg) in prop.args.iter().enumerate() {
                let is_definition_ref = i == 0 && arg.role == *symbols::REF_ROLE;
                let target = match (arg.mention_index(), arg.proposition_index()) {
                    (Some(m), _) if is_definition_ref => {
                        let mention = node_for(&mut graph, TreeNode::Mention(m));
                        graph.add_edge(mention, from, symbols::REF_ROLE.clone());
                        continue;
                    }
                    (Some(m), _) => TreeNode::Mention(m),
                    (None, Some(p)) => TreeNode::Prop(p),
                    (None, None) => continue,
                };
                let to = node_for(&mut graph, target);
                graph.add_edge(from, to, arg.role.clone());
            }
        }

        Self {
            graph,
            index,
            legacy_distance_swap,
        }
    }

    /// Proposition ancestors of a mention with their distance and the role
    /// path from the ancestor down to the mention
    fn ancestors(&self, mention: usize) -> HashMap<usize, Ancestor> {
        let mut found = HashMap::new();
        let Some(&start) = self.index.get(&TreeNode::Mention(mention)) else {
            return found;
        };
        let mut best: HashMap<NodeIndex, usize> = HashMap::new();
        best.insert(start, 0);
        let mut queue = VecDeque::new();
        queue.push_back((start, 0usize, Vec::<Symbol>::new()));
        while let Some((node, distance, roles)) = queue.pop_front() {
            let incoming: Vec<_> = self
                .graph
                .edges_directed(node, Direction::Incoming)
                .map(|e| (e.source(), e.weight().clone()))
                .collect();
            for (parent, role) in incoming {
                if best.contains_key(&parent) {
                    continue;
                }
                best.insert(parent, distance + 1);
                let mut path = Vec::with_capacity(roles.len() + 1);
                path.push(role);
                path.extend(roles.iter().cloned());
                if let TreeNode::Prop(p) = self.graph[parent] {
                    found.entry(p).or_insert(Ancestor {
                        distance: distance + 1,
                        roles: path.clone(),
                    });
                }
                queue.push_back((parent, distance + 1, path));
            }
        }
        found
    }

    /// Nearest common proposition ancestor of two mentions
    pub fn link(&self, left: usize, right: usize, props: &PropositionSet) -> Option<TreeLink> {
        let left_up = self.ancestors(left);
        let right_up = self.ancestors(right);
        let (top, l, r) = left_up
            .iter()
            .filter_map(|(p, l)| right_up.get(p).map(|r| (*p, l, r)))
            .min_by_key(|(p, l, r)| (l.distance + r.distance, *p))?;
        let prop = props.get(top)?;

        let right_distance = if self.legacy_distance_swap {
            // historical behavior: the right slot receives the left distance
            l.distance
        } else {
            r.distance
        };
        Some(TreeLink {
            top_link: top,
            predicate: prop.pred_symbol(),
            pred_type: prop.pred_type,
            left_roles: l.roles.clone(),
            right_roles: r.roles.clone(),
            left_distance: l.distance,
            right_distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::GenericRelationUtilities;
    use crate::theory::{Mention, MentionSet, MentionType, Parse};

    /// "Smith and Jones visited the office of the company in Paris"
    fn theory(props: Vec<Proposition>) -> TheoryBundle {
        let parse = Parse::from_bracketed(
            "(S (NP (NP (NNP Smith)) (CC and) (NP (NNP Jones))) (VP^ (VBD visited) (NP (NP^ (DT the) (NN office)) (PP (IN of) (NP (NP^ (DT the) (NN company)) (PP (IN in) (NP (NNP Paris))))))))",
        )
        .unwrap();
        let spans = [(0, 2), (0, 0), (2, 2), (4, 5), (7, 8), (10, 10)];
        let types = [
            MentionType::List,
            MentionType::Name,
            MentionType::Name,
            MentionType::Desc,
            MentionType::Desc,
            MentionType::Name,
        ];
        let mentions: Vec<Mention> = spans
            .iter()
            .zip(types)
            .enumerate()
            .map(|(i, (&(s, e), mention_type))| Mention {
                index: i,
                node: parse.find_node(s, e, None).unwrap(),
                mention_type,
                entity_type: Symbol::new(if i == 5 { "GPE" } else { "ORG" }),
                child: if i == 0 { Some(1) } else { None },
                next: if i == 1 { Some(2) } else { None },
                parent: None,
                metonymy: None,
                entity_id: None,
            })
            .collect();
        TheoryBundle::new(
            parse,
            MentionSet::new(mentions).unwrap(),
            PropositionSet::new(props).unwrap(),
        )
        .unwrap()
    }

    fn standard_props() -> Vec<Proposition> {
        vec![
            // 0: visited(<sub>=Smith and Jones, <obj>=office)
            Proposition::new(
                PredType::Verb,
                Some("visited"),
                vec![Argument::mention("<sub>", 0), Argument::mention("<obj>", 3)],
            ),
            // 1: set(<ref>=list, <member>=Smith, <member>=Jones)
            Proposition::new(
                PredType::Set,
                None,
                vec![
                    Argument::mention("<ref>", 0),
                    Argument::mention("<member>", 1),
                    Argument::mention("<member>", 2),
                ],
            ),
            // 2: office(<ref>=office, of=company)
            Proposition::new(
                PredType::Noun,
                Some("office"),
                vec![Argument::mention("<ref>", 3), Argument::mention("of", 4)],
            ),
            // 3: company(<ref>=company, in=Paris)
            Proposition::new(
                PredType::Noun,
                Some("company"),
                vec![Argument::mention("<ref>", 4), Argument::mention("in", 5)],
            ),
        ]
    }

    #[test]
    fn test_direct_link() {
        let theory = theory(standard_props());
        let resolver = PropLinkResolver::new(&theory, &GenericRelationUtilities);
        match resolver.resolve(3, 4) {
            PropLink::Direct(d) => {
                assert_eq!(d.top, 2);
                assert_eq!(d.left_role, "<ref>");
                assert_eq!(d.right_role, "of");
                assert!(!d.stacked);
            }
            other => panic!("expected direct link, got {:?}", other),
        }
    }

    #[test]
    fn test_set_member_link() {
        let theory = theory(standard_props());
        let resolver = PropLinkResolver::new(&theory, &GenericRelationUtilities);
        match resolver.resolve(2, 3) {
            PropLink::Direct(d) => {
                assert_eq!(d.top, 0);
                assert_eq!(d.left_role, "<sub>");
                assert_eq!(d.right_role, "<obj>");
            }
            other => panic!("expected direct link, got {:?}", other),
        }
    }

    #[test]
    fn test_set_argument_credits_first_listed_member() {
        // praised(<sub>=Smith and Jones, <obj>=Jones): Smith is listed before Jones,
        // so the set fills Smith's side and the direct argument fills Jones's
        let praised = Proposition::new(
            PredType::Verb,
            Some("praised"),
            vec![Argument::mention("<sub>", 0), Argument::mention("<obj>", 2)],
        );
        let theory = theory(vec![praised, standard_props().remove(1)]);
        let resolver = PropLinkResolver::new(&theory, &GenericRelationUtilities);
        match resolver.resolve(2, 1) {
            PropLink::Direct(d) => {
                assert_eq!(d.top, 0);
                assert_eq!(d.left_role, "<obj>");
                assert_eq!(d.right_role, "<sub>");
            }
            other => panic!("expected direct link, got {:?}", other),
        }
    }

    #[test]
    fn test_same_set_members_do_not_link() {
        let theory = theory(vec![standard_props().remove(0), standard_props().remove(1)]);
        let resolver = PropLinkResolver::new(&theory, &GenericRelationUtilities);
        // members of the set are only linked through the set proposition itself
        match resolver.resolve(1, 2) {
            PropLink::Direct(d) => assert_eq!(d.top, 1),
            other => panic!("expected the set proposition, got {:?}", other),
        }
        let verb_only = theory_without_set();
        let resolver = PropLinkResolver::new(&verb_only, &GenericRelationUtilities);
        assert!(resolver.resolve(1, 2).is_empty());
    }

    fn theory_without_set() -> TheoryBundle {
        theory(vec![Proposition::new(
            PredType::Verb,
            Some("visited"),
            vec![
                Argument::mention("<sub>", 0),
                Argument::mention("<obj>", 3),
            ],
        )])
    }

    #[test]
    fn test_nested_link() {
        let theory = theory(standard_props());
        let resolver = PropLinkResolver::new(&theory, &GenericRelationUtilities);
        match resolver.resolve(0, 4) {
            PropLink::Nested(n) => {
                assert_eq!(n.outer, 0);
                assert_eq!(n.left_role, "<sub>");
                assert_eq!(n.inner, 2);
                assert_eq!(n.direction, NestDirection::Right);
                assert_eq!(n.intermediate_role, "<obj>");
                assert_eq!(n.right_role, "of");
            }
            other => panic!("expected nested link, got {:?}", other),
        }
    }

    #[test]
    fn test_tree_link_and_legacy_swap() {
        let theory = theory(standard_props());
        let tree = PropTree::build(&theory.props, false);
        let resolver =
            PropLinkResolver::new(&theory, &GenericRelationUtilities).with_tree(Some(&tree));
        // Smith .. Paris: visited -> office -> company -> Paris
        match resolver.resolve(1, 5) {
            PropLink::Tree(t) => {
                assert_eq!(t.top_link, 0);
                assert_eq!(t.predicate, "visited");
                // the left path crosses the set definition of the list
                assert_eq!(t.left_distance, 3);
                assert_eq!(t.right_distance, 5);
                assert_eq!(t.right_roles.first().unwrap(), "<obj>");
            }
            other => panic!("expected tree link, got {:?}", other),
        }

        let legacy = PropTree::build(&theory.props, true);
        let link = legacy.link(1, 5, &theory.props).unwrap();
        assert_eq!(link.right_distance, link.left_distance);
    }

    #[test]
    fn test_no_propositions_is_empty() {
        let theory = theory(vec![]);
        let resolver = PropLinkResolver::new(&theory, &GenericRelationUtilities);
        assert_eq!(resolver.resolve(1, 2), PropLink::Empty);
    }
}
