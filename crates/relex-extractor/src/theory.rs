//! Sentence theories
//!
//! Read-only linguistic inputs for one sentence: the syntax tree, the
//! mention set and the proposition set. Alternate theories (for example
//! from a second parser) carry their own tree, mentions and propositions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use relex_core::{symbols, RelexError, Result, Symbol};

pub type NodeId = usize;

// ============================================================================
// Syntax tree
// ============================================================================

/// A node in the parse arena. Leaves are terminals whose tag is the word.
#[derive(Debug, Clone)]
pub struct SynNode {
    pub tag: Symbol,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Index of the head among `children`
    pub head: usize,
    pub start_token: usize,
    pub end_token: usize,
}

impl SynNode {
    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }
}

/// Arena-backed syntax tree with token and POS tables
#[derive(Debug, Clone)]
pub struct Parse {
    nodes: Vec<SynNode>,
    root: NodeId,
    tokens: Vec<Symbol>,
    pos_tags: Vec<Symbol>,
}

impl Parse {
    /// Parse a bracketed tree such as `(S (NP^ (NN officials)) (VP (VBD met)))`.
    ///
    /// A `^` suffix on a label marks that constituent as its parent's head.
    /// Unmarked constituents fall back to a simple head rule: the rightmost
    /// nominal child for nominal phrases, otherwise the leftmost child whose
    /// tag shares the parent's first letter, otherwise the first child.
    pub fn from_bracketed(text: &str) -> Result<Self> {
        let tokens = tokenize_tree(text);
        let mut builder = TreeBuilder {
            tokens: &tokens,
            pos: 0,
            nodes: Vec::new(),
            words: Vec::new(),
            pos_tags: Vec::new(),
        };
        let (root, _) = builder.parse_node(None)?;
        if builder.pos != tokens.len() {
            return Err(RelexError::MalformedInput(format!(
                "trailing input after parse tree at token {}",
                builder.pos
            )));
        }
        Ok(Self {
            nodes: builder.nodes,
            root,
            tokens: builder.words,
            pos_tags: builder.pos_tags,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &SynNode {
        &self.nodes[id]
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn tokens(&self) -> &[Symbol] {
        &self.tokens
    }

    pub fn pos_tags(&self) -> &[Symbol] {
        &self.pos_tags
    }

    pub fn n_tokens(&self) -> usize {
        self.tokens.len()
    }

    pub fn token(&self, index: usize) -> Option<&Symbol> {
        self.tokens.get(index)
    }

    pub fn pos(&self, index: usize) -> Option<&Symbol> {
        self.pos_tags.get(index)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_preterminal(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.children.len() == 1 && self.nodes[node.children[0]].is_terminal()
    }

    pub fn head_child(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id];
        node.children.get(node.head).copied()
    }

    /// Follow head children down to the preterminal
    pub fn head_preterminal(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while !self.is_preterminal(current) {
            match self.head_child(current) {
                Some(child) => current = child,
                None => break,
            }
        }
        current
    }

    pub fn head_word(&self, id: NodeId) -> Symbol {
        let preterminal = self.head_preterminal(id);
        match self.nodes[preterminal].children.first() {
            Some(&leaf) => self.nodes[leaf].tag.clone(),
            None => self.nodes[preterminal].tag.clone(),
        }
    }

    pub fn first_terminal(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(&first) = self.nodes[current].children.first() {
            current = first;
        }
        current
    }

    /// Words covered by a node, in order
    pub fn terminal_symbols(&self, id: NodeId) -> Vec<Symbol> {
        let node = &self.nodes[id];
        self.tokens[node.start_token..=node.end_token].to_vec()
    }

    /// Highest node spanning exactly `start..=end`, optionally with a given tag
    pub fn find_node(&self, start: usize, end: usize, tag: Option<&str>) -> Option<NodeId> {
        let mut found = None;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.start_token > end || node.end_token < start {
                continue;
            }
            if node.start_token == start
                && node.end_token == end
                && !node.is_terminal()
                && tag.map_or(true, |t| node.tag == t)
            {
                found = Some(id);
                break;
            }
            stack.extend(node.children.iter().rev().copied());
        }
        found
    }
}

fn tokenize_tree(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | ')' => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
                out.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

struct TreeBuilder<'a> {
    tokens: &'a [String],
    pos: usize,
    nodes: Vec<SynNode>,
    words: Vec<Symbol>,
    pos_tags: Vec<Symbol>,
}

impl<'a> TreeBuilder<'a> {
    fn expect(&mut self, what: &str) -> Result<&'a str> {
        let tokens: &'a [String] = self.tokens;
        let token = tokens.get(self.pos).ok_or_else(|| {
            RelexError::MalformedInput(format!("parse tree ended early, expected {}", what))
        })?;
        self.pos += 1;
        Ok(token.as_str())
    }

    /// Returns the node id and whether it was marked as head
    fn parse_node(&mut self, parent: Option<NodeId>) -> Result<(NodeId, bool)> {
        let open = self.expect("left parenthesis")?;
        if open != "(" {
            return Err(RelexError::MalformedInput(format!(
                "ill-formed parse tree. Token: {}. Expected left parenthesis.",
                open
            )));
        }
        let raw_label = self.expect("label")?;
        let (label, marked) = match raw_label.strip_suffix('^') {
            Some(stripped) => (stripped, true),
            None => (raw_label, false),
        };
        let id = self.nodes.len();
        self.nodes.push(SynNode {
            tag: Symbol::new(label),
            parent,
            children: Vec::new(),
            head: 0,
            start_token: self.words.len(),
            end_token: self.words.len(),
        });

        let tokens: &'a [String] = self.tokens;
        let mut marked_head = None;
        loop {
            let next = tokens
                .get(self.pos)
                .ok_or_else(|| RelexError::MalformedInput("unbalanced parse tree".to_string()))?;
            match next.as_str() {
                ")" => {
                    self.pos += 1;
                    break;
                }
                "(" => {
                    let (child, is_head) = self.parse_node(Some(id))?;
                    if is_head && marked_head.is_none() {
                        marked_head = Some(self.nodes[id].children.len());
                    }
                    self.nodes[id].children.push(child);
                }
                word => {
                    self.pos += 1;
                    let leaf = self.nodes.len();
                    let index = self.words.len();
                    self.nodes.push(SynNode {
                        tag: Symbol::new(word),
                        parent: Some(id),
                        children: Vec::new(),
                        head: 0,
                        start_token: index,
                        end_token: index,
                    });
                    self.words.push(Symbol::new(word));
                    self.pos_tags.push(Symbol::new(label));
                    self.nodes[id].children.push(leaf);
                }
            }
        }

        if self.nodes[id].children.is_empty() {
            return Err(RelexError::MalformedInput(format!(
                "empty constituent '{}' in parse tree",
                label
            )));
        }
        let end = self.words.len().saturating_sub(1);
        self.nodes[id].end_token = end;
        let head = match marked_head {
            Some(h) => h,
            None => self.default_head(id),
        };
        self.nodes[id].head = head;
        Ok((id, marked))
    }

    fn default_head(&self, id: NodeId) -> usize {
        let node = &self.nodes[id];
        let tag = node.tag.as_str();
        let child_tags: Vec<&str> = node
            .children
            .iter()
            .map(|&c| self.nodes[c].tag.as_str())
            .collect();
        if tag.starts_with('N') {
            if let Some(i) = child_tags.iter().rposition(|t| t.starts_with('N')) {
                return i;
            }
            return child_tags.len() - 1;
        }
        if let Some(first) = tag.chars().next() {
            if let Some(i) = child_tags.iter().position(|t| t.starts_with(first)) {
                return i;
            }
        }
        0
    }
}

// ============================================================================
// Mentions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MentionType {
    None,
    Name,
    Pron,
    Desc,
    Part,
    Appo,
    List,
    Nest,
}

impl MentionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Name => "NAME",
            Self::Pron => "PRON",
            Self::Desc => "DESC",
            Self::Part => "PART",
            Self::Appo => "APPO",
            Self::List => "LIST",
            Self::Nest => "NEST",
        }
    }

    /// Mentions of these types never take part in a relation directly
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::None | Self::Appo | Self::List)
    }
}

impl fmt::Display for MentionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Mention {
    pub index: usize,
    pub node: NodeId,
    pub mention_type: MentionType,
    pub entity_type: Symbol,
    /// First child (appositive parts, list members, partitive whole)
    pub child: Option<usize>,
    /// Next sibling under the same parent mention
    pub next: Option<usize>,
    pub parent: Option<usize>,
    pub metonymy: Option<Symbol>,
    /// Coreference cluster
    pub entity_id: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MentionSet {
    mentions: Vec<Mention>,
}

impl MentionSet {
    /// Build a mention set; parent links are derived from child/next chains
    pub fn new(mut mentions: Vec<Mention>) -> Result<Self> {
        let n = mentions.len();
        for (i, m) in mentions.iter_mut().enumerate() {
            m.index = i;
            for link in [m.child, m.next].into_iter().flatten() {
                if link >= n {
                    return Err(RelexError::MalformedInput(format!(
                        "mention {} links to missing mention {}",
                        i, link
                    )));
                }
            }
        }
        for i in 0..n {
            let mut child = mentions[i].child;
            let mut guard = 0;
            while let Some(c) = child {
                mentions[c].parent = Some(i);
                child = mentions[c].next;
                guard += 1;
                if guard > n {
                    return Err(RelexError::MalformedInput(format!(
                        "cyclic mention chain under mention {}",
                        i
                    )));
                }
            }
        }
        Ok(Self { mentions })
    }

    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Mention> {
        self.mentions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mention> {
        self.mentions.iter()
    }

    /// Children of a mention in chain order
    pub fn children(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut child = self.mentions.get(index).and_then(|m| m.child);
        while let Some(c) = child {
            if out.contains(&c) {
                break;
            }
            out.push(c);
            child = self.mentions[c].next;
        }
        out
    }

    /// The mention whose node supplies the headword: an appositive defers
    /// to its descriptive child
    pub fn head_mention(&self, index: usize) -> usize {
        match self.mentions.get(index) {
            Some(m) if m.mention_type == MentionType::Appo => {
                let children = self.children(index);
                children
                    .iter()
                    .copied()
                    .find(|&c| self.mentions[c].mention_type == MentionType::Desc)
                    .or_else(|| children.first().copied())
                    .unwrap_or(index)
            }
            _ => index,
        }
    }

    /// Mention whose node is `node`, if any
    pub fn mention_by_node(&self, node: NodeId) -> Option<usize> {
        self.mentions.iter().position(|m| m.node == node)
    }
}

// ============================================================================
// Propositions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredType {
    Verb,
    Copula,
    Modifier,
    Noun,
    Poss,
    Loc,
    Set,
    Comp,
    Name,
    Pronoun,
    Dependency,
}

impl PredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verb => "verb",
            Self::Copula => "copula",
            Self::Modifier => "modifier",
            Self::Noun => "noun",
            Self::Poss => "poss",
            Self::Loc => "loc",
            Self::Set => "set",
            Self::Comp => "comp",
            Self::Name => "name",
            Self::Pronoun => "pronoun",
            Self::Dependency => "dependency",
        }
    }
}

impl fmt::Display for PredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgPayload {
    Mention(usize),
    Proposition(usize),
    Text(Symbol),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub role: Symbol,
    pub payload: ArgPayload,
}

impl Argument {
    pub fn mention(role: &str, index: usize) -> Self {
        Self {
            role: Symbol::new(role),
            payload: ArgPayload::Mention(index),
        }
    }

    pub fn proposition(role: &str, index: usize) -> Self {
        Self {
            role: Symbol::new(role),
            payload: ArgPayload::Proposition(index),
        }
    }

    pub fn mention_index(&self) -> Option<usize> {
        match self.payload {
            ArgPayload::Mention(m) => Some(m),
            _ => None,
        }
    }

    pub fn proposition_index(&self) -> Option<usize> {
        match self.payload {
            ArgPayload::Proposition(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Proposition {
    pub index: usize,
    pub pred_type: PredType,
    pub predicate: Option<Symbol>,
    pub args: Vec<Argument>,
}

impl Proposition {
    pub fn new(pred_type: PredType, predicate: Option<&str>, args: Vec<Argument>) -> Self {
        Self {
            index: 0,
            pred_type,
            predicate: predicate.map(Symbol::new),
            args,
        }
    }

    pub fn arg(&self, i: usize) -> Option<&Argument> {
        self.args.get(i)
    }

    /// Predicate head, `NULL` when the proposition has none
    pub fn pred_symbol(&self) -> Symbol {
        self.predicate.clone().unwrap_or_else(|| symbols::NULL.clone())
    }
}

/// Propositions of a sentence together with mention definitions
#[derive(Debug, Clone, Default)]
pub struct PropositionSet {
    props: Vec<Proposition>,
    definitions: HashMap<usize, usize>,
}

impl PropositionSet {
    pub fn new(mut props: Vec<Proposition>) -> Result<Self> {
        let n = props.len();
        let mut definitions = HashMap::new();
        for (i, prop) in props.iter_mut().enumerate() {
            prop.index = i;
            for arg in &prop.args {
                if let Some(p) = arg.proposition_index() {
                    if p >= n {
                        return Err(RelexError::MalformedInput(format!(
                            "proposition {} refers to missing proposition {}",
                            i, p
                        )));
                    }
                }
            }
            // a <ref> mention in slot 0 makes this proposition its definition
            if let Some(first) = prop.args.first() {
                if first.role == *symbols::REF_ROLE {
                    if let Some(m) = first.mention_index() {
                        definitions.entry(m).or_insert(i);
                    }
                }
            }
        }
        Ok(Self { props, definitions })
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Proposition> {
        self.props.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proposition> {
        self.props.iter()
    }

    pub fn definition(&self, mention: usize) -> Option<&Proposition> {
        self.definitions.get(&mention).map(|&p| &self.props[p])
    }
}

// ============================================================================
// Sentence theory
// ============================================================================

/// One consistent analysis of a sentence
#[derive(Debug, Clone)]
pub struct TheoryBundle {
    pub parse: Parse,
    pub mentions: MentionSet,
    pub props: PropositionSet,
}

impl TheoryBundle {
    pub fn new(parse: Parse, mentions: MentionSet, props: PropositionSet) -> Result<Self> {
        for m in mentions.iter() {
            if m.node >= parse.n_nodes() {
                return Err(RelexError::MalformedInput(format!(
                    "mention {} points at missing node {}",
                    m.index, m.node
                )));
            }
        }
        for prop in props.iter() {
            for arg in &prop.args {
                if let Some(m) = arg.mention_index() {
                    if m >= mentions.len() {
                        return Err(RelexError::MalformedInput(format!(
                            "proposition {} refers to missing mention {}",
                            prop.index, m
                        )));
                    }
                }
            }
        }
        Ok(Self {
            parse,
            mentions,
            props,
        })
    }

    pub fn mention_start(&self, index: usize) -> usize {
        self.parse.node(self.mentions.mentions[index].node).start_token
    }

    pub fn mention_end(&self, index: usize) -> usize {
        self.parse.node(self.mentions.mentions[index].node).end_token
    }

    /// End token of the mention's head preterminal, used to align theories
    pub fn head_end_token(&self, index: usize) -> usize {
        let node = self.mentions.mentions[index].node;
        let preterminal = self.parse.head_preterminal(node);
        self.parse.node(preterminal).end_token
    }

    /// Headword of a mention, honoring the appositive rule
    pub fn head_word(&self, index: usize) -> Symbol {
        let head = self.mentions.head_mention(index);
        self.parse.head_word(self.mentions.mentions[head].node)
    }
}

/// An annotated relation between two mentions of the primary theory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldRelation {
    pub left: usize,
    pub right: usize,
    #[serde(rename = "type")]
    pub relation_type: Symbol,
}

/// Everything known about one sentence
#[derive(Debug, Clone)]
pub struct SentenceTheory {
    pub primary: TheoryBundle,
    pub alternates: Vec<TheoryBundle>,
    pub relations: Vec<GoldRelation>,
}

impl SentenceTheory {
    pub fn new(primary: TheoryBundle) -> Self {
        Self {
            primary,
            alternates: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Primary theory followed by the alternates
    pub fn theories(&self) -> impl Iterator<Item = &TheoryBundle> {
        std::iter::once(&self.primary).chain(self.alternates.iter())
    }

    /// Gold relation type for an unordered mention pair, with a flag set
    /// when the annotation runs right-to-left
    pub fn gold_relation(&self, left: usize, right: usize) -> Option<(Symbol, bool)> {
        self.relations.iter().find_map(|r| {
            if r.left == left && r.right == right {
                Some((r.relation_type.clone(), false))
            } else if r.left == right && r.right == left {
                Some((r.relation_type.clone(), true))
            } else {
                None
            }
        })
    }
}
