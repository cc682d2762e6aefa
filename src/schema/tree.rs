use indexmap::IndexMap;

use crate::error::{Error, Result};

/// A handle into a [`Schema`]'s arena. Two structurally identical subtrees
/// built into the same [`Schema`] are two distinct `NodeId`s: identity here
/// is by handle (arena index), not by structure, per the crate's chosen
/// resolution of the null-vs-missing design note (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One node of a compiled schema tree: either a leaf (no children) or a
/// group. Carries its own maximum repetition and definition level, computed
/// once when the node is added to its [`Schema`] and never mutated again.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    is_repeated: bool,
    max_repetition_level: i16,
    max_definition_level: i16,
    is_first_in_repetition: bool,
    is_last_in_repetition: bool,
    preorder_rank: usize,
}

impl Node {
    /// The local field name (the root uses the sentinel `"$"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_repeated(&self) -> bool {
        self.is_repeated
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn max_repetition_level(&self) -> i16 {
        self.max_repetition_level
    }

    pub fn max_definition_level(&self) -> i16 {
        self.max_definition_level
    }
}

/// A schema tree: a root node (the sentinel `"$"`, `R=0`, `D=0`,
/// non-repeated) and its arena of descendants, built once by
/// [`crate::schema::parse_schema`] and never mutated afterward.
#[derive(Debug, Clone)]
pub struct Schema {
    nodes: Vec<Node>,
    root: NodeId,
    /// Leaves in declaration (preorder) order, populated by `finalize`.
    leaves: Vec<NodeId>,
}

const ROOT_NAME: &str = "$";

impl Schema {
    pub fn new() -> Self {
        let root = Node {
            name: ROOT_NAME.to_string(),
            parent: None,
            children: IndexMap::new(),
            is_repeated: false,
            max_repetition_level: 0,
            max_definition_level: 0,
            is_first_in_repetition: false,
            is_last_in_repetition: false,
            preorder_rank: 0,
        };
        Schema {
            nodes: vec![root],
            root: NodeId(0),
            leaves: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Full public [`Node`] accessor, for callers that want more than one
    /// field without repeated lookups.
    pub fn get(&self, id: NodeId) -> &Node {
        self.node(id)
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.node(id).name()
    }

    pub fn is_repeated(&self, id: NodeId) -> bool {
        self.node(id).is_repeated
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).is_leaf()
    }

    pub fn max_repetition_level(&self, id: NodeId) -> i16 {
        self.node(id).max_repetition_level
    }

    pub fn max_definition_level(&self, id: NodeId) -> i16 {
        self.node(id).max_definition_level
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id).children.get(name).copied()
    }

    /// Children of `id`, in declaration order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id).children.values().copied()
    }

    /// Inserts (or reuses) a child named `name` under `parent`. Reusing an
    /// existing child with a different `is_repeated` is a schema error.
    pub fn add_child(&mut self, parent: NodeId, name: &str, is_repeated: bool) -> Result<NodeId> {
        if let Some(&existing) = self.node(parent).children.get(name) {
            let existing_repeated = self.node(existing).is_repeated;
            if existing_repeated != is_repeated {
                return Err(schema_err!(
                    "field '{}' declared as {} in one path and {} in another",
                    name,
                    if existing_repeated { "repeated" } else { "non-repeated" },
                    if is_repeated { "repeated" } else { "non-repeated" }
                ));
            }
            return Ok(existing);
        }

        let parent_node = self.node(parent);
        let max_definition_level = parent_node.max_definition_level + 1;
        let max_repetition_level = parent_node.max_repetition_level + i16::from(is_repeated);

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            parent: Some(parent),
            children: IndexMap::new(),
            is_repeated,
            max_repetition_level,
            max_definition_level,
            is_first_in_repetition: false,
            is_last_in_repetition: false,
            preorder_rank: 0,
        });
        self.nodes[parent.0].children.insert(name.to_string(), id);
        Ok(id)
    }

    /// Completes schema construction: computes leaf declaration order,
    /// first/last-in-repetition flags, and preorder ranks over every node.
    /// Must be called once, after all paths have been inserted.
    pub fn finalize(&mut self) {
        self.leaves.clear();
        let mut rank = 0usize;
        let mut order = Vec::new();
        fn preorder(schema: &Schema, id: NodeId, order: &mut Vec<NodeId>) {
            order.push(id);
            for child in schema.children(id) {
                preorder(schema, child, order);
            }
        }
        preorder(self, self.root, &mut order);

        for id in &order {
            self.nodes[id.0].preorder_rank = rank;
            rank += 1;
            if self.nodes[id.0].is_leaf() {
                self.leaves.push(*id);
            }
        }

        for id in &order {
            let parent = self.nodes[id.0].parent;
            let (is_first, is_last) = match parent {
                Some(p) if self.nodes[p.0].is_repeated => {
                    let children = &self.nodes[p.0].children;
                    let is_first = children.get_index(0).map(|(_, v)| *v) == Some(*id);
                    let is_last = children
                        .get_index(children.len() - 1)
                        .map(|(_, v)| *v)
                        == Some(*id);
                    (is_first, is_last)
                }
                _ => (false, false),
            };
            self.nodes[id.0].is_first_in_repetition = is_first;
            self.nodes[id.0].is_last_in_repetition = is_last;
        }
    }

    /// All nodes, root first, in preorder.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        fn preorder(schema: &Schema, id: NodeId, out: &mut Vec<NodeId>) {
            out.push(id);
            for child in schema.children(id) {
                preorder(schema, child, out);
            }
        }
        let mut out = Vec::new();
        preorder(self, self.root, &mut out);
        out
    }

    /// Leaves in declaration order. Populated by [`Schema::finalize`].
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// `true` if `id` is the first declared child of a repeated parent.
    pub fn is_first_in_repetition(&self, id: NodeId) -> bool {
        self.node(id).is_first_in_repetition
    }

    /// `true` if `id` is the last declared child of a repeated parent.
    pub fn is_last_in_repetition(&self, id: NodeId) -> bool {
        self.node(id).is_last_in_repetition
    }

    /// Position of `id` in a full preorder walk of the schema (root
    /// included). Used by the assembler to tell a forward FSM step from a
    /// backward (repeating) one.
    pub fn preorder_rank(&self, id: NodeId) -> usize {
        self.node(id).preorder_rank
    }

    /// Ancestor chain from the root down to (and including) `id`.
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut rev = Vec::new();
        let mut current = Some(id);
        while let Some(c) = current {
            rev.push(c);
            current = self.node(c).parent;
        }
        rev.reverse();
        rev
    }

    /// The deepest node that is an ancestor of both `a` and `b` (the root,
    /// at worst).
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        let a_path = self.path_from_root(a);
        let b_path = self.path_from_root(b);
        let mut ancestor = self.root;
        for (x, y) in a_path.iter().zip(b_path.iter()) {
            if x == y {
                ancestor = *x;
            } else {
                break;
            }
        }
        ancestor
    }

    /// The definition level of the *shallowest* ancestor of `leaf` (or
    /// `leaf` itself) whose maximum repetition level equals `r` — the
    /// repeated node that introduced level `r`, not a deeper non-repeated
    /// descendant that merely inherits it. Used by the assembler to decide
    /// how far to unwind when a new repetition begins.
    pub fn full_definition_for_repetition_level(&self, leaf: NodeId, r: i16) -> Result<i16> {
        for node in self.path_from_root(leaf) {
            if self.node(node).max_repetition_level == r {
                return Ok(self.node(node).max_definition_level);
            }
        }
        Err(Error::Exhausted(format!(
            "repetition level {} not found among ancestors of '{}'",
            r,
            self.name(leaf)
        )))
    }

    /// A dotted path like `"Name.Language.Code"` resolved against this
    /// schema, ignoring `[*]` markers on segments. Mirrors the textual
    /// schema format accepted by [`crate::schema::parse_schema`], handy for
    /// tests and diagnostics.
    pub fn get_descriptor(&self, dotted_path: &str) -> Option<NodeId> {
        let mut current = self.root;
        for part in dotted_path.split('.') {
            let name = part.strip_suffix("[*]").unwrap_or(part);
            current = self.child(current, name)?;
        }
        Some(current)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}
