//! Arena-backed live device tree.

mod definition;

pub use definition::{
    AccessDefinition, ConnectionDefinition, FunctionDefinition, LabelDefinition,
    MatrixDefinition, NodeDefinition, ParameterDefinition, TupleDefinition, ValueDefinition,
};

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;
use crate::glow::{Address, Element, ElementKind, Fragment, Root, TreePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub number: Option<u32>,
    pub parent: Option<NodeId>,
    pub kind: Option<ElementKind>,
    pub children: BTreeMap<u32, NodeId>,
}

impl TreeNode {
    fn root() -> Self {
        Self {
            number: None,
            parent: None,
            kind: None,
            children: BTreeMap::new(),
        }
    }
}

/// The device tree. Slot 0 is the root, which has no number and no
/// contents. Parents are tracked as arena handles, never owned.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Option<TreeNode>>,
    free: Vec<usize>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(TreeNode::root())],
            free: Vec::new(),
        }
    }

    /// Builds a tree whose top-level elements are `elements`.
    pub fn from_elements(elements: Vec<Element>) -> Result<Self, Error> {
        let mut tree = Self::new();
        for element in elements {
            tree.add_child(tree.root(), element)?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id.0 == 0
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn kind(&self, id: NodeId) -> Option<&ElementKind> {
        self.node(id).and_then(|n| n.kind.as_ref())
    }

    pub fn kind_mut(&mut self, id: NodeId) -> Option<&mut ElementKind> {
        self.node_mut(id).and_then(|n| n.kind.as_mut())
    }

    pub fn child_by_number(&self, id: NodeId, number: u32) -> Option<NodeId> {
        self.node(id)?.children.get(&number).copied()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id)
            .into_iter()
            .flat_map(|n| n.children.values().copied())
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| !n.children.is_empty())
    }

    /// Walks the tree number by number. Any miss yields `None`.
    pub fn element_by_path(&self, path: &TreePath) -> Option<NodeId> {
        path.components()
            .iter()
            .try_fold(self.root(), |id, &number| self.child_by_number(id, number))
    }

    pub fn element_by_path_str(&self, path: &str) -> Option<NodeId> {
        let path: TreePath = path.parse().ok()?;
        self.element_by_path(&path)
    }

    /// Recomputes the path of `id` from the parent chain.
    pub fn path(&self, id: NodeId) -> TreePath {
        let mut components = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            if let Some(number) = node.number {
                components.push(number);
            }
            current = node.parent.and_then(|p| self.node(p));
        }
        components.reverse();
        TreePath::new(components)
    }

    /// Inserts `element` and its element children under `parent`.
    /// Commands inside the fragment are never stored. Nothing is inserted
    /// unless the whole fragment is valid.
    pub fn add_child(&mut self, parent: NodeId, element: Element) -> Result<NodeId, Error> {
        let Some(number) = element.number() else {
            return Err(Error::InvalidNode {
                path: self.path(parent).to_string(),
                reason: "qualified element cannot be inserted as a child",
            });
        };
        let Some(parent_node) = self.node(parent) else {
            return Err(Error::UnknownElement(format!("{:?}", parent)));
        };
        let path = self.path(parent).child(number);
        if parent_node.children.contains_key(&number) {
            return Err(Error::InvalidNode {
                path: path.to_string(),
                reason: "duplicate element number",
            });
        }
        check_children(&path, &element)?;
        Ok(self.insert_subtree(parent, number, element))
    }

    fn insert_subtree(&mut self, parent: NodeId, number: u32, element: Element) -> NodeId {
        let id = self.insert(number, parent, element.kind);
        for child in element.children.unwrap_or_default() {
            if let Fragment::Element(child) = child {
                if let Some(child_number) = child.number() {
                    self.insert_subtree(id, child_number, child);
                }
            }
        }
        id
    }

    fn insert(&mut self, number: u32, parent: NodeId, kind: ElementKind) -> NodeId {
        let node = TreeNode {
            number: Some(number),
            parent: Some(parent),
            kind: Some(kind),
            children: BTreeMap::new(),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.insert(number, id);
        }
        id
    }

    fn release(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        for child in node.children.into_values() {
            self.release(child);
        }
        self.free.push(id.0);
    }

    /// Splices `element` into the tree at `path`, replacing whatever is
    /// there. The new element keeps the number of the one it replaces.
    pub fn replace(&mut self, path: &TreePath, element: Element) -> Result<NodeId, Error> {
        let existing = self
            .element_by_path(path)
            .ok_or_else(|| Error::unknown(path))?;
        let Some(parent) = self.node(existing).and_then(|n| n.parent) else {
            return Err(Error::InvalidNode {
                path: path.to_string(),
                reason: "no parent, cannot replace",
            });
        };
        let number = path.last().unwrap_or_default();
        check_children(path, &element)?;

        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.remove(&number);
        }
        self.release(existing);
        Ok(self.insert_subtree(parent, number, element))
    }

    fn entry(&self, id: NodeId) -> Option<(u32, &ElementKind)> {
        let node = self.node(id)?;
        Some((node.number?, node.kind.as_ref()?))
    }

    /// Number and kind only, no contents.
    pub fn minimal(&self, id: NodeId) -> Option<Element> {
        let (number, kind) = self.entry(id)?;
        Some(Element::new(Address::Number(number), kind.stripped()))
    }

    /// Number and contents, without children or matrix routing state.
    pub fn minimal_content(&self, id: NodeId) -> Option<Element> {
        let (number, kind) = self.entry(id)?;
        Some(Element::new(Address::Number(number), kind.contents_only()))
    }

    /// Detached copy of the element itself, without children.
    pub fn duplicate(&self, id: NodeId) -> Option<Element> {
        let (number, kind) = self.entry(id)?;
        Some(Element::new(Address::Number(number), kind.clone()))
    }

    pub fn to_qualified(&self, id: NodeId) -> Option<Element> {
        let (_, kind) = self.entry(id)?;
        Some(Element::new(Address::Path(self.path(id)), kind.clone()))
    }

    /// Wraps `leaf`, standing in for `id`, in the minimal chain of its
    /// ancestors so it can be sent hierarchically.
    pub fn tree_branch(&self, id: NodeId, leaf: Element) -> Root {
        let mut current = leaf;
        let mut parent = self.node(id).and_then(|n| n.parent);
        while let Some(ancestor) = parent {
            if let Some(wrapper) = self.minimal(ancestor) {
                current = wrapper.with_children(vec![current.into()]);
            }
            parent = self.node(ancestor).and_then(|n| n.parent);
        }
        Root::single(current)
    }

    /// Hierarchical directory response: the element with its contents
    /// and a copy of each direct child.
    pub fn response(&self, id: NodeId) -> Root {
        if self.is_root(id) {
            return self.root_directory();
        }
        let Some(mut element) = self.duplicate(id) else {
            return Root::default();
        };
        for child in self.children(id) {
            if let Some(dup) = self.duplicate(child) {
                element.add_child(dup);
            }
        }
        self.tree_branch(id, element)
    }

    /// Qualified directory response: each child as a qualified element
    /// with its contents, or the element itself when it has no children.
    pub fn qualified_response(&self, id: NodeId) -> Root {
        if self.has_children(id) {
            let children = self
                .children(id)
                .filter_map(|child| {
                    let (_, kind) = self.entry(child)?;
                    Some(Element::new(Address::Path(self.path(child)), kind.contents_only()).into())
                })
                .collect();
            return Root::new(children);
        }
        match self.to_qualified(id) {
            Some(element) => Root::single(element),
            None => Root::default(),
        }
    }

    pub fn root_directory(&self) -> Root {
        Root::new(
            self.children(self.root())
                .filter_map(|id| self.duplicate(id).map(Fragment::from))
                .collect(),
        )
    }

    /// Top-level elements without contents. Sent back when a request
    /// cannot be served.
    pub fn minimal_snapshot(&self) -> Root {
        Root::new(
            self.children(self.root())
                .filter_map(|id| self.minimal(id).map(Fragment::from))
                .collect(),
        )
    }
}

/// Checks that every element below `element` is numbered and unique
/// among its siblings.
fn check_children(path: &TreePath, element: &Element) -> Result<(), Error> {
    let mut seen = BTreeSet::new();
    for child in element.children() {
        let Fragment::Element(child) = child else {
            continue;
        };
        let Some(number) = child.number() else {
            return Err(Error::InvalidNode {
                path: path.to_string(),
                reason: "qualified element cannot be inserted as a child",
            });
        };
        let child_path = path.child(number);
        if !seen.insert(number) {
            return Err(Error::InvalidNode {
                path: child_path.to_string(),
                reason: "duplicate element number",
            });
        }
        check_children(&child_path, child)?;
    }
    Ok(())
}
