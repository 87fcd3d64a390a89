//! Source nodes: offset-tracked wrappers over the parsed syntax tree.
//!
//! A `SourceNode` is a shared handle whose identity survives edits and
//! identity morphs. Offsets index the owning tree's buffer; a start of `-1`
//! marks an invalidated node. Mutating operations (`replace_with`,
//! `insert_before`, `remove`, ...) go through the owning tree's single edit
//! primitive and then re-attach structure on top of the spliced text.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fragment::{self, Fragment};
use crate::tree::{self, SourceTree, TreeData};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Node kinds that carry a symbol spelling.
pub fn is_identifier_kind(kind: &str) -> bool {
    matches!(
        kind,
        "identifier" | "type_identifier" | "field_identifier" | "statement_identifier"
    )
}

/// Saved re-attachment site for a removed node.
#[derive(Clone)]
pub(crate) struct DetachSite {
    pub(crate) parent: Weak<RefCell<NodeData>>,
    pub(crate) index: usize,
}

pub(crate) struct NodeData {
    pub(crate) id: u64,
    pub(crate) kind: &'static str,
    pub(crate) named: bool,
    pub(crate) field_name: Option<&'static str>,
    /// Byte offsets into the owning tree's buffer; `start == -1` marks an
    /// invalidated node.
    pub(crate) start: isize,
    pub(crate) end: isize,
    pub(crate) tree: Weak<RefCell<TreeData>>,
    pub(crate) parent: Weak<RefCell<NodeData>>,
    pub(crate) children: Vec<SourceNode>,
    pub(crate) data: HashMap<String, String>,
    /// Original spelling preserved across renames, used for symbol
    /// resolution.
    pub(crate) captured_text: Option<String>,
    pub(crate) detach: Option<DetachSite>,
}

/// Shared handle to a node. Cloning is cheap; equality is identity.
#[derive(Clone)]
pub struct SourceNode {
    pub(crate) cell: Rc<RefCell<NodeData>>,
}

impl PartialEq for SourceNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for SourceNode {}

impl std::fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.cell.borrow();
        write!(f, "({} [{}, {}) {:?})", d.kind, d.start, d.end, self.text())
    }
}

impl SourceNode {
    pub(crate) fn from_data(data: NodeData) -> Self {
        Self {
            cell: Rc::new(RefCell::new(data)),
        }
    }

    /// Stable identity; survives edits and identity morphs.
    pub fn id(&self) -> u64 {
        self.cell.borrow().id
    }

    pub fn kind(&self) -> &'static str {
        self.cell.borrow().kind
    }

    pub fn is_named(&self) -> bool {
        self.cell.borrow().named
    }

    pub fn field_name(&self) -> Option<&'static str> {
        self.cell.borrow().field_name
    }

    pub fn start(&self) -> isize {
        self.cell.borrow().start
    }

    pub fn end(&self) -> isize {
        self.cell.borrow().end
    }

    pub fn byte_range(&self) -> Option<Range<usize>> {
        let d = self.cell.borrow();
        if d.start < 0 || d.end < d.start {
            return None;
        }
        Some(d.start as usize..d.end as usize)
    }

    pub fn tree(&self) -> Option<SourceTree> {
        self.cell.borrow().tree.upgrade().map(SourceTree::from_cell)
    }

    /// A node is valid while it has non-negative offsets and is registered
    /// in its owning tree's node cache.
    pub fn is_valid(&self) -> bool {
        let (start, id) = {
            let d = self.cell.borrow();
            (d.start, d.id)
        };
        if start < 0 {
            return false;
        }
        match self.tree() {
            Some(tree) => tree.is_cached(id),
            None => false,
        }
    }

    /// Current text: the buffer slice for valid nodes, empty otherwise.
    pub fn text(&self) -> String {
        let Some(range) = self.byte_range() else {
            return String::new();
        };
        let Some(tree) = self.tree() else {
            return String::new();
        };
        tree.slice(range)
    }

    /// The original spelling when one was captured, else the current text.
    pub fn searchable_text(&self) -> String {
        if let Some(t) = self.cell.borrow().captured_text.clone() {
            return t;
        }
        self.text()
    }

    pub fn captured_text(&self) -> Option<String> {
        self.cell.borrow().captured_text.clone()
    }

    /// Snapshot the spelling of every identifier in this subtree (self
    /// included) that has no capture yet.
    pub fn capture_identifiers(&self) {
        snapshot_captures(self);
    }

    /// Snapshot the current spelling unless one is already captured.
    pub fn capture_text(&self) {
        let text = self.text();
        let mut d = self.cell.borrow_mut();
        if d.captured_text.is_none() {
            d.captured_text = Some(text);
        }
    }

    pub(crate) fn set_captured_text(&self, text: Option<String>) {
        self.cell.borrow_mut().captured_text = text;
    }

    pub fn data_get(&self, key: &str) -> Option<String> {
        self.cell.borrow().data.get(key).cloned()
    }

    pub fn data_set(&self, key: &str, value: impl Into<String>) {
        self.cell.borrow_mut().data.insert(key.to_owned(), value.into());
    }

    pub(crate) fn data_clone(&self) -> HashMap<String, String> {
        self.cell.borrow().data.clone()
    }

    pub(crate) fn data_replace(&self, data: HashMap<String, String>) {
        self.cell.borrow_mut().data = data;
    }

    pub fn parent(&self) -> Option<SourceNode> {
        self.cell
            .borrow()
            .parent
            .upgrade()
            .map(|cell| SourceNode { cell })
    }

    pub fn children(&self) -> Vec<SourceNode> {
        self.cell.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.cell.borrow().children.len()
    }

    pub fn child(&self, index: usize) -> Option<SourceNode> {
        self.cell.borrow().children.get(index).cloned()
    }

    pub fn named_children(&self) -> Vec<SourceNode> {
        self.cell
            .borrow()
            .children
            .iter()
            .filter(|c| c.is_named())
            .cloned()
            .collect()
    }

    pub fn named_child(&self, index: usize) -> Option<SourceNode> {
        self.named_children().into_iter().nth(index)
    }

    pub fn child_by_field(&self, field: &str) -> Option<SourceNode> {
        self.cell
            .borrow()
            .children
            .iter()
            .find(|c| c.field_name() == Some(field))
            .cloned()
    }

    pub fn index_in_parent(&self) -> Option<usize> {
        let parent = self.parent()?;
        parent.children().iter().position(|c| c == self)
    }

    pub fn next_sibling(&self) -> Option<SourceNode> {
        let parent = self.parent()?;
        let index = self.index_in_parent()?;
        parent.child(index + 1)
    }

    pub fn prev_sibling(&self) -> Option<SourceNode> {
        let parent = self.parent()?;
        let index = self.index_in_parent()?;
        if index == 0 {
            return None;
        }
        parent.child(index - 1)
    }

    pub fn next_named_sibling(&self) -> Option<SourceNode> {
        let parent = self.parent()?;
        let index = self.index_in_parent()?;
        parent
            .children()
            .into_iter()
            .skip(index + 1)
            .find(|c| c.is_named())
    }

    /// Walk ancestors (excluding self).
    pub fn ancestors(&self) -> Vec<SourceNode> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(node) = cur {
            cur = node.parent();
            out.push(node);
        }
        out
    }

    pub fn is_ancestor_of(&self, other: &SourceNode) -> bool {
        let mut cur = other.parent();
        while let Some(node) = cur {
            if &node == self {
                return true;
            }
            cur = node.parent();
        }
        false
    }

    /// Depth-first pre-order descendants, excluding self. Invalidated
    /// children are skipped.
    pub fn descendants(&self) -> Vec<SourceNode> {
        let mut out = Vec::new();
        let mut stack: Vec<SourceNode> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.start() < 0 {
                continue;
            }
            let children = node.children();
            out.push(node);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Depth-first collection of descendants of the given kind.
    pub fn find_kind(&self, kind: &str) -> Vec<SourceNode> {
        self.descendants()
            .into_iter()
            .filter(|n| n.kind() == kind)
            .collect()
    }

    /// Depth-first collection of descendants matching a predicate.
    pub fn find_where(&self, pred: impl Fn(&SourceNode) -> bool) -> Vec<SourceNode> {
        self.descendants().into_iter().filter(|n| pred(n)).collect()
    }

    /// Iterative smallest-enclosing descent for a byte range.
    pub fn descendant_for_range(&self, start: usize, end: usize) -> Option<SourceNode> {
        let range = self.byte_range()?;
        if !(range.start <= start && end <= range.end) {
            return None;
        }
        let mut current = self.clone();
        'descend: loop {
            for child in current.children() {
                if let Some(r) = child.byte_range() {
                    if r.start <= start && end <= r.end {
                        current = child;
                        continue 'descend;
                    }
                }
            }
            return Some(current);
        }
    }

    pub(crate) fn detach_site(&self) -> Option<DetachSite> {
        self.cell.borrow().detach.clone()
    }

    pub(crate) fn set_detach_site(&self, site: Option<DetachSite>) {
        self.cell.borrow_mut().detach = site;
    }

    pub(crate) fn set_parent(&self, parent: Option<&SourceNode>) {
        self.cell.borrow_mut().parent = match parent {
            Some(p) => Rc::downgrade(&p.cell),
            None => Weak::new(),
        };
    }

    pub(crate) fn set_field_name(&self, field: Option<&'static str>) {
        self.cell.borrow_mut().field_name = field;
    }

    pub(crate) fn splice_children(&self, index: usize, nodes: &[SourceNode]) {
        let mut d = self.cell.borrow_mut();
        let index = index.min(d.children.len());
        for (offset, node) in nodes.iter().enumerate() {
            d.children.insert(index + offset, node.clone());
        }
        d.children.sort_by_key(|c| c.start());
    }

    pub(crate) fn remove_child_at(&self, index: usize) {
        let mut d = self.cell.borrow_mut();
        if index < d.children.len() {
            d.children.remove(index);
        }
    }

    // ----- mutation surface -------------------------------------------------

    /// Replace this node with new content.
    ///
    /// Returns the nodes now occupying the replaced slot. With
    /// `morph_identity` and textual content that parses to a single node,
    /// `self` is morphed in place and returned, so existing references to the
    /// node stay usable.
    pub fn replace_with(&self, content: impl Into<NodeContent>, morph_identity: bool) -> Vec<SourceNode> {
        let content = content.into();
        if let Some(site) = self.detach_site() {
            return self.reattach_at(site, content);
        }
        let Some(tree) = self.tree() else {
            return Vec::new();
        };
        let Some(range) = self.byte_range() else {
            return Vec::new();
        };
        let parent = self.parent();
        let index = self.index_in_parent().unwrap_or(0);
        let field = self.field_name();
        let text = content.to_text();

        // Preserve original spellings so rename hygiene survives the splice.
        snapshot_captures(self);
        let old_children = self.children();

        tree.edit(range.start, range.end, &text);

        let morphable = morph_identity && matches!(content, NodeContent::Text(_));
        if morphable {
            let frag = fragment::fragment(&text, &tree.lang());
            if frag.nodes.len() == 1 {
                let replacement = frag.nodes[0].clone();
                // Account for leading trivia in the payload: the node lands
                // where its text begins, not where the splice begins.
                let at = (range.start as isize + replacement.start() - frag.base).max(0) as usize;
                tree::morph_node(self, &replacement, at, &tree, parent.as_ref(), index, field);
                transfer_captures(&old_children, self);
                return vec![self.clone()];
            }
            // Fall back to a plain structural attach of the same fragment.
            let attached =
                tree::attach_fragment(&tree, parent.as_ref(), index, range.start, &frag, field);
            return attached;
        }

        tree::attach_content(&tree, parent.as_ref(), index, range.start, &content, field)
    }

    /// Insert content before this node (zero-length splice at `start`).
    pub fn insert_before(&self, content: impl Into<NodeContent>) -> Vec<SourceNode> {
        let content = content.into();
        let Some(tree) = self.tree() else {
            return Vec::new();
        };
        let Some(range) = self.byte_range() else {
            return Vec::new();
        };
        let parent = self.parent();
        let index = self.index_in_parent().unwrap_or(0);
        let text = content.to_text();
        tree.edit(range.start, range.start, &text);
        tree::attach_content(&tree, parent.as_ref(), index, range.start, &content, None)
    }

    /// Insert content after this node (zero-length splice at `end`).
    pub fn insert_after(&self, content: impl Into<NodeContent>) -> Vec<SourceNode> {
        let content = content.into();
        let Some(tree) = self.tree() else {
            return Vec::new();
        };
        let Some(range) = self.byte_range() else {
            return Vec::new();
        };
        let parent = self.parent();
        let index = self.index_in_parent().map(|i| i + 1).unwrap_or(0);
        let text = content.to_text();
        tree.edit(range.end, range.end, &text);
        tree::attach_content(&tree, parent.as_ref(), index, range.end, &content, None)
    }

    /// Insert content as the `index`-th child (counting named and
    /// punctuation children alike).
    pub fn insert_at(&self, index: usize, content: impl Into<NodeContent>) -> Vec<SourceNode> {
        let content = content.into();
        let Some(tree) = self.tree() else {
            return Vec::new();
        };
        let children = self.children();
        let pos = if index < children.len() {
            match children[index].byte_range() {
                Some(r) => r.start,
                None => return Vec::new(),
            }
        } else {
            match self.byte_range() {
                Some(r) => r.end,
                None => return Vec::new(),
            }
        };
        let text = content.to_text();
        tree.edit(pos, pos, &text);
        tree::attach_content(&tree, Some(self), index, pos, &content, None)
    }

    /// Detach this node into a fresh holding tree and erase its source
    /// range. The returned tree owns the detached subtree; the saved parent
    /// and index permit later re-attachment.
    pub fn remove(&self) -> SourceTree {
        let Some(tree) = self.tree() else {
            return SourceTree::holding(String::new(), crate::lang::c());
        };
        let lang = tree.lang();
        let Some(range) = self.byte_range() else {
            return SourceTree::holding(String::new(), lang);
        };
        let text = tree.slice(range.clone());
        snapshot_captures(self);

        let parent = self.parent();
        let index = self.index_in_parent();
        if let (Some(p), Some(i)) = (&parent, index) {
            p.remove_child_at(i);
            self.set_detach_site(Some(DetachSite {
                parent: Rc::downgrade(&p.cell),
                index: i,
            }));
        }
        self.set_parent(None);

        let holding = SourceTree::holding(text, lang);
        tree::migrate_subtree(self, &holding, -(range.start as isize));
        holding.set_root(Some(self.clone()));

        tree.edit(range.start, range.end, "");
        holding
    }

    /// Re-parse this node's text into a fresh tree, propagating a copy of
    /// the `data` map to every node. Used when a macro needs referential
    /// uniqueness for a subtree.
    pub fn clone_subtree(&self) -> Fragment {
        let lang = self
            .tree()
            .map(|t| t.lang())
            .unwrap_or_else(crate::lang::c);
        let frag = fragment::fragment(&self.text(), &lang);
        let data = self.data_clone();
        if let Some(root) = frag.tree.root() {
            root.data_replace(data.clone());
            for node in root.descendants() {
                node.data_replace(data.clone());
            }
        }
        frag
    }

    fn reattach_at(&self, site: DetachSite, content: NodeContent) -> Vec<SourceNode> {
        let Some(parent_cell) = site.parent.upgrade() else {
            return Vec::new();
        };
        let parent = SourceNode { cell: parent_cell };
        if !parent.is_valid() {
            return Vec::new();
        }
        let Some(tree) = parent.tree() else {
            return Vec::new();
        };
        let children = parent.children();
        let pos = if site.index < children.len() {
            match children[site.index].byte_range() {
                Some(r) => r.start,
                None => return Vec::new(),
            }
        } else {
            match parent.byte_range() {
                Some(r) => r.end,
                None => return Vec::new(),
            }
        };
        let text = content.to_text();
        tree.edit(pos, pos, &text);
        self.set_detach_site(None);
        tree::attach_content(&tree, Some(&parent), site.index, pos, &content, None)
    }
}

/// Capture the current spelling of every identifier in a subtree (including
/// the node itself) that has no capture yet.
pub(crate) fn snapshot_captures(node: &SourceNode) {
    if is_identifier_kind(node.kind()) {
        node.capture_text();
    }
    for descendant in node.descendants() {
        if is_identifier_kind(descendant.kind()) {
            descendant.capture_text();
        }
    }
}

/// Transfer captured spellings from the pre-replacement children to the
/// morphed node: single identifiers map to single identifiers; otherwise
/// children pair up by shared field-name and kind.
pub(crate) fn transfer_captures(old_children: &[SourceNode], new_node: &SourceNode) {
    let old_idents: Vec<&SourceNode> = old_children
        .iter()
        .filter(|n| is_identifier_kind(n.kind()))
        .collect();
    let new_children = new_node.children();
    let new_idents: Vec<&SourceNode> = new_children
        .iter()
        .filter(|n| is_identifier_kind(n.kind()))
        .collect();
    if old_idents.len() == 1 && new_idents.len() == 1 {
        if new_idents[0].captured_text().is_none() {
            new_idents[0].set_captured_text(old_idents[0].captured_text());
        }
    }
    for new_child in &new_children {
        let matched = old_children.iter().find(|old| {
            old.kind() == new_child.kind() && old.field_name() == new_child.field_name()
        });
        if let Some(old_child) = matched {
            if is_identifier_kind(new_child.kind()) && new_child.captured_text().is_none() {
                new_child.set_captured_text(old_child.captured_text());
            }
            transfer_captures(&old_child.children(), new_child);
        }
    }
}

/// Payload for node mutations: text, an existing node, a list, or a whole
/// tree.
pub enum NodeContent {
    Text(String),
    Node(SourceNode),
    List(Vec<NodeContent>),
    Tree(SourceTree),
}

impl NodeContent {
    pub fn to_text(&self) -> String {
        match self {
            NodeContent::Text(t) => t.clone(),
            NodeContent::Node(n) => n.text(),
            NodeContent::List(items) => items.iter().map(|i| i.to_text()).collect(),
            NodeContent::Tree(t) => t.text(),
        }
    }
}

impl From<&str> for NodeContent {
    fn from(value: &str) -> Self {
        NodeContent::Text(value.to_owned())
    }
}

impl From<String> for NodeContent {
    fn from(value: String) -> Self {
        NodeContent::Text(value)
    }
}

impl From<SourceNode> for NodeContent {
    fn from(value: SourceNode) -> Self {
        NodeContent::Node(value)
    }
}

impl From<SourceTree> for NodeContent {
    fn from(value: SourceTree) -> Self {
        NodeContent::Tree(value)
    }
}

impl From<Vec<NodeContent>> for NodeContent {
    fn from(value: Vec<NodeContent>) -> Self {
        NodeContent::List(value)
    }
}
