//! The mutable source tree: a text buffer plus an offset-tracked node graph.
//!
//! A tree is parsed once; the resulting tree-sitter nodes are wrapped
//! eagerly into [`SourceNode`]s and the raw parse tree is dropped. From then
//! on the wrapper graph is authoritative: `edit` splices the buffer and
//! adjusts every live node's offsets in lockstep, and structural operations
//! (attach, morph, migrate) keep parent/child links consistent with the
//! text. Mutation hooks let the registry invalidate semantic caches.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use crate::fragment::Fragment;
use crate::lang::Lang;
use crate::node::{next_node_id, NodeContent, NodeData, SourceNode};

pub type MutationHook = Rc<dyn Fn(usize, usize, isize)>;

pub(crate) struct TreeData {
    pub(crate) lang: Lang,
    pub(crate) buffer: String,
    /// All live nodes, keyed by node id. Invalidation removes entries.
    pub(crate) cache: HashMap<u64, SourceNode>,
    pub(crate) root: Option<SourceNode>,
    pub(crate) version: u64,
    pub(crate) had_errors: bool,
    pub(crate) hooks: Vec<MutationHook>,
}

/// Shared handle to a tree. Cloning is cheap.
#[derive(Clone)]
pub struct SourceTree {
    pub(crate) cell: Rc<RefCell<TreeData>>,
}

impl PartialEq for SourceTree {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for SourceTree {}

impl std::fmt::Debug for SourceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let d = self.cell.borrow();
        f.debug_struct("SourceTree")
            .field("len", &d.buffer.len())
            .field("nodes", &d.cache.len())
            .finish()
    }
}

impl SourceTree {
    /// Parse `source` and wrap the full tree.
    pub fn new(source: &str, lang: Lang) -> Self {
        let ts_tree = lang.parse(source);
        let tree = Self::bare(source.to_owned(), lang);
        let ts_root = ts_tree.root_node();
        let had_errors = ts_root.has_error();
        let root = wrap_ts(&tree, ts_root, None, None);
        {
            let mut d = tree.cell.borrow_mut();
            d.root = Some(root);
            d.had_errors = had_errors;
        }
        tree
    }

    /// A tree that holds text without parsing it; used as the destination
    /// for detached subtrees.
    pub fn holding(text: String, lang: Lang) -> Self {
        Self::bare(text, lang)
    }

    fn bare(buffer: String, lang: Lang) -> Self {
        Self {
            cell: Rc::new(RefCell::new(TreeData {
                lang,
                buffer,
                cache: HashMap::new(),
                root: None,
                version: 0,
                had_errors: false,
                hooks: Vec::new(),
            })),
        }
    }

    pub(crate) fn from_cell(cell: Rc<RefCell<TreeData>>) -> Self {
        Self { cell }
    }

    pub fn lang(&self) -> Lang {
        self.cell.borrow().lang.clone()
    }

    pub fn text(&self) -> String {
        self.cell.borrow().buffer.clone()
    }

    pub fn len(&self) -> usize {
        self.cell.borrow().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn slice(&self, range: Range<usize>) -> String {
        let d = self.cell.borrow();
        let end = range.end.min(d.buffer.len());
        let start = range.start.min(end);
        d.buffer[start..end].to_owned()
    }

    pub fn root(&self) -> Option<SourceNode> {
        self.cell.borrow().root.clone()
    }

    pub(crate) fn set_root(&self, root: Option<SourceNode>) {
        self.cell.borrow_mut().root = root;
    }

    /// Parse-time error flag (any ERROR/missing node in the original parse).
    pub fn had_errors(&self) -> bool {
        self.cell.borrow().had_errors
    }

    /// Monotonically increasing mutation counter; semantic caches compare
    /// against it instead of clearing eagerly.
    pub fn version(&self) -> u64 {
        self.cell.borrow().version
    }

    pub fn add_mutation_hook(&self, hook: MutationHook) {
        self.cell.borrow_mut().hooks.push(hook);
    }

    pub fn node_count(&self) -> usize {
        self.cell.borrow().cache.len()
    }

    pub fn cached_nodes(&self) -> Vec<SourceNode> {
        self.cell.borrow().cache.values().cloned().collect()
    }

    pub(crate) fn register(&self, node: &SourceNode) {
        self.cell.borrow_mut().cache.insert(node.id(), node.clone());
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.cell.borrow_mut().cache.remove(&id);
    }

    pub(crate) fn is_cached(&self, id: u64) -> bool {
        self.cell.borrow().cache.contains_key(&id)
    }

    /// The single mutation primitive: splice `[start, end) <- new_text`,
    /// adjust every live node's offsets, fire the mutation hooks.
    ///
    /// Offset policy for an edit `[s, e)` with length delta `delta`:
    /// - edit wholly before a node: shift the node by `delta`;
    /// - edit wholly after a node: leave it;
    /// - edit covering the node: invalidate it and its descendants (the
    ///   root is exempt and extends instead);
    /// - edit overlapping or inside the node: extend its end by `delta`.
    pub fn edit(&self, start: usize, end: usize, new_text: &str) {
        let (start, end, nodes, root_id) = {
            let mut d = self.cell.borrow_mut();
            let start = start.min(d.buffer.len());
            let end = end.clamp(start, d.buffer.len());
            d.buffer.replace_range(start..end, new_text);
            d.version += 1;
            let nodes: Vec<SourceNode> = d.cache.values().cloned().collect();
            let root_id = d.root.as_ref().map(|r| r.id());
            (start, end, nodes, root_id)
        };
        let delta = new_text.len() as isize - (end - start) as isize;

        let mut invalidated: Vec<SourceNode> = Vec::new();
        for node in &nodes {
            apply_edit_to_node(node, start, end, delta, root_id, &mut invalidated);
        }
        {
            let mut d = self.cell.borrow_mut();
            for node in &invalidated {
                d.cache.remove(&node.id());
            }
        }
        // Prune invalidated nodes from surviving parents' child lists.
        for node in &invalidated {
            if let Some(parent) = node.parent() {
                if parent.start() >= 0 {
                    if let Some(i) = parent.children().iter().position(|c| c == node) {
                        parent.remove_child_at(i);
                    }
                }
            }
        }

        let hooks = self.cell.borrow().hooks.clone();
        for hook in hooks {
            hook(start, end, delta);
        }
    }

    /// Transfer every cached node into `target`, shifting offsets so the
    /// donor's buffer reads as if inserted at `offset`. The donor cache is
    /// cleared.
    pub fn merge_into(&self, target: &SourceTree, offset: usize) {
        if self == target {
            return;
        }
        let nodes: Vec<SourceNode> = {
            let mut d = self.cell.borrow_mut();
            d.root = None;
            d.cache.drain().map(|(_, n)| n).collect()
        };
        for node in nodes {
            {
                let mut nd = node.cell.borrow_mut();
                if nd.start >= 0 {
                    nd.start += offset as isize;
                    nd.end += offset as isize;
                }
                nd.tree = Rc::downgrade(&target.cell);
            }
            target.register(&node);
        }
    }
}

fn apply_edit_to_node(
    node: &SourceNode,
    s: usize,
    e: usize,
    delta: isize,
    root_id: Option<u64>,
    invalidated: &mut Vec<SourceNode>,
) {
    let (start, end, id) = {
        let d = node.cell.borrow();
        (d.start, d.end, d.id)
    };
    if start < 0 {
        return;
    }
    let (s, e) = (s as isize, e as isize);
    if e <= start {
        let mut d = node.cell.borrow_mut();
        d.start += delta;
        d.end += delta;
    } else if end <= s {
        // wholly after the node
    } else if s <= start && end <= e {
        if root_id == Some(id) {
            node.cell.borrow_mut().end += delta;
        } else {
            invalidate_recursive(node, invalidated);
        }
    } else {
        node.cell.borrow_mut().end += delta;
    }
}

fn invalidate_recursive(node: &SourceNode, out: &mut Vec<SourceNode>) {
    {
        let mut d = node.cell.borrow_mut();
        if d.start < 0 {
            return;
        }
        d.start = -1;
        d.end = -1;
    }
    out.push(node.clone());
    for child in node.children() {
        invalidate_recursive(&child, out);
    }
}

/// Eagerly wrap a tree-sitter node and its descendants.
fn wrap_ts(
    tree: &SourceTree,
    ts: arborium_tree_sitter::Node<'_>,
    parent: Option<&SourceNode>,
    field: Option<&'static str>,
) -> SourceNode {
    let node = SourceNode::from_data(NodeData {
        id: next_node_id(),
        kind: ts.kind(),
        named: ts.is_named(),
        field_name: field,
        start: ts.start_byte() as isize,
        end: ts.end_byte() as isize,
        tree: Rc::downgrade(&tree.cell),
        parent: parent.map(|p| Rc::downgrade(&p.cell)).unwrap_or_default(),
        children: Vec::new(),
        data: HashMap::new(),
        captured_text: None,
        detach: None,
    });
    tree.register(&node);
    let mut children = Vec::with_capacity(ts.child_count());
    for i in 0..ts.child_count() {
        if let Some(child_ts) = ts.child(i as u32) {
            let child_field = ts.field_name_for_child(i as u32);
            children.push(wrap_ts(tree, child_ts, Some(&node), child_field));
        }
    }
    node.cell.borrow_mut().children = children;
    node
}

/// Move a node and its descendants into `target`, shifting offsets.
pub(crate) fn migrate_subtree(node: &SourceNode, target: &SourceTree, shift: isize) {
    let source = node.tree();
    let mut all = vec![node.clone()];
    all.extend(node.descendants());
    for n in all {
        if let Some(src) = &source {
            src.unregister(n.id());
        }
        {
            let mut d = n.cell.borrow_mut();
            if d.start >= 0 {
                d.start += shift;
                d.end += shift;
            }
            d.tree = Rc::downgrade(&target.cell);
        }
        target.register(&n);
    }
}

/// Widen a node and its ancestors so they cover `[s, e)`.
pub(crate) fn ensure_covers(node: &SourceNode, s: usize, e: usize) {
    let mut cur = Some(node.clone());
    while let Some(n) = cur {
        {
            let mut d = n.cell.borrow_mut();
            if d.start >= 0 {
                if (s as isize) < d.start {
                    d.start = s as isize;
                }
                if (e as isize) > d.end {
                    d.end = e as isize;
                }
            }
        }
        cur = n.parent();
    }
}

fn splice_into(
    tree: &SourceTree,
    parent: Option<&SourceNode>,
    index: usize,
    nodes: &[SourceNode],
    field: Option<&'static str>,
) {
    match parent {
        Some(p) => {
            for n in nodes {
                n.set_parent(Some(p));
                if nodes.len() == 1 {
                    n.set_field_name(field);
                }
            }
            p.splice_children(index, nodes);
            for n in nodes {
                if let Some(r) = n.byte_range() {
                    ensure_covers(p, r.start, r.end);
                }
            }
        }
        None => {
            if nodes.len() == 1 && tree.root().is_none() {
                tree.set_root(Some(nodes[0].clone()));
            }
        }
    }
}

/// Attach already-materialized nodes (from a holding or fragment tree) at
/// byte offset `at`, splicing them under `parent` at `index`.
pub(crate) fn attach_nodes(
    tree: &SourceTree,
    parent: Option<&SourceNode>,
    index: usize,
    at: usize,
    nodes: &[SourceNode],
    field: Option<&'static str>,
) {
    let mut cursor = at as isize;
    for n in nodes {
        let len = (n.end() - n.start()).max(0);
        if let (Some(op), Some(i)) = (n.parent(), n.index_in_parent()) {
            op.remove_child_at(i);
        }
        let shift = cursor - n.start();
        migrate_subtree(n, tree, shift);
        n.set_detach_site(None);
        cursor += len;
    }
    splice_into(tree, parent, index, nodes, field);
}

/// Attach a parsed fragment's nodes at byte offset `at`.
pub(crate) fn attach_fragment(
    tree: &SourceTree,
    parent: Option<&SourceNode>,
    index: usize,
    at: usize,
    frag: &Fragment,
    field: Option<&'static str>,
) -> Vec<SourceNode> {
    if frag.nodes.is_empty() {
        return Vec::new();
    }
    let shift = at as isize - frag.base;
    for n in &frag.nodes {
        if let (Some(op), Some(i)) = (n.parent(), n.index_in_parent()) {
            op.remove_child_at(i);
        }
        migrate_subtree(n, tree, shift);
    }
    splice_into(tree, parent, index, &frag.nodes, field);
    frag.nodes.clone()
}

/// Attach arbitrary content whose text has already been spliced into the
/// buffer at `at`. Returns the nodes that now occupy the slot (possibly
/// empty when the payload does not parse to reusable structure).
pub(crate) fn attach_content(
    tree: &SourceTree,
    parent: Option<&SourceNode>,
    index: usize,
    at: usize,
    content: &NodeContent,
    field: Option<&'static str>,
) -> Vec<SourceNode> {
    match content {
        NodeContent::Text(t) => {
            if t.is_empty() {
                return Vec::new();
            }
            let frag = crate::fragment::fragment(t, &tree.lang());
            attach_fragment(tree, parent, index, at, &frag, field)
        }
        NodeContent::Node(n) => {
            let nodes = vec![n.clone()];
            attach_nodes(tree, parent, index, at, &nodes, field);
            nodes
        }
        NodeContent::Tree(t) => {
            let nodes = top_level_nodes(t);
            attach_nodes(tree, parent, index, at, &nodes, field);
            nodes
        }
        NodeContent::List(items) => {
            let mut out = Vec::new();
            let mut cursor = at;
            let mut slot = index;
            for item in items {
                let text_len = item.to_text().len();
                let attached = attach_content(tree, parent, slot, cursor, item, None);
                slot += attached.len();
                out.extend(attached);
                cursor += text_len;
            }
            out
        }
    }
}

/// The insertable top-level nodes of a tree: a translation unit contributes
/// its children, anything else (e.g. a holding tree) its root.
pub(crate) fn top_level_nodes(tree: &SourceTree) -> Vec<SourceNode> {
    match tree.root() {
        Some(root) if root.kind() == "translation_unit" => root.children(),
        Some(root) => vec![root],
        None => Vec::new(),
    }
}

/// Morph `node` in place into the shape of `replacement` (freshly parsed
/// from text at offset `at`): same handle and id, new kind/offsets/children.
pub(crate) fn morph_node(
    node: &SourceNode,
    replacement: &SourceNode,
    at: usize,
    tree: &SourceTree,
    parent: Option<&SourceNode>,
    index: usize,
    field: Option<&'static str>,
) {
    let rep_range = replacement.byte_range().unwrap_or(0..0);
    let shift = at as isize - rep_range.start as isize;
    let rep_children = replacement.children();
    for child in &rep_children {
        migrate_subtree(child, tree, shift);
        child.set_parent(Some(node));
    }
    if let Some(rep_tree) = replacement.tree() {
        rep_tree.unregister(replacement.id());
    }
    {
        let mut d = node.cell.borrow_mut();
        let r = replacement.cell.borrow();
        d.kind = r.kind;
        d.named = r.named;
        d.start = at as isize;
        d.end = at as isize + (rep_range.end - rep_range.start) as isize;
        d.children = rep_children.clone();
        d.field_name = field;
        d.detach = None;
    }
    tree.register(node);
    if let Some(p) = parent {
        node.set_parent(Some(p));
        p.splice_children(index, std::slice::from_ref(node));
        if let Some(r) = node.byte_range() {
            ensure_covers(p, r.start, r.end);
        }
    }
}
