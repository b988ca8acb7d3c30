/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The diff tree: an arena of nodes addressed by stable integer handles, so relation
//! edges and parent back-pointers survive reparenting without borrow-checker fights.

use std::collections::BTreeMap;

use crate::error::{Result, SendStreamError};
use crate::pathname;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

pub const ROOT: NodeId = NodeId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Unknown,
    File,
    Dir,
    Fifo,
    Sock,
    Symlink,
    Node,
}

/// Stored on a node, the verdict this snapshot assigns it. Ordinal is part of the
/// JSON wire contract: do not reorder these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationState {
    Unspecified = 0,
    Ignored = 1,
    Created = 2,
    Modified = 3,
    Deleted = 4,
    Renamed = 5,
    End = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationReason {
    RenameSrc,
    RenameDest,
    LinkDest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub target: NodeId,
    pub reason: RelationReason,
}

/// A structured, not-yet-stringified mutation recorded against a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Write { offset: u64, length: u64 },
    Truncate { size: u64 },
    Utime { atime: String, mtime: String, ctime: String },
    Chmod { mode: u64 },
    Chown { uid: u64, gid: u64 },
    SetXattr { name: String, data: String },
    RemoveXattr { name: String },
}

impl Change {
    pub fn render(&self) -> String {
        match self {
            Change::Write { offset, length } => {
                format!("write:offset={}:data_len={}", offset, length)
            }
            Change::Truncate { size } => format!("truncate:size={}", size),
            Change::Utime { atime, mtime, ctime } => {
                format!("utime:atime={},mtime={},ctime={}", atime, mtime, ctime)
            }
            Change::Chmod { mode } => format!("chmod:mode={:o}", mode),
            Change::Chown { uid, gid } => format!("chown:uid={},gid={}", uid, gid),
            Change::SetXattr { name, data } => format!("set_xattr:name={},data={}", name, data),
            Change::RemoveXattr { name } => format!("remove_xattr:name={}", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffNode {
    pub kind: NodeKind,
    pub name: String,
    pub state: OperationState,
    pub parent: Option<NodeId>,
    pub children: BTreeMap<String, NodeId>,
    pub relations: Vec<Relation>,
    pub changes: Vec<Change>,
    pub deleted_in_snapshot: bool,
    pub last_write_end: Option<u64>,
}

impl DiffNode {
    fn new(name: String, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            name,
            state: OperationState::Unspecified,
            parent,
            children: BTreeMap::new(),
            relations: Vec::new(),
            changes: Vec::new(),
            deleted_in_snapshot: false,
            last_write_end: None,
        }
    }
}

/// Arena-backed tree of [`DiffNode`]s. Every node but the root is reachable from
/// exactly one parent's `children` map; relation edges are non-owning cross-references
/// that survive a node being detached or deleted.
pub struct DiffTree {
    nodes: Vec<DiffNode>,
}

impl DiffTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![DiffNode::new(String::new(), NodeKind::Dir, None)],
        }
    }

    fn alloc(&mut self, name: String, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        self.nodes.push(DiffNode::new(name, kind, parent));
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &DiffNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DiffNode {
        &mut self.nodes[id.0]
    }

    pub fn chain_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.node(cur).parent {
            segments.push(self.node(cur).name.clone());
            cur = parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Walks `path` from the root, returning the node at the end, or `None` if any
    /// component along the way is missing.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut cur = ROOT;
        for segment in pathname::segments(path) {
            cur = *self.node(cur).children.get(segment)?;
        }
        Some(cur)
    }

    /// Ensures every directory along `path` exists, synthesizing missing ones as
    /// `Unknown`/`Dir` with `Unspecified` state. The terminal component's existing
    /// state is left untouched unless `new_created` requests `Created`; a freshly
    /// synthesized terminal gets `Created` only when `new_created` is set, otherwise
    /// `Unspecified`. `old_created` currently only documents intent (see callers);
    /// the terminal's prior state is never downgraded by this call.
    pub fn mkdirp(&mut self, path: &str, new_created: bool) -> NodeId {
        let mut cur = ROOT;
        let segments: Vec<&str> = pathname::segments(path).collect();
        for (i, segment) in segments.iter().enumerate() {
            if let Some(&child) = self.node(cur).children.get(*segment) {
                cur = child;
                continue;
            }
            let id = self.alloc(segment.to_string(), NodeKind::Dir, Some(cur));
            if i == segments.len() - 1 && new_created {
                self.node_mut(id).state = OperationState::Created;
            }
            self.node_mut(cur).children.insert(segment.to_string(), id);
            cur = id;
        }
        cur
    }

    /// Creates a fresh, unattached node. Callers attach it with [`Self::add_node`].
    pub fn new_node(&mut self, name: String, kind: NodeKind) -> NodeId {
        self.alloc(name, kind, None)
    }

    pub fn is_temporary_node(&self, id: NodeId) -> bool {
        match self.node(id).parent {
            Some(parent) if parent == ROOT => pathname::is_placeholder_name(&self.node(id).name),
            _ => false,
        }
    }

    pub fn remove_from_parent(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            let name = self.node(id).name.clone();
            self.node_mut(parent).children.remove(&name);
            self.node_mut(id).parent = None;
        }
    }

    /// Attaches `id` under `parent`, following the addNode rules: promotes an
    /// `Unknown` parent to `Dir`, allows replacing an existing deleted child
    /// (merging its relations/children into the incoming node), and refuses to
    /// clobber a live child.
    pub fn add_node(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        self.remove_from_parent(id);
        if self.node(parent).kind == NodeKind::Unknown {
            self.node_mut(parent).kind = NodeKind::Dir;
        }
        let name = self.node(id).name.clone();
        if let Some(&existing) = self.node(parent).children.get(&name) {
            if self.node(existing).state != OperationState::Deleted {
                let parent_path = self.chain_path(parent);
                return Err(SendStreamError::DuplicateChild(name, parent_path));
            }
            let mut existing_relations = std::mem::take(&mut self.node_mut(existing).relations);
            let mut existing_children = std::mem::take(&mut self.node_mut(existing).children);
            self.node_mut(id).relations.append(&mut existing_relations);
            for (child_name, child_id) in existing_children.drain() {
                self.node_mut(child_id).parent = Some(id);
                self.node_mut(id).children.insert(child_name, child_id);
            }
            self.node_mut(id).deleted_in_snapshot = true;
            self.node_mut(existing).parent = None;
        }
        self.node_mut(id).parent = Some(parent);
        self.node_mut(parent).children.insert(name, id);
        Ok(())
    }

    /// Looks up an existing node at `path`, or synthesizes one of `fallback_kind`
    /// under its (possibly synthesized) parent.
    pub fn lookup_or_synthesize(&mut self, path: &str, fallback_kind: NodeKind) -> NodeId {
        if let Some(id) = self.lookup(path) {
            return id;
        }
        let (parent_path, name) = pathname::split(path);
        let parent = self.mkdirp(parent_path, false);
        let id = self.alloc(name.to_string(), fallback_kind, Some(parent));
        self.node_mut(parent)
            .children
            .insert(name.to_string(), id);
        id
    }

    /// Follows a chain of `RenameSrc` relations starting from `id`'s relations list
    /// until it reaches a node that is not itself a temporary placeholder. Used to
    /// retarget deletes that arrive against an already-renamed-away parent.
    pub fn resolve_rename_anchor(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self
            .node(id)
            .relations
            .iter()
            .find(|r| r.reason == RelationReason::RenameSrc)
            .map(|r| r.target)?;
        while self.is_temporary_node(cur) {
            cur = self
                .node(cur)
                .relations
                .iter()
                .find(|r| r.reason == RelationReason::RenameSrc)
                .map(|r| r.target)?;
        }
        Some(cur)
    }

    /// Marks `path` (synthesizing it first if absent) as deleted, applying the
    /// placeholder-reparenting rule for deletes under a renamed-away temporary parent.
    /// Fails with `MissingChild` if that parent is a temporary placeholder whose
    /// rename chain doesn't resolve to a real anchor — a malformed stream.
    pub fn delete_node(&mut self, path: &str, rmdir: bool) -> Result<NodeId> {
        let fallback_kind = if rmdir { NodeKind::Dir } else { NodeKind::Unknown };
        let id = self.lookup_or_synthesize(path, fallback_kind);
        self.node_mut(id).state = OperationState::Deleted;
        self.node_mut(id).deleted_in_snapshot = true;
        if rmdir && self.node(id).kind == NodeKind::Unknown {
            self.node_mut(id).kind = NodeKind::Dir;
        }

        let parent = match self.node(id).parent {
            Some(p) => p,
            None => return Ok(id),
        };
        if !self.is_temporary_node(parent) {
            return Ok(id);
        }
        let anchor = match self.resolve_rename_anchor(parent) {
            Some(a) => a,
            None => return Err(SendStreamError::MissingChild(path.to_string())),
        };
        let name = self.node(id).name.clone();
        if let Some(&existing) = self.node(anchor).children.get(&name) {
            self.node_mut(existing).deleted_in_snapshot = true;
            if rmdir {
                self.node_mut(existing).kind = NodeKind::Dir;
            }
            self.remove_from_parent(id);
            return Ok(existing);
        }
        self.remove_from_parent(id);
        self.add_node(id, anchor)?;
        Ok(id)
    }

    /// Appends `change`, coalescing an adjacent write/update-extent into the
    /// previous one when the offsets are contiguous.
    pub fn append_write(&mut self, id: NodeId, offset: u64, length: u64) {
        let node = self.node_mut(id);
        if let (Some(Change::Write { offset: prev_offset, length: prev_len }), Some(last_end)) =
            (node.changes.last().cloned(), node.last_write_end)
        {
            if last_end == offset {
                let merged = Change::Write {
                    offset: prev_offset,
                    length: prev_len + length,
                };
                *node.changes.last_mut().unwrap() = merged;
                node.last_write_end = Some(offset + length);
                return;
            }
        }
        node.changes.push(Change::Write { offset, length });
        node.last_write_end = Some(offset + length);
    }
}

impl Default for DiffTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdirp_synthesizes_missing_intermediates() {
        let mut tree = DiffTree::new();
        let id = tree.mkdirp("a/b/c", true);
        assert_eq!(tree.chain_path(id), "a/b/c");
        assert_eq!(tree.node(id).state, OperationState::Created);
        let b = tree.lookup("a/b").unwrap();
        assert_eq!(tree.node(b).state, OperationState::Unspecified);
    }

    #[test]
    fn add_node_refuses_to_clobber_live_child() {
        let mut tree = DiffTree::new();
        let parent = tree.mkdirp("dir", false);
        let a = tree.new_node("leaf".to_string(), NodeKind::File);
        tree.add_node(a, parent).unwrap();
        let b = tree.new_node("leaf".to_string(), NodeKind::File);
        assert!(matches!(
            tree.add_node(b, parent).unwrap_err(),
            SendStreamError::DuplicateChild(..)
        ));
    }

    #[test]
    fn add_node_replaces_deleted_child_and_merges_children() {
        let mut tree = DiffTree::new();
        let parent = tree.mkdirp("dir", false);
        let old = tree.new_node("leaf".to_string(), NodeKind::Dir);
        tree.add_node(old, parent).unwrap();
        let grandchild = tree.new_node("inner".to_string(), NodeKind::File);
        tree.add_node(grandchild, old).unwrap();
        tree.node_mut(old).state = OperationState::Deleted;

        let new = tree.new_node("leaf".to_string(), NodeKind::Dir);
        tree.add_node(new, parent).unwrap();
        assert!(tree.node(new).deleted_in_snapshot);
        assert!(tree.node(new).children.contains_key("inner"));
    }

    #[test]
    fn append_write_coalesces_contiguous_writes() {
        let mut tree = DiffTree::new();
        let id = tree.mkdirp("f", false);
        tree.append_write(id, 0, 10);
        tree.append_write(id, 10, 5);
        assert_eq!(tree.node(id).changes.len(), 1);
        assert_eq!(
            tree.node(id).changes[0],
            Change::Write { offset: 0, length: 15 }
        );
    }

    #[test]
    fn append_write_does_not_coalesce_non_adjacent_writes() {
        let mut tree = DiffTree::new();
        let id = tree.mkdirp("f", false);
        tree.append_write(id, 0, 10);
        tree.append_write(id, 20, 5);
        assert_eq!(tree.node(id).changes.len(), 2);
    }

    #[test]
    fn delete_reparents_under_rename_anchor() {
        let mut tree = DiffTree::new();
        let anchor = tree.mkdirp("real_dir", false);
        let placeholder = tree.mkdirp("o1-2-3", false);
        tree.node_mut(placeholder).relations.push(Relation {
            target: anchor,
            reason: RelationReason::RenameSrc,
        });
        let id = tree.delete_node("o1-2-3/file", false).unwrap();
        assert_eq!(tree.chain_path(id), "real_dir/file");
    }

    #[test]
    fn delete_under_unresolved_placeholder_is_missing_child() {
        let mut tree = DiffTree::new();
        tree.mkdirp("o9-9-9", false);
        let err = tree.delete_node("o9-9-9/file", false).unwrap_err();
        assert_eq!(err, SendStreamError::MissingChild("o9-9-9/file".to_string()));
    }
}
