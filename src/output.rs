/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Turns a drained [`DiffTree`] into the two output shapes the CLI renders: a pretty
//! log-style listing and the JSON document.

use log::info;
use regex::RegexSet;
use serde::Serialize;

use crate::error::{Result, SendStreamError};
use crate::tree::{DiffTree, NodeId, NodeKind, OperationState, RelationReason, ROOT};

#[derive(Debug, Serialize)]
pub struct RelationDocument {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct NodeDocument {
    pub node_type: String,
    pub path: String,
    pub state: u8,
    pub relations: Option<Vec<RelationDocument>>,
    pub changes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Default)]
pub struct OutputDocument {
    pub added: Option<Vec<NodeDocument>>,
    pub changed: Option<Vec<NodeDocument>>,
    pub deleted: Option<Vec<NodeDocument>>,
}

/// Bucketed node ids gathered by one traversal of the tree. `visible` lists every
/// node that survived the filters, deduplicated across bucket membership, so pretty
/// output logs each node once even when it is shadow-emitted into `deleted`.
#[derive(Debug, Default)]
pub struct Buckets {
    pub added: Vec<NodeId>,
    pub changed: Vec<NodeId>,
    pub deleted: Vec<NodeId>,
    pub visible: Vec<NodeId>,
}

fn node_type_str(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Unknown => "UNKNOWN",
        NodeKind::File => "FILE",
        NodeKind::Dir => "DIR",
        NodeKind::Fifo => "FIFO",
        NodeKind::Sock => "SOCK",
        NodeKind::Symlink => "SYMLINK",
        NodeKind::Node => "NODE",
    }
}

fn reason_str(reason: RelationReason) -> &'static str {
    match reason {
        RelationReason::RenameSrc => "RENAME_SRC",
        RelationReason::RenameDest => "RENAME_DEST",
        RelationReason::LinkDest => "LINK_DEST",
    }
}

/// Depth-first, post-visit traversal that buckets every node by its operation state,
/// skipping root-level temporary placeholders and anything matching `ignore_patterns`.
/// A `RegexSet` is compiled once up front and reused for every node, rather than
/// recompiling a pattern list per path.
pub fn project(tree: &DiffTree, ignore_patterns: &[String]) -> Result<Buckets> {
    let ignore = RegexSet::new(ignore_patterns)
        .map_err(|e| SendStreamError::InvalidIgnorePattern(e.to_string()))?;
    let mut buckets = Buckets::default();
    visit(tree, ROOT, &ignore, &mut buckets);
    info!(
        "projected {} added, {} changed, {} deleted",
        buckets.added.len(),
        buckets.changed.len(),
        buckets.deleted.len()
    );
    Ok(buckets)
}

fn visit(tree: &DiffTree, id: NodeId, ignore: &RegexSet, buckets: &mut Buckets) {
    for &child in tree.node(id).children.values() {
        visit(tree, child, ignore, buckets);
    }
    if id == ROOT || tree.is_temporary_node(id) {
        return;
    }
    // Matched against the absolute form the CLI actually displays/emits (leading `/`),
    // not `chain_path`'s bare relative string, so a pattern like `^/secrets` behaves
    // the way a user reading the output would expect.
    let path = format!("/{}", tree.chain_path(id));
    if ignore.is_match(&path) {
        return;
    }
    buckets.visible.push(id);
    let node = tree.node(id);
    match node.state {
        OperationState::Created => buckets.added.push(id),
        OperationState::Modified => buckets.changed.push(id),
        OperationState::Deleted => buckets.deleted.push(id),
        _ => {}
    }
    if node.deleted_in_snapshot && node.state != OperationState::Deleted {
        buckets.deleted.push(id);
    }
}

fn to_document(tree: &DiffTree, id: NodeId) -> NodeDocument {
    let node = tree.node(id);
    let relations = if node.relations.is_empty() {
        None
    } else {
        Some(
            node.relations
                .iter()
                .map(|r| RelationDocument {
                    path: format!("/{}", tree.chain_path(r.target)),
                    reason: reason_str(r.reason).to_string(),
                })
                .collect(),
        )
    };
    let changes = if node.changes.is_empty() {
        None
    } else {
        Some(node.changes.iter().map(|c| c.render()).collect())
    };
    NodeDocument {
        node_type: node_type_str(node.kind).to_string(),
        path: format!("/{}", tree.chain_path(id)),
        state: node.state as u8,
        relations,
        changes,
    }
}

pub fn evaluate(tree: &DiffTree, buckets: &Buckets) -> OutputDocument {
    let to_docs = |ids: &[NodeId]| -> Option<Vec<NodeDocument>> {
        if ids.is_empty() {
            None
        } else {
            Some(ids.iter().map(|&id| to_document(tree, id)).collect())
        }
    };
    OutputDocument {
        added: to_docs(&buckets.added),
        changed: to_docs(&buckets.changed),
        deleted: to_docs(&buckets.deleted),
    }
}

/// Renders one line per visible node: `[KIND][state] /path [rel=/target:REASON]… [change=...]…`.
pub fn render_pretty(tree: &DiffTree, buckets: &Buckets) -> String {
    let mut out = String::new();
    for &id in &buckets.visible {
        let node = tree.node(id);
        out.push_str(&format!(
            "[{}][{:?}] /{}",
            node_type_str(node.kind),
            node.state,
            tree.chain_path(id)
        ));
        for r in &node.relations {
            out.push_str(&format!(
                " [rel=/{}:{}]",
                tree.chain_path(r.target),
                reason_str(r.reason)
            ));
        }
        for c in &node.changes {
            out.push_str(&format!(" [change={}]", c.render()));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Relation;

    #[test]
    fn buckets_created_modified_deleted_separately() {
        let mut tree = DiffTree::new();
        let created = tree.mkdirp("added", true);
        let modified = tree.mkdirp("changed", false);
        tree.node_mut(modified).state = OperationState::Modified;
        let deleted = tree.mkdirp("removed", false);
        tree.node_mut(deleted).state = OperationState::Deleted;

        let buckets = project(&tree, &[]).unwrap();
        assert_eq!(buckets.added, vec![created]);
        assert_eq!(buckets.changed, vec![modified]);
        assert_eq!(buckets.deleted, vec![deleted]);
    }

    #[test]
    fn shadow_emits_relocated_node_into_deleted_bucket() {
        let mut tree = DiffTree::new();
        let node = tree.mkdirp("still/here", true);
        tree.node_mut(node).deleted_in_snapshot = true;

        let buckets = project(&tree, &[]).unwrap();
        assert!(buckets.added.contains(&node));
        assert!(buckets.deleted.contains(&node));
        assert_eq!(buckets.visible.iter().filter(|&&id| id == node).count(), 1);
    }

    #[test]
    fn filters_temporary_root_children() {
        let mut tree = DiffTree::new();
        let placeholder = tree.mkdirp("o7-1-0", true);
        let buckets = project(&tree, &[]).unwrap();
        assert!(!buckets.visible.contains(&placeholder));
    }

    #[test]
    fn filters_by_ignore_pattern() {
        let mut tree = DiffTree::new();
        let node = tree.mkdirp("secrets/key", true);
        let buckets = project(&tree, &[r"^/secrets/".to_string()]).unwrap();
        assert!(!buckets.visible.contains(&node));
    }

    #[test]
    fn json_document_includes_relations_and_changes() {
        let mut tree = DiffTree::new();
        let target = tree.mkdirp("target", true);
        let node = tree.mkdirp("link", true);
        tree.node_mut(node).relations.push(Relation {
            target,
            reason: RelationReason::LinkDest,
        });
        tree.append_write(node, 0, 4);

        let buckets = project(&tree, &[]).unwrap();
        let doc = evaluate(&tree, &buckets);
        let added = doc.added.unwrap();
        let link_doc = added.iter().find(|n| n.path == "/link").unwrap();
        assert_eq!(link_doc.relations.as_ref().unwrap()[0].reason, "LINK_DEST");
        assert_eq!(link_doc.changes.as_ref().unwrap()[0], "write:offset=0:data_len=4");
    }
}
