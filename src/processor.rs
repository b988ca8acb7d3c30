/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::BTreeMap;
use std::io::Read;

use log::debug;

use crate::attribute::{AttributeReader, AttributeType};
use crate::byte_reader::ByteReader;
use crate::command::{self, classify, CommandType, OpClass};
use crate::error::{Result, SendStreamError};
use crate::pathname;
use crate::tree::{Change, DiffTree, NodeId, NodeKind, OperationState, Relation, RelationReason};
use crate::validator;

/// Drains a send-stream source into a [`DiffTree`], one command at a time.
pub struct Processor {
    tree: DiffTree,
}

impl Processor {
    pub fn new() -> Self {
        Self {
            tree: DiffTree::new(),
        }
    }

    /// Validates the header, then applies every command up to and including `End`.
    pub fn run<R: Read>(mut self, source: R) -> Result<DiffTree> {
        let mut reader = ByteReader::new(source);
        validator::validate_header(&mut reader)?;
        loop {
            let cmd = command::decode_command(&mut reader)?;
            let class = classify(cmd.command_type);
            debug!("applying {:?} ({:?})", cmd.command_type, class);
            match class {
                OpClass::Create => self.apply_create(cmd.command_type, &cmd.payload)?,
                OpClass::Modify => self.apply_modify(cmd.command_type, &cmd.payload)?,
                OpClass::Rename => self.apply_rename(cmd.command_type, &cmd.payload)?,
                OpClass::Delete => self.apply_delete(cmd.command_type, &cmd.payload)?,
                OpClass::Ignore => {
                    // The static table files UTIMES under Ignore, but dispatch routes it
                    // to the modify handler before falling through to a no-op.
                    if cmd.command_type == CommandType::Utimes {
                        self.apply_modify(cmd.command_type, &cmd.payload)?;
                    }
                }
                OpClass::Unspec => {
                    // payload already consumed whole by decode_command; nothing to apply.
                }
                OpClass::End => {
                    debug!("stream end");
                    break;
                }
            }
        }
        Ok(self.tree)
    }

    fn apply_create(&mut self, ct: CommandType, payload: &[u8]) -> Result<()> {
        let mut attrs = AttributeReader::new(payload);
        let path = attrs.path(AttributeType::Path)?;
        if let Some(existing) = self.tree.lookup(&path) {
            if self.tree.node(existing).state != OperationState::Deleted {
                return Err(SendStreamError::DuplicateCreate(path));
            }
        }
        match ct {
            CommandType::Subvol | CommandType::Snapshot => {}
            CommandType::Mkdir => {
                let (parent_path, name) = pathname::split(&path);
                let parent = self.tree.mkdirp(parent_path, false);
                let node = self.tree.new_node(name.to_string(), NodeKind::Dir);
                self.tree.node_mut(node).state = OperationState::Created;
                self.tree.add_node(node, parent)?;
            }
            CommandType::Symlink => {
                let _ino = attrs.u64(AttributeType::Ino)?;
                let target_path = attrs.path_link(AttributeType::PathLink)?;
                let (parent_path, name) = pathname::split(&path);
                let parent = self.tree.mkdirp(parent_path, false);
                let node = self.tree.new_node(name.to_string(), NodeKind::Symlink);
                self.tree.node_mut(node).state = OperationState::Created;
                let target = match self.tree.lookup(&target_path) {
                    Some(existing) => existing,
                    None => {
                        let (_, target_name) = pathname::split(&target_path);
                        self.tree.new_node(target_name.to_string(), NodeKind::Unknown)
                    }
                };
                self.tree.node_mut(node).relations.push(Relation {
                    target,
                    reason: RelationReason::LinkDest,
                });
                self.tree.add_node(node, parent)?;
            }
            _ => {
                let kind = match ct {
                    CommandType::Mkfile => NodeKind::File,
                    CommandType::Mknod => NodeKind::Node,
                    CommandType::Mkfifo => NodeKind::Fifo,
                    CommandType::Mksock => NodeKind::Sock,
                    other => return Err(SendStreamError::UnhandledCommand(format!("{:?}", other))),
                };
                let (parent_path, name) = pathname::split(&path);
                let parent = self.tree.mkdirp(parent_path, false);
                let node = self.tree.new_node(name.to_string(), kind);
                self.tree.node_mut(node).state = OperationState::Created;
                self.tree.add_node(node, parent)?;
            }
        }
        Ok(())
    }

    fn apply_modify(&mut self, ct: CommandType, payload: &[u8]) -> Result<()> {
        if ct == CommandType::Clone {
            return Err(SendStreamError::Unsupported("CLONE".to_string()));
        }
        let mut attrs = AttributeReader::new(payload);
        let path = attrs.path(AttributeType::Path)?;
        let id = self.tree.lookup_or_synthesize(&path, NodeKind::Unknown);
        if self.tree.node(id).state != OperationState::Created {
            self.tree.node_mut(id).state = OperationState::Modified;
        }
        match ct {
            CommandType::Write => {
                let offset = attrs.u64(AttributeType::FileOffset)?;
                let data = attrs.bytes(AttributeType::Data)?;
                self.tree.append_write(id, offset, data.data.len() as u64);
                upgrade_to_file(&mut self.tree, id);
            }
            CommandType::UpdateExtent => {
                let offset = attrs.u64(AttributeType::FileOffset)?;
                let size = attrs.u64(AttributeType::Size)?;
                self.tree.append_write(id, offset, size);
                upgrade_to_file(&mut self.tree, id);
            }
            CommandType::Truncate => {
                let size = attrs.u64(AttributeType::Size)?;
                self.tree.node_mut(id).changes.push(Change::Truncate { size });
                upgrade_to_file(&mut self.tree, id);
            }
            CommandType::Utimes => {
                let atime = attrs.time(AttributeType::Atime)?;
                let mtime = attrs.time(AttributeType::Mtime)?;
                let ctime = attrs.time(AttributeType::Ctime)?;
                self.tree.node_mut(id).changes.push(Change::Utime {
                    atime: atime.to_string(),
                    mtime: mtime.to_string(),
                    ctime: ctime.to_string(),
                });
            }
            CommandType::Chmod => {
                let mode = attrs.u64(AttributeType::Mode)?;
                self.tree.node_mut(id).changes.push(Change::Chmod { mode });
            }
            CommandType::Chown => {
                let uid = attrs.u64(AttributeType::Uid)?;
                let gid = attrs.u64(AttributeType::Gid)?;
                self.tree.node_mut(id).changes.push(Change::Chown { uid, gid });
            }
            CommandType::SetXattr => {
                let name = attrs.string(AttributeType::XattrName)?;
                let data = attrs.bytes(AttributeType::XattrData)?;
                self.tree.node_mut(id).changes.push(Change::SetXattr {
                    name,
                    data: data.to_string(),
                });
            }
            CommandType::RemoveXattr => {
                let name = attrs.string(AttributeType::XattrName)?;
                self.tree.node_mut(id).changes.push(Change::RemoveXattr { name });
            }
            other => return Err(SendStreamError::UnhandledCommand(format!("{:?}", other))),
        }
        Ok(())
    }

    fn apply_rename(&mut self, ct: CommandType, payload: &[u8]) -> Result<()> {
        let mut attrs = AttributeReader::new(payload);
        let (from, to) = match ct {
            CommandType::Rename => {
                let from = attrs.path(AttributeType::Path)?;
                let to = attrs.path(AttributeType::PathTo)?;
                (from, to)
            }
            CommandType::Link => {
                let from = attrs.path_link(AttributeType::PathLink)?;
                let to = attrs.path(AttributeType::Path)?;
                (from, to)
            }
            other => return Err(SendStreamError::UnhandledCommand(format!("{:?}", other))),
        };

        let from_is_placeholder = pathname::has_placeholder_component(&from);
        let mut src = self.tree.lookup(&from);
        if src.is_none() && !from_is_placeholder {
            // A fake source stands in for an entry that existed before this stream
            // (e.g. across a `btrfs send -p`) but was never observed here. It is built
            // detached: the destination node constructed below is what actually lands
            // in the tree, so there is no path left for the fake to occupy.
            let (_, name) = pathname::split(&from);
            let fake = self.tree.new_node(name.to_string(), NodeKind::Unknown);
            src = Some(fake);
        }

        let (captured_kind, mut relations, captured_children) = match src {
            Some(s) => {
                let node = self.tree.node(s);
                (node.kind, node.relations.clone(), node.children.clone())
            }
            None => (NodeKind::Unknown, Vec::new(), BTreeMap::new()),
        };
        if let Some(s) = src {
            self.tree.node_mut(s).children.clear();
        }

        if ct == CommandType::Rename {
            self.tree.delete_node(&from, false)?;
        }

        if !from_is_placeholder {
            if let Some(s) = src {
                let reason = if ct == CommandType::Rename {
                    RelationReason::RenameSrc
                } else {
                    RelationReason::LinkDest
                };
                relations.push(Relation { target: s, reason });
            }
        }

        let (to_parent_path, to_name) = pathname::split(&to);
        let to_parent = self.tree.mkdirp(to_parent_path, false);
        let dest = self.tree.new_node(to_name.to_string(), captured_kind);
        self.tree.node_mut(dest).state = OperationState::Created;
        self.tree.node_mut(dest).relations = relations;
        for (child_name, child_id) in captured_children {
            self.tree.node_mut(child_id).parent = Some(dest);
            self.tree.node_mut(dest).children.insert(child_name, child_id);
        }
        self.tree.add_node(dest, to_parent)?;

        if ct == CommandType::Rename {
            if let Some(s) = src {
                self.tree.node_mut(s).relations.push(Relation {
                    target: dest,
                    reason: RelationReason::RenameDest,
                });
            }
        }
        Ok(())
    }

    fn apply_delete(&mut self, ct: CommandType, payload: &[u8]) -> Result<()> {
        let mut attrs = AttributeReader::new(payload);
        let path = attrs.path(AttributeType::Path)?;
        let rmdir = ct == CommandType::Rmdir;
        self.tree.delete_node(&path, rmdir)?;
        Ok(())
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

fn upgrade_to_file(tree: &mut DiffTree, id: NodeId) {
    if tree.node(id).kind == NodeKind::Unknown {
        tree.node_mut(id).kind = NodeKind::File;
    }
}
