/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Decodes a BTRFS incremental send-stream into a tree of per-path verdicts
//! (created / changed / deleted), then projects that tree into either a
//! pretty log-style listing or a JSON document.

pub mod args;
pub mod attribute;
pub mod byte_reader;
pub mod command;
pub mod error;
pub mod output;
pub mod pathname;
pub mod processor;
pub mod tree;
pub mod validator;

use std::io::Read;

pub use error::{Result, SendStreamError};
pub use output::{evaluate, project, render_pretty, Buckets, OutputDocument};
pub use processor::Processor;
pub use tree::DiffTree;

/// Convenience entry point: drains `source` into a tree, then projects it with
/// `ignore_patterns` applied. Equivalent to `Processor::new().run(source)` followed
/// by `output::project`.
pub fn process_stream<R: Read>(source: R, ignore_patterns: &[String]) -> Result<(DiffTree, Buckets)> {
    let tree = Processor::new().run(source)?;
    let buckets = project(&tree, ignore_patterns)?;
    Ok((tree, buckets))
}
