/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the send-stream file to decode
    pub stream_path: String,

    /// Regex patterns matched against each node's absolute path (leading `/`) to
    /// omit from the output
    #[arg(short, long)]
    pub ignore: Option<Vec<String>>,

    /// Emit a single JSON document on standard output instead of log-style lines
    #[arg(short, long, default_value_t = false)]
    pub json: bool,
}
