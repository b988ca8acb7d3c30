/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs::File;
use std::io::BufReader;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use btrfs_send_diff::args::Args;
use btrfs_send_diff::{evaluate, process_stream, render_pretty};

fn main() {
    let args = Args::parse();
    let json = args.json;
    if let Err(ref err) = run(args) {
        if json {
            eprintln!("{:?}", err);
        } else {
            error!("{:?}", err);
        }
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if !args.json {
        log4rs::init_file("log4rs.yml", Default::default())
            .with_context(|| "failed to init logger")?;
        info!("init logger");
    }

    info!("reading send stream from '{}'", args.stream_path);
    let file = File::open(&args.stream_path)
        .with_context(|| format!("failed to open '{}'", args.stream_path))?;
    let reader = BufReader::new(file);

    let ignore_patterns = args.ignore.unwrap_or_default();
    let (tree, buckets) =
        process_stream(reader, &ignore_patterns).with_context(|| "failed to process send stream")?;

    if args.json {
        let document = evaluate(&tree, &buckets);
        println!("{}", serde_json::to_string(&document)?);
    } else {
        eprint!("{}", render_pretty(&tree, &buckets));
    }
    Ok(())
}
