/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use anyhow::{Context, Result};
use clap::Parser;
use soil::host::{FileReader, HostFileReader};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// Assembly source file. Output is written alongside it with a
    /// `.soil` extension.
    source: PathBuf,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let reader = HostFileReader;
    let text = reader
        .read_to_string(&opts.source)
        .with_context(|| format!("Failed to read input file: {}", opts.source.display()))?;

    let container = soil::assemble(&text).map_err(|e| anyhow::anyhow!("{e}"))?;

    let output = opts.source.with_extension("soil");
    fs::write(&output, container)
        .with_context(|| format!("Failed to write output file: {}", output.display()))?;

    println!(
        "Successfully assembled {} to {}",
        opts.source.display(),
        output.display()
    );

    Ok(())
}
