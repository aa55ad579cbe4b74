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
use soil::{Container, Interpreter, State};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[clap(version, author = "Connor Nolan")]
struct Opts {
    /// The `.soil` container to run.
    binary: PathBuf,
    /// Arguments passed through to the program via syscalls 9 and 10.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> Result<ExitCode> {
    let opts = Opts::parse();

    let reader = HostFileReader;
    let bytes = reader
        .read_binary(&opts.binary)
        .with_context(|| format!("Failed to read binary file: {}", opts.binary.display()))?;

    let container = Container::parse(&bytes).map_err(|e| anyhow::anyhow!("{e}"))?;
    let argv = opts.args.into_iter().map(String::into_bytes).collect();

    let mut vm = Interpreter::new(container, argv);
    vm.run();

    match vm.state() {
        State::Halted(code) => Ok(ExitCode::from(*code as u8)),
        State::Trapped(trap) => {
            report_trap(&vm, trap);
            Ok(ExitCode::FAILURE)
        }
        State::Running => unreachable!("run() only returns once execution has left Running"),
    }
}

fn report_trap(vm: &Interpreter, trap: &soil::errors::Trap) {
    eprintln!("{trap}");
    if let Some(label) = vm.label_for(trap.ip) {
        eprintln!("  in {label}");
    }

    const NAMES: [&str; 8] = ["sp", "st", "a", "b", "c", "d", "e", "f"];
    eprintln!("registers:");
    for (name, value) in NAMES.iter().zip(vm.registers()) {
        eprintln!("  {name} = 0x{value:016x}");
    }

    eprintln!("call stack:");
    for (depth, ret_addr) in vm.call_stack().iter().rev().enumerate() {
        eprintln!("  #{depth} return to 0x{ret_addr:08x}");
    }
}
