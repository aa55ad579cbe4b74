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

use thiserror::Error;

/// Errors raised while turning assembly source into a container.
#[derive(Error, Debug, PartialEq)]
pub enum AssemblyError {
    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Line {line}: {reason}")]
    Label { line: usize, reason: String },

    #[error("{reason}")]
    LabelNoLine { reason: String },
}

impl AssemblyError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        AssemblyError::Parse {
            line,
            reason: reason.into(),
        }
    }

    pub fn label(line: usize, reason: impl Into<String>) -> Self {
        AssemblyError::Label {
            line,
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading a `.soil` container.
#[derive(Error, Debug, PartialEq)]
pub enum ContainerError {
    #[error("bad magic bytes: expected \"soil\"")]
    BadMagic,

    #[error("truncated section: expected {expected} bytes, found {found}")]
    Truncated { expected: u64, found: u64 },

    #[error("initial memory section ({len} bytes) does not fit in the {memory_size} byte arena")]
    MemoryTooLarge { len: u64, memory_size: u64 },
}

/// A fatal runtime condition. Produced by the interpreter's dispatch loop;
/// terminates execution with no possibility of resuming.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("trap at ip={ip}: {reason}")]
pub struct Trap {
    pub ip: u64,
    pub reason: String,
}

impl Trap {
    pub fn new(ip: u64, reason: impl Into<String>) -> Self {
        Trap {
            ip,
            reason: reason.into(),
        }
    }
}

/// A host-level file or stream failure observed inside a syscall handler.
/// Never propagated to the guest as a Rust `Err` out of `step`/`run`; a
/// handler maps the underlying `std::io::Error` into this before folding
/// it into the register-contract sentinel, so that mapping is named and
/// testable apart from the dispatch loop.
#[derive(Error, Debug)]
#[error("host I/O error: {0}")]
pub struct HostIoError(#[from] std::io::Error);
