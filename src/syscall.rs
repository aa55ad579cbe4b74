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

//! The fixed syscall dispatch table. Unknown numbers trap; host I/O
//! failures are reported in-band through the register contract instead,
//! so programs can recover from them.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};

use crate::errors::{HostIoError, Trap};
use crate::interpreter::Interpreter;
use crate::lexer::Register;

/// What the dispatch loop should do after a syscall returns.
pub enum SyscallOutcome {
    Continue,
    Halt(i64),
}

const OPEN_FAILURE: u64 = u64::MAX;

/// Open file handles owned by one interpreter instance. Slot 0 is never
/// issued, so a handle of 0 is unambiguously invalid. Handles close when
/// this table (and its `File`s) drop.
pub struct HandleTable {
    files: Vec<Option<File>>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable { files: vec![None] }
    }

    fn insert(&mut self, file: File) -> u64 {
        self.files.push(Some(file));
        (self.files.len() - 1) as u64
    }

    fn get_mut(&mut self, handle: u64) -> Option<&mut File> {
        self.files.get_mut(handle as usize).and_then(|slot| slot.as_mut())
    }

    fn close(&mut self, handle: u64) {
        if let Some(slot) = self.files.get_mut(handle as usize) {
            *slot = None;
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        HandleTable::new()
    }
}

/// Dispatches syscall `number` against the fixed 256-entry table. Numbers
/// outside the defined subset trap; a `match` over the number is the
/// dense Rust equivalent of the original's array of function pointers.
pub fn dispatch(vm: &mut Interpreter, number: u8) -> Result<SyscallOutcome, Trap> {
    match number {
        0 => exit(vm),
        1 => print(vm),
        2 => log(vm),
        3 => create(vm),
        4 => open_read(vm),
        5 => open_write(vm),
        6 => read(vm),
        7 => write(vm),
        8 => close(vm),
        9 => argc(vm),
        10 => arg(vm),
        _ => Err(Trap::new(vm.ip(), format!("invalid syscall number {number}"))),
    }
}

fn exit(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    Ok(SyscallOutcome::Halt(vm.reg(Register::A) as i64))
}

fn print(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    write_range_to(vm, Stream::Stdout)
}

fn log(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    write_range_to(vm, Stream::Stderr)
}

enum Stream {
    Stdout,
    Stderr,
}

fn write_range_to(vm: &mut Interpreter, stream: Stream) -> Result<SyscallOutcome, Trap> {
    let addr = vm.reg(Register::A);
    let len = vm.reg(Register::B);
    let (start, end) = vm.checked_range(addr, len)?;
    let bytes = &vm.memory[start..end];
    let result = match stream {
        Stream::Stdout => vm.stdout.write_all(bytes),
        Stream::Stderr => vm.stderr.write_all(bytes),
    };
    let _ = result.map_err(HostIoError::from);
    Ok(SyscallOutcome::Continue)
}

/// Reads the `[addr, addr+len)` filename out of VM memory into an owned
/// buffer. Never assumes the bytes are null-terminated inside the VM.
fn filename_from_memory(vm: &Interpreter, addr: u64, len: u64) -> Result<String, Trap> {
    let (start, end) = vm.checked_range(addr, len)?;
    Ok(String::from_utf8_lossy(&vm.memory[start..end]).into_owned())
}

fn open_with(vm: &mut Interpreter, opts: &OpenOptions) -> Result<SyscallOutcome, Trap> {
    let addr = vm.reg(Register::A);
    let len = vm.reg(Register::B);
    let name = filename_from_memory(vm, addr, len)?;
    let handle = match opts.open(&name).map_err(HostIoError::from) {
        Ok(file) => vm.handles.insert(file),
        Err(_) => OPEN_FAILURE,
    };
    vm.set_reg(Register::A, handle);
    Ok(SyscallOutcome::Continue)
}

fn create(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    open_with(vm, OpenOptions::new().write(true).create(true).truncate(true))
}

fn open_read(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    open_with(vm, OpenOptions::new().read(true))
}

fn open_write(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    open_with(vm, OpenOptions::new().write(true).create(true).truncate(true))
}

fn read(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    let handle = vm.reg(Register::A);
    let dest_addr = vm.reg(Register::B);
    let max_len = vm.reg(Register::C);
    let (start, end) = vm.checked_range(dest_addr, max_len)?;

    let n = match vm.handles.get_mut(handle) {
        Some(file) => file
            .read(&mut vm.memory[start..end])
            .map_err(HostIoError::from)
            .unwrap_or(0),
        None => 0,
    };
    vm.set_reg(Register::A, n as u64);
    Ok(SyscallOutcome::Continue)
}

fn write(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    let handle = vm.reg(Register::A);
    let src_addr = vm.reg(Register::B);
    let len = vm.reg(Register::C);
    let (start, end) = vm.checked_range(src_addr, len)?;

    let n = match vm.handles.get_mut(handle) {
        Some(file) => file
            .write(&vm.memory[start..end])
            .map_err(HostIoError::from)
            .unwrap_or(0),
        None => 0,
    };
    vm.set_reg(Register::A, n as u64);
    Ok(SyscallOutcome::Continue)
}

fn close(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    let handle = vm.reg(Register::A);
    vm.handles.close(handle);
    Ok(SyscallOutcome::Continue)
}

fn argc(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    vm.set_reg(Register::A, vm.argv.len() as u64);
    Ok(SyscallOutcome::Continue)
}

fn arg(vm: &mut Interpreter) -> Result<SyscallOutcome, Trap> {
    let index = vm.reg(Register::A) as usize;
    let dest_addr = vm.reg(Register::B);
    let max_len = vm.reg(Register::C);
    let ip = vm.ip();

    let copied = {
        let bytes = vm
            .argv
            .get(index)
            .ok_or_else(|| Trap::new(ip, "arg index out of range"))?;
        let n = std::cmp::min(bytes.len() as u64, max_len);
        let (start, end) = vm.checked_range(dest_addr, n)?;
        vm.memory[start..end].copy_from_slice(&bytes[..n as usize]);
        n
    };
    vm.set_reg(Register::A, copied);
    Ok(SyscallOutcome::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;

    fn interpreter_with(code: Vec<u8>) -> Interpreter {
        let container = Container {
            code,
            initial_memory: Vec::new(),
            debug_labels: Vec::new(),
        };
        Interpreter::new(container, Vec::new())
    }

    #[test]
    fn open_read_on_a_missing_file_returns_max_handle_sentinel() {
        let mut vm = interpreter_with(Vec::new());
        let path = "/nonexistent/path/for/soil/tests";
        let path_addr = 0u64;
        vm.memory[..path.len()].copy_from_slice(path.as_bytes());
        vm.set_reg(Register::A, path_addr);
        vm.set_reg(Register::B, path.len() as u64);
        open_read(&mut vm).unwrap();
        assert_eq!(vm.reg(Register::A), OPEN_FAILURE);
    }

    #[test]
    fn read_from_an_invalid_handle_returns_zero() {
        let mut vm = interpreter_with(Vec::new());
        vm.set_reg(Register::A, 999);
        vm.set_reg(Register::B, 0);
        vm.set_reg(Register::C, 16);
        read(&mut vm).unwrap();
        assert_eq!(vm.reg(Register::A), 0);
    }

    #[test]
    fn close_on_an_invalid_handle_is_a_no_op() {
        let mut vm = interpreter_with(Vec::new());
        vm.set_reg(Register::A, 999);
        assert!(close(&mut vm).is_ok());
    }

    #[test]
    fn arg_out_of_range_traps() {
        let mut vm = interpreter_with(Vec::new());
        vm.set_reg(Register::A, 0);
        vm.set_reg(Register::B, 0);
        vm.set_reg(Register::C, 8);
        assert!(arg(&mut vm).is_err());
    }

    #[test]
    fn argc_and_arg_expose_the_host_argument_vector() {
        let mut vm = Interpreter::new(
            Container {
                code: Vec::new(),
                initial_memory: Vec::new(),
                debug_labels: Vec::new(),
            },
            vec![b"hello".to_vec()],
        );
        argc(&mut vm).unwrap();
        assert_eq!(vm.reg(Register::A), 1);

        vm.set_reg(Register::A, 0);
        vm.set_reg(Register::B, 0);
        vm.set_reg(Register::C, 16);
        arg(&mut vm).unwrap();
        assert_eq!(vm.reg(Register::A), 5);
        assert_eq!(&vm.memory[0..5], b"hello");
    }
}
