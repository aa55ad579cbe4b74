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

//! The dispatch loop: registers, the linear memory arena, the native
//! call stack, and the `running`/`trapped`/`halted` state machine.

use std::io::Write;

use crate::container::{Container, MEMORY_SIZE};
use crate::errors::Trap;
use crate::lexer::Register;
use crate::opcodes;
use crate::syscall::{self, HandleTable, SyscallOutcome};

const CALL_STACK_DEPTH: usize = 1024;

/// The interpreter's run state. There is no transition out of `Trapped`.
#[derive(Debug, Clone)]
pub enum State {
    Running,
    Trapped(Trap),
    Halted(i64),
}

pub struct Interpreter {
    pub(crate) registers: [u64; 8],
    pub(crate) ip: u64,
    pub(crate) memory: Vec<u8>,
    bytecode: Vec<u8>,
    call_stack: Vec<u64>,
    state: State,
    pub(crate) handles: HandleTable,
    pub(crate) argv: Vec<Vec<u8>>,
    debug_labels: Vec<crate::label::LabelEntry>,
    pub(crate) stdout: Box<dyn Write>,
    pub(crate) stderr: Box<dyn Write>,
}

impl Interpreter {
    /// Builds a fresh interpreter from a decoded container. `argv` is
    /// the program's own argument vector, exposed to it via syscalls 9
    /// and 10. `print`/`log` write to the real standard streams; use
    /// `new_with_output` to redirect them.
    pub fn new(container: Container, argv: Vec<Vec<u8>>) -> Self {
        Self::new_with_output(container, argv, Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    /// Builds a fresh interpreter with `print` (syscall 1) and `log`
    /// (syscall 2) wired to the given sinks, so tests can observe what a
    /// program writes without touching the real standard streams.
    pub fn new_with_output(
        container: Container,
        argv: Vec<Vec<u8>>,
        stdout: Box<dyn Write>,
        stderr: Box<dyn Write>,
    ) -> Self {
        let mut memory = vec![0u8; MEMORY_SIZE as usize];
        memory[..container.initial_memory.len()].copy_from_slice(&container.initial_memory);

        let mut registers = [0u64; 8];
        registers[Register::Sp.index() as usize] = MEMORY_SIZE;

        Interpreter {
            registers,
            ip: 0,
            memory,
            bytecode: container.code,
            call_stack: Vec::new(),
            state: State::Running,
            handles: HandleTable::new(),
            argv,
            debug_labels: container.debug_labels,
            stdout,
            stderr,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn ip(&self) -> u64 {
        self.ip
    }

    pub fn registers(&self) -> [u64; 8] {
        self.registers
    }

    pub fn call_stack(&self) -> &[u64] {
        &self.call_stack
    }

    /// Resolves an address to the nearest label at or before it, for
    /// diagnostics. Returns `None` if there is no debug info.
    pub fn label_for(&self, pos: u64) -> Option<&str> {
        self.debug_labels
            .iter()
            .filter(|l| l.pos <= pos)
            .max_by_key(|l| l.pos)
            .map(|l| l.name.as_str())
    }

    pub(crate) fn reg(&self, r: Register) -> u64 {
        self.registers[r.index() as usize]
    }

    pub(crate) fn set_reg(&mut self, r: Register, value: u64) {
        self.registers[r.index() as usize] = value;
    }

    fn fetch_byte(&self, pos: u64) -> Result<u8, Trap> {
        self.bytecode
            .get(pos as usize)
            .copied()
            .ok_or_else(|| Trap::new(self.ip, "read past end of bytecode"))
    }

    fn fetch_word(&self, pos: u64) -> Result<u64, Trap> {
        let start = pos as usize;
        let slice = self
            .bytecode
            .get(start..start + 8)
            .ok_or_else(|| Trap::new(self.ip, "read past end of bytecode"))?;
        Ok(u64::from_le_bytes(slice.try_into().unwrap()))
    }

    fn decode_regs(&self) -> Result<(Register, Register), Trap> {
        let byte = self.fetch_byte(self.ip + 1)?;
        let first = Register::from_index(byte & 0x0f)
            .ok_or_else(|| Trap::new(self.ip, "invalid register index"))?;
        let second = Register::from_index(byte >> 4)
            .ok_or_else(|| Trap::new(self.ip, "invalid register index"))?;
        Ok((first, second))
    }

    pub(crate) fn checked_range(&self, addr: u64, len: u64) -> Result<(usize, usize), Trap> {
        let end = addr
            .checked_add(len)
            .filter(|&e| e <= MEMORY_SIZE)
            .ok_or_else(|| Trap::new(self.ip, "memory access out of bounds"))?;
        Ok((addr as usize, end as usize))
    }

    fn load_word(&self, addr: u64) -> Result<u64, Trap> {
        let (start, end) = self.checked_range(addr, 8)?;
        Ok(u64::from_le_bytes(self.memory[start..end].try_into().unwrap()))
    }

    fn load_byte(&self, addr: u64) -> Result<u8, Trap> {
        let (start, _) = self.checked_range(addr, 1)?;
        Ok(self.memory[start])
    }

    fn store_word(&mut self, addr: u64, value: u64) -> Result<(), Trap> {
        let (start, end) = self.checked_range(addr, 8)?;
        self.memory[start..end].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn store_byte(&mut self, addr: u64, value: u8) -> Result<(), Trap> {
        let (start, _) = self.checked_range(addr, 1)?;
        self.memory[start] = value;
        Ok(())
    }

    /// Executes a single instruction, or does nothing if not `Running`.
    pub fn step(&mut self) {
        if !matches!(self.state, State::Running) {
            return;
        }
        match self.step_inner() {
            Ok(Some(code)) => self.state = State::Halted(code),
            Ok(None) => {}
            Err(trap) => self.state = State::Trapped(trap),
        }
    }

    /// Runs until the interpreter leaves the `Running` state.
    pub fn run(&mut self) {
        while matches!(self.state, State::Running) {
            self.step();
        }
    }

    fn step_inner(&mut self) -> Result<Option<i64>, Trap> {
        let opcode = self.fetch_byte(self.ip)?;

        if opcodes::is_reserved(opcode) {
            return Err(Trap::new(
                self.ip,
                format!("opcode 0x{opcode:02x} is reserved and has no interpreter semantics"),
            ));
        }

        match opcode {
            0x00 => self.ip += 1,
            0xe0 => return Err(Trap::new(self.ip, "panicked")),
            0xd0 => {
                let (r1, r2) = self.decode_regs()?;
                self.set_reg(r1, self.reg(r2));
                self.ip += 2;
            }
            0xd1 => {
                let (r1, _) = self.decode_regs()?;
                let word = self.fetch_word(self.ip + 2)?;
                self.set_reg(r1, word);
                self.ip += 10;
            }
            0xd2 => {
                let (r1, _) = self.decode_regs()?;
                let byte = self.fetch_byte(self.ip + 2)?;
                self.set_reg(r1, byte as u64);
                self.ip += 3;
            }
            0xd3 => {
                let (r1, r2) = self.decode_regs()?;
                let value = self.load_word(self.reg(r2))?;
                self.set_reg(r1, value);
                self.ip += 2;
            }
            0xd4 => {
                let (r1, r2) = self.decode_regs()?;
                let value = self.load_byte(self.reg(r2))?;
                self.set_reg(r1, value as u64);
                self.ip += 2;
            }
            0xd5 => {
                let (r1, r2) = self.decode_regs()?;
                self.store_word(self.reg(r1), self.reg(r2))?;
                self.ip += 2;
            }
            0xd6 => {
                let (r1, r2) = self.decode_regs()?;
                self.store_byte(self.reg(r1), (self.reg(r2) & 0xff) as u8)?;
                self.ip += 2;
            }
            0xd7 => {
                let (r1, _) = self.decode_regs()?;
                let new_sp = self.reg(Register::Sp).wrapping_sub(8);
                self.store_word(new_sp, self.reg(r1))?;
                self.set_reg(Register::Sp, new_sp);
                self.ip += 2;
            }
            0xd8 => {
                let (r1, _) = self.decode_regs()?;
                let sp = self.reg(Register::Sp);
                let value = self.load_word(sp)?;
                self.set_reg(r1, value);
                self.set_reg(Register::Sp, sp.wrapping_add(8));
                self.ip += 2;
            }
            0xf0 => {
                self.ip = self.fetch_word(self.ip + 1)?;
            }
            0xf1 => {
                let target = self.fetch_word(self.ip + 1)?;
                self.ip = if self.reg(Register::St) != 0 { target } else { self.ip + 9 };
            }
            0xf2 => {
                let target = self.fetch_word(self.ip + 1)?;
                if self.call_stack.len() >= CALL_STACK_DEPTH {
                    return Err(Trap::new(self.ip, "call stack overflow"));
                }
                self.call_stack.push(self.ip + 9);
                self.ip = target;
            }
            0xf3 => {
                self.ip = self
                    .call_stack
                    .pop()
                    .ok_or_else(|| Trap::new(self.ip, "call stack underflow"))?;
            }
            0xf4 => {
                let number = self.fetch_byte(self.ip + 1)?;
                self.ip += 2;
                match syscall::dispatch(self, number)? {
                    SyscallOutcome::Continue => {}
                    SyscallOutcome::Halt(code) => return Ok(Some(code)),
                }
            }
            0xc0 => {
                let (r1, r2) = self.decode_regs()?;
                let result = self.reg(r1).wrapping_sub(self.reg(r2));
                self.set_reg(Register::St, result);
                self.ip += 2;
            }
            0xc1..=0xc5 => {
                let st = self.reg(Register::St) as i64;
                let result = match opcode {
                    0xc1 => st == 0,
                    0xc2 => st < 0,
                    0xc3 => st > 0,
                    0xc4 => st <= 0,
                    0xc5 => st >= 0,
                    _ => unreachable!(),
                };
                self.set_reg(Register::St, result as u64);
                self.ip += 1;
            }
            0xa0 => {
                let (r1, r2) = self.decode_regs()?;
                self.set_reg(r1, self.reg(r1).wrapping_add(self.reg(r2)));
                self.ip += 2;
            }
            0xa1 => {
                let (r1, r2) = self.decode_regs()?;
                self.set_reg(r1, self.reg(r1).wrapping_sub(self.reg(r2)));
                self.ip += 2;
            }
            0xa2 => {
                let (r1, r2) = self.decode_regs()?;
                self.set_reg(r1, self.reg(r1).wrapping_mul(self.reg(r2)));
                self.ip += 2;
            }
            0xa3 => {
                let (r1, r2) = self.decode_regs()?;
                let divisor = self.reg(r2);
                if divisor == 0 {
                    return Err(Trap::new(self.ip, "division by zero"));
                }
                self.set_reg(r1, self.reg(r1).wrapping_div(divisor));
                self.ip += 2;
            }
            0xb0 => {
                let (r1, r2) = self.decode_regs()?;
                self.set_reg(r1, self.reg(r1) & self.reg(r2));
                self.ip += 2;
            }
            0xb1 => {
                let (r1, r2) = self.decode_regs()?;
                self.set_reg(r1, self.reg(r1) | self.reg(r2));
                self.ip += 2;
            }
            0xb2 => {
                let (r1, r2) = self.decode_regs()?;
                self.set_reg(r1, self.reg(r1) ^ self.reg(r2));
                self.ip += 2;
            }
            0xb3 => {
                let (r1, _) = self.decode_regs()?;
                self.set_reg(r1, !self.reg(r1));
                self.ip += 2;
            }
            _ => {
                return Err(Trap::new(self.ip, format!("unknown opcode 0x{opcode:02x}")));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;

    fn run_source(source: &str, argv: Vec<Vec<u8>>) -> Interpreter {
        let bytes = assemble(source).unwrap();
        let container = Container::parse(&bytes).unwrap();
        let mut vm = Interpreter::new(container, argv);
        vm.run();
        vm
    }

    #[test]
    fn fibonacci_loop_ten_iterations() {
        let source = "\
            moveib a 0\n\
            moveib b 1\n\
        loop:\n\
            move c b\n\
            add b a\n\
            move a c\n\
            jump loop\n\
        ";
        let bytes = assemble(source).unwrap();
        let container = Container::parse(&bytes).unwrap();
        let mut vm = Interpreter::new(container, Vec::new());

        // Two setup instructions, then ten iterations of the four
        // instruction loop body.
        for _ in 0..(2 + 10 * 4) {
            vm.step();
        }

        assert_eq!(vm.reg(Register::A), 55);
        assert_eq!(vm.reg(Register::B), 89);
        assert_eq!(vm.reg(Register::C), 55);
    }

    #[test]
    fn bounds_check_traps_before_touching_memory() {
        let vm = run_source("movei a 0x1000000\nloadb c a\n", Vec::new());
        assert!(matches!(vm.state(), State::Trapped(_)));
    }

    #[test]
    fn unknown_opcode_traps_immediately() {
        let container = Container {
            code: vec![0x7f],
            initial_memory: Vec::new(),
            debug_labels: Vec::new(),
        };
        let mut vm = Interpreter::new(container, Vec::new());
        vm.step();
        assert!(matches!(vm.state(), State::Trapped(_)));
    }

    #[test]
    fn reserved_opcode_traps() {
        let container = Container {
            code: vec![0xc6],
            initial_memory: Vec::new(),
            debug_labels: Vec::new(),
        };
        let mut vm = Interpreter::new(container, Vec::new());
        vm.step();
        assert!(matches!(vm.state(), State::Trapped(_)));
    }

    #[test]
    fn division_by_zero_traps() {
        let vm = run_source("moveib a 1\nmoveib b 0\ndiv a b\n", Vec::new());
        assert!(matches!(vm.state(), State::Trapped(_)));
    }

    #[test]
    fn ret_with_empty_call_stack_traps() {
        let vm = run_source("ret\n", Vec::new());
        assert!(matches!(vm.state(), State::Trapped(_)));
    }

    #[test]
    fn call_and_ret_restore_ip_and_balance_native_stack() {
        let source = "\
            call fn\n\
            moveib a 42\n\
            moveib b 0\n\
            syscall 0\n\
        fn:\n\
            ret\n\
        ";
        let vm = run_source(source, Vec::new());
        assert!(matches!(vm.state(), State::Halted(42)));
        assert!(vm.call_stack().is_empty());
    }

    #[test]
    fn container_skip_unknown_section_runs_eight_nops_then_traps() {
        use crate::emitter::Emitter;
        let mut emitter = Emitter::new();
        crate::container::write_magic(&mut emitter);

        let pos = crate::container::begin_section(&mut emitter, crate::container::SECTION_CODE);
        for _ in 0..8 {
            emitter.emit_byte(0x00);
        }
        crate::container::end_section(&mut emitter, pos);

        let pos = crate::container::begin_section(&mut emitter, 7);
        for _ in 0..16 {
            emitter.emit_byte(0xaa);
        }
        crate::container::end_section(&mut emitter, pos);

        let pos = crate::container::begin_section(&mut emitter, crate::container::SECTION_DEBUG);
        emitter.emit_word(0);
        crate::container::end_section(&mut emitter, pos);

        let bytes = emitter.into_bytes();
        let container = Container::parse(&bytes).unwrap();
        let mut vm = Interpreter::new(container, Vec::new());
        vm.run();
        assert_eq!(vm.ip(), 8);
        assert!(matches!(vm.state(), State::Trapped(_)));
    }
}
