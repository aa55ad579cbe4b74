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

//! Sequences the code, initial-memory, and debug-info sections into a
//! single container buffer, switching the operand dialect at `@data`.

use crate::container::{self, SECTION_CODE, SECTION_DEBUG, SECTION_MEMORY};
use crate::emitter::Emitter;
use crate::errors::AssemblyError;
use crate::lexer::Lexer;
use crate::opcodes::{self, OperandShape};

/// Assembles `source` into a complete `.soil` container.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblyError> {
    let mut lexer = Lexer::new(source);
    let mut emitter = Emitter::new();

    container::write_magic(&mut emitter);

    let code_len_pos = container::begin_section(&mut emitter, SECTION_CODE);
    assemble_code_section(&mut lexer, &mut emitter)?;
    emitter.resolve_patches()?;
    let code_labels = emitter.current_labels().to_vec();
    container::end_section(&mut emitter, code_len_pos);

    let memory_len_pos = container::begin_section(&mut emitter, SECTION_MEMORY);
    assemble_data_section(&mut lexer, &mut emitter)?;
    emitter.resolve_patches()?;
    container::end_section(&mut emitter, memory_len_pos);

    let debug_len_pos = container::begin_section(&mut emitter, SECTION_DEBUG);
    emitter.emit_word(code_labels.len() as u64);
    for label in &code_labels {
        emitter.emit_word(label.pos);
        emitter.emit_word(label.name.len() as u64);
        emitter.emit_str(&label.name);
    }
    container::end_section(&mut emitter, debug_len_pos);

    Ok(emitter.into_bytes())
}

fn assemble_code_section(lexer: &mut Lexer, emitter: &mut Emitter) -> Result<(), AssemblyError> {
    loop {
        lexer.consume_whitespace();
        if lexer.is_at_end() {
            break;
        }
        let line = lexer.line();
        let name = lexer.parse_name()?;

        if lexer.try_consume(b':') {
            emitter.define_label(&name, line)?;
            continue;
        }
        if name == "@data" {
            break;
        }

        let info = opcodes::lookup(&name)
            .ok_or_else(|| AssemblyError::parse(line, format!("Unknown command: {}", name)))?;
        emitter.emit_byte(info.opcode);
        emit_operands(lexer, emitter, info.shape, line)?;
    }
    Ok(())
}

fn assemble_data_section(lexer: &mut Lexer, emitter: &mut Emitter) -> Result<(), AssemblyError> {
    loop {
        lexer.consume_whitespace();
        if lexer.is_at_end() {
            break;
        }
        let line = lexer.line();
        let name = lexer.parse_name()?;

        if lexer.try_consume(b':') {
            emitter.define_label(&name, line)?;
            continue;
        }

        match name.as_str() {
            "str" => {
                let s = lexer.parse_quoted_string()?;
                emitter.emit_str(&s);
            }
            "byte" => {
                let b = lexer.parse_number()? as u8;
                emitter.emit_byte(b);
            }
            "word" => {
                if lexer.peek_is_digit() {
                    let w = lexer.parse_number()?;
                    emitter.emit_word(w);
                } else {
                    let label_name = lexer.parse_name()?;
                    emitter.emit_label_ref(&label_name, line)?;
                }
            }
            _ => {
                return Err(AssemblyError::parse(
                    line,
                    format!("Unknown data command: {}", name),
                ))
            }
        }
    }
    Ok(())
}

fn emit_operands(
    lexer: &mut Lexer,
    emitter: &mut Emitter,
    shape: OperandShape,
    line: usize,
) -> Result<(), AssemblyError> {
    match shape {
        OperandShape::None => {}
        OperandShape::Reg => {
            let r = lexer.parse_register()?;
            emitter.emit_reg(r);
        }
        OperandShape::RegReg => {
            let a = lexer.parse_register()?;
            let b = lexer.parse_register()?;
            emitter.emit_regs(a, b);
        }
        OperandShape::RegByte => {
            let r = lexer.parse_register()?;
            emitter.emit_reg(r);
            let b = lexer.parse_number()? as u8;
            emitter.emit_byte(b);
        }
        OperandShape::RegWord => {
            let r = lexer.parse_register()?;
            emitter.emit_reg(r);
            if lexer.peek_is_digit() {
                let w = lexer.parse_number()?;
                emitter.emit_word(w);
            } else {
                let name = lexer.parse_name()?;
                emitter.emit_label_ref(&name, line)?;
            }
        }
        OperandShape::Byte => {
            let b = lexer.parse_number()? as u8;
            emitter.emit_byte(b);
        }
        OperandShape::WordOrLabel => {
            if lexer.peek_is_digit() {
                let w = lexer.parse_number()?;
                emitter.emit_word(w);
            } else {
                let name = lexer.parse_name()?;
                emitter.emit_label_ref(&name, line)?;
            }
        }
        OperandShape::Label => {
            let name = lexer.parse_name()?;
            emitter.emit_label_ref(&name, line)?;
        }
    }
    Ok(())
}
