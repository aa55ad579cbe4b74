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

//! Appends bytes to the single growing container buffer, tracks the
//! label table and patch list for whichever section is currently open,
//! and resolves patches at end-of-section.

use crate::errors::AssemblyError;
use crate::label::{self, LabelEntry, LabelTable, PatchList};
use crate::lexer::Register;

pub struct Emitter {
    buf: Vec<u8>,
    start_of_section: u64,
    labels: LabelTable,
    patches: PatchList,
    last_label: String,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter {
            buf: Vec::new(),
            start_of_section: 0,
            labels: LabelTable::new(),
            patches: PatchList::new(),
            last_label: String::new(),
        }
    }

    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    /// Bytes emitted since the current section began (since the last
    /// call to `start_new_section`).
    pub fn section_len(&self) -> u64 {
        self.len() - self.start_of_section
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn emit_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub fn emit_word(&mut self, word: u64) {
        self.buf.extend_from_slice(&word.to_le_bytes());
    }

    pub fn emit_str(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn overwrite_word(&mut self, pos: u64, word: u64) {
        let pos = pos as usize;
        self.buf[pos..pos + 8].copy_from_slice(&word.to_le_bytes());
    }

    pub fn emit_reg(&mut self, reg: Register) {
        self.emit_byte(reg.index());
    }

    pub fn emit_regs(&mut self, first: Register, second: Register) {
        self.emit_byte(first.index() | (second.index() << 4));
    }

    /// Globalizes `name` against the section's current "last label",
    /// appends an 8-byte zero placeholder, and records a patch.
    pub fn emit_label_ref(&mut self, name: &str, line: usize) -> Result<(), AssemblyError> {
        let global =
            label::globalize(name, &self.last_label).map_err(|reason| AssemblyError::label(line, reason))?;
        let position = self.len();
        self.patches.push(global, position);
        self.emit_word(0);
        Ok(())
    }

    /// Globalizes `name`, records its offset (relative to the start of
    /// the current section) in the label table, and updates the
    /// section's "last label".
    pub fn define_label(&mut self, name: &str, line: usize) -> Result<(), AssemblyError> {
        let global =
            label::globalize(name, &self.last_label).map_err(|reason| AssemblyError::label(line, reason))?;
        if self.labels.contains(&global) {
            return Err(AssemblyError::label(
                line,
                format!("Duplicate label definition: {}", global),
            ));
        }
        let pos = self.len() - self.start_of_section;
        self.labels.push(global.clone(), pos);
        self.last_label = global;
        Ok(())
    }

    /// Resolves every outstanding patch against the current section's
    /// label table. An unresolved patch is a fatal assembly error.
    pub fn resolve_patches(&mut self) -> Result<(), AssemblyError> {
        for patch in self.patches.drain() {
            let target = self.labels.find(&patch.label).ok_or_else(|| {
                AssemblyError::LabelNoLine {
                    reason: format!("Label not defined: {}", patch.label),
                }
            })?;
            self.overwrite_word(patch.position, target);
        }
        Ok(())
    }

    /// The labels defined so far in the current (not yet reset) section,
    /// in definition order.
    pub fn current_labels(&self) -> &[LabelEntry] {
        self.labels.entries()
    }

    /// Closes out the current section's label table and patch list,
    /// resetting scoping for whatever section comes next. Callers that
    /// need the label set of a section for debug info must snapshot it
    /// via `current_labels` before calling this.
    pub fn start_new_section(&mut self) {
        self.start_of_section = self.len();
        self.labels.clear();
        self.last_label.clear();
    }

    pub fn patches_are_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Emitter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_word_round_trips_little_endian() {
        let mut e = Emitter::new();
        e.emit_word(0x0102030405060708);
        let bytes = e.into_bytes();
        assert_eq!(bytes, vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn overwrite_word_patches_in_place() {
        let mut e = Emitter::new();
        e.emit_byte(0xaa);
        let pos = e.len();
        e.emit_word(0);
        e.emit_byte(0xbb);
        e.overwrite_word(pos, 42);
        let bytes = e.into_bytes();
        assert_eq!(bytes[0], 0xaa);
        assert_eq!(u64::from_le_bytes(bytes[1..9].try_into().unwrap()), 42);
        assert_eq!(bytes[9], 0xbb);
    }

    #[test]
    fn emit_regs_packs_nibbles_low_then_high() {
        let mut e = Emitter::new();
        e.emit_regs(Register::A, Register::B);
        let bytes = e.into_bytes();
        assert_eq!(bytes[0], Register::A.index() | (Register::B.index() << 4));
    }

    #[test]
    fn forward_reference_resolves_at_end_of_section() {
        let mut e = Emitter::new();
        e.emit_label_ref("target", 1).unwrap();
        e.define_label("target", 2).unwrap();
        assert!(e.resolve_patches().is_ok());
        assert!(e.patches_are_empty());
        let bytes = e.into_bytes();
        assert_eq!(u64::from_le_bytes(bytes[0..8].try_into().unwrap()), 8);
    }

    #[test]
    fn unresolved_patch_is_an_error() {
        let mut e = Emitter::new();
        e.emit_label_ref("nowhere", 1).unwrap();
        assert!(e.resolve_patches().is_err());
    }

    #[test]
    fn duplicate_label_definition_is_an_error() {
        let mut e = Emitter::new();
        e.define_label("foo", 1).unwrap();
        assert!(e.define_label("foo", 2).is_err());
    }
}
