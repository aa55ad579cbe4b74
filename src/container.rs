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

//! The `.soil` container: magic bytes followed by a sequence of typed,
//! length-prefixed sections. Readers must skip section types they don't
//! recognize using the length field; writers go through the same
//! begin/end helpers the assembler driver uses for every section.

use crate::emitter::Emitter;
use crate::errors::ContainerError;
use crate::label::LabelEntry;

pub const MEMORY_SIZE: u64 = 0x1000000;

pub const SECTION_CODE: u8 = 0;
pub const SECTION_MEMORY: u8 = 1;
pub const SECTION_DEBUG: u8 = 3;

const MAGIC: &[u8; 4] = b"soil";

/// Writes the container magic.
pub fn write_magic(emitter: &mut Emitter) {
    emitter.emit_str("soil");
}

/// Writes a section's type byte and a zero length placeholder, then
/// resets the emitter's section-relative bookkeeping. Returns the
/// placeholder's position, to be passed to `end_section`.
pub fn begin_section(emitter: &mut Emitter, section_type: u8) -> u64 {
    emitter.emit_byte(section_type);
    let len_pos = emitter.len();
    emitter.emit_word(0);
    emitter.start_new_section();
    len_pos
}

/// Patches the length placeholder from `begin_section` with the number
/// of bytes emitted since.
pub fn end_section(emitter: &mut Emitter, len_pos: u64) {
    emitter.overwrite_word(len_pos, emitter.section_len());
}

/// A decoded container: the bytecode buffer, the bytes to preload into
/// memory at address 0, and whatever debug labels were carried along.
#[derive(Debug, Clone, Default)]
pub struct Container {
    pub code: Vec<u8>,
    pub initial_memory: Vec<u8>,
    pub debug_labels: Vec<LabelEntry>,
}

impl Container {
    pub fn parse(bytes: &[u8]) -> Result<Container, ContainerError> {
        if bytes.len() < MAGIC.len() || &bytes[0..MAGIC.len()] != MAGIC {
            return Err(ContainerError::BadMagic);
        }

        let mut container = Container::default();
        let mut pos = MAGIC.len();

        while pos < bytes.len() {
            let section_type = read_u8(bytes, pos)?;
            pos += 1;
            let len = read_u64(bytes, pos)?;
            pos += 8;

            if section_type == SECTION_MEMORY && len >= MEMORY_SIZE {
                return Err(ContainerError::MemoryTooLarge {
                    len,
                    memory_size: MEMORY_SIZE,
                });
            }

            let remaining = (bytes.len() - pos) as u64;
            if len > remaining {
                return Err(ContainerError::Truncated {
                    expected: len,
                    found: remaining,
                });
            }
            let payload = &bytes[pos..pos + len as usize];

            match section_type {
                SECTION_CODE => container.code = payload.to_vec(),
                SECTION_MEMORY => container.initial_memory = payload.to_vec(),
                SECTION_DEBUG => container.debug_labels = parse_debug_info(payload)?,
                _ => {}
            }

            pos += len as usize;
        }

        Ok(container)
    }
}

fn parse_debug_info(payload: &[u8]) -> Result<Vec<LabelEntry>, ContainerError> {
    let num_labels = read_u64(payload, 0)?;
    let mut pos = 8usize;
    let mut labels = Vec::with_capacity(num_labels as usize);
    for _ in 0..num_labels {
        let label_pos = read_u64(payload, pos)?;
        pos += 8;
        let name_len = read_u64(payload, pos)?;
        pos += 8;
        let end = pos + name_len as usize;
        if end > payload.len() {
            return Err(ContainerError::Truncated {
                expected: name_len,
                found: (payload.len() - pos) as u64,
            });
        }
        let name = String::from_utf8_lossy(&payload[pos..end]).into_owned();
        pos = end;
        labels.push(LabelEntry { name, pos: label_pos });
    }
    Ok(labels)
}

fn read_u8(bytes: &[u8], pos: usize) -> Result<u8, ContainerError> {
    bytes.get(pos).copied().ok_or(ContainerError::Truncated {
        expected: 1,
        found: 0,
    })
}

fn read_u64(bytes: &[u8], pos: usize) -> Result<u64, ContainerError> {
    let slice = bytes
        .get(pos..pos + 8)
        .ok_or(ContainerError::Truncated {
            expected: 8,
            found: bytes.len().saturating_sub(pos) as u64,
        })?;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}
