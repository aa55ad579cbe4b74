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

//! Hierarchical (dotted) label scoping, the label table, and the patch
//! list used to back-fill forward references at end-of-section.

/// Expands a possibly-dotted label name into an absolute dotted path,
/// relative to `last` (the most recently *defined* label).
///
/// `label` with zero leading dots is returned unchanged. Otherwise the
/// leading dots are stripped and counted as `n`. `last` is split on `.`
/// into its dot-separated components; the result keeps the leftmost
/// `components(last) - (n - 1)` of them and appends `label`'s tail as a
/// new final component. `n == 1` therefore keeps every component of
/// `last` and nests the tail one level deeper; each additional dot walks
/// one more level up. Asking to walk past the root (`n` greater than the
/// number of components in `last`) is an error.
pub fn globalize(label: &str, last: &str) -> Result<String, String> {
    let stripped = label.trim_start_matches('.');
    let n = label.len() - stripped.len();
    if n == 0 {
        return Ok(stripped.to_string());
    }

    let components: Vec<&str> = last.split('.').collect();
    if n > components.len() {
        return Err("Label has too many dots at the beginning.".to_string());
    }
    let keep = components.len() - (n - 1);
    let prefix = components[..keep].join(".");

    Ok(format!("{}.{}", prefix, stripped))
}

/// A `{name, pos}` record, in the order labels were defined within the
/// current section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub name: String,
    pub pos: u64,
}

/// Labels defined so far in the current section. Append-only; reset
/// between sections.
#[derive(Debug, Default)]
pub struct LabelTable {
    entries: Vec<LabelEntry>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn push(&mut self, name: String, pos: u64) {
        self.entries.push(LabelEntry { name, pos });
    }

    pub fn find(&self, name: &str) -> Option<u64> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.pos)
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A pending write of an 8-byte absolute offset, to be filled in once
/// `label` is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub label: String,
    pub position: u64,
}

/// Unresolved label references recorded in the current section.
#[derive(Debug, Default)]
pub struct PatchList {
    entries: Vec<Patch>,
}

impl PatchList {
    pub fn new() -> Self {
        PatchList::default()
    }

    pub fn push(&mut self, label: String, position: u64) {
        self.entries.push(Patch { label, position });
    }

    pub fn drain(&mut self) -> Vec<Patch> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
