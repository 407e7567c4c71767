// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interned element identifiers.

use rustc_hash::FxHashMap;

/// Maps element GUID strings to compact indexes so octree cells can refer to
/// elements by `u32`.
#[derive(Debug, Clone, Default)]
pub struct ElementTable {
    ids: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl ElementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of `id`, adding it if needed.
    pub fn intern(&mut self, id: &str) -> u32 {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.ids.len() as u32;
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    pub fn index_of(&self, id: &str) -> Option<u32> {
        self.index.get(id).copied()
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        self.ids.get(idx as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.ids.iter().enumerate().map(|(i, s)| (i as u32, s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut table = ElementTable::new();
        let a = table.intern("2O2Fr$t4X7Zf8NOew3FLOH");
        let b = table.intern("1hOSvn6df7F8_7GcBWlRGQ");
        assert_ne!(a, b);
        assert_eq!(table.intern("2O2Fr$t4X7Zf8NOew3FLOH"), a);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(b), Some("1hOSvn6df7F8_7GcBWlRGQ"));
        assert_eq!(table.index_of("missing"), None);
        assert_eq!(table.iter().count(), 2);
    }
}
