//! Secondary index over the base EPG: title and sub-title strings mapped to
//! start-ordered program lists. Fuzzy matching only ever consults keys of
//! this index, never the full program set.

use std::collections::HashMap;

use crate::models::{insertion_point, Program};

#[derive(Debug, Default)]
pub struct ProgramIndex {
    entries: HashMap<String, Vec<Program>>,
}

impl ProgramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a base-EPG program under its title and, when present, its
    /// sub-title.
    pub fn insert(&mut self, program: &Program) {
        self.insert_under(program.title().to_string(), program);
        if let Some(sub_title) = program.sub_title() {
            self.insert_under(sub_title.to_string(), program);
        }
    }

    fn insert_under(&mut self, key: String, program: &Program) {
        let programs = self.entries.entry(key).or_default();
        let position = insertion_point(programs, program.start);
        programs.insert(position, program.clone());
    }

    pub fn programs_for(&self, key: &str) -> &[Program] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
