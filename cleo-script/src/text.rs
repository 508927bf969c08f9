//! Custom display strings (GXT entries) and FXT language files.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref COMMENT: Regex = Regex::new(r"//|#").unwrap();
}

/// Key/value store consulted before the game's own text tables.
#[derive(Debug, Default, Clone)]
pub struct TextTable {
    entries: HashMap<String, String>,
}

impl TextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. Returns `true` if the key was already present.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.entries.insert(key.into(), value.into()).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge FXT source: one `KEY text` entry per line, `//` and `#` start a
    /// comment. Returns how many existing entries were overwritten.
    pub fn parse_fxt(&mut self, src: &str) -> usize {
        let mut overwrites = 0;

        for line in src.lines() {
            let line = COMMENT.split(line).next().map(str::trim).unwrap_or("");
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(' ') else {
                log::warn!("Unable to find key and value in line '{}'", line);
                continue;
            };

            if self.set(key, value) {
                overwrites += 1;
            }
        }

        overwrites
    }

    pub fn load_fxt(&mut self, path: impl AsRef<Path>) -> io::Result<usize> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)?;
        let overwrites = self.parse_fxt(&src);

        if overwrites != 0 {
            log::warn!(
                "Loading of {:?} resulted in {} overwrite(s).",
                path.file_name().unwrap_or(path.as_os_str()),
                overwrites
            );
        }

        Ok(overwrites)
    }
}
