use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::Error;

/// A parsed `KEY=VALUE` entry from a `.env` file or input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub source: Option<PathBuf>,
    /// 1-based line on which the statement starts.
    pub line: u32,
}

impl Entry {
    /// Create an entry that did not come from a file.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source: None,
            line: 0,
        }
    }
}

/// Ordered entries from one load, deduplicated by key.
///
/// Inserting a key that is already present replaces the value in place, so
/// the last write wins while the key keeps the position of its first
/// occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentSet {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    skipped: usize,
}

impl EnvironmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of malformed lines dropped while building this set in lenient
    /// mode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_entry(key).map(|entry| entry.value.as_str())
    }

    pub fn get_entry(&self, key: &str) -> Option<&Entry> {
        self.index.get(key).map(|idx| &self.entries[*idx])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    /// Insert an entry, returning the one it replaced.
    ///
    /// The key is not validated; use [`EnvironmentSet::try_insert`] for keys
    /// that did not come from the parser.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        if let Some(existing_idx) = self.index.get(&entry.key).copied() {
            return Some(std::mem::replace(&mut self.entries[existing_idx], entry));
        }

        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
        None
    }

    /// Insert a key/value pair after checking the key against
    /// [`KeyPattern::Identifier`].
    pub fn try_insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<Entry>, Error> {
        let key = key.into();
        if !KeyPattern::Identifier.matches(&key) {
            return Err(Error::InvalidKey { key });
        }
        Ok(self.insert(Entry::new(key, value)))
    }

    /// Merge `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: EnvironmentSet) {
        self.skipped += other.skipped;
        for entry in other.entries {
            self.insert(entry);
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect()
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect()
    }

    pub(crate) fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }
}

impl FromIterator<Entry> for EnvironmentSet {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Entry> for EnvironmentSet {
    fn extend<I: IntoIterator<Item = Entry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl IntoIterator for EnvironmentSet {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a EnvironmentSet {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Summary of [`EnvLoader::load`](crate::EnvLoader::load).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped_existing: usize,
    pub skipped_lines: usize,
    pub files_read: usize,
}

/// Summary of [`apply`](crate::apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped_existing: usize,
}

/// Variable expansion behavior for loader values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    /// Keep values as parsed with no expansion.
    #[default]
    Disabled,
    /// Expand `$VAR` and `${VAR}` placeholders.
    Expand,
}

/// Which key names the parser accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPattern {
    /// Shell identifiers: `[A-Za-z_][A-Za-z0-9_]*`.
    #[default]
    Identifier,
    /// `[A-Za-z0-9_.-]+`, for tools that use dotted or dashed keys.
    Extended,
}

impl KeyPattern {
    pub fn matches(self, key: &str) -> bool {
        let mut chars = key.chars();
        let Some(first) = chars.next() else {
            return false;
        };

        match self {
            Self::Identifier => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            }
            Self::Extended => key.chars().all(is_extended_key_char),
        }
    }
}

fn is_extended_key_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-'
}

/// Parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fail on malformed lines instead of skipping them.
    pub strict: bool,
    pub key_pattern: KeyPattern,
    /// Truncate unquoted values at a `#` preceded by whitespace.
    pub inline_comments: bool,
    /// Interpret backslash escapes inside double quotes.
    pub escapes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: true,
            key_pattern: KeyPattern::Identifier,
            inline_comments: true,
            escapes: true,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn key_pattern(mut self, key_pattern: KeyPattern) -> Self {
        self.key_pattern = key_pattern;
        self
    }

    pub fn inline_comments(mut self, inline_comments: bool) -> Self {
        self.inline_comments = inline_comments;
        self
    }

    pub fn escapes(mut self, escapes: bool) -> Self {
        self.escapes = escapes;
        self
    }
}

/// Options for [`load`](crate::load) and [`load_str`](crate::load_str).
///
/// `overwrite` is not used while parsing; it travels with the options so the
/// caller can hand it to [`apply`](crate::apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub overwrite: bool,
    pub parse: ParseOptions,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.parse.strict = strict;
        self
    }

    pub fn parse_options(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }
}
