use std::fmt::Write as _;
use std::io::Write;

use crate::model::{EnvironmentSet, KeyPattern};

impl EnvironmentSet {
    /// Render the set as `.env` text, one `KEY=VALUE` line per entry.
    ///
    /// Parsing the output with the default options yields the same mapping
    /// as long as every key is a [`KeyPattern::Identifier`]. Other keys are
    /// written as they are and logged at `warn`; reading them back needs
    /// [`KeyPattern::Extended`].
    pub fn to_env_string(&self) -> String {
        let mut out = String::new();
        for entry in self {
            if !KeyPattern::Identifier.matches(&entry.key) {
                tracing::warn!(key = %entry.key, "key needs the extended key pattern to reload");
            }
            let _ = writeln!(out, "{}={}", entry.key, quote_value(&entry.value));
        }
        out
    }
}

/// Write `set` in `.env` format to `writer`.
pub fn write_env<W: Write>(set: &EnvironmentSet, mut writer: W) -> std::io::Result<()> {
    writer.write_all(set.to_env_string().as_bytes())?;
    writer.flush()
}

fn quote_value(value: &str) -> String {
    if value.chars().all(is_bare_char) {
        return value.to_owned();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn is_bare_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '/' | ':' | '@' | ',' | '+' | '-')
}
