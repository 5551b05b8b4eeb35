//! `$VAR` and `${VAR}` expansion over a parsed set.
//!
//! Values reach this module in template form (see `parser::ValueForm`):
//! `\x` stands for a literal `x` and a bare `$` may start a placeholder.

use std::collections::HashMap;

use crate::env::EnvironmentSetter;
use crate::model::EnvironmentSet;

/// Replace every value in `set` with its expansion.
///
/// A name resolves to the entry of the same key when the set has one, or to
/// `target` otherwise. With `overwrite` false, a key that `target` already
/// holds resolves to the target's value, since that is the value the process
/// will end up with. Unknown names and names that take part in a cycle are
/// left verbatim.
pub(crate) fn expand_set<E>(set: &mut EnvironmentSet, target: &E, overwrite: bool)
where
    E: EnvironmentSetter + ?Sized,
{
    let expanded: Vec<String> = {
        let mut expander = Expander {
            set: &*set,
            target,
            overwrite,
            progress: HashMap::new(),
        };
        set.keys()
            .map(|key| expander.value_of(key).unwrap_or_default())
            .collect()
    };

    for (entry, value) in set.entries_mut().iter_mut().zip(expanded) {
        entry.value = value;
    }
}

enum Progress {
    Expanding,
    Done(String),
}

struct Expander<'a, E: ?Sized> {
    set: &'a EnvironmentSet,
    target: &'a E,
    overwrite: bool,
    progress: HashMap<&'a str, Progress>,
}

impl<'a, E> Expander<'a, E>
where
    E: EnvironmentSetter + ?Sized,
{
    /// Final value of `name`, or `None` when it is undefined or is still
    /// being expanded further up the stack.
    fn value_of(&mut self, name: &str) -> Option<String> {
        let set = self.set;
        let Some(entry) = set.get_entry(name) else {
            return self.target.get_var(name);
        };
        if !self.overwrite
            && let Some(existing) = self.target.get_var(name)
        {
            return Some(existing);
        }

        match self.progress.get(name) {
            Some(Progress::Done(value)) => return Some(value.clone()),
            Some(Progress::Expanding) => return None,
            None => {}
        }

        let key = entry.key.as_str();
        self.progress.insert(key, Progress::Expanding);
        let value = expand_template(&entry.value, |name, token| {
            self.value_of(name).unwrap_or_else(|| token.to_owned())
        });
        self.progress.insert(key, Progress::Done(value.clone()));
        Some(value)
    }
}

/// Expand placeholders in a template-form value. `\x` yields `x`.
fn expand_template<F>(input: &str, mut resolve: F) -> String
where
    F: FnMut(&str, &str) -> String,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find(['\\', '$']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if let Some(escaped) = tail.strip_prefix('\\') {
            match escaped.chars().next() {
                Some(ch) => {
                    out.push(ch);
                    rest = &escaped[ch.len_utf8()..];
                }
                None => {
                    out.push('\\');
                    rest = escaped;
                }
            }
            continue;
        }

        match placeholder(tail) {
            Some((name, token_len)) => {
                out.push_str(&resolve(name, &tail[..token_len]));
                rest = &tail[token_len..];
            }
            None => {
                out.push('$');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Name and byte length of the placeholder at the start of `token`, which
/// begins with `$`.
fn placeholder(token: &str) -> Option<(&str, usize)> {
    let after = &token[1..];

    if let Some(braced) = after.strip_prefix('{') {
        let close = braced.find('}')?;
        let name = &braced[..close];
        if name.is_empty() || !name.chars().all(is_braced_name_char) {
            return None;
        }
        return Some((name, close + 3));
    }

    let mut chars = after.char_indices();
    let (_, first) = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let len = chars
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(after.len());
    Some((&after[..len], len + 1))
}

fn is_braced_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MemoryEnv;
    use crate::model::Entry;

    fn expand_with(input: &str, vars: &[(&str, &str)]) -> String {
        expand_template(input, |name, token| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_owned())
                .unwrap_or_else(|| token.to_owned())
        })
    }

    fn template_set(pairs: &[(&str, &str)]) -> EnvironmentSet {
        pairs
            .iter()
            .map(|(key, value)| Entry::new(*key, *value))
            .collect()
    }

    #[test]
    fn expands_braced_and_bare_placeholders() {
        let vars = [("HOST", "db"), ("PORT", "5432")];
        assert_eq!(expand_with("${HOST}:$PORT/app", &vars), "db:5432/app");
        assert_eq!(expand_with("$HOST-x", &vars), "db-x");
    }

    #[test]
    fn keeps_unknown_and_incomplete_placeholders() {
        assert_eq!(expand_with("$ ${ ${} $1 ${OPEN", &[]), "$ ${ ${} $1 ${OPEN");
        assert_eq!(expand_with("${MISSING}-$OTHER", &[]), "${MISSING}-$OTHER");
        assert_eq!(expand_with("trailing$", &[]), "trailing$");
    }

    #[test]
    fn escaped_dollars_and_backslashes_are_literal() {
        let vars = [("HOME", "/root")];
        assert_eq!(expand_with("\\$HOME", &vars), "$HOME");
        assert_eq!(expand_with("\\\\$HOME", &vars), "\\/root");
        assert_eq!(expand_with("caf\\é", &vars), "café");
    }

    #[test]
    fn entries_resolve_forward_references() {
        let mut set = template_set(&[("URL", "${HOST}:$PORT"), ("HOST", "db"), ("PORT", "5432")]);
        expand_set(&mut set, &MemoryEnv::new(), false);
        assert_eq!(set.get("URL"), Some("db:5432"));
    }

    #[test]
    fn cycles_stay_verbatim() {
        let mut set = template_set(&[("A", "x${B}"), ("B", "y${A}"), ("SELF", "$SELF!")]);
        expand_set(&mut set, &MemoryEnv::new(), false);
        assert_eq!(set.get("A"), Some("xy${A}"));
        assert_eq!(set.get("B"), Some("y${A}"));
        assert_eq!(set.get("SELF"), Some("$SELF!"));
    }

    #[test]
    fn existing_target_value_wins_unless_overwriting() {
        let target: MemoryEnv = [("HOST".to_owned(), "cluster-db".to_owned())]
            .into_iter()
            .collect();

        let mut kept = template_set(&[("HOST", "localhost"), ("URL", "pg://$HOST")]);
        expand_set(&mut kept, &target, false);
        assert_eq!(kept.get("URL"), Some("pg://cluster-db"));

        let mut replaced = template_set(&[("HOST", "localhost"), ("URL", "pg://$HOST")]);
        expand_set(&mut replaced, &target, true);
        assert_eq!(replaced.get("URL"), Some("pg://localhost"));
    }
}
