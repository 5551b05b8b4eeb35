use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::Error;
use crate::model::{ApplyReport, EnvironmentSet};

/// Destination for loaded environment variables.
///
/// Implemented by [`ProcessEnv`] for the real process environment and by
/// [`MemoryEnv`] for isolated maps.
pub trait EnvironmentSetter {
    fn contains_key(&self, key: &str) -> bool;

    fn get_var(&self, key: &str) -> Option<String>;

    fn set_var(&mut self, key: &str, value: &str);

    /// Set `key` unless it is already present. Returns whether it was set.
    ///
    /// Implementations shared between threads override this so the check and
    /// the write happen under one lock.
    fn set_var_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.contains_key(key) {
            return false;
        }
        self.set_var(key, value);
        true
    }
}

impl<T: EnvironmentSetter + ?Sized> EnvironmentSetter for &mut T {
    fn contains_key(&self, key: &str) -> bool {
        (**self).contains_key(key)
    }

    fn get_var(&self, key: &str) -> Option<String> {
        (**self).get_var(key)
    }

    fn set_var(&mut self, key: &str, value: &str) {
        (**self).set_var(key, value)
    }

    fn set_var_if_absent(&mut self, key: &str, value: &str) -> bool {
        (**self).set_var_if_absent(key, value)
    }
}

/// Copy every entry of `set` into `target`.
///
/// With `overwrite` false, keys already present in `target` keep their value.
///
/// Every entry is checked before anything is written: a key that is empty or
/// contains `=` or NUL fails with [`Error::InvalidKey`], and a value
/// containing NUL fails with [`Error::InvalidValue`]. On error `target` is
/// left untouched.
pub fn apply<E: EnvironmentSetter + ?Sized>(
    set: &EnvironmentSet,
    overwrite: bool,
    target: &mut E,
) -> Result<ApplyReport, Error> {
    for entry in set {
        check_assignable(&entry.key, &entry.value)?;
    }

    let mut report = ApplyReport::default();
    for entry in set {
        if overwrite {
            target.set_var(&entry.key, &entry.value);
        } else if !target.set_var_if_absent(&entry.key, &entry.value) {
            tracing::debug!(key = %entry.key, "keeping existing value");
            report.skipped_existing += 1;
            continue;
        }

        tracing::trace!(key = %entry.key, "set variable");
        report.applied += 1;
    }

    Ok(report)
}

/// Whether the operating system can store `key=value` as an environment
/// variable.
fn check_assignable(key: &str, value: &str) -> Result<(), Error> {
    if key.is_empty() || key.contains(['=', '\0']) {
        return Err(Error::InvalidKey {
            key: key.to_owned(),
        });
    }
    if value.contains('\0') {
        return Err(Error::InvalidValue {
            key: key.to_owned(),
        });
    }
    Ok(())
}

static PROCESS_ENV_LOCK: Mutex<()> = Mutex::new(());

fn process_env_lock() -> MutexGuard<'static, ()> {
    PROCESS_ENV_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The current process environment.
///
/// Reads and writes made through this type are serialized by one
/// process-wide lock, and [`EnvironmentSetter::set_var_if_absent`] holds it
/// across the check and the write. Code that touches the environment
/// directly through [`std::env`] does not take that lock.
///
/// Pairs the operating system cannot store are dropped with a warning
/// instead of panicking; [`apply`] rejects them up front.
#[derive(Debug)]
pub struct ProcessEnv {
    _private: (),
}

impl ProcessEnv {
    /// Create a process-environment target.
    ///
    /// # Safety
    ///
    /// The caller must ensure no other threads read or write the process
    /// environment outside of `ProcessEnv` while this value is used to apply
    /// entries.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn write_locked(key: &str, value: &str) {
        if let Err(err) = check_assignable(key, value) {
            tracing::warn!(error = %err, "not setting variable");
            return;
        }
        // SAFETY: the constructor's contract rules out unsynchronized access
        // from other threads, and callers hold the process-wide lock.
        unsafe { std::env::set_var(key, value) }
    }
}

impl EnvironmentSetter for ProcessEnv {
    fn contains_key(&self, key: &str) -> bool {
        let _guard = process_env_lock();
        std::env::var_os(key).is_some()
    }

    fn get_var(&self, key: &str) -> Option<String> {
        let _guard = process_env_lock();
        std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
    }

    fn set_var(&mut self, key: &str, value: &str) {
        let _guard = process_env_lock();
        Self::write_locked(key, value);
    }

    fn set_var_if_absent(&mut self, key: &str, value: &str) -> bool {
        let _guard = process_env_lock();
        if std::env::var_os(key).is_some() {
            return false;
        }
        Self::write_locked(key, value);
        true
    }
}

/// An in-memory environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryEnv {
    vars: BTreeMap<String, String>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    ///
    /// Non-UTF-8 keys and values are converted lossily.
    pub fn from_process() -> Self {
        let _guard = process_env_lock();
        std::env::vars_os()
            .map(|(key, value)| {
                (
                    key.to_string_lossy().into_owned(),
                    value.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

impl From<BTreeMap<String, String>> for MemoryEnv {
    fn from(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }
}

impl FromIterator<(String, String)> for MemoryEnv {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

impl EnvironmentSetter for MemoryEnv {
    fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn set_var(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_owned(), value.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Entry;

    fn set_of(pairs: &[(&str, &str)]) -> EnvironmentSet {
        pairs
            .iter()
            .map(|(key, value)| Entry::new(*key, *value))
            .collect()
    }

    #[test]
    fn apply_with_overwrite_sets_every_value() {
        let mut target: MemoryEnv = [("A".to_owned(), "old".to_owned())].into_iter().collect();
        let report = apply(&set_of(&[("A", "new"), ("B", "2")]), true, &mut target)
            .expect("apply should succeed");

        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped_existing, 0);
        assert_eq!(target.get("A"), Some("new"));
        assert_eq!(target.get("B"), Some("2"));
    }

    #[test]
    fn apply_without_overwrite_keeps_existing_values() {
        let mut target: MemoryEnv = [("A".to_owned(), "from_cluster".to_owned())]
            .into_iter()
            .collect();
        let report = apply(&set_of(&[("A", "from_file"), ("B", "2")]), false, &mut target)
            .expect("apply should succeed");

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(target.get("A"), Some("from_cluster"));
        assert_eq!(target.get("B"), Some("2"));
    }

    #[test]
    fn existing_empty_value_still_counts_as_set() {
        let mut target: MemoryEnv = [("A".to_owned(), String::new())].into_iter().collect();
        apply(&set_of(&[("A", "from_file")]), false, &mut target).expect("apply should succeed");
        assert_eq!(target.get("A"), Some(""));
    }

    #[test]
    fn apply_accepts_trait_objects() {
        let mut memory = MemoryEnv::new();
        let target: &mut dyn EnvironmentSetter = &mut memory;
        apply(&set_of(&[("A", "1")]), false, target).expect("apply should succeed");
        assert_eq!(memory.get("A"), Some("1"));
    }

    #[test]
    fn nul_in_value_is_rejected_before_any_write() {
        let mut target = MemoryEnv::new();
        let set = set_of(&[("FIRST", "ok"), ("TOKEN", "a\0b")]);

        match apply(&set, true, &mut target) {
            Err(Error::InvalidValue { key }) => assert_eq!(key, "TOKEN"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(target.as_map().is_empty());
    }

    #[test]
    fn unstorable_keys_are_rejected() {
        for key in ["", "A=B", "NUL\0KEY"] {
            let mut target = MemoryEnv::new();
            match apply(&set_of(&[(key, "value")]), true, &mut target) {
                Err(Error::InvalidKey { key: rejected }) => assert_eq!(rejected, key),
                other => panic!("unexpected result for {key:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn set_var_if_absent_reports_whether_it_wrote() {
        let mut target = MemoryEnv::new();
        assert!(target.set_var_if_absent("A", "1"));
        assert!(!target.set_var_if_absent("A", "2"));
        assert_eq!(target.get("A"), Some("1"));
    }
}
