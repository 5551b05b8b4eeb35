use std::path::{Path, PathBuf};

use crate::env::{EnvironmentSetter, MemoryEnv, ProcessEnv, apply};
use crate::error::Error;
use crate::expand::expand_set;
use crate::model::{
    EnvironmentSet, KeyPattern, LoadOptions, LoadReport, ParseOptions, SubstitutionMode,
};
use crate::parser::{ValueForm, parse_str_with, parse_str_with_source};

const DEFAULT_FILE: &str = ".env";

/// Read and parse one env file without touching any environment.
///
/// `options.overwrite` is ignored here; pass it to [`apply`].
pub fn load(path: impl AsRef<Path>, options: &LoadOptions) -> Result<EnvironmentSet, Error> {
    EnvLoader::new()
        .path(path)
        .parse_options(options.parse)
        .overwrite(options.overwrite)
        .parse()
}

/// Parse raw env-file content without touching any environment.
pub fn load_str(content: &str, options: &LoadOptions) -> Result<EnvironmentSet, Error> {
    parse_str_with(content, &options.parse)
}

/// Load `.env` from the current working directory into the process
/// environment, keeping variables that are already set.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn dotenv() -> Result<LoadReport, Error> {
    unsafe { from_filename(DEFAULT_FILE) }
}

/// Load a `.env` file from a specific path into the process environment.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn from_path(path: impl AsRef<Path>) -> Result<LoadReport, Error> {
    let mut target = unsafe { ProcessEnv::new() };
    EnvLoader::new().path(path).load(&mut target)
}

/// Load multiple `.env` files into the process environment. Later files win.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn from_paths<I, P>(paths: I) -> Result<LoadReport, Error>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut target = unsafe { ProcessEnv::new() };
    EnvLoader::new().paths(paths).load(&mut target)
}

/// Load a dotenv file by filename from the current working directory.
///
/// # Safety
///
/// Mutates the process environment; see [`ProcessEnv::new`].
pub unsafe fn from_filename(name: &str) -> Result<LoadReport, Error> {
    unsafe { from_path(PathBuf::from(name)) }
}

/// Builder-style dotenv loader.
///
/// Files are merged in the order they were added, so later files win.
/// With no paths configured the loader reads `.env`.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    paths: Vec<PathBuf>,
    required: bool,
    search_upward: bool,
    overwrite: bool,
    parse: ParseOptions,
    substitution_mode: SubstitutionMode,
}

impl EnvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.paths
            .extend(paths.into_iter().map(|path| path.as_ref().to_path_buf()));
        self
    }

    /// Whether a missing file is an error. When false, missing files are
    /// skipped.
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Look for relative paths in the working directory and then in each of
    /// its parents.
    pub fn search_upward(mut self, search_upward: bool) -> Self {
        self.search_upward = search_upward;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.parse.strict = strict;
        self
    }

    pub fn key_pattern(mut self, key_pattern: KeyPattern) -> Self {
        self.parse.key_pattern = key_pattern;
        self
    }

    pub fn inline_comments(mut self, inline_comments: bool) -> Self {
        self.parse.inline_comments = inline_comments;
        self
    }

    pub fn escapes(mut self, escapes: bool) -> Self {
        self.parse.escapes = escapes;
        self
    }

    pub fn parse_options(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }

    pub fn substitution_mode(mut self, substitution_mode: SubstitutionMode) -> Self {
        self.substitution_mode = substitution_mode;
        self
    }

    /// Parse every configured file into one set.
    ///
    /// Placeholders, when enabled, resolve only against the files themselves.
    pub fn parse(&self) -> Result<EnvironmentSet, Error> {
        self.parse_against(&MemoryEnv::new())
    }

    /// Parse every configured file, resolving placeholders the way
    /// [`EnvLoader::load`] would against `target`. `target` is not modified.
    pub fn parse_against<E>(&self, target: &E) -> Result<EnvironmentSet, Error>
    where
        E: EnvironmentSetter + ?Sized,
    {
        let (mut set, _) = self.collect_entries()?;
        self.apply_substitution(&mut set, target);
        Ok(set)
    }

    /// Parse every configured file and apply the result to `target`.
    pub fn load<E>(&self, target: &mut E) -> Result<LoadReport, Error>
    where
        E: EnvironmentSetter + ?Sized,
    {
        let (mut set, files_read) = self.collect_entries()?;
        self.apply_substitution(&mut set, &*target);

        let applied = apply(&set, self.overwrite, target)?;
        Ok(LoadReport {
            loaded: applied.applied,
            skipped_existing: applied.skipped_existing,
            skipped_lines: set.skipped(),
            files_read,
        })
    }

    fn collect_entries(&self) -> Result<(EnvironmentSet, usize), Error> {
        let form = match self.substitution_mode {
            SubstitutionMode::Disabled => ValueForm::Literal,
            SubstitutionMode::Expand => ValueForm::Template,
        };
        let mut merged = EnvironmentSet::new();
        let mut files_read = 0usize;

        for path in self.effective_paths() {
            let path = self.resolve_path(&path);
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    let err = Error::from_io(&path, err);
                    if !self.required && err.is_not_found() {
                        tracing::debug!(path = %path.display(), "optional env file not found");
                        continue;
                    }
                    return Err(err);
                }
            };
            files_read += 1;

            let content = std::str::from_utf8(&bytes)?;
            let parsed = parse_str_with_source(content, Some(&path), &self.parse, form)?;
            tracing::debug!(
                path = %path.display(),
                entries = parsed.len(),
                skipped = parsed.skipped(),
                "read env file"
            );
            merged.merge(parsed);
        }

        Ok((merged, files_read))
    }

    fn apply_substitution<E>(&self, set: &mut EnvironmentSet, target: &E)
    where
        E: EnvironmentSetter + ?Sized,
    {
        if self.substitution_mode == SubstitutionMode::Expand {
            expand_set(set, target, self.overwrite);
        }
    }

    fn effective_paths(&self) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![PathBuf::from(DEFAULT_FILE)]
        } else {
            self.paths.clone()
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if !self.search_upward || path.is_absolute() {
            return path.to_path_buf();
        }

        let Ok(cwd) = std::env::current_dir() else {
            return path.to_path_buf();
        };
        cwd.ancestors()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| path.to_path_buf())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            required: true,
            search_upward: false,
            overwrite: false,
            parse: ParseOptions::default(),
            substitution_mode: SubstitutionMode::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_str_honors_lenient_option() {
        let options = LoadOptions::new().strict(false);
        let set = load_str("GOOD=1\nbad line\n", &options).expect("lenient load");
        assert_eq!(set.get("GOOD"), Some("1"));
        assert_eq!(set.skipped(), 1);
    }

    #[test]
    fn substitution_reads_target_without_mutating_it() {
        let target: MemoryEnv = [("BASE".to_owned(), "/opt".to_owned())].into_iter().collect();
        let loader = EnvLoader::new().substitution_mode(SubstitutionMode::Expand);

        let mut set = EnvironmentSet::new();
        set.insert(crate::model::Entry::new("BIN", "${BASE}/bin"));
        loader.apply_substitution(&mut set, &target);

        assert_eq!(set.get("BIN"), Some("/opt/bin"));
        assert!(!target.contains_key("BIN"));
    }
}
