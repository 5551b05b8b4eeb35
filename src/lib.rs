//! Load `.env` files into an environment.
//!
//! Development setups keep configuration in a local `.env` file; deployed
//! workloads receive the same variables from their orchestrator (ConfigMaps,
//! Secrets) before the process starts. Loading with `overwrite = false`
//! makes those two coexist: variables that are already set win over the
//! file, and a missing file can be treated as benign with
//! [`Error::is_not_found`].
//!
//! [`load`] and the parser functions are pure. [`apply`] is the only place
//! that writes, and it writes through an [`EnvironmentSetter`]: a
//! [`MemoryEnv`] for isolated maps or a [`ProcessEnv`] for the real process
//! environment.
//!
//! Convenience loaders (`dotenv`, `from_path`, `from_paths`, `from_filename`)
//! mutate the process environment and are `unsafe`, because callers must
//! guarantee no concurrent process-environment access.

mod env;
mod error;
mod expand;
mod loader;
mod model;
mod parser;
mod writer;

pub use env::{EnvironmentSetter, MemoryEnv, ProcessEnv, apply};
pub use error::{Error, ParseError, ParseErrorKind};
pub use loader::{EnvLoader, dotenv, from_filename, from_path, from_paths, load, load_str};
pub use model::{
    ApplyReport, Entry, EnvironmentSet, KeyPattern, LoadOptions, LoadReport, ParseOptions,
    SubstitutionMode,
};
pub use parser::{
    parse_bytes, parse_bytes_with, parse_reader, parse_reader_with, parse_str, parse_str_with,
};
pub use writer::write_env;
