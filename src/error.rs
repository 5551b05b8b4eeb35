use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the parser, the loaders, [`apply`] and
/// [`EnvironmentSet::try_insert`].
///
/// No variant renders the raw text of a `.env` line. [`ParseError::content`]
/// keeps it for callers that want to show it.
///
/// [`apply`]: crate::apply
/// [`EnvironmentSet::try_insert`]: crate::EnvironmentSet::try_insert
#[derive(Debug, Error)]
pub enum Error {
    #[error("env file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("I/O error{}: {source}", io_context(.path.as_ref()))]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error(transparent)]
    MalformedLine(#[from] ParseError),

    #[error("invalid key `{key}`")]
    InvalidKey { key: String },

    #[error("value of `{key}` contains a NUL byte")]
    InvalidValue { key: String },
}

impl Error {
    /// Whether this error means the requested file does not exist.
    ///
    /// Deployments that get their configuration from the orchestrator usually
    /// ship no `.env` file at all, so this case is often benign.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound { .. })
    }

    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path }
        } else {
            Self::Io {
                path: Some(path),
                source,
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

fn io_context(path: Option<&PathBuf>) -> String {
    path.map(|path| format!(" reading {}", path.display()))
        .unwrap_or_default()
}

/// A statement that could not be parsed in strict mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed line {line}, column {column}: {kind}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub kind: ParseErrorKind,
    /// Raw text of the offending statement, without its line terminator.
    pub content: String,
}

impl ParseError {
    pub(crate) fn new(line: u32, column: u32, kind: ParseErrorKind, content: &str) -> Self {
        Self {
            line,
            column,
            kind,
            content: content.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("missing `=` separator")]
    MissingSeparator,
    #[error("missing key")]
    MissingKey,
    #[error("invalid key")]
    InvalidKey,
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("unexpected characters after closing quote")]
    TrailingCharacters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_does_not_leak_line_content() {
        let err = Error::from(ParseError::new(
            3,
            12,
            ParseErrorKind::TrailingCharacters,
            "PASSWORD=\"hunter2\"oops",
        ));
        let rendered = err.to_string();
        assert_eq!(
            rendered,
            "malformed line 3, column 12: unexpected characters after closing quote"
        );
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn invalid_value_names_only_the_key() {
        let err = Error::InvalidValue {
            key: "API_TOKEN".to_owned(),
        };
        assert_eq!(err.to_string(), "value of `API_TOKEN` contains a NUL byte");
    }

    #[test]
    fn not_found_io_errors_map_to_file_not_found() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from_io("/nope/.env", source);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "env file not found: /nope/.env");
    }

    #[test]
    fn other_io_errors_keep_the_path() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Error::from_io("/etc/app/.env", source);
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "I/O error reading /etc/app/.env: denied");
    }
}
