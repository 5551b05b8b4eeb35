use std::borrow::Cow;
use std::io::BufRead;
use std::path::Path;

use crate::error::{Error, ParseError, ParseErrorKind};
use crate::model::{Entry, EnvironmentSet, ParseOptions};

/// Parse dotenv entries from UTF-8 text with the default options.
pub fn parse_str(input: &str) -> Result<EnvironmentSet, Error> {
    parse_str_with(input, &ParseOptions::default())
}

/// Parse dotenv entries from UTF-8 text.
pub fn parse_str_with(input: &str, options: &ParseOptions) -> Result<EnvironmentSet, Error> {
    parse_str_with_source(input, None, options, ValueForm::Literal).map_err(Error::from)
}

/// Parse dotenv entries from UTF-8 bytes with the default options.
pub fn parse_bytes(input: &[u8]) -> Result<EnvironmentSet, Error> {
    parse_bytes_with(input, &ParseOptions::default())
}

/// Parse dotenv entries from UTF-8 bytes.
pub fn parse_bytes_with(input: &[u8], options: &ParseOptions) -> Result<EnvironmentSet, Error> {
    let text = std::str::from_utf8(input)?;
    parse_str_with(text, options)
}

/// Parse dotenv entries from a buffered reader with the default options.
pub fn parse_reader<R: BufRead>(reader: R) -> Result<EnvironmentSet, Error> {
    parse_reader_with(reader, &ParseOptions::default())
}

/// Parse dotenv entries from a buffered reader.
///
/// The reader is drained completely before parsing starts.
pub fn parse_reader_with<R: BufRead>(
    mut reader: R,
    options: &ParseOptions,
) -> Result<EnvironmentSet, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    parse_bytes_with(&buf, options)
}

/// How parsed values are represented.
///
/// `Template` keeps values ready for `$VAR` expansion: a literal `\` is
/// stored as `\\` and a literal `$` as `\$`, while bare `$` starts a
/// placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueForm {
    Literal,
    Template,
}

pub(crate) fn parse_str_with_source(
    input: &str,
    source: Option<&Path>,
    options: &ParseOptions,
    form: ValueForm,
) -> Result<EnvironmentSet, ParseError> {
    let normalized = normalize_newlines(input);
    let input = normalized.as_ref();

    let mut set = EnvironmentSet::new();
    let mut offset = 0usize;
    let mut line_num = 1u32;

    while offset < input.len() {
        let statement_end = statement_end(&input[offset..], options) + offset;
        let statement = &input[offset..statement_end];

        match parse_statement(statement, line_num, source, options, form) {
            Ok(Some(entry)) => {
                set.insert(entry);
            }
            Ok(None) => {}
            Err(err) if !options.strict => {
                tracing::debug!(
                    line = err.line,
                    kind = %err.kind,
                    source = ?source,
                    "skipping malformed line"
                );
                set.record_skipped();
            }
            Err(err) => return Err(err),
        }

        line_num += statement.matches('\n').count() as u32 + 1;
        offset = statement_end + 1;
    }

    Ok(set)
}

fn normalize_newlines(input: &str) -> Cow<'_, str> {
    if !input.contains('\r') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\r' {
            out.push('\n');
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            continue;
        }
        out.push(ch);
    }

    Cow::Owned(out)
}

/// Byte length of the statement at the start of `rest`, excluding its
/// terminating newline.
///
/// A statement is one physical line unless its value opens a quote that is
/// closed on a later line and followed only by whitespace or a comment. Any
/// other quote ends the statement at the first newline, so a lenient parse
/// drops only that line.
fn statement_end(rest: &str, options: &ParseOptions) -> usize {
    let line_end = rest.find('\n').unwrap_or(rest.len());
    let line = &rest[..line_end];

    let Some(eq_idx) = line.find('=') else {
        return line_end;
    };
    if line.trim_start().starts_with('#') {
        return line_end;
    }

    let value = &line[eq_idx + 1..];
    let value_start = eq_idx + 1 + (value.len() - value.trim_start().len());
    let Some(quote) = rest[value_start..]
        .chars()
        .next()
        .filter(|ch| *ch == '"' || *ch == '\'')
    else {
        return line_end;
    };

    let body_start = value_start + 1;
    let Some(close) = find_closing_quote(&rest[body_start..], quote, options.escapes) else {
        return line_end;
    };

    let after_close = body_start + close + quote.len_utf8();
    let close_line_end = rest[after_close..]
        .find('\n')
        .map(|idx| after_close + idx)
        .unwrap_or(rest.len());
    if close_line_end <= line_end || !is_blank_or_comment(&rest[after_close..close_line_end]) {
        return line_end;
    }
    close_line_end
}

fn is_blank_or_comment(tail: &str) -> bool {
    let tail = tail.trim_start();
    tail.is_empty() || tail.starts_with('#')
}

/// Byte index of the closing `quote` in `body`, which starts just after the
/// opening quote.
fn find_closing_quote(body: &str, quote: char, escapes: bool) -> Option<usize> {
    let honor_backslash = quote == '"' && escapes;
    let mut escaped = false;
    for (idx, ch) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if honor_backslash && ch == '\\' {
            escaped = true;
            continue;
        }
        if ch == quote {
            return Some(idx);
        }
    }
    None
}

fn parse_statement(
    statement: &str,
    line_num: u32,
    source: Option<&Path>,
    options: &ParseOptions,
    form: ValueForm,
) -> Result<Option<Entry>, ParseError> {
    let mut working = statement.trim_start();
    if working.is_empty() || working.starts_with('#') {
        return Ok(None);
    }

    if let Some(rest) = working.strip_prefix("export")
        && rest
            .chars()
            .next()
            .map(|ch| ch.is_whitespace())
            .unwrap_or(false)
    {
        working = rest.trim_start();
    }

    let key_column = column_of(statement, working);
    let error = |column: u32, kind: ParseErrorKind| {
        ParseError::new(line_num, column, kind, statement)
    };

    let Some(eq_idx) = working.find('=') else {
        let column = key_column + working.chars().count() as u32;
        return Err(error(column, ParseErrorKind::MissingSeparator));
    };

    let key = working[..eq_idx].trim_end();
    if key.is_empty() {
        return Err(error(key_column, ParseErrorKind::MissingKey));
    }
    if !options.key_pattern.matches(key) {
        return Err(error(key_column, ParseErrorKind::InvalidKey));
    }

    let raw_value = &working[eq_idx + 1..];
    let value_input = raw_value.trim_start();
    let value_column = column_of(statement, value_input);
    let value = match value_input.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            parse_quoted(value_input, quote, options, form).map_err(|(offset, kind)| {
                error(value_column + offset, kind)
            })?
        }
        _ => parse_unquoted(raw_value, options, form),
    };

    Ok(Some(Entry {
        key: key.to_owned(),
        value,
        source: source.map(Path::to_path_buf),
        line: line_num,
    }))
}

/// 1-based column of `tail` within `statement`, where `tail` is a suffix.
fn column_of(statement: &str, tail: &str) -> u32 {
    let prefix = &statement[..statement.len() - tail.len()];
    let last_line = prefix.rsplit('\n').next().unwrap_or(prefix);
    last_line.chars().count() as u32 + 1
}

fn parse_unquoted(raw: &str, options: &ParseOptions, form: ValueForm) -> String {
    let value = if options.inline_comments {
        truncate_inline_comment(raw)
    } else {
        raw
    };
    let value = value.trim();

    match form {
        ValueForm::Literal => value.to_owned(),
        ValueForm::Template => {
            let mut out = String::with_capacity(value.len());
            let mut chars = value.chars().peekable();
            while let Some(ch) = chars.next() {
                match ch {
                    '\\' if chars.peek() == Some(&'$') => {
                        chars.next();
                        out.push_str("\\$");
                    }
                    '\\' => out.push_str("\\\\"),
                    _ => out.push(ch),
                }
            }
            out
        }
    }
}

fn truncate_inline_comment(raw: &str) -> &str {
    let mut prev_is_space = false;
    for (idx, ch) in raw.char_indices() {
        if ch == '#' && prev_is_space {
            return &raw[..idx];
        }
        prev_is_space = ch.is_whitespace();
    }
    raw
}

/// Parse a value starting with `quote`. Errors carry the 0-based column
/// offset of the problem within `input`.
fn parse_quoted(
    input: &str,
    quote: char,
    options: &ParseOptions,
    form: ValueForm,
) -> Result<String, (u32, ParseErrorKind)> {
    let body = &input[1..];
    let Some(close) = find_closing_quote(body, quote, options.escapes) else {
        return Err((0, ParseErrorKind::UnterminatedQuote));
    };

    let tail = &body[close + 1..];
    if !is_blank_or_comment(tail) {
        let offset = input.len() - tail.trim_start().len();
        return Err((input[..offset].chars().count() as u32, ParseErrorKind::TrailingCharacters));
    }

    let content = &body[..close];
    let value = if quote == '"' && options.escapes {
        unescape_double_quoted(content, form)
    } else {
        let mut out = String::with_capacity(content.len());
        for ch in content.chars() {
            // Only double-quoted values expand placeholders.
            if quote == '\'' {
                push_literal(&mut out, ch, form);
            } else {
                push_expandable(&mut out, ch, form);
            }
        }
        out
    };

    Ok(value)
}

fn unescape_double_quoted(content: &str, form: ValueForm) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            push_expandable(&mut out, ch, form);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(escaped @ ('\\' | '"' | '$')) => push_literal(&mut out, escaped, form),
            Some(other) => {
                push_literal(&mut out, '\\', form);
                push_literal(&mut out, other, form);
            }
            None => push_literal(&mut out, '\\', form),
        }
    }
    out
}

/// Push a character that must never start a placeholder.
fn push_literal(out: &mut String, ch: char, form: ValueForm) {
    if form == ValueForm::Template && (ch == '\\' || ch == '$') {
        out.push('\\');
    }
    out.push(ch);
}

/// Push a character where a bare `$` may start a placeholder.
fn push_expandable(out: &mut String, ch: char, form: ValueForm) {
    if ch == '$' {
        out.push(ch);
    } else {
        push_literal(out, ch, form);
    }
}
