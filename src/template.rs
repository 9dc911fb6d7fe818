// Field templates: strings with embedded {path} references resolved
// against a record.

use crate::value::{Record, Value};

/// One parsed piece of a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    /// A dot-separated field path; never empty.
    Field(Vec<String>),
}

/// A parsed `{field}` / `{a.b.c}` template.
///
/// A template that is exactly one reference resolves to the referenced
/// value with its type preserved; anything else renders to a string.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template. A `{` that does not open a well-formed path
    /// reference stays literal text.
    pub fn parse(text: &str) -> Template {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            match scan_reference(&rest[open..]) {
                Some((path, consumed)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(path));
                    rest = &rest[open + consumed..];
                }
                None => {
                    literal.push('{');
                    rest = &rest[open + 1..];
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Template { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Paths referenced by this template.
    pub fn references(&self) -> impl Iterator<Item = &[String]> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(path) => Some(path.as_slice()),
            Segment::Literal(_) => None,
        })
    }

    /// Evaluate against a record. A single-reference template yields the
    /// referenced value unchanged; mixed templates yield a rendered
    /// string. Any missing reference makes the whole evaluation `None` —
    /// callers decide whether that omits a key (`map`) or drops the
    /// record (`filter_map`).
    pub fn eval(&self, record: &Record) -> Option<Value> {
        if let [Segment::Field(path)] = self.segments.as_slice() {
            return resolve(record, path).cloned();
        }
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(path) => out.push_str(&resolve(record, path)?.render()),
            }
        }
        Some(Value::String(out))
    }

    /// Substitute references into a command line: every reference is
    /// rendered (missing becomes the empty string) and shell-quoted so
    /// arbitrary content survives re-tokenisation.
    pub fn substitute_quoted(&self, record: &Record) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(path) => {
                    let rendered = resolve(record, path)
                        .map(Value::render)
                        .unwrap_or_default();
                    out.push_str(&shell_quote(&rendered));
                }
            }
        }
        out
    }
}

fn resolve<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = record.get(first)?;
    for part in rest {
        match current {
            Value::Record(nested) => current = nested.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

// Scans `{a.b.c}` at the start of `text`; returns the path and the byte
// length consumed, or None if the text there is not a valid reference.
fn scan_reference(text: &str) -> Option<(Vec<String>, usize)> {
    debug_assert!(text.starts_with('{'));
    let body_end = text.find('}')?;
    let body = &text[1..body_end];
    let mut path = Vec::new();
    for part in body.split('.') {
        if !is_identifier(part) {
            return None;
        }
        path.push(part.to_string());
    }
    Some((path, body_end + 1))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote a string for safe re-tokenisation, `shlex.quote` style: the
/// safe charset passes through, everything else is single-quoted with
/// embedded quotes spliced as `'"'"'`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let safe = s.bytes().all(|b| {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'@' | b'%' | b'+' | b'=' | b':' | b',' | b'.' | b'/' | b'-')
    });
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r#"'"'"'"#))
    }
}
