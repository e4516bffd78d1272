//! Cache key template parsing
//!
//! Templates are plain text with actions between `{{` and `}}`:
//!
//! | Action | Renders |
//! |--------|---------|
//! | `{{ .Branch }}` | metadata value `Branch` |
//! | `{{ checksum "go.sum" }}` | SHA256 of the file, hex encoded |
//! | `{{ epoch }}` | Unix timestamp in seconds |
//! | `{{ arch }}` / `{{ os }}` | build target architecture / platform |
//!
//! Functions may also be called with parentheses: `{{ checksum("go.sum") }}`.

use crate::cachekey::functions::TemplateFunction;
use crate::cachekey::Metadata;
use crate::error::{StowageError, StowageResult};
use serde_json::Value;
use std::path::Path;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied to the output unchanged
    Literal(String),
    /// Metadata variable reference (`.Name`)
    Variable(String),
    /// Built-in function call with its string arguments
    Call(TemplateFunction, Vec<String>),
}

/// A parsed cache key template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string
    pub fn parse(source: &str) -> StowageResult<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = find_close(after_open)
                .ok_or_else(|| StowageError::template(source, "unclosed action"))?;
            segments.push(parse_action(source, &after_open[..end])?);
            rest = &after_open[end + CLOSE.len()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original template text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any action calls `checksum`
    pub fn uses_checksum(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Call(TemplateFunction::Checksum, _)))
    }

    /// Render the template against metadata, resolving `checksum` paths
    /// relative to `workdir`
    pub fn render(&self, workdir: &Path, metadata: &Metadata) -> StowageResult<String> {
        let mut out = String::with_capacity(self.source.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = metadata
                        .get(name)
                        .ok_or_else(|| StowageError::UndefinedVariable(name.clone()))?;
                    out.push_str(&value_to_string(value));
                }
                Segment::Call(function, args) => out.push_str(&function.call(workdir, args)),
            }
        }

        Ok(out)
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Find the closing delimiter, skipping over quoted string literals
fn find_close(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => {
                if c == '"' || c == '`' {
                    quote = Some(c);
                } else if s[i..].starts_with(CLOSE) {
                    return Some(i);
                }
            }
        }
    }

    None
}

fn parse_action(source: &str, body: &str) -> StowageResult<Segment> {
    let body = body.trim();
    if body.is_empty() {
        return Err(StowageError::template(source, "empty action"));
    }

    if let Some(name) = body.strip_prefix('.') {
        if name.is_empty() || !name.chars().all(is_ident_char) {
            return Err(StowageError::template(
                source,
                format!("invalid variable reference {:?}", body),
            ));
        }
        return Ok(Segment::Variable(name.to_string()));
    }

    let name_end = body
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(body.len());
    let (name, rest) = body.split_at(name_end);
    if name.is_empty() {
        return Err(StowageError::template(
            source,
            format!("unexpected {:?} in action", body),
        ));
    }

    let function = TemplateFunction::lookup(name).ok_or_else(|| {
        StowageError::template(source, format!("function {:?} not defined", name))
    })?;

    let rest = rest.trim();
    let args = match rest.strip_prefix('(') {
        Some(inner) => {
            let inner = inner.strip_suffix(')').ok_or_else(|| {
                StowageError::template(source, format!("unclosed call to {}", name))
            })?;
            parse_args(source, inner, true)?
        }
        None => parse_args(source, rest, false)?,
    };

    if args.len() != function.arity() {
        return Err(StowageError::template(
            source,
            format!(
                "wrong number of args for {}: want {} got {}",
                name,
                function.arity(),
                args.len()
            ),
        ));
    }

    Ok(Segment::Call(function, args))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse string literal arguments, separated by whitespace or by commas
/// inside a parenthesized call
fn parse_args(source: &str, text: &str, comma_separated: bool) -> StowageResult<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = text.trim().chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(open) = chars.next() else {
            break;
        };

        let arg = match open {
            '"' => read_quoted(source, &mut chars)?,
            '`' => {
                let mut raw = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(c) => raw.push(c),
                        None => return Err(StowageError::template(source, "unterminated raw string")),
                    }
                }
                raw
            }
            other => {
                return Err(StowageError::template(
                    source,
                    format!("unexpected {:?} in arguments, expected a quoted string", other),
                ))
            }
        };
        args.push(arg);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if comma_separated {
            match chars.next() {
                Some(',') => continue,
                None => break,
                Some(other) => {
                    return Err(StowageError::template(
                        source,
                        format!("unexpected {:?} after argument", other),
                    ))
                }
            }
        }
    }

    Ok(args)
}

fn read_quoted(
    source: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> StowageResult<String> {
    let mut value = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(value),
            Some('\\') => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(c @ ('"' | '\\')) => value.push(c),
                Some(c) => {
                    return Err(StowageError::template(
                        source,
                        format!("unknown escape sequence \\{}", c),
                    ))
                }
                None => break,
            },
            Some(c) => value.push(c),
            None => break,
        }
    }
    Err(StowageError::template(source, "unterminated quoted string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_only() {
        let t = Template::parse("cache/my-repo").unwrap();
        assert_eq!(t.segments(), &[Segment::Literal("cache/my-repo".to_string())]);
        assert!(!t.uses_checksum());
    }

    #[test]
    fn parse_go_style_call() {
        let t = Template::parse(r#"cache/{{ checksum "go.sum" }}/x"#).unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("cache/".to_string()),
                Segment::Call(TemplateFunction::Checksum, vec!["go.sum".to_string()]),
                Segment::Literal("/x".to_string()),
            ]
        );
        assert!(t.uses_checksum());
    }

    #[test]
    fn parse_paren_style_call() {
        let t = Template::parse(r#"{{checksum("a b.lock")}}-{{ epoch() }}"#).unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Call(TemplateFunction::Checksum, vec!["a b.lock".to_string()]),
                Segment::Literal("-".to_string()),
                Segment::Call(TemplateFunction::Epoch, vec![]),
            ]
        );
    }

    #[test]
    fn parse_variable() {
        let t = Template::parse("{{ .Branch }}").unwrap();
        assert_eq!(t.segments(), &[Segment::Variable("Branch".to_string())]);
    }

    #[test]
    fn close_delimiter_inside_string() {
        let t = Template::parse(r#"{{ checksum "odd}}name" }}"#).unwrap();
        assert_eq!(
            t.segments(),
            &[Segment::Call(
                TemplateFunction::Checksum,
                vec!["odd}}name".to_string()]
            )]
        );
    }

    #[test]
    fn syntax_errors() {
        for bad in [
            "{{ checksum \"x\"",
            "{{ }}",
            "{{ nope }}",
            "{{ checksum }}",
            "{{ epoch \"x\" }}",
            "{{ checksum(\"x\" }}",
            "{{ checksum x }}",
            "{{ . }}",
            "{{ checksum \"a\\q\" }}",
        ] {
            let err = Template::parse(bad).unwrap_err();
            assert!(
                matches!(err, StowageError::Template { .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn render_undefined_variable() {
        let t = Template::parse("{{ .Missing }}").unwrap();
        let err = t.render(Path::new("/"), &Metadata::new()).unwrap_err();
        assert!(matches!(err, StowageError::UndefinedVariable(name) if name == "Missing"));
    }

    #[test]
    fn render_json_values() {
        let mut meta = Metadata::new();
        meta.insert("n".to_string(), Value::from(42));
        meta.insert("s".to_string(), Value::from("main"));
        meta.insert("z".to_string(), Value::Null);
        let t = Template::parse("{{.s}}-{{.n}}-{{.z}}").unwrap();
        assert_eq!(t.render(Path::new("/"), &meta).unwrap(), "main-42-");
    }
}
