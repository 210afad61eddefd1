//! Approximate declaration lookup in raw source text.
//!
//! This is a keyword search, not a parse: overloads and declarations in
//! comments or strings can produce the wrong hit.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static DEFINITION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:class|interface|object|fun)\s+(\w+)").expect("valid regex"));

/// Zero based line and UTF-16 column, as editors count them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// Half open range: `end` points just past the last character.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextRange {
    pub start: Position,
    pub end: Position,
}

pub fn position_at(content: &str, offset: usize) -> Position {
    let offset = offset.min(content.len());
    let before = &content[..floor_char_boundary(content, offset)];
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    Position {
        line: before.matches('\n').count() as u32,
        character: before[line_start..].encode_utf16().count() as u32,
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Byte span of the first declared identifier equal to `name`, together
/// with the byte offset of the declaring keyword.
fn find_declaration(content: &str, name: &str) -> Option<(usize, std::ops::Range<usize>)> {
    DEFINITION_PATTERN.captures_iter(content).find_map(|caps| {
        let ident = caps.get(1)?;
        if ident.as_str() != name {
            return None;
        }
        let keyword_start = caps.get(0)?.start();
        Some((keyword_start, ident.range()))
    })
}

pub fn find_declaration_range(content: &str, name: &str) -> Option<TextRange> {
    let (_, ident) = find_declaration(content, name)?;
    Some(TextRange {
        start: position_at(content, ident.start),
        end: position_at(content, ident.end),
    })
}

/// The `/** ... */` block directly above the declaration of `name`, with
/// comment markers removed. Annotation lines between the comment and the
/// declaration are skipped.
pub fn find_declaration_comment(content: &str, name: &str) -> Option<String> {
    let (keyword_start, _) = find_declaration(content, name)?;
    let line_start = content[..keyword_start]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut above = content[..line_start].trim_end();
    loop {
        let last_line_start = above.rfind('\n').map(|i| i + 1).unwrap_or(0);
        if above[last_line_start..].trim_start().starts_with('@') {
            above = above[..last_line_start].trim_end();
        } else {
            break;
        }
    }

    let body_end = above.strip_suffix("*/")?;
    // The comment closing here must itself be a doc comment.
    let open = body_end.rfind("/*")?;
    let body = body_end[open..].strip_prefix("/**")?;
    let text = render_doc_comment(body);
    if text.is_empty() { None } else { Some(text) }
}

fn render_doc_comment(body: &str) -> String {
    body.lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').map(str::trim_start).unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
