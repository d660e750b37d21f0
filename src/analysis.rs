//! Lightweight source index extracted from a Zig document.
//!
//! The store does not keep a full syntax tree; what the dependency graph and
//! the completion queries need is a small, cheap-to-recompute index: the raw
//! `@import` targets, every `@cImport` block rendered down to the C translation
//! unit it describes, and the error-tag / enum-tag completion sets.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, ops::Range};

use crate::utils;

/// A spanned item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    /// The byte range of `data` in the file.
    pub span: Range<usize>,
    /// The data of the item.
    pub data: T,
}

impl<T> Spanned<T> {
    /// Creates a new data unit with the given data and location.
    pub fn new(data: T, span: Range<usize>) -> Self {
        Self { data, span }
    }

    /// Returns the underlying data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Returns the location.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }
}

/// Represents various information about a Zig source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZigData {
    /// Raw `@import` targets, in source order.
    pub imports: Vec<Spanned<String>>,
    /// One rendered C translation unit per supported `@cImport` block, in
    /// source order. Blocks containing anything other than
    /// `@cInclude`/`@cDefine`/`@cUndef` are unsupported and dropped.
    pub cimports: Vec<Spanned<String>>,
}

impl ZigData {
    /// Extracts the useful data from a Zig source.
    pub fn parse(content: &str) -> Self {
        let imports = utils::find_import_targets(content)
            .map(|m| Spanned::new(m.as_str().to_string(), m.range()))
            .collect();

        let mut cimports = Vec::new();
        for (start, _) in content.match_indices("@cImport") {
            let after = start + "@cImport".len();
            if content.as_bytes().get(after).copied().is_some_and(is_identifier_char) {
                continue;
            }
            let Some((body, end)) = capture_call_body(content, after) else {
                continue;
            };
            if let Some(c_source) = render_cimport(body) {
                cimports.push(Spanned::new(c_source, start..end));
            } else {
                trace!("unsupported cimport block at byte {start}");
            }
        }

        Self { imports, cimports }
    }
}

/// The kind of a completion, mirroring the protocol-level completion kinds the
/// server hands out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompletionItemKind {
    Constant,
    EnumMember,
}

/// A single completion offered to the editor.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionItemKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Derived semantic index of a single document: the completion sets the
/// aggregation queries draw from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentScope {
    /// Error tags declared in `error { ... }` sets and `error.Name` literals.
    pub error_completions: Vec<CompletionItem>,
    /// Members of `enum { ... }` container declarations.
    pub enum_completions: Vec<CompletionItem>,
}

impl DocumentScope {
    /// Builds the scope index for a source file.
    pub fn build(content: &str) -> Self {
        let mut error_tags = BTreeSet::new();
        let mut enum_tags = BTreeSet::new();
        collect_container_tags(content, "error", &mut error_tags);
        collect_container_tags(content, "enum", &mut enum_tags);

        let error_completions = error_tags
            .into_iter()
            .map(|label| CompletionItem {
                detail: Some(format!("error.{label}")),
                label,
                kind: CompletionItemKind::Constant,
            })
            .collect();
        let enum_completions = enum_tags
            .into_iter()
            .map(|label| CompletionItem {
                label,
                kind: CompletionItemKind::EnumMember,
                detail: None,
            })
            .collect();

        Self { error_completions, enum_completions }
    }
}

/// Captures the parenthesized body of a builtin call whose name ends at `at`.
///
/// Returns the body text and the byte offset one past the closing paren.
fn capture_call_body(content: &str, at: usize) -> Option<(&str, usize)> {
    let bytes = content.as_bytes();
    let open = skip_trivia(content, at);
    if bytes.get(open) != Some(&b'(') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&content[open + 1..i], i + 1));
                }
            }
            b'"' => i = skip_string(content, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = skip_line_comment(content, i);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Renders the body of an `@cImport` block into the C translation unit it
/// describes:
///
/// - `@cInclude("hdr.h")` -> `#include <hdr.h>`
/// - `@cDefine("NAME", "VALUE")` -> `#define NAME VALUE`
/// - `@cDefine("NAME", void)` -> `#define NAME`
/// - `@cUndef("NAME")` -> `#undef NAME`
///
/// Any other construct in the block makes it unsupported and yields `None`.
fn render_cimport(body: &str) -> Option<String> {
    let bytes = body.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    loop {
        i = skip_trivia(body, i);
        let Some(&c) = bytes.get(i) else { break };
        match c {
            b'{' | b'}' | b';' => i += 1,
            b'@' => {
                let (name, next) = read_identifier(body, i + 1)?;
                i = skip_trivia(body, next);
                if bytes.get(i) != Some(&b'(') {
                    return None;
                }
                let (args, next) = parse_directive_args(body, i + 1)?;
                i = next;
                match (name, args.as_slice()) {
                    ("cInclude", [DirectiveArg::Str(header)]) => {
                        out.push_str(&format!("#include <{header}>\n"));
                    }
                    ("cDefine", [DirectiveArg::Str(name), DirectiveArg::Void]) => {
                        out.push_str(&format!("#define {name}\n"));
                    }
                    ("cDefine", [DirectiveArg::Str(name), DirectiveArg::Str(value)]) => {
                        if value.is_empty() {
                            out.push_str(&format!("#define {name}\n"));
                        } else {
                            out.push_str(&format!("#define {name} {value}\n"));
                        }
                    }
                    ("cUndef", [DirectiveArg::Str(name)]) => {
                        out.push_str(&format!("#undef {name}\n"));
                    }
                    _ => return None,
                }
            }
            _ => return None,
        }
    }
    Some(out)
}

enum DirectiveArg {
    Str(String),
    Void,
}

/// Parses the comma-separated arguments of a cimport directive starting right
/// after the opening paren. Returns the arguments and the byte offset one past
/// the closing paren.
fn parse_directive_args(content: &str, mut i: usize) -> Option<(Vec<DirectiveArg>, usize)> {
    let bytes = content.as_bytes();
    let mut args = Vec::new();
    loop {
        i = skip_trivia(content, i);
        match bytes.get(i)? {
            b')' => return Some((args, i + 1)),
            b'"' => {
                let end = skip_string(content, i);
                args.push(DirectiveArg::Str(content.get(i + 1..end)?.to_string()));
                i = end + 1;
            }
            c if is_identifier_start(*c) => {
                let (ident, next) = read_identifier(content, i)?;
                if ident != "void" {
                    return None;
                }
                args.push(DirectiveArg::Void);
                i = next;
            }
            _ => return None,
        }
        i = skip_trivia(content, i);
        match bytes.get(i)? {
            b',' => i += 1,
            b')' => return Some((args, i + 1)),
            _ => return None,
        }
    }
}

/// Declaration keywords that can appear in member position inside a container
/// body but never name a member.
const DECL_KEYWORDS: &[&str] =
    &["pub", "fn", "const", "var", "comptime", "usingnamespace", "test", "extern", "inline"];

/// Collects member tags of `keyword { ... }` container declarations into
/// `out`. For `error` this also picks up `error.Name` literals.
fn collect_container_tags(content: &str, keyword: &str, out: &mut BTreeSet<String>) {
    let bytes = content.as_bytes();
    for (at, _) in content.match_indices(keyword) {
        // whole-word occurrences only
        if at > 0 && is_identifier_char(bytes[at - 1]) {
            continue;
        }
        let after = at + keyword.len();
        if bytes.get(after).copied().is_some_and(is_identifier_char) {
            continue;
        }

        let mut i = skip_trivia(content, after);
        if keyword == "error" && bytes.get(i) == Some(&b'.') {
            if let Some((tag, _)) = read_identifier(content, i + 1) {
                out.insert(tag.to_string());
            }
            continue;
        }
        // optional tag-type clause, e.g. `enum(u8)`
        if bytes.get(i) == Some(&b'(') {
            let Some((_, next)) = capture_call_body(content, i) else { continue };
            i = skip_trivia(content, next);
        }
        if bytes.get(i) != Some(&b'{') {
            continue;
        }
        collect_members(content, i + 1, out);
    }
}

/// Scans a container body starting right after its opening brace, recording
/// identifiers in member position at brace depth one.
fn collect_members(content: &str, mut i: usize, out: &mut BTreeSet<String>) {
    let bytes = content.as_bytes();
    let mut depth = 1usize;
    let mut expect_member = true;
    while let Some(&c) = bytes.get(i) {
        match c {
            b'{' | b'(' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b')' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return;
                }
                i += 1;
            }
            b',' => {
                if depth == 1 {
                    expect_member = true;
                }
                i += 1;
            }
            b'"' => i = skip_string(content, i) + 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(content, i),
            c if c.is_ascii_whitespace() => i += 1,
            c if is_identifier_start(c) => {
                let Some((ident, next)) = read_identifier(content, i) else { return };
                if depth == 1 && expect_member && !DECL_KEYWORDS.contains(&ident) {
                    let after = skip_trivia(content, next);
                    if matches!(bytes.get(after), Some(b',' | b'=' | b'}')) {
                        out.insert(ident.to_string());
                    }
                }
                if depth == 1 {
                    expect_member = false;
                }
                i = next;
            }
            _ => i += 1,
        }
    }
}

fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_identifier_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn read_identifier(content: &str, at: usize) -> Option<(&str, usize)> {
    let bytes = content.as_bytes();
    if !bytes.get(at).copied().is_some_and(is_identifier_start) {
        return None;
    }
    let mut end = at + 1;
    while bytes.get(end).copied().is_some_and(is_identifier_char) {
        end += 1;
    }
    Some((&content[at..end], end))
}

/// Advances past whitespace and `//` comments.
fn skip_trivia(content: &str, mut i: usize) -> usize {
    let bytes = content.as_bytes();
    while let Some(&c) = bytes.get(i) {
        if c.is_ascii_whitespace() {
            i += 1;
        } else if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
            i = skip_line_comment(content, i);
        } else {
            break;
        }
    }
    i
}

/// Returns the offset of the closing quote of the string starting at `i`.
fn skip_string(content: &str, i: usize) -> usize {
    let bytes = content.as_bytes();
    let mut j = i + 1;
    while let Some(&c) = bytes.get(j) {
        match c {
            b'\\' => j += 2,
            b'"' => return j,
            _ => j += 1,
        }
    }
    j
}

fn skip_line_comment(content: &str, i: usize) -> usize {
    content[i..].find('\n').map(|n| i + n + 1).unwrap_or(content.len())
}
