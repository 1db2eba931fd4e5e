//! Regex-based property/instantiation extraction (`spec.md` §4.4, §9 Design
//! Notes: "tree-sitter gives token structure but not semantic types").
//! Grounded on `original_source/indexer/swift_parser.py`'s
//! `PROPERTY_DECL_RE`/`CREATE_EXPR_RE`.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn property_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?P<prefix>(?:weak|unowned)\s+)?(?:lazy\s+)?(?:(?:private|fileprivate|internal|public)\s+)?(?:var|let)\s+(?P<name>[A-Za-z_]\w*)\s*:\s*(?P<type>[A-Za-z_][\w?.<>, ]*)",
        )
        .expect("static property regex compiles")
    })
}

fn create_expr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:=|return)\s+(?P<type>[A-Z][A-Za-z0-9_]*)\s*\(").expect("static creation regex compiles")
    })
}

/// Result of matching a property/variable declaration line.
pub struct PropertyMatch {
    pub name: String,
    pub normalized_type: String,
    pub is_weak: bool,
}

/// Scan one member's code for `[weak|unowned]? (var|let) name: Type`.
/// Returns `None` when the captured type does not start uppercase (spec:
/// only emit an edge for nominal, presumably-reference-able types).
pub fn match_property_decl(code: &str) -> Option<PropertyMatch> {
    let captures = property_decl_re().captures(code)?;
    let name = captures.name("name")?.as_str().to_string();
    let raw_type = captures.name("type")?.as_str();
    let normalized_type = normalize_type(raw_type);
    if !normalized_type.chars().next().is_some_and(|c| c.is_uppercase()) {
        return None;
    }
    let is_weak = captures.name("prefix").is_some();
    Some(PropertyMatch {
        name,
        normalized_type,
        is_weak,
    })
}

/// Walk a member's body collecting `= Type(` / `return Type(` instantiations.
pub fn find_created_types(code: &str) -> HashSet<String> {
    let mut types = HashSet::new();
    for captures in create_expr_re().captures_iter(code) {
        if let Some(type_match) = captures.name("type") {
            let candidate = type_match.as_str();
            if candidate.chars().next().is_some_and(|c| c.is_uppercase()) {
                types.insert(candidate.to_string());
            }
        }
    }
    types
}

/// Strip `?`, `!`, generic brackets, and leading `any ` (`spec.md` §4.4).
pub fn normalize_type(raw: &str) -> String {
    let candidate = raw.trim().replace('?', "").replace('!', "");
    let candidate = candidate.split('<').next().unwrap_or("").to_string();
    candidate.replace("any ", "").trim().to_string()
}

/// First line of `code`, truncated to 240 chars (`spec.md` §4.4).
pub fn signature_of(code: &str) -> String {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let first_line = trimmed.lines().next().unwrap_or("");
    truncate_chars(first_line, 240)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// The declaration header: everything before the first `{` opening the body.
pub fn header_of(code: &str) -> &str {
    code.find('{').map(|idx| &code[..idx]).unwrap_or(code)
}

/// Parse an inheritance/conformance clause: the text after the declaration's
/// `:`, split on commas, with an optional `where` clause captured separately.
pub fn parse_inheritance_clause(header: &str) -> (Vec<String>, Option<String>) {
    let Some(colon_idx) = header.find(':') else {
        return (Vec::new(), None);
    };
    let after_colon = &header[colon_idx + 1..];
    let (types_part, where_clause) = match after_colon.find("where") {
        Some(idx) => (&after_colon[..idx], Some(after_colon[idx + "where".len()..].trim().to_string())),
        None => (after_colon, None),
    };
    let types = types_part
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    (types, where_clause)
}

/// Scan the first five whitespace-separated tokens of a declaration header
/// for a visibility keyword (`spec.md` §4.4).
pub fn extract_visibility(header: &str) -> Option<String> {
    const VISIBILITY_KEYWORDS: [&str; 5] = ["public", "open", "internal", "fileprivate", "private"];
    header
        .split_whitespace()
        .take(5)
        .find(|token| VISIBILITY_KEYWORDS.contains(token))
        .map(|token| token.to_string())
}
