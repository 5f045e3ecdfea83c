//! Filename expression expansion (`${key}` placeholders in file and directory names).

use lazy_static::lazy_static;
use regex::Regex;

use crate::context::Context;

lazy_static! {
    /// `${identifier}` where identifier is any run of non-`}` characters
    static ref FILENAME_EXPR_RE: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// Expand `${key}` placeholders in `name` against `context`.
///
/// Every occurrence of a resolvable token is replaced. Tokens whose key is
/// missing or null are left verbatim. Replacement text is never re-scanned.
pub fn expand(name: &str, context: &Context) -> String {
    if !name.contains("${") {
        return name.to_string();
    }

    let mut resolved: Vec<(&str, String)> = Vec::new();
    for caps in FILENAME_EXPR_RE.captures_iter(name) {
        let token = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let key = &caps[1];
        if resolved.iter().any(|(t, _)| *t == token) {
            continue;
        }
        if let Some(value) = context.text(key) {
            resolved.push((token, value));
        }
    }

    if resolved.is_empty() {
        return name.to_string();
    }

    FILENAME_EXPR_RE
        .replace_all(name, |caps: &regex::Captures| {
            let token = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            resolved
                .iter()
                .find(|(t, _)| *t == token)
                .map(|(_, value)| value.clone())
                .unwrap_or_else(|| token.to_string())
        })
        .into_owned()
}

/// Strip `marker` from the end of `name`, if present.
///
/// Returns the stripped name and whether the marker was found.
pub fn strip_marker<'a>(name: &'a str, marker: &str) -> (&'a str, bool) {
    if marker.is_empty() {
        return (name, false);
    }
    match name.strip_suffix(marker) {
        Some(stripped) => (stripped, true),
        None => (name, false),
    }
}

/// Compute the destination name of a source entry: strip the template
/// marker, then expand placeholders.
///
/// Also returns whether the marker was present.
pub fn target_name(name: &str, marker: &str, context: &Context) -> (String, bool) {
    let (stripped, marked) = strip_marker(name, marker);
    (expand(stripped, context), marked)
}
