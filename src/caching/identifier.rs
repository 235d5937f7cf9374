//! Identifier patterns used in the caching configuration.
//!
//! An identifier is either an entry point string `group:name` or a dotted
//! class path `module.sub.Class`. Both forms may contain `*` wildcards.

use std::sync::LazyLock;

use regex::Regex;

use crate::{CacheError, ENTRY_POINT_STRING_SEPARATOR, PluginRegistry, Result, common::MemCache};

const WILDCARD: char = '*';

/// Compiled wildcard patterns, keyed by pattern.
static PATTERNS: LazyLock<MemCache<String, Regex>> = LazyLock::new(|| MemCache::new(1024));

static IDENTIFIER_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Words that cannot appear as a component of a class path.
const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif", "else", "except", "finally",
    "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Full-string match of `string` against `pattern`, where `*` matches any run of characters.
pub fn match_wildcard(
    string: &str,
    pattern: &str,
) -> bool {
    compile_wildcard(pattern).is_some_and(|re| re.is_match(string))
}

fn compile_wildcard(pattern: &str) -> Option<Regex> {
    let key = pattern.to_string();
    if let Some(re) = PATTERNS.get(&key) {
        return Some(re);
    }
    let expr = format!("(?s)^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    let re = Regex::new(&expr).ok()?;
    PATTERNS.set(key, re.clone());
    Some(re)
}

fn is_identifier_token(part: &str) -> bool {
    IDENTIFIER_TOKEN.is_match(part)
}

/// Checks that `identifier` is a well formed pattern.
///
/// With `strict`, an identifier without wildcards must also resolve to a
/// registered plugin.
pub fn validate_identifier_pattern(
    identifier: &str,
    registry: &PluginRegistry,
    strict: bool,
) -> Result<()> {
    let has_wildcard = identifier.contains(WILDCARD);

    if identifier.contains(ENTRY_POINT_STRING_SEPARATOR) {
        let mut parts = identifier.split(ENTRY_POINT_STRING_SEPARATOR);
        let group_pattern = parts.next().unwrap_or_default();
        if parts.count() > 1 {
            return Err(CacheError::Value(format!(
                "identifier '{}' contains more than one '{}' separator",
                identifier, ENTRY_POINT_STRING_SEPARATOR
            )));
        }
        if !registry.groups().any(|group| match_wildcard(group, group_pattern)) {
            return Err(CacheError::Value(format!(
                "group pattern '{}' of identifier '{}' does not match any known entry point group",
                group_pattern, identifier
            )));
        }
    } else {
        for part in identifier.split('.') {
            if part.contains(WILDCARD) {
                // a wildcard stands for at least part of a valid token
                if !is_identifier_token(&part.replace(WILDCARD, "a")) {
                    return Err(CacheError::Value(format!(
                        "identifier part '{}' of '{}' is not a valid pattern",
                        part, identifier
                    )));
                }
            } else {
                if !is_identifier_token(part) {
                    return Err(CacheError::Value(format!("identifier part '{}' of '{}' is not a valid name", part, identifier)));
                }
                if RESERVED_WORDS.contains(&part) {
                    return Err(CacheError::Value(format!("identifier part '{}' of '{}' is a reserved word", part, identifier)));
                }
            }
        }
    }

    if strict && !has_wildcard {
        registry
            .load(identifier)
            .map_err(|err| CacheError::Value(format!("could not load identifier '{}': {}", identifier, err)))?;
    }
    Ok(())
}
