//! Name transforms shared by the generator, the schema engine and the HTTP
//! layer.
//!
//! Every derived name in the system funnels through here: model names,
//! physical collection names, route slugs and structure-driven field keys.
//! Keeping the rules in one place is what makes generation idempotent: the
//! patcher and the reset path must derive the exact same strings the
//! generator wrote.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Cyrillic transliteration table used when deriving field keys from
/// free-form structure labels.
static CYRILLIC_MAP: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ('а', "a"),
        ('б', "b"),
        ('в', "v"),
        ('г', "g"),
        ('д', "d"),
        ('е', "e"),
        ('ё', "yo"),
        ('ж', "zh"),
        ('з', "z"),
        ('и', "i"),
        ('й', "y"),
        ('к', "k"),
        ('л', "l"),
        ('м', "m"),
        ('н', "n"),
        ('о', "o"),
        ('п', "p"),
        ('р', "r"),
        ('с', "s"),
        ('т', "t"),
        ('у', "u"),
        ('ф', "f"),
        ('х', "h"),
        ('ц', "ts"),
        ('ч', "ch"),
        ('ш', "sh"),
        ('щ', "sch"),
        ('ъ', ""),
        ('ы', "y"),
        ('ь', ""),
        ('э', "e"),
        ('ю', "yu"),
        ('я', "ya"),
    ])
});

/// Uppercase the first character and lowercase the rest: `myCases` → `Mycases`,
/// `cases` → `Cases`. This is the model-name transform, so `Cases` and `cases`
/// collide on purpose.
#[must_use]
pub fn capitalize_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// camelCase → snake_case for physical field names. A leading uppercase does
/// not produce a leading underscore: `IconType` → `icon_type`.
#[must_use]
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out.trim_start_matches('_').to_string()
}

/// Route segment for a resource: the lowercased resource name.
#[must_use]
pub fn route_name(resource: &str) -> String {
    resource.to_lowercase()
}

/// Physical collection name: lowercased resource name, pluralized with a
/// trailing `s` unless it already ends in one (`Cases` → `cases`, `Post` →
/// `posts`).
#[must_use]
pub fn collection_name(resource: &str) -> String {
    let lower = resource.to_lowercase();
    if lower.ends_with('s') {
        lower
    } else {
        format!("{lower}s")
    }
}

/// Collection holding a resource's structure singleton.
#[must_use]
pub fn structure_collection_name(resource: &str) -> String {
    format!("{}_structures", resource.to_lowercase())
}

/// Resource name → kebab-case page slug: `OurCases` → `our-cases`,
/// `press kit` → `press-kit`.
#[must_use]
pub fn kebab_slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower_or_digit = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else if ch == ' ' || ch == '_' || ch == '-' {
            if !out.ends_with('-') {
                out.push('-');
            }
            prev_lower_or_digit = false;
        } else {
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Normalize an admin menu URL into a page slug. Strips leading slashes, a
/// leading `admin/` segment (any case) and trailing slashes; returns an empty
/// string when nothing remains.
#[must_use]
pub fn normalize_page_slug(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut slug = trimmed.trim_start_matches('/');
    if slug.len() >= 6 && slug[..6].eq_ignore_ascii_case("admin/") {
        slug = &slug[6..];
    }
    slug.trim_start_matches('/').trim_end_matches('/').to_string()
}

fn transliterate(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        let lower = ch.to_lowercase().next().unwrap_or(ch);
        match CYRILLIC_MAP.get(&lower) {
            // Empty mappings (hard/soft signs) fall through unchanged and are
            // squashed into separators by the caller.
            Some(mapped) if !mapped.is_empty() => out.push_str(mapped),
            _ => out.push(ch),
        }
    }
    out
}

/// Derive a physical field key from a free-form label: transliterate,
/// lowercase, squash anything non-alphanumeric into single underscores. Falls
/// back to `fallback` when nothing survives, and prefixes `field_` when the
/// result does not start with a letter.
#[must_use]
pub fn normalize_field_key(raw: &str, fallback: &str) -> String {
    let transliterated = transliterate(raw).to_lowercase();
    let mut normalized = String::with_capacity(transliterated.len());
    for ch in transliterated.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            normalized.push(ch);
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    let base = normalized.trim_matches('_');
    let base = if base.is_empty() { fallback } else { base };
    if base.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        base.to_string()
    } else {
        format!("field_{base}")
    }
}
