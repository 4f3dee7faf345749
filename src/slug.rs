//! Filename-safe slugs and collision-resistant identifiers derived from titles.

use chrono::{DateTime, Utc};

pub const SLUG_MAX_LEN: usize = 50;
pub const ID_SLUG_MAX_LEN: usize = 30;
/// Stem used when a title has no ASCII alphanumerics left after slugging.
pub const EMPTY_SLUG_STEM: &str = "video";

/// Lowercases, drops everything outside `[a-z0-9\s-]`, turns whitespace runs
/// into single hyphens and caps the result at 50 characters.
///
/// The input is not trimmed: leading or trailing whitespace becomes a
/// hyphen, as in filenames already published. The result may be empty
/// (e.g. a title made only of punctuation); callers that need a filename
/// must guard against that.
pub fn slugify(title: &str) -> String {
    slugify_with_cap(title, SLUG_MAX_LEN)
}

pub fn slugify_with_cap(title: &str, cap: usize) -> String {
    let mut slug = String::with_capacity(title.len().min(cap));
    let mut in_whitespace = false;
    for ch in title.to_lowercase().chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
                in_whitespace = true;
            }
            continue;
        }
        // Dropped characters do not end a whitespace run.
        if !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-') {
            continue;
        }
        in_whitespace = false;
        slug.push(ch);
    }
    // Output is pure ASCII, so byte truncation never splits a char.
    slug.truncate(cap);
    slug
}

/// `slugify(title, cap = 30) + "-" + <creation millis>`.
///
/// Two records with the same title created in the same millisecond collide.
pub fn generate_id(title: &str, created: DateTime<Utc>) -> String {
    let stem = slugify_with_cap(title, ID_SLUG_MAX_LEN);
    let stem = if stem.is_empty() {
        EMPTY_SLUG_STEM
    } else {
        stem.as_str()
    };
    format!("{stem}-{}", created.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("My First  Video!"), "my-first-video");
        assert_eq!(slugify("Café au lait"), "caf-au-lait");
        assert_eq!(slugify("tabs\tand\nnewlines"), "tabs-and-newlines");
    }

    #[test]
    fn slugify_does_not_trim_surrounding_whitespace() {
        assert_eq!(slugify("a "), "a-");
        assert_eq!(slugify("  padded title  "), "-padded-title-");
        assert_eq!(slugify("a ! b"), "a-b");
        assert_eq!(slugify("!!! ???"), "-");
    }

    #[test]
    fn slugify_keeps_existing_hyphens() {
        assert_eq!(slugify("part-one - intro"), "part-one---intro");
    }

    #[test]
    fn slugify_caps_length_and_charset() {
        let long = "word ".repeat(40);
        let slug = slugify(&long);
        assert_eq!(slug.len(), SLUG_MAX_LEN);
        assert!(
            slug.chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
        );
    }

    #[test]
    fn slugify_is_idempotent() {
        for title in [
            "Hello World",
            "  padded title  ",
            "UPPER lower 123",
            "¿Qué? ¡Sí!",
            &"x y ".repeat(30),
        ] {
            let once = slugify(title);
            assert_eq!(slugify(&once), once, "title {title:?}");
        }
    }

    #[test]
    fn slugify_can_be_empty() {
        assert_eq!(slugify("!!!???"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn generate_id_appends_creation_millis() {
        let created = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            generate_id("A Very Long Title That Keeps Going And Going", created),
            "a-very-long-title-that-keeps-g-1700000000123"
        );
        assert_eq!(generate_id("***", created), "video-1700000000123");
    }

    #[test]
    fn generate_id_separates_same_title_at_different_instants() {
        let first = Utc.timestamp_millis_opt(1_000).unwrap();
        let second = Utc.timestamp_millis_opt(1_001).unwrap();
        assert_ne!(generate_id("same", first), generate_id("same", second));
        assert_eq!(generate_id("same", first), generate_id("same", first));
    }
}
