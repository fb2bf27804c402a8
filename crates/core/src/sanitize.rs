//! Input sanitization for free-text and numeric fields.
//!
//! Every value that reaches a provider or the database passes through
//! one of these functions first. All of them are pure, never panic,
//! and are idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
//! Invalid input degrades to an empty string, `None`, or a clamped
//! default — it is never rejected with an error at this layer.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Field limits
// ---------------------------------------------------------------------------

/// Maximum length of a generation prompt.
pub const MAX_PROMPT_LENGTH: usize = 2_000;

/// Maximum length of user-supplied lyrics.
pub const MAX_LYRICS_LENGTH: usize = 10_000;

/// Maximum length of a track title.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum number of style tags per track.
pub const MAX_STYLE_TAGS: usize = 20;

/// Maximum length of a single style tag.
pub const MAX_STYLE_TAG_LENGTH: usize = 50;

/// Maximum length of a URL field.
pub const MAX_URL_LENGTH: usize = 2_000;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Control characters except tab, newline, and carriage return.
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("static regex"));

/// Literal `<...>` tag spans. Best-effort HTML stripping, not a parser:
/// an unclosed `<` is left alone.
static TAG_SPANS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("static regex"));

// ---------------------------------------------------------------------------
// Core sanitizer
// ---------------------------------------------------------------------------

/// Clean a free-text field.
///
/// Trims whitespace, strips non-printable control characters (keeping
/// tab/newline/CR), removes literal `<...>` tag spans, and truncates to
/// `max_length` characters on a char boundary.
pub fn sanitize_string(input: &str, max_length: usize) -> String {
    let trimmed = input.trim();
    let without_controls = CONTROL_CHARS.replace_all(trimmed, "");

    // Repeat tag removal until stable so nested spans like
    // `<a<b>c>` cannot survive a single pass.
    let mut cleaned = without_controls.into_owned();
    loop {
        let next = TAG_SPANS.replace_all(&cleaned, "").into_owned();
        if next == cleaned {
            break;
        }
        cleaned = next;
    }

    let truncated: String = cleaned.chars().take(max_length).collect();

    // Truncation can expose trailing whitespace; trim again so a second
    // application is a no-op.
    truncated.trim().to_string()
}

// ---------------------------------------------------------------------------
// Typed wrappers
// ---------------------------------------------------------------------------

/// Sanitize a generation prompt (≤ [`MAX_PROMPT_LENGTH`] chars).
pub fn sanitize_prompt(input: &str) -> String {
    sanitize_string(input, MAX_PROMPT_LENGTH)
}

/// Sanitize lyrics text (≤ [`MAX_LYRICS_LENGTH`] chars).
pub fn sanitize_lyrics(input: &str) -> String {
    sanitize_string(input, MAX_LYRICS_LENGTH)
}

/// Sanitize a track title (≤ [`MAX_TITLE_LENGTH`] chars).
pub fn sanitize_title(input: &str) -> String {
    sanitize_string(input, MAX_TITLE_LENGTH)
}

/// Sanitize a list of style tags.
///
/// Each entry may itself be a comma/semicolon-separated list (providers
/// deliver both shapes). Tags are individually sanitized, empties are
/// dropped, duplicates are removed keeping the first occurrence, and
/// the result is capped at [`MAX_STYLE_TAGS`] entries.
pub fn sanitize_style_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();

    for raw in tags {
        for part in raw.as_ref().split([',', ';']) {
            let tag = sanitize_string(part, MAX_STYLE_TAG_LENGTH);
            if tag.is_empty() || seen.iter().any(|t| t == &tag) {
                continue;
            }
            seen.push(tag);
            if seen.len() == MAX_STYLE_TAGS {
                return seen;
            }
        }
    }

    seen
}

/// Sanitize a URL. Only `http`/`https` schemes are accepted; anything
/// else (including `javascript:` and relative paths) yields `None`.
pub fn sanitize_url(input: &str) -> Option<String> {
    let cleaned = sanitize_string(input, MAX_URL_LENGTH);
    if cleaned.starts_with("http://") || cleaned.starts_with("https://") {
        Some(cleaned)
    } else {
        None
    }
}

/// Validate a user identifier as a UUID. Returns `None` for anything
/// that does not parse.
pub fn sanitize_user_id(input: &str) -> Option<uuid::Uuid> {
    uuid::Uuid::parse_str(input.trim()).ok()
}

/// Clamp a numeric field into `[min, max]`, substituting `default` for
/// NaN. `default` itself is clamped, so a misconfigured default cannot
/// escape the range.
pub fn sanitize_number(value: f64, min: f64, max: f64, default: f64) -> f64 {
    let v = if value.is_nan() { default } else { value };
    v.clamp(min, max)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- sanitize_string --

    #[test]
    fn trims_whitespace() {
        assert_eq!(sanitize_string("  hello  ", 100), "hello");
    }

    #[test]
    fn strips_control_characters_keeps_whitespace_controls() {
        assert_eq!(sanitize_string("a\x00b\x07c\td\ne\rf", 100), "abc\td\ne\rf");
    }

    #[test]
    fn strips_tag_spans() {
        assert_eq!(sanitize_string("<script>alert(1)</script>hi", 100), "alert(1)hi");
        assert_eq!(sanitize_string("a <b>bold</b> c", 100), "a bold c");
    }

    #[test]
    fn strips_nested_tag_spans() {
        assert_eq!(sanitize_string("<a<b>c>x", 100), "x");
    }

    #[test]
    fn unclosed_angle_bracket_survives() {
        assert_eq!(sanitize_string("1 < 2", 100), "1 < 2");
    }

    #[test]
    fn truncates_on_char_boundary() {
        // 'é' is multi-byte; char-based truncation must not split it.
        let input = "ééééé";
        assert_eq!(sanitize_string(input, 3), "ééé");
    }

    #[test]
    fn truncation_does_not_leave_trailing_whitespace() {
        assert_eq!(sanitize_string("ab cdef", 3), "ab");
    }

    #[test]
    fn idempotent_on_adversarial_inputs() {
        let cases = [
            "  <b>hello</b> world  ",
            "a\x00b<script>x</script>",
            "<a<b>c>",
            "plain text",
            "   ",
            "1 < 2 > 0",
            "éé<p>éé</p>ééééééééééééé",
        ];
        for case in cases {
            let once = sanitize_string(case, 10);
            let twice = sanitize_string(&once, 10);
            assert_eq!(once, twice, "not idempotent for {case:?}");
        }
    }

    // -- typed wrappers --

    #[test]
    fn prompt_truncated_to_limit() {
        let long = "x".repeat(MAX_PROMPT_LENGTH + 500);
        assert_eq!(sanitize_prompt(&long).chars().count(), MAX_PROMPT_LENGTH);
    }

    #[test]
    fn style_tags_split_dedup_and_cap() {
        let tags = sanitize_style_tags(["ambient, chill;ambient", "  lo-fi  ", ""]);
        assert_eq!(tags, vec!["ambient", "chill", "lo-fi"]);

        let many: Vec<String> = (0..30).map(|i| format!("tag{i}")).collect();
        assert_eq!(sanitize_style_tags(&many).len(), MAX_STYLE_TAGS);
    }

    #[test]
    fn style_tag_entries_are_sanitized() {
        let tags = sanitize_style_tags(["<em>jazz</em>"]);
        assert_eq!(tags, vec!["jazz"]);
    }

    #[test]
    fn url_accepts_http_and_https_only() {
        assert_eq!(
            sanitize_url("https://cdn.example.com/a.mp3").as_deref(),
            Some("https://cdn.example.com/a.mp3"),
        );
        assert_eq!(
            sanitize_url("  http://example.com  ").as_deref(),
            Some("http://example.com"),
        );
        assert_eq!(sanitize_url("javascript:alert(1)"), None);
        assert_eq!(sanitize_url("ftp://example.com"), None);
        assert_eq!(sanitize_url(""), None);
    }

    #[test]
    fn user_id_requires_uuid_shape() {
        assert!(sanitize_user_id("b5f8c1e2-8f4a-4f6d-9c3b-2a1e0d9f8c7b").is_some());
        assert!(sanitize_user_id(" b5f8c1e2-8f4a-4f6d-9c3b-2a1e0d9f8c7b ").is_some());
        assert!(sanitize_user_id("not-a-uuid").is_none());
        assert!(sanitize_user_id("").is_none());
    }

    #[test]
    fn number_clamps_and_defaults() {
        assert_eq!(sanitize_number(5.0, 0.0, 10.0, 1.0), 5.0);
        assert_eq!(sanitize_number(-3.0, 0.0, 10.0, 1.0), 0.0);
        assert_eq!(sanitize_number(42.0, 0.0, 10.0, 1.0), 10.0);
        assert_eq!(sanitize_number(f64::NAN, 0.0, 10.0, 1.0), 1.0);
        // A default outside the range is clamped too.
        assert_eq!(sanitize_number(f64::NAN, 0.0, 10.0, 99.0), 10.0);
    }
}
