//! Response sanitization.
//!
//! Generation models routinely wrap their output in markdown code fences or
//! prefix it with a stray language label even when instructed not to. The
//! sanitizer strips those artifacts with an ordered sequence of pure string
//! transforms, each independently testable:
//!
//! 1. leading fence opener naming a markup language (```html)
//! 2. leading fence opener with no language tag (```)
//! 3. trailing fence closer
//! 4. leading standalone language token, optionally quoted or backticked
//! 5. whitespace trim
//!
//! The sequence runs until it stops changing the string: stripping a label
//! line can expose a fence opener underneath it (and vice versa), and a
//! single pass would leave that second artifact behind. Every step only
//! removes characters, so the loop terminates.

/// Language labels the models are known to emit. First lines that are not
/// exactly one of these are never stripped.
const LANGUAGE_TAGS: &[&str] = &[
    "html",
    "markdown",
    "md",
    "xml",
    "json",
    "text",
    "plaintext",
    "plain",
];

/// Strip generation artifacts from raw backend output. Idempotent:
/// sanitizing an already-sanitized string is a no-op.
pub fn sanitize_response(raw: &str) -> String {
    let mut s = raw.trim();
    loop {
        let mut next = strip_fence_open_with_language(s);
        next = strip_fence_open(next);
        next = strip_fence_close(next);
        next = strip_leading_language_token(next);
        let next = next.trim();
        if next == s {
            return s.to_string();
        }
        s = next;
    }
}

fn is_language_tag(token: &str) -> bool {
    LANGUAGE_TAGS
        .iter()
        .any(|tag| token.eq_ignore_ascii_case(tag))
}

/// Strip a leading ```<lang> opener (case-insensitive), with an optional
/// trailing newline.
fn strip_fence_open_with_language(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    match rest.find('\n') {
        Some(idx) => {
            let token = rest[..idx].trim();
            if !token.is_empty() && is_language_tag(token) {
                &rest[idx + 1..]
            } else {
                s
            }
        }
        // ```html with nothing after it — still an artifact.
        None if is_language_tag(rest.trim()) && !rest.trim().is_empty() => "",
        None => s,
    }
}

/// Strip a leading bare ``` opener, with an optional trailing newline.
fn strip_fence_open(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    rest.strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest)
}

/// Strip a trailing ``` closer.
fn strip_fence_close(s: &str) -> &str {
    s.strip_suffix("```").unwrap_or(s)
}

/// Strip a leading standalone language token followed by a newline. The
/// token may be wrapped in quotes or backticks ("html", `html`).
fn strip_leading_language_token(s: &str) -> &str {
    let Some(idx) = s.find('\n') else {
        return s;
    };
    let token = s[..idx]
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if !token.is_empty() && is_language_tag(token) {
        &s[idx + 1..]
    } else {
        s
    }
}
