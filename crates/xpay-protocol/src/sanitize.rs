//! Sanitization of untrusted callback fields.
//!
//! Every inbound field is attacker-controlled text until it passes through
//! [`text_field`]: HTML tags and control characters are stripped and the
//! result is trimmed. No semantic validation happens here.

/// Strip HTML tags and control characters, trim surrounding whitespace.
pub fn text_field(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;

    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {}
            _ if c.is_control() => {}
            _ => out.push(c),
        }
    }

    // An unterminated '<' swallows the rest of the string, same as tag
    // stripping in the platforms this integrates with.
    out.trim().to_string()
}

/// Sanitize an optional field, mapping empty results to `None`.
pub fn optional_field(input: Option<&str>) -> Option<String> {
    let cleaned = text_field(input?);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
