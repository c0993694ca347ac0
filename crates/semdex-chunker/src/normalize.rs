//! Whitespace normalization applied before text chunking.
//!
//! The transformation is lossy and documented:
//! - `\r\n` and `\r` become `\n`
//! - runs of spaces and tabs collapse to a single space
//! - spaces and tabs at the start and end of each line are removed
//! - two or more consecutive blank lines collapse to one blank line
//! - leading and trailing whitespace of the whole text is trimmed
//!
//! Chunk offsets are expressed against the normalized text.

/// Normalize whitespace in `input`.
#[must_use]
pub fn normalize_text(input: &str) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;

    for line in unified.split('\n') {
        let line = collapse_horizontal(line);
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&line);
        blank_run = 0;
    }

    let trimmed = out.trim();
    if trimmed.len() == out.len() {
        out
    } else {
        trimmed.to_string()
    }
}

fn collapse_horizontal(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_space = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}
