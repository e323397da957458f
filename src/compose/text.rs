//! Plain-text preparation for combined documents.
//!
//! Converts HTML bodies to readable text and wraps lines to the page column
//! width used by the PDF builder.

/// Convert an HTML body to readable plain text.
///
/// - block-level tags (`<p>`, `<div>`, `<br>`, `<li>`, `<tr>`, headings)
///   become line breaks
/// - `<script>` and `<style>` blocks are dropped entirely
/// - common entities are decoded
/// - runs of blank lines collapse to at most one
pub fn html_to_text(html: &str) -> String {
    let mut text = strip_tag_block(html, "script");
    text = strip_tag_block(&text, "style");

    let broken = break_block_tags(&text);

    // Strip remaining tags.
    let mut stripped = String::with_capacity(broken.len());
    let mut in_tag = false;
    for ch in broken.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    let decoded = decode_entities(&stripped);

    // Trim each line and collapse blank runs to a single blank line.
    let mut cleaned = String::with_capacity(decoded.len());
    let mut blank_run = 0usize;
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !cleaned.is_empty() {
            cleaned.push('\n');
            if blank_run > 0 {
                cleaned.push('\n');
            }
        }
        blank_run = 0;
        cleaned.push_str(trimmed);
    }
    cleaned
}

/// Replace block-level tags with newlines, case-insensitively.
fn break_block_tags(html: &str) -> String {
    const BLOCK_TAGS: &[&str] = &[
        "br", "p", "div", "tr", "li", "ul", "ol", "table", "h1", "h2", "h3", "h4", "h5", "h6",
    ];

    let mut out = String::with_capacity(html.len());
    let bytes = html.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            let rest = &html[i + 1..];
            let name_start = rest.strip_prefix('/').unwrap_or(rest);
            let name: String = name_start
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();
            if BLOCK_TAGS.contains(&name.to_ascii_lowercase().as_str()) {
                out.push('\n');
            }
        }
        // Push the original char; multi-byte chars advance by their length.
        let ch = html[i..].chars().next().unwrap_or('\u{fffd}');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Remove an entire `<tag>…</tag>` block, case-insensitively.
fn strip_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start) = lower[pos..].find(&open) {
        let start = pos + start;
        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return out, // unclosed block runs to the end
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// Decode the handful of entities that matter for email bodies.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Wrap text to `cols` characters, breaking on whitespace where possible.
///
/// Words longer than the column width are hard-split. Blank lines survive.
pub fn wrap_text(text: &str, cols: usize) -> Vec<String> {
    let cols = cols.max(1);
    let mut lines = Vec::new();
    for raw_line in text.lines() {
        if raw_line.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();
            if current.is_empty() {
                if word_len <= cols {
                    current.push_str(word);
                } else {
                    hard_split(word, cols, &mut lines, &mut current);
                }
            } else if current_len + 1 + word_len <= cols {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                if word_len <= cols {
                    current.push_str(word);
                } else {
                    hard_split(word, cols, &mut lines, &mut current);
                }
            }
        }
        lines.push(current);
    }
    lines
}

/// Split an over-long word into full-width chunks; the tail becomes the new
/// current line.
fn hard_split(word: &str, cols: usize, lines: &mut Vec<String>, current: &mut String) {
    let chars: Vec<char> = word.chars().collect();
    let mut chunks = chars.chunks(cols).peekable();
    while let Some(chunk) = chunks.next() {
        let piece: String = chunk.iter().collect();
        if chunks.peek().is_some() {
            lines.push(piece);
        } else {
            *current = piece;
        }
    }
}
