//! Rendering of audit records into bounded text blocks

use super::{AuditBody, AuditRecord};
use crate::traits::RenderedBlock;

/// Bullet prefixed to every change line
pub const BULLET: &str = "\u{2022}";

/// Cap `body` at `max_chars` characters
///
/// An overflowing body keeps its first `max_chars - marker` characters and
/// ends with `marker`, so the result is exactly `max_chars` long.
///
/// # Returns
///
/// The capped body and whether truncation was applied.
pub fn truncate_body(body: &str, max_chars: usize, marker: &str) -> (String, bool) {
    if body.chars().count() <= max_chars {
        return (body.to_string(), false);
    }

    let keep = max_chars.saturating_sub(marker.chars().count());
    let mut truncated: String = body.chars().take(keep).collect();
    truncated.push_str(marker);
    (truncated, true)
}

/// Body text of a record before capping
pub fn render_body(body: &AuditBody) -> String {
    match body {
        AuditBody::Text(text) => text.clone(),
        AuditBody::Changes { header, lines } => {
            let mut out = String::new();
            if let Some(header) = header {
                out.push_str(header);
                out.push_str("\n\n");
            }
            for line in lines {
                out.push_str(BULLET);
                out.push(' ');
                out.push_str(line);
                out.push('\n');
            }
            out
        }
    }
}

/// Render a record into a block with a capped body
pub fn render(record: &AuditRecord, max_chars: usize, marker: &str) -> (RenderedBlock, bool) {
    let (body, truncated) = truncate_body(&render_body(&record.body), max_chars, marker);
    let block = RenderedBlock {
        title: record.title.clone(),
        body,
        thumbnail: record.thumbnail.clone(),
        footer: record.footer.clone(),
        timestamp: record.timestamp,
    };
    (block, truncated)
}
