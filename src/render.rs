//! Plain-text rendering of display blocks for an output buffer.

use kernlink_document::{BlockKind, DisplayBlock};

/// Prompt the buffer shows while waiting for the next input.
pub const NEXT_PROMPT: &str = "In [ ]";

/// Renders `blocks` as buffer lines in the style of an IPython console:
///
/// ```text
/// In [1]: for i in range(2):
///    ...:     print(i)
/// 0
/// 1
///
/// In [ ]
/// ```
///
/// Every block but the input is followed by one blank line, and the lines end
/// with [`NEXT_PROMPT`]. No blocks render as no lines.
pub fn buffer_lines(blocks: &[DisplayBlock]) -> Vec<String> {
    let mut lines = Vec::new();
    if blocks.is_empty() {
        return lines;
    }

    for block in blocks {
        let body = trimmed(&block.lines);

        match block.kind {
            BlockKind::Input => {
                let count = counter(block.execution_count);
                let prompt = format!("In [{count}]: ");
                let continuation = format!("{}...: ", " ".repeat(2 + count.len()));

                let mut rows = body.iter();
                lines.push(format!("{prompt}{}", rows.next().map_or("", String::as_str)));
                lines.extend(rows.map(|row| format!("{continuation}{row}")));
            }
            BlockKind::Result => {
                let count = counter(block.execution_count);

                let mut rows = body.iter();
                lines.push(format!("Out[{count}]: {}", rows.next().map_or("", String::as_str)));
                lines.extend(rows.cloned());
                lines.push(String::new());
            }
            BlockKind::Stream | BlockKind::Error => {
                lines.extend(body.iter().cloned());
                lines.push(String::new());
            }
        }
    }

    lines.push(NEXT_PROMPT.to_string());
    lines
}

fn counter(execution_count: Option<u32>) -> String {
    execution_count.map_or_else(|| " ".to_string(), |n| n.to_string())
}

/// Drops blank lines at both ends of a payload.
fn trimmed(lines: &[String]) -> &[String] {
    let blank = |line: &String| line.trim().is_empty();
    let start = lines.iter().position(|l| !blank(l)).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !blank(l)).map_or(start, |i| i + 1);

    &lines[start..end]
}
