//! Bounded output for text-producing operations.
//!
//! Operations that can emit unbounded text (diffs, logs, search dumps) cut
//! their output to a line budget before handing it back. The cut is always
//! the head of the output followed by a single marker line, so repeating the
//! same budget is stable.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default hint appended to the marker line.
pub const DEFAULT_HINT: &str = "Increase max_diff_lines to see more.";

/// Matches a marker line produced by [`bound_lines`].
static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\.\.\. Output truncated\. Showing (\d+) of (\d+) lines \.\.\.").unwrap()
});

/// Result of applying a line budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedOutput {
    /// The (possibly truncated) text
    pub text: String,
    /// Number of original lines kept
    pub shown: usize,
    /// Number of lines in the original output
    pub total: usize,
    /// Whether a marker line was appended
    pub truncated: bool,
}

/// Format the marker line for a truncated output.
pub fn marker_line(shown: usize, total: usize, hint: Option<&str>) -> String {
    let mut line = format!("... Output truncated. Showing {} of {} lines ...", shown, total);
    if let Some(hint) = hint.filter(|h| !h.is_empty()) {
        line.push(' ');
        line.push_str(hint);
    }
    line
}

/// Apply a line budget with the default hint.
pub fn bound_lines(text: &str, max_lines: usize) -> BoundedOutput {
    bound_lines_with_hint(text, max_lines, Some(DEFAULT_HINT))
}

/// Apply a line budget, appending `hint` to the marker line when truncating.
///
/// Lines are the `\n`-separated segments of `text`, so a trailing newline
/// counts as an empty final line. Strip it first if it is only a terminator.
///
/// Output of `max_lines` lines or fewer is returned byte-identical. Output
/// that already carries a marker from an earlier cut at the same (or larger)
/// budget is also returned unchanged.
pub fn bound_lines_with_hint(text: &str, max_lines: usize, hint: Option<&str>) -> BoundedOutput {
    let lines: Vec<&str> = text.split('\n').collect();
    let total = lines.len();

    if total <= max_lines {
        return BoundedOutput { text: text.to_string(), shown: total, total, truncated: false };
    }

    if let Some((shown, original_total)) = already_bounded(&lines, max_lines) {
        return BoundedOutput {
            text: text.to_string(),
            shown,
            total: original_total,
            truncated: true,
        };
    }

    let mut out = lines[..max_lines].join("\n");
    out.push('\n');
    out.push_str(&marker_line(max_lines, total, hint));

    BoundedOutput { text: out, shown: max_lines, total, truncated: true }
}

/// Detect a previous cut: last line is a marker whose shown count matches the
/// body above it and fits the budget.
fn already_bounded(lines: &[&str], max_lines: usize) -> Option<(usize, usize)> {
    let (last, body) = lines.split_last()?;
    let caps = MARKER_RE.captures(last)?;
    let shown: usize = caps[1].parse().ok()?;
    let total: usize = caps[2].parse().ok()?;

    (shown == body.len() && shown <= max_lines).then_some((shown, total))
}
