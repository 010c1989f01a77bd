//! Line-oriented unified diffs for failure output

use colored::Colorize;
use similar::TextDiff;

/// Unified diff from `reference` to `response`, plain text
pub fn unified_diff(reference: &str, response: &str) -> String {
    TextDiff::from_lines(reference, response)
        .unified_diff()
        .context_radius(3)
        .header("reference", "response")
        .to_string()
}

/// Removals in red, additions in green, headers untouched
pub fn colorize(diff: &str) -> String {
    let mut out = String::with_capacity(diff.len());
    for line in diff.lines() {
        let colored = if line.starts_with("+++") || line.starts_with("---") {
            line.bold().to_string()
        } else if line.starts_with('+') {
            line.green().to_string()
        } else if line.starts_with('-') {
            line.red().to_string()
        } else {
            line.to_string()
        };
        out.push_str(&colored);
        out.push('\n');
    }
    out
}

/// Failure banner followed by the colored diff
pub fn render_failure(test: &str, diff: &str) -> String {
    format!("\n\n{}\n\n{}", format!("{test} failed:").magenta(), colorize(diff))
}
