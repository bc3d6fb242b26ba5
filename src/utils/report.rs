// src/utils/report.rs

//! Server-style progress output for sync passes.
//!
//! Thin helpers over the `log` facade so headers, steps, and summaries look
//! the same wherever a pass is driven from.

const RULE_WIDTH: usize = 60;

/// Log a framed header.
pub fn header(title: &str) {
    let border = "═".repeat(RULE_WIDTH);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a numbered step.
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("{}", step_line(step_num, total, message));
}

/// Log an indented detail line.
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a titled list of key/value pairs.
pub fn summary(title: &str, items: &[(&str, String)]) {
    for line in summary_lines(title, items) {
        log::info!("{}", line);
    }
}

fn step_line(step_num: usize, total: usize, message: &str) -> String {
    format!("[STEP {step_num}/{total}] {message}")
}

fn summary_lines(title: &str, items: &[(&str, String)]) -> Vec<String> {
    std::iter::once(format!("[SUMMARY] {title}"))
        .chain(items.iter().map(|(key, value)| format!("    {key}: {value}")))
        .collect()
}
