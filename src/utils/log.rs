// src/utils/log.rs

//! Console layout helpers on top of the `log` facade.
//!
//! Level filtering and timestamps come from whatever logger the binary
//! installs (env_logger in the CLI); these only shape the lines.

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// `[3/40]`-style progress prefix.
pub fn progress(current: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("[{:>width$}/{}]", current, total, width = width)
}
