//! Command handlers that delegate to `AppCore`.
//!
//! Handlers parse CLI-specific input, call the core and format output for
//! the terminal. They hold no business logic.

pub mod check_path;
pub mod compact;
pub mod list;
pub mod render;
pub mod summary;
pub mod tasks;
pub mod validate_config;

/// Shorten `value` to `max` characters, marking the cut.
pub(crate) fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let cut: String = value.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
