//! Output helper functions for consistent styled messages.

use super::colors::SemanticStyle;

/// Prints a success message with a checkmark.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".success(), msg);
}

/// Prints an error message with an X mark.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".error(), msg);
}

/// Prints a hint with an arrow.
pub fn print_hint(msg: &str) {
    eprintln!("{} {}", "→".muted(), msg.muted());
}

pub fn print_spacer() {
    println!();
}
