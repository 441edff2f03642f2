//! Semantic color palette.

use owo_colors::{OwoColorize, Style};

fn success_style() -> Style {
    Style::new().green().bold()
}

fn error_style() -> Style {
    Style::new().red().bold()
}

fn muted_style() -> Style {
    Style::new().dimmed()
}

/// Applies a palette style unless colors are disabled.
pub trait SemanticStyle: Sized {
    /// Green bold.
    fn success(&self) -> String;
    /// Red bold.
    fn error(&self) -> String;
    /// Dimmed.
    fn muted(&self) -> String;
}

fn paint<T: std::fmt::Display>(value: &T, style: Style) -> String {
    if super::no_color() {
        value.to_string()
    } else {
        value.style(style).to_string()
    }
}

impl<T: std::fmt::Display> SemanticStyle for T {
    fn success(&self) -> String {
        paint(self, success_style())
    }

    fn error(&self) -> String {
        paint(self, error_style())
    }

    fn muted(&self) -> String {
        paint(self, muted_style())
    }
}
