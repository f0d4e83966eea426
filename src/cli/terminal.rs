//! Terminal styling for command output

use owo_colors::{colors::css, OwoColorize};

/// Columns below which tables are printed stacked.
const NARROW_COLUMNS: u16 = 60;

/// Whether stdout is a terminal that understands colour
fn supports_color() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

/// Whether stdout is a terminal narrower than [`NARROW_COLUMNS`]
pub fn is_narrow() -> bool {
    terminal_size::terminal_size().is_some_and(|(width, _)| width.0 < NARROW_COLUMNS)
}

/// Styles for report lines. Styling is skipped when colour is unavailable.
pub trait Colorize {
    /// Green, for completed work
    fn success(&self) -> String;
    /// Amber, for things worth a second look
    fn warning(&self) -> String;
    /// Blue
    fn info(&self) -> String;
    /// Dimmed, for secondary detail
    fn dim(&self) -> String;
}

impl Colorize for str {
    fn success(&self) -> String {
        paint(self, |s| s.fg::<css::Green>().to_string())
    }

    fn warning(&self) -> String {
        paint(self, |s| s.fg::<css::Orange>().to_string())
    }

    fn info(&self) -> String {
        paint(self, |s| s.fg::<css::LightBlue>().to_string())
    }

    fn dim(&self) -> String {
        paint(self, |s| s.dimmed().to_string())
    }
}

fn paint(text: &str, style: impl FnOnce(&str) -> String) -> String {
    if supports_color() {
        style(text)
    } else {
        text.to_string()
    }
}
