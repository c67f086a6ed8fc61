use crossterm::style::{Color, Stylize, style};

/// Semantic colors used by the console report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Red,
    Green,
    Yellow,
    Magenta,
    Bold,
}

impl Tone {
    fn color(self) -> Option<Color> {
        match self {
            Tone::Red => Some(Color::Red),
            Tone::Green => Some(Color::Green),
            Tone::Yellow => Some(Color::Yellow),
            Tone::Magenta => Some(Color::Magenta),
            Tone::Bold => None,
        }
    }
}

/// Turns plain text into styled text for a particular output sink.
pub trait Styler: Send {
    fn paint(&self, text: &str, tone: Tone) -> String;
}

/// Leaves text untouched. Used for pipes, logs and tests.
pub struct PlainStyler;

impl Styler for PlainStyler {
    fn paint(&self, text: &str, _tone: Tone) -> String {
        text.to_string()
    }
}

/// ANSI escape sequences for terminals.
pub struct AnsiStyler;

impl Styler for AnsiStyler {
    fn paint(&self, text: &str, tone: Tone) -> String {
        match tone.color() {
            Some(color) => style(text).with(color).to_string(),
            None => style(text).bold().to_string(),
        }
    }
}

/// Pick a styler for the given color mode; `None` means auto-detect from the terminal.
pub fn styler_for(color: Option<bool>) -> Box<dyn Styler> {
    use std::io::IsTerminal;

    let enabled = color.unwrap_or_else(|| std::io::stdout().is_terminal());
    if enabled {
        Box::new(AnsiStyler)
    } else {
        Box::new(PlainStyler)
    }
}
