use std::io::Write;

use super::theme::{Styler, Tone};

/// Line-oriented report writer with a normal and a verbose register.
pub struct Console {
    out: Box<dyn Write + Send>,
    styler: Box<dyn Styler>,
    verbose: bool,
}

impl Console {
    pub fn new(out: Box<dyn Write + Send>, styler: Box<dyn Styler>, verbose: bool) -> Self {
        Self {
            out,
            styler,
            verbose,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn paint(&self, text: &str, tone: Tone) -> String {
        self.styler.paint(text, tone)
    }

    /// Style each line on its own so the color survives line breaks.
    pub fn paint_lines(&self, text: &str, tone: Tone) -> String {
        text.split('\n')
            .map(|line| self.styler.paint(line, tone))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    pub fn writeln(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
        let _ = self.out.flush();
    }

    pub fn newline(&mut self) {
        self.writeln("");
    }

    pub fn write_painted(&mut self, text: &str, tone: Tone) {
        let painted = self.paint(text, tone);
        self.write(&painted);
    }

    pub fn writeln_painted(&mut self, text: &str, tone: Tone) {
        let painted = self.paint(text, tone);
        self.writeln(&painted);
    }

    /// `>> message`, with the marker repeated on every line.
    pub fn error(&mut self, message: &str) {
        let marker = self.paint(">>", Tone::Red);
        for line in message.split('\n') {
            let line = format!("{} {}", marker, line);
            self.writeln(&line);
        }
    }

    /// Bare `ERROR` marker ending the current progress line.
    pub fn error_mark(&mut self) {
        self.writeln_painted("ERROR", Tone::Red);
    }

    pub fn ok(&mut self, message: &str) {
        let line = format!("{} {}", self.paint(">>", Tone::Green), message);
        self.writeln(&line);
    }

    pub fn ok_mark(&mut self) {
        self.writeln_painted("OK", Tone::Green);
    }

    pub fn warn(&mut self, message: &str) {
        let line = self.paint(&format!("Warning: {}", message), Tone::Yellow);
        self.writeln(&line);
    }

    pub fn subhead(&mut self, message: &str) {
        self.newline();
        self.writeln_painted(message, Tone::Bold);
    }

    /// Write text from the page exactly as received.
    pub fn passthrough(&mut self, text: &str) {
        self.writeln(text);
    }
}

/// In-memory sink shared between a [`Console`] and a test.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct Capture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl Capture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn console(&self, verbose: bool) -> Console {
        Console::new(
            Box::new(self.clone()),
            Box::new(super::theme::PlainStyler),
            verbose,
        )
    }
}

#[cfg(test)]
impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::theme::AnsiStyler;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_marks_every_line() {
        let capture = Capture::default();
        let mut console = capture.console(false);
        console.error("first\nsecond");

        assert_eq!(capture.contents(), ">> first\n>> second\n");
    }

    #[test]
    fn test_paint_lines_styles_each_line() {
        let console = Console::new(Box::new(Capture::default()), Box::new(AnsiStyler), false);
        let painted = console.paint_lines("line1\nline2", Tone::Magenta);

        let lines: Vec<&str> = painted.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], AnsiStyler.paint("line1", Tone::Magenta));
        assert_eq!(lines[1], AnsiStyler.paint("line2", Tone::Magenta));
    }

    #[test]
    fn test_warn_and_ok() {
        let capture = Capture::default();
        let mut console = capture.console(false);
        console.warn("Issues were found.");
        console.ok("No issues found.");

        assert_eq!(
            capture.contents(),
            "Warning: Issues were found.\n>> No issues found.\n"
        );
    }
}
