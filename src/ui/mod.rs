pub mod console;
pub mod theme;

pub use console::Console;
pub use theme::{Tone, styler_for};
