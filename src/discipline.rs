//! Cooked terminal input.
//!
//! A [`LineDiscipline`] turns raw keystroke bytes into an edited line. Input
//! is fed chunk by chunk through [`LineDiscipline::process`], which returns
//! the bytes to echo so that the terminal shows the line being edited.

use crate::TRACING_TARGET;

use std::fmt::Write;
use std::iter::Peekable;
use std::str::Chars;

const BELL: char = '\x07';
const ESC: char = '\x1b';
const DELETE: char = '\x7f';
const BACKSPACE: char = '\x08';

/// The edit buffer of one line, split at the cursor.
#[derive(Debug, Default)]
pub struct LineDiscipline {
    before: String,
    after: String,
    done: bool,
}

impl LineDiscipline {
    pub fn new() -> LineDiscipline {
        LineDiscipline::default()
    }

    /// Consumes one chunk of raw input and returns the echo for it.
    ///
    /// Input after a newline in the same chunk is discarded. Escape
    /// sequences must arrive whole; one split across two chunks is
    /// misparsed.
    ///
    /// Editing works on code points, and every code point is one column
    /// wide. Backspace after a combining mark removes only the mark, and
    /// cursor moves over wide characters are one column short.
    pub fn process(&mut self, raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw)
            .replace("\r\n", "\n")
            .replace('\r', "\n");
        let mut chars = text.chars().peekable();

        let mut echo = String::new();
        // Columns left of the line end that hold stale glyphs after deletes.
        let mut shift = 0;

        while let Some(c) = chars.next() {
            match c {
                DELETE | BACKSPACE => match self.before.pop() {
                    Some(_) => {
                        shift += 1;
                        echo.push_str("\x1b[1D");
                    }
                    None => bell(&mut echo),
                },
                ESC => self.escape(&mut chars, &mut echo),
                '\n' => {
                    self.done = true;
                    echo.push('\n');
                    break;
                }
                c => {
                    self.before.push(c);
                    echo.push(c);
                }
            }
        }

        let tail = self.after.chars().count() + shift;
        if tail > 0 {
            echo.push_str(&self.after);
            echo.push_str(&" ".repeat(shift));
            let _ = write!(echo, "\x1b[{tail}D");
        }

        echo
    }

    fn escape(&mut self, chars: &mut Peekable<Chars<'_>>, echo: &mut String) {
        match chars.peek() {
            Some('[') => {
                chars.next();
            }
            // Alt+key: drop the key.
            Some(c) if !c.is_control() => {
                chars.next();
                return;
            }
            _ => return,
        }

        let mut args = String::new();
        let mut command = None;
        for c in chars.by_ref() {
            if c == ';' || c.is_ascii_digit() {
                args.push(c);
            } else {
                command = Some(c);
                break;
            }
        }

        match command {
            // History is not kept.
            Some('A' | 'B') => {}
            Some('C') => match first_char(&self.after) {
                Some(c) => {
                    self.after.remove(0);
                    self.before.push(c);
                    echo.push_str("\x1b[1C");
                }
                None => bell(echo),
            },
            Some('D') => match self.before.pop() {
                Some(c) => {
                    self.after.insert(0, c);
                    echo.push_str("\x1b[1D");
                }
                None => bell(echo),
            },
            Some('H') => {
                if self.before.is_empty() {
                    bell(echo);
                } else {
                    let n = self.before.chars().count();
                    self.after.insert_str(0, &self.before);
                    self.before.clear();
                    let _ = write!(echo, "\x1b[{n}D");
                }
            }
            Some('F') => {
                if self.after.is_empty() {
                    bell(echo);
                } else {
                    let n = self.after.chars().count();
                    self.before.push_str(&self.after);
                    self.after.clear();
                    let _ = write!(echo, "\x1b[{n}C");
                }
            }
            command => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    ?command,
                    %args,
                    "ignoring escape sequence"
                );
            }
        }
    }

    /// Whether Enter has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The logical line, regardless of cursor position.
    pub fn line(&self) -> String {
        format!("{}{}", self.before, self.after)
    }
}

fn first_char(s: &str) -> Option<char> {
    s.chars().next()
}

fn bell(echo: &mut String) {
    if !echo.contains(BELL) {
        echo.push(BELL);
    }
}
