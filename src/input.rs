//! Input surface - keys, commands and the stdin reader.
//!
//! Everything that can steer the show arrives on the control thread as an
//! `Input` over one crossbeam channel:
//!
//! - `Key(char)`: a raw keypress. The slideshow decides whether it is a
//!   command or typing into the email prompt.
//! - `Command(Command)`: already decoded (REST API).
//! - `Status(reply)`: a status query; the control thread answers on `reply`.
//!
//! # Keys
//!
//! | Key       | Command          |
//! |-----------|------------------|
//! | space     | pause / resume   |
//! | `1`..`5`  | rate             |
//! | `r` / `l` | rotate CW / CCW  |
//! | `n` / `p` | next / previous  |
//! | `e`       | email prompt     |
//! | `D`       | debug overlay    |
//! | `b`       | aux panel        |
//! | `T`       | toggle ingestion |
//! | `Q`       | quit             |

use std::io::{self, BufRead};
use std::thread;

use crossbeam_channel::Sender;
use log::{debug, trace};

use crate::core::slideshow::StatusReport;

/// Degrees added to a photo's rotation by one clockwise turn.
pub const ROTATE_CW: i32 = -90;
/// Degrees added to a photo's rotation by one counter-clockwise turn.
pub const ROTATE_CCW: i32 = 90;

/// User commands, independent of where they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    /// Rate the photo on screen (1-5)
    Rate(u8),
    /// Rotate the photo on screen by this many degrees (CCW positive)
    Rotate(i32),
    /// Jump this many slides
    Jump(i64),
    PromptEmail,
    ToggleDebug,
    ToggleAuxPanel,
    ToggleIngest,
    /// Typing into the open email prompt
    EmailKey(EmailKey),
    Quit,
}

impl Command {
    /// Command bound to `key`, if any.
    pub fn from_key(key: char) -> Option<Self> {
        let command = match key {
            ' ' => Command::TogglePause,
            '1'..='5' => Command::Rate(key as u8 - b'0'),
            'r' => Command::Rotate(ROTATE_CW),
            'l' => Command::Rotate(ROTATE_CCW),
            'n' => Command::Jump(1),
            'p' => Command::Jump(-1),
            'e' => Command::PromptEmail,
            'D' => Command::ToggleDebug,
            'b' => Command::ToggleAuxPanel,
            'T' => Command::ToggleIngest,
            'Q' => Command::Quit,
            _ => return None,
        };
        Some(command)
    }
}

/// Keys understood by the email prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKey {
    Char(char),
    Backspace,
    /// Complete to the only suggestion
    Tab,
    Enter,
    Escape,
    /// Pick suggestion by position
    Suggestion(usize),
}

impl EmailKey {
    /// Map a typed character. Other control characters are dropped.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '\x1b' => Some(EmailKey::Escape),
            '\x08' | '\x7f' => Some(EmailKey::Backspace),
            '\t' => Some(EmailKey::Tab),
            '\n' | '\r' => Some(EmailKey::Enter),
            c if c.is_control() => None,
            c => Some(EmailKey::Char(c)),
        }
    }
}

/// Message to the control thread.
#[derive(Debug)]
pub enum Input {
    Key(char),
    Command(Command),
    Status(Sender<StatusReport>),
}

/// Start a detached thread forwarding stdin characters as `Input::Key`.
///
/// Line buffering is left to the terminal, so keys arrive when Enter is
/// pressed; the newline itself is forwarded too.
pub fn spawn_stdin_reader(tx: Sender<Input>) -> io::Result<()> {
    thread::Builder::new()
        .name("frameloop-stdin".to_string())
        .spawn(move || {
            debug!("Stdin reader started");
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                trace!("stdin: {:?}", line);
                for key in line.chars().chain(std::iter::once('\n')) {
                    if tx.send(Input::Key(key)).is_err() {
                        return;
                    }
                }
            }
            debug!("Stdin closed");
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key() {
        assert_eq!(Command::from_key(' '), Some(Command::TogglePause));
        assert_eq!(Command::from_key('4'), Some(Command::Rate(4)));
        assert_eq!(Command::from_key('r'), Some(Command::Rotate(-90)));
        assert_eq!(Command::from_key('l'), Some(Command::Rotate(90)));
        assert_eq!(Command::from_key('p'), Some(Command::Jump(-1)));
        assert_eq!(Command::from_key('T'), Some(Command::ToggleIngest));
        assert_eq!(Command::from_key('Q'), Some(Command::Quit));
        assert_eq!(Command::from_key('0'), None);
        assert_eq!(Command::from_key('q'), None);
        assert_eq!(Command::from_key('\n'), None);
    }

    #[test]
    fn test_email_key_from_char() {
        assert_eq!(EmailKey::from_char('a'), Some(EmailKey::Char('a')));
        assert_eq!(EmailKey::from_char('@'), Some(EmailKey::Char('@')));
        assert_eq!(EmailKey::from_char('\r'), Some(EmailKey::Enter));
        assert_eq!(EmailKey::from_char('\x7f'), Some(EmailKey::Backspace));
        assert_eq!(EmailKey::from_char('\x1b'), Some(EmailKey::Escape));
        assert_eq!(EmailKey::from_char('\x01'), None);
    }
}
