//! Console input - crossterm keys to single bytes

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::error::SteerError;
use crate::keys::{ActionTable, KEY_ENTER, KEY_ESC};
use crate::state::SharedRunState;

/// A keystroke as seen by the action table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Byte(u8),
    /// Ctrl+C (raw mode swallows SIGINT)
    Interrupt,
}

/// Map a crossterm key event to a single byte. Non-ASCII keys and key
/// releases map to `None`.
pub fn key_to_input(key: KeyEvent) -> Option<KeyInput> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(KeyInput::Interrupt),
        (_, KeyCode::Esc) => Some(KeyInput::Byte(KEY_ESC)),
        (_, KeyCode::Enter) => Some(KeyInput::Byte(KEY_ENTER)),
        (_, KeyCode::Tab) => Some(KeyInput::Byte(b'\t')),
        (_, KeyCode::Backspace) => Some(KeyInput::Byte(8)),
        (_, KeyCode::Char(c)) if c.is_ascii() => Some(KeyInput::Byte(c as u8)),
        _ => None,
    }
}

/// Poll for keyboard events with timeout
pub fn poll_event(timeout: Duration) -> io::Result<Option<KeyEvent>> {
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            return Ok(Some(key));
        }
    }
    Ok(None)
}

/// Feed terminal keystrokes to `table` until quit is requested or `done`
/// says stop. Blocks for at most `tick` per poll.
pub fn pump_keys(
    table: &ActionTable,
    state: &SharedRunState,
    tick: Duration,
    done: impl Fn() -> bool,
) -> io::Result<()> {
    pump_keys_from(poll_event, table, state, tick, done)
}

/// [`pump_keys`] over any event source. A read error requests quit before
/// it is returned, so the run loop does not outlive the keyboard.
pub fn pump_keys_from(
    mut poll: impl FnMut(Duration) -> io::Result<Option<KeyEvent>>,
    table: &ActionTable,
    state: &SharedRunState,
    tick: Duration,
    done: impl Fn() -> bool,
) -> io::Result<()> {
    while !state.is_quit_requested() && !done() {
        let key = match poll(tick) {
            Ok(key) => key,
            Err(e) => {
                state.request_quit();
                return Err(e);
            }
        };
        match key.and_then(key_to_input) {
            Some(KeyInput::Byte(b)) => table.keyboard_handler(b),
            Some(KeyInput::Interrupt) => state.request_quit(),
            None => {}
        }
    }
    Ok(())
}

/// Raw terminal mode for the guard's lifetime
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enable() -> Result<Self, SteerError> {
        enable_raw_mode().map_err(|e| SteerError::Terminal(e.to_string()))?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Writer translating `\n` to `\r\n`, so log lines stay left-aligned in
/// raw mode
pub struct CrlfWriter<W> {
    inner: W,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut start = 0;
        for (i, b) in buf.iter().enumerate() {
            if *b == b'\n' {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
