//! Key Actions - single-byte keystroke dispatch
//!
//! An [`ActionTable`] maps one input byte to a description and a
//! zero-argument action. Bytes arrive through
//! [`ActionTable::keyboard_handler`], which first routes them through the
//! [`ExtendedInput`] capture machine:
//!
//! ```text
//!              begin_or_end(X)                 ENTER / ESC
//!   Normal ───────────────────► Capturing ───────────────────► dispatch(X)
//!     ▲                          │  any other byte                  │
//!     │                          └──► payload.push(byte)            │
//!     └──────────────── begin_or_end(X) returns payload ◄───────────┘
//! ```
//!
//! The table iterates in ascending byte order, so the help listing is
//! stable regardless of registration order.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::log::LogSink;
use crate::state::SharedRunState;

/// Carriage return: accepts extended input
pub const KEY_ENTER: u8 = 13;

/// Escape: quits, or aborts extended input
pub const KEY_ESC: u8 = 27;

/// Payload handed back when extended input was aborted with ESC
pub const ABORT_PAYLOAD: &str = "-1";

/// Zero-argument action bound to a key
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// A registered key
#[derive(Clone)]
pub struct KeyEntry {
    pub symbol: u8,
    pub description: String,
    action: Action,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("symbol", &self.symbol)
            .field("description", &self.description)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extended input
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
enum Capture {
    #[default]
    Normal,
    Capturing { finish: u8, payload: Vec<u8> },
}

/// Outcome of routing one byte through the capture machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Dispatch this symbol (the incoming byte, or the finish symbol)
    Dispatch(u8),
    /// Byte was appended to the payload (shown as lossy text)
    Captured { payload: String },
}

/// Free-text capture sub-mode, shareable with the actions that drive it
///
/// Cloning shares the same capture state.
#[derive(Debug, Clone, Default)]
pub struct ExtendedInput {
    state: Arc<Mutex<Capture>>,
}

impl ExtendedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open capture under `finish` and return `""`, or, when already
    /// capturing, close it and return the payload as text. Bytes that are
    /// not valid UTF-8 come back as U+FFFD; use
    /// [`begin_or_end_bytes`](Self::begin_or_end_bytes) for the raw bytes.
    /// The `finish` argument of the closing call is not checked against the
    /// opening one.
    pub fn begin_or_end(&self, finish: u8) -> String {
        String::from_utf8_lossy(&self.begin_or_end_bytes(finish)).into_owned()
    }

    /// Byte-exact form of [`begin_or_end`](Self::begin_or_end)
    pub fn begin_or_end_bytes(&self, finish: u8) -> Vec<u8> {
        let mut state = self.state.lock();
        match std::mem::take(&mut *state) {
            Capture::Normal => {
                *state = Capture::Capturing {
                    finish,
                    payload: Vec::new(),
                };
                Vec::new()
            }
            Capture::Capturing { payload, .. } => payload,
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(*self.state.lock(), Capture::Capturing { .. })
    }

    /// Finish symbol while capturing
    pub fn finish_symbol(&self) -> Option<u8> {
        match *self.state.lock() {
            Capture::Capturing { finish, .. } => Some(finish),
            Capture::Normal => None,
        }
    }

    /// Payload collected so far while capturing, as lossy text
    pub fn payload(&self) -> Option<String> {
        match &*self.state.lock() {
            Capture::Capturing { payload, .. } => Some(String::from_utf8_lossy(payload).into_owned()),
            Capture::Normal => None,
        }
    }

    /// Route one raw byte
    pub fn route(&self, key: u8) -> Routed {
        let mut state = self.state.lock();
        match &mut *state {
            Capture::Normal => Routed::Dispatch(key),
            Capture::Capturing { finish, payload } => match key {
                KEY_ENTER => Routed::Dispatch(*finish),
                KEY_ESC => {
                    payload.clear();
                    payload.extend_from_slice(ABORT_PAYLOAD.as_bytes());
                    Routed::Dispatch(*finish)
                }
                other => {
                    payload.push(other);
                    Routed::Captured {
                        payload: String::from_utf8_lossy(payload).into_owned(),
                    }
                }
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action table
// ─────────────────────────────────────────────────────────────────────────────

type EntryMap = BTreeMap<u8, KeyEntry>;

/// Key-to-action registry
///
/// Cloning is cheap and shares the same entries and capture state. Actions
/// run outside the table lock, so they may register keys or open extended
/// input themselves.
#[derive(Clone)]
pub struct ActionTable {
    entries: Arc<RwLock<EntryMap>>,
    input: ExtendedInput,
    log: Arc<dyn LogSink>,
}

impl ActionTable {
    /// Table with only the help key
    pub fn empty(log: Arc<dyn LogSink>) -> Self {
        let table = Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            input: ExtendedInput::new(),
            log,
        };
        table.register_help();
        table
    }

    /// Table with the built-in run-control keys bound to `state`
    pub fn new(state: Arc<SharedRunState>) -> Self {
        let table = Self::empty(Arc::clone(state.log()));
        table.register_builtin_actions(&state);
        table.log.status("Key action table established");
        table
    }

    /// Bind `action` to `symbol`. Returns false, leaving the existing entry
    /// in place, if `symbol` is already bound.
    pub fn register<F>(&self, symbol: u8, description: impl Into<String>, action: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        let description = description.into();
        debug_assert!(!description.is_empty(), "key description must not be empty");

        match self.entries.write().entry(symbol) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(KeyEntry {
                    symbol,
                    description,
                    action: Arc::new(action),
                });
                true
            }
        }
    }

    /// Entry point for raw keystrokes
    pub fn keyboard_handler(&self, key: u8) {
        self.log.trace("ActionTable::keyboard_handler");
        match self.input.route(key) {
            Routed::Dispatch(symbol) => self.dispatch(symbol),
            Routed::Captured { payload } => self.log.status(&payload),
        }
    }

    /// Run the action bound to `symbol`, bypassing extended input
    pub fn dispatch(&self, symbol: u8) {
        // Clone out so the lock is not held while the action runs
        let action = self
            .entries
            .read()
            .get(&symbol)
            .map(|entry| Arc::clone(&entry.action));

        match action {
            Some(action) => action(),
            None => self.log.warning(&format!(
                "No action bound to key {}. Press h for help.",
                key_label(symbol)
            )),
        }
    }

    /// See [`ExtendedInput::begin_or_end`]
    pub fn begin_or_end_extended_input(&self, finish: u8) -> String {
        self.input.begin_or_end(finish)
    }

    /// Handle to the capture state, for actions that open or close it
    pub fn extended_input(&self) -> ExtendedInput {
        self.input.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.input.is_capturing()
    }

    pub fn contains(&self, symbol: u8) -> bool {
        self.entries.read().contains_key(&symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(symbol, description)` pairs in ascending symbol order
    pub fn descriptions(&self) -> Vec<(u8, String)> {
        self.entries
            .read()
            .values()
            .map(|e| (e.symbol, e.description.clone()))
            .collect()
    }

    /// Log the help listing
    pub fn display_options(&self) {
        display_options(&self.entries, self.log.as_ref());
    }

    fn register_help(&self) {
        // Weak: the entry map owns this closure
        let entries = Arc::downgrade(&self.entries);
        let log = Arc::clone(&self.log);
        self.register(b'h', "h - lists registered keys", move || {
            log.trace("ActionTable::display_options");
            if let Some(entries) = entries.upgrade() {
                display_options(&entries, log.as_ref());
            }
        });
    }

    fn register_builtin_actions(&self, state: &Arc<SharedRunState>) {
        self.bind(state, KEY_ESC, "ESC - quits", "quit", |s| s.request_quit());
        self.bind(state, b's', "s - shows run status", "display_status", |s| {
            s.display_status()
        });

        self.bind(state, b';', "; - raises the log severity threshold", "increment_severity", |s| {
            s.log().increment_severity()
        });
        self.bind(state, b'\'', "' - lowers the log severity threshold", "decrement_severity", |s| {
            s.log().decrement_severity()
        });

        self.bind(state, b'-', "- - slows down (sleep interval x 1.5)", "slow_down", |s| {
            s.multiply_sleep_interval()
        });
        self.bind(state, b'+', "+ - speeds up (sleep interval / 1.5)", "speed_up", |s| {
            s.divide_sleep_interval()
        });
        self.bind(state, b'=', "= - resets the sleep interval to 1s", "reset_sleep", |s| {
            s.set_sleep_interval_seconds(crate::state::DEFAULT_SLEEP_SECS);
        });

        self.bind(state, b'l', "l - toggles learning mode", "toggle_learning", |s| {
            s.toggle_learning_mode()
        });
        self.bind(state, b' ', "SPACE - pauses/resumes the run", "toggle_pause", |s| {
            s.toggle_pause()
        });
        self.bind(state, b'\\', "\\ - performs a single step", "single_step", |s| {
            s.request_single_step()
        });
    }

    fn bind<F>(
        &self,
        state: &Arc<SharedRunState>,
        symbol: u8,
        description: &str,
        name: &'static str,
        effect: F,
    ) where
        F: Fn(&SharedRunState) + Send + Sync + 'static,
    {
        let state = Arc::clone(state);
        self.register(symbol, description, move || {
            state.log().trace(&format!("key action: {}", name));
            effect(&state);
        });
    }
}

impl fmt::Debug for ActionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTable")
            .field("keys", &self.entries.read().keys().collect::<Vec<_>>())
            .field("capturing", &self.input.is_capturing())
            .finish()
    }
}

fn display_options(entries: &RwLock<EntryMap>, log: &dyn LogSink) {
    let rule = "----------------------------------------------------------------";
    log.status(rule);
    log.status("Registered keys:");
    log.status(rule);
    for entry in entries.read().values() {
        log.status(&entry.description);
    }
    log.status(rule);
}

/// Printable name for a key byte
pub fn key_label(symbol: u8) -> String {
    match symbol {
        KEY_ESC => "ESC".to_string(),
        KEY_ENTER => "ENTER".to_string(),
        b' ' => "SPACE".to_string(),
        c if c.is_ascii_graphic() => format!("'{}'", c as char),
        c => format!("0x{:02x}", c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{MemoryLog, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn empty_table() -> (ActionTable, MemoryLog) {
        let log = MemoryLog::default();
        (ActionTable::empty(Arc::new(log.clone())), log)
    }

    fn full_table() -> (ActionTable, Arc<SharedRunState>, MemoryLog) {
        let log = MemoryLog::default();
        let state = SharedRunState::shared(Arc::new(log.clone()));
        (ActionTable::new(Arc::clone(&state)), state, log)
    }

    #[test]
    fn first_registration_wins() {
        let (table, _) = empty_table();
        let (first, first_action) = counter();
        let (second, second_action) = counter();

        assert!(table.register(b'x', "x - first", first_action));
        assert!(!table.register(b'x', "x - second", second_action));

        table.keyboard_handler(b'x');
        table.keyboard_handler(b'x');
        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert!(table.descriptions().contains(&(b'x', "x - first".to_string())));
    }

    #[test]
    fn unknown_key_warns_once() {
        let (table, log) = empty_table();
        let (count, action) = counter();
        table.register(b'a', "a - something", action);

        table.keyboard_handler(b'z');

        assert_eq!(count.load(Ordering::SeqCst), 0);
        let warnings = log.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'z'"));
    }

    #[test]
    fn high_bytes_are_kept_verbatim() {
        let input = ExtendedInput::new();
        input.begin_or_end_bytes(b'x');
        input.route(b'a');
        input.route(0xE9);
        input.route(0xFF);

        assert_eq!(input.begin_or_end_bytes(b'x'), vec![b'a', 0xE9, 0xFF]);
        assert!(!input.is_capturing());

        input.begin_or_end(b'x');
        input.route(0xE9);
        assert_eq!(input.begin_or_end(b'x'), "\u{FFFD}");
    }

    #[test]
    fn descriptions_are_in_byte_order() {
        let (table, _) = empty_table();
        table.register(b's', "s", || {});
        table.register(b'l', "l", || {});

        let symbols: Vec<u8> = table.descriptions().into_iter().map(|(s, _)| s).collect();
        assert_eq!(symbols, vec![b'h', b'l', b's']);
    }

    #[test]
    fn help_key_lists_in_byte_order() {
        let log = MemoryLog::new(Severity::Status);
        let table = ActionTable::empty(Arc::new(log.clone()));
        table.register(b's', "s - status", || {});
        table.register(b'l', "l - learn", || {});

        table.keyboard_handler(b'h');

        let listed: Vec<String> = log
            .at(Severity::Status)
            .into_iter()
            .filter(|line| !line.starts_with('-') && line != "Registered keys:")
            .collect();
        assert_eq!(
            listed,
            vec![
                "h - lists registered keys".to_string(),
                "l - learn".to_string(),
                "s - status".to_string(),
            ]
        );
    }

    #[test]
    fn extended_input_collects_then_dispatches_finish_key() {
        let (table, _) = empty_table();
        let (fired, action) = counter();
        table.register(b'X', "X - finish", action);

        assert_eq!(table.begin_or_end_extended_input(b'X'), "");
        assert!(table.is_capturing());
        assert_eq!(table.extended_input().finish_symbol(), Some(b'X'));

        for b in b"abc" {
            table.keyboard_handler(*b);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(table.extended_input().payload().as_deref(), Some("abc"));

        table.keyboard_handler(KEY_ENTER);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert_eq!(table.begin_or_end_extended_input(b'X'), "abc");
        assert!(!table.is_capturing());
    }

    #[test]
    fn extended_input_abort_yields_sentinel() {
        let (table, _) = empty_table();
        let (fired, action) = counter();
        table.register(b'X', "X - finish", action);

        table.begin_or_end_extended_input(b'X');
        table.keyboard_handler(b'4');
        table.keyboard_handler(KEY_ESC);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(table.begin_or_end_extended_input(b'X'), ABORT_PAYLOAD);
    }

    #[test]
    fn finish_handler_closes_capture_itself() {
        let (table, _) = empty_table();
        let input = table.extended_input();
        let received = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&received);

        table.register(b'n', "n - enter a name", move || {
            let text = input.begin_or_end(b'n');
            if !text.is_empty() {
                sink.lock().push(text);
            }
        });

        // First press opens capture from inside the handler
        table.keyboard_handler(b'n');
        assert!(table.is_capturing());

        for b in b"ada" {
            table.keyboard_handler(*b);
        }
        table.keyboard_handler(KEY_ENTER);

        assert!(!table.is_capturing());
        assert_eq!(*received.lock(), vec!["ada".to_string()]);
    }

    #[test]
    fn capture_logs_payload_without_dispatch() {
        let (table, log) = empty_table();
        table.begin_or_end_extended_input(b'X');
        table.keyboard_handler(b'h');
        // 'h' is bound, but while capturing it only extends the payload
        assert!(log.at(Severity::Status).contains(&"h".to_string()));
        assert!(!log.contains("Registered keys:"));
    }

    #[test]
    fn capture_without_finish_handler_warns() {
        let (table, log) = empty_table();
        table.begin_or_end_extended_input(b'Q');
        table.keyboard_handler(KEY_ENTER);
        assert_eq!(log.warnings().len(), 1);
        assert!(table.is_capturing());
    }

    #[test]
    fn builtin_keys_drive_state() {
        let (table, state, log) = full_table();

        table.keyboard_handler(b' ');
        assert!(state.is_paused());
        table.keyboard_handler(b' ');
        assert!(!state.is_paused());

        table.keyboard_handler(b'\\');
        assert!(state.is_single_step_requested());

        table.keyboard_handler(b'l');
        assert!(state.is_learning_mode_on());

        table.keyboard_handler(b'-');
        assert!((state.sleep_interval_secs() - 1.5).abs() < 1e-12);
        table.keyboard_handler(b'+');
        table.keyboard_handler(b'+');
        assert!((state.sleep_interval_secs() - 1.0 / 1.5).abs() < 1e-12);
        table.keyboard_handler(b'=');
        assert_eq!(state.sleep_interval_secs(), 1.0);

        table.keyboard_handler(b';');
        assert_eq!(log.threshold(), Severity::Debug);
        table.keyboard_handler(b'\'');
        assert_eq!(log.threshold(), Severity::Trace);

        table.keyboard_handler(b's');
        assert!(log.contains("Iteration: 0"));

        table.keyboard_handler(KEY_ESC);
        assert!(state.is_quit_requested());
        assert!(log.warnings().is_empty());
    }

    #[test]
    fn builtin_table_has_all_keys() {
        let (table, _, _) = full_table();
        for key in [KEY_ESC, b'h', b's', b';', b'\'', b'-', b'+', b'=', b'l', b' ', b'\\'] {
            assert!(table.contains(key), "missing {}", key_label(key));
        }
        assert_eq!(table.len(), 11);
    }

    #[test]
    fn action_can_register_keys() {
        let (table, _) = empty_table();
        let inner = table.clone();
        table.register(b'r', "r - adds a key", move || {
            inner.register(b'q', "q - added", || {});
        });
        table.keyboard_handler(b'r');
        assert!(table.contains(b'q'));
    }

    #[test]
    fn key_labels() {
        assert_eq!(key_label(KEY_ESC), "ESC");
        assert_eq!(key_label(b' '), "SPACE");
        assert_eq!(key_label(b'a'), "'a'");
        assert_eq!(key_label(1), "0x01");
    }
}
