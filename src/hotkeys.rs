use std::io::BufRead;
use std::sync::mpsc::{self, Receiver};
use std::thread;

/// Scoped keypress capability for `AWAIT_KEYPRESS` (§4.6 [EXPANDED]). The original binds one
/// OS-global hotkey per available seat letter and lets the OS deliver the keypress event; this
/// crate has no portable global-hotkey dependency available, so it substitutes line-buffered
/// stdin reads of a single letter. The contract seen by [`crate::fsm::game::GameFsm`] is
/// unchanged either way: bind once per round, capture yields exactly one letter, release when
/// the state is left.
pub struct HotkeyTable {
    bound: Option<Receiver<String>>,
}

impl Default for HotkeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HotkeyTable {
    pub fn new() -> Self {
        Self { bound: None }
    }

    /// True if a bind is currently active (a reader thread is waiting on input).
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Starts waiting for one letter from `valid_letters` (case-insensitive). A no-op if
    /// already bound. The reader thread is fire-and-forget: once it reads a valid letter it
    /// sends it and exits; if [`HotkeyTable::release`] is called first, the thread (blocked on
    /// stdin) is simply abandoned rather than interrupted, since standard input cannot be
    /// cancelled portably without an extra dependency.
    pub fn bind(&mut self, valid_letters: Vec<String>) {
        if self.bound.is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { return };
                let letter = line.trim().to_uppercase();
                if valid_letters.iter().any(|l| l == &letter) {
                    let _ = tx.send(letter);
                    return;
                }
            }
        });
        self.bound = Some(rx);
    }

    /// Non-blocking poll for a captured letter. Unbinds automatically once a letter is
    /// captured.
    pub fn try_capture(&mut self) -> Option<String> {
        let letter = self.bound.as_ref()?.try_recv().ok();
        if letter.is_some() {
            self.bound = None;
        }
        letter
    }

    /// Drops the current bind without waiting for input, e.g. when leaving `AWAIT_KEYPRESS`.
    pub fn release(&mut self) {
        self.bound = None;
    }
}

#[cfg(test)]
mod hotkey_tests {
    use super::*;

    #[test]
    fn test_fresh_table_is_unbound() {
        let table = HotkeyTable::new();
        assert!(!table.is_bound());
    }

    #[test]
    fn test_release_clears_bind_state() {
        let mut table = HotkeyTable::new();
        table.bind(vec!["Q".into()]);
        assert!(table.is_bound());
        table.release();
        assert!(!table.is_bound());
    }

    #[test]
    fn test_try_capture_without_bind_yields_none() {
        let mut table = HotkeyTable::new();
        assert_eq!(table.try_capture(), None);
    }
}
