//! Keystrokes for the interactive tools.
//!
//! `q` quits and `s` saves. Keys are read from stdin lines on a background
//! thread so the capture loop never blocks on the terminal.

use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Quit,
    Save,
    Other(char),
}

impl Key {
    pub fn from_char(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'q' => Key::Quit,
            's' => Key::Save,
            other => Key::Other(other),
        }
    }
}

pub trait KeySource: Send {
    /// Next pending key, without blocking.
    fn poll(&mut self) -> Option<Key>;
}

/// Reads keys typed on stdin (one or more characters followed by Enter).
pub struct StdinKeys {
    rx: Receiver<Key>,
}

impl StdinKeys {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        // The reader is detached; it ends with stdin or when the receiver goes away.
        thread::Builder::new()
            .name("stdin-keys".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    for c in line.chars().filter(|c| !c.is_whitespace()) {
                        if tx.send(Key::from_char(c)).is_err() {
                            return;
                        }
                    }
                }
            })
            .map(|_| ())
            .unwrap_or_else(|e| debug!("stdin key reader unavailable: {}", e));
        Self { rx }
    }
}

impl KeySource for StdinKeys {
    fn poll(&mut self) -> Option<Key> {
        match self.rx.try_recv() {
            Ok(key) => Some(key),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

/// Replays a fixed sequence, one entry per poll; `None` entries are frames
/// without a key press.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    script: VecDeque<Option<Key>>,
}

impl ScriptedKeys {
    pub fn new(script: impl IntoIterator<Item = Option<Key>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl KeySource for ScriptedKeys {
    fn poll(&mut self) -> Option<Key> {
        self.script.pop_front().flatten()
    }
}

/// Never reports a key.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeys;

impl KeySource for NoKeys {
    fn poll(&mut self) -> Option<Key> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_case_insensitively() {
        assert_eq!(Key::from_char('Q'), Key::Quit);
        assert_eq!(Key::from_char('s'), Key::Save);
        assert_eq!(Key::from_char('x'), Key::Other('x'));
    }

    #[test]
    fn scripted_keys_replay_in_order() {
        let mut keys = ScriptedKeys::new([None, Some(Key::Save), Some(Key::Quit)]);
        assert_eq!(keys.poll(), None);
        assert_eq!(keys.poll(), Some(Key::Save));
        assert_eq!(keys.poll(), Some(Key::Quit));
        assert_eq!(keys.poll(), None);
    }
}
