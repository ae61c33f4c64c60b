//! Session Signals
//!
//! Everything the session produces for the outside world: status text,
//! progress, the "do not close" guard and the save-action interlock.

use super::state::SessionState;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

/// Receives session output. All methods default to doing nothing.
pub trait SessionObserver: Send + Sync {
    fn on_state(&self, _state: SessionState) {}

    fn on_status(&self, _message: &str) {}

    fn on_progress(&self, _percent: u8) {}

    /// A confirmation question was put to the gate
    fn on_confirmation(&self, _message: &str) {}

    /// Entry action of the flash states: arm the leave guard, block saves
    fn on_flash_started(&self) {}

    /// Exit action of the flash states
    fn on_flash_finished(&self, _success: bool) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Observer that keeps the latest value of every signal, plus a history of
/// states and progress values
#[derive(Debug)]
pub struct SignalBoard {
    status: Mutex<String>,
    progress: AtomicU8,
    update_in_progress: AtomicBool,
    save_enabled: AtomicBool,
    success: AtomicBool,
    states: Mutex<Vec<SessionState>>,
    progress_history: Mutex<Vec<u8>>,
    confirmations: Mutex<Vec<String>>,
}

impl Default for SignalBoard {
    fn default() -> Self {
        Self {
            status: Mutex::new(String::new()),
            progress: AtomicU8::new(0),
            update_in_progress: AtomicBool::new(false),
            save_enabled: AtomicBool::new(true),
            success: AtomicBool::new(false),
            states: Mutex::new(vec![SessionState::Idle]),
            progress_history: Mutex::new(Vec::new()),
            confirmations: Mutex::new(Vec::new()),
        }
    }
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> String {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// Whether leaving must be confirmed
    pub fn update_in_progress(&self) -> bool {
        self.update_in_progress.load(Ordering::SeqCst)
    }

    pub fn save_enabled(&self) -> bool {
        self.save_enabled.load(Ordering::SeqCst)
    }

    pub fn success(&self) -> bool {
        self.success.load(Ordering::SeqCst)
    }

    pub fn states(&self) -> Vec<SessionState> {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn progress_history(&self) -> Vec<u8> {
        self.progress_history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn confirmations(&self) -> Vec<String> {
        self.confirmations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SessionObserver for SignalBoard {
    fn on_state(&self, state: SessionState) {
        if state == SessionState::Checking {
            self.success.store(false, Ordering::SeqCst);
            self.progress.store(0, Ordering::SeqCst);
        }
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state);
    }

    fn on_status(&self, message: &str) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = message.to_string();
    }

    fn on_progress(&self, percent: u8) {
        self.progress.store(percent, Ordering::SeqCst);
        self.progress_history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(percent);
    }

    fn on_confirmation(&self, message: &str) {
        self.confirmations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }

    fn on_flash_started(&self) {
        self.update_in_progress.store(true, Ordering::SeqCst);
        self.save_enabled.store(false, Ordering::SeqCst);
    }

    fn on_flash_finished(&self, success: bool) {
        self.update_in_progress.store(false, Ordering::SeqCst);
        self.save_enabled.store(true, Ordering::SeqCst);
        self.success.store(success, Ordering::SeqCst);
    }
}

/// Fan out to several observers
pub struct Observers(pub Vec<std::sync::Arc<dyn SessionObserver>>);

impl SessionObserver for Observers {
    fn on_state(&self, state: SessionState) {
        self.0.iter().for_each(|o| o.on_state(state));
    }

    fn on_status(&self, message: &str) {
        self.0.iter().for_each(|o| o.on_status(message));
    }

    fn on_progress(&self, percent: u8) {
        self.0.iter().for_each(|o| o.on_progress(percent));
    }

    fn on_confirmation(&self, message: &str) {
        self.0.iter().for_each(|o| o.on_confirmation(message));
    }

    fn on_flash_started(&self) {
        self.0.iter().for_each(|o| o.on_flash_started());
    }

    fn on_flash_finished(&self, success: bool) {
        self.0.iter().for_each(|o| o.on_flash_finished(success));
    }
}
