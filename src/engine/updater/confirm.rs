//! Confirmation Gate
//!
//! Holds at most one pending yes/no question. The session awaits the answer;
//! whoever owns the user interface calls [`ConfirmationGate::resolve`].
//! There is no timeout.

use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("A confirmation is already pending")]
    AlreadyPending,
    #[error("No confirmation is pending")]
    NothingPending,
}

struct Pending {
    message: String,
    reply: oneshot::Sender<bool>,
}

/// Single-slot confirmation rendezvous
#[derive(Default)]
pub struct ConfirmationGate {
    slot: Mutex<Option<Pending>>,
    asked: Notify,
}

/// Awaitable answer to a confirmation request
pub struct Decision {
    reply: oneshot::Receiver<bool>,
}

impl Decision {
    /// Wait for the answer. A gate dropped without answering counts as "no".
    pub async fn wait(self) -> bool {
        self.reply.await.unwrap_or(false)
    }
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request. Fails if another one is still unanswered.
    pub fn request(&self, message: &str) -> Result<Decision, GateError> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(GateError::AlreadyPending);
        }

        let (reply, receiver) = oneshot::channel();
        *slot = Some(Pending {
            message: message.to_string(),
            reply,
        });
        drop(slot);

        self.asked.notify_one();
        Ok(Decision { reply: receiver })
    }

    /// Answer the pending request
    pub fn resolve(&self, accepted: bool) -> Result<(), GateError> {
        let pending = self
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(GateError::NothingPending)?;
        // the requester may have gone away; nothing to do then
        let _ = pending.reply.send(accepted);
        Ok(())
    }

    /// Withdraw the pending request without answering it
    pub fn cancel(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }

    /// Message of the pending request, if any
    pub fn pending_message(&self) -> Option<String> {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.message.clone())
    }

    pub fn is_pending(&self) -> bool {
        self.pending_message().is_some()
    }

    /// Wait until a request is pending and return its message
    pub async fn next_request(&self) -> String {
        loop {
            let notified = self.asked.notified();
            if let Some(message) = self.pending_message() {
                return message;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_accept() {
        let gate = ConfirmationGate::new();
        let decision = gate.request("Flash?").unwrap();
        assert_eq!(gate.pending_message().as_deref(), Some("Flash?"));

        gate.resolve(true).unwrap();
        assert!(decision.wait().await);
        assert!(!gate.is_pending());
    }

    #[tokio::test]
    async fn test_decline() {
        let gate = ConfirmationGate::new();
        let decision = gate.request("Flash?").unwrap();
        gate.resolve(false).unwrap();
        assert!(!decision.wait().await);
    }

    #[test]
    fn test_second_request_rejected() {
        let gate = ConfirmationGate::new();
        let _first = gate.request("one").unwrap();
        assert_eq!(gate.request("two").err(), Some(GateError::AlreadyPending));
        assert_eq!(gate.pending_message().as_deref(), Some("one"));
    }

    #[test]
    fn test_resolve_without_request() {
        let gate = ConfirmationGate::new();
        assert_eq!(gate.resolve(true), Err(GateError::NothingPending));
    }

    #[tokio::test]
    async fn test_next_request_wakes_waiter() {
        let gate = Arc::new(ConfirmationGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.next_request().await })
        };
        tokio::task::yield_now().await;

        let decision = gate.request("Downgrade?").unwrap();
        assert_eq!(waiter.await.unwrap(), "Downgrade?");

        gate.resolve(true).unwrap();
        assert!(decision.wait().await);
    }

    #[tokio::test]
    async fn test_slot_reusable_after_answer() {
        let gate = ConfirmationGate::new();
        let first = gate.request("one").unwrap();
        gate.resolve(false).unwrap();
        assert!(!first.wait().await);

        let second = gate.request("two").unwrap();
        gate.resolve(true).unwrap();
        assert!(second.wait().await);
    }

    #[tokio::test]
    async fn test_cancel_withdraws_request() {
        let gate = ConfirmationGate::new();
        let decision = gate.request("Flash?").unwrap();

        assert!(gate.cancel());
        assert!(!gate.is_pending());
        assert!(!decision.wait().await);
        assert_eq!(gate.resolve(true), Err(GateError::NothingPending));
        assert!(!gate.cancel());
    }
}
