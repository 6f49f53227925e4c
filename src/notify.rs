//! Credential state-change signals.
//!
//! The core only raises the "state changed" event; formatting and delivery
//! (mail, push, whatever the host application wires up) happen on the
//! subscriber side.

use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSignal {
    /// Raised by the host application when it approves a request; the
    /// pipeline shares the hub but never raises this itself.
    Approved,
    /// Host-raised, like [`CredentialSignal::Approved`].
    Rejected,
    Suspended,
    RenderReady,
    RenderFailed,
}

#[derive(Clone, Debug)]
pub struct StateChange {
    pub credential_id: Uuid,
    pub signal: CredentialSignal,
}

#[derive(Clone, Debug)]
pub struct NotificationHub {
    tx: broadcast::Sender<StateChange>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.tx.subscribe()
    }

    /// Raise a signal. Lagging or absent subscribers are the collaborator's
    /// problem, never the pipeline's.
    pub fn raise(&self, credential_id: Uuid, signal: CredentialSignal) {
        let _ = self.tx.send(StateChange {
            credential_id,
            signal,
        });
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}
