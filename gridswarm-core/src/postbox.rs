use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::trace;

use crate::message::{AgentId, Envelope};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostError {
    #[error("no agent named {0} is registered")]
    UnknownReceiver(AgentId),
    #[error("mailbox of {0} is closed")]
    Disconnected(AgentId),
    #[error("agent {0} is already registered")]
    AlreadyRegistered(AgentId),
}

/// Somewhere envelopes can be dropped off.
pub trait Mailbox: Send + Sync {
    fn deliver(&self, envelope: Envelope) -> Result<(), PostError>;
}

impl Mailbox for Sender<Envelope> {
    fn deliver(&self, envelope: Envelope) -> Result<(), PostError> {
        let receiver = envelope.receiver.clone();
        self.send(envelope).map_err(|_| PostError::Disconnected(receiver))
    }
}

/// In-process router delivering envelopes by receiver id.
#[derive(Default)]
pub struct Postbox {
    routes: RwLock<HashMap<AgentId, Arc<dyn Mailbox>>>,
}

impl Postbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, id: AgentId, mailbox: Arc<dyn Mailbox>) -> Result<(), PostError> {
        let mut routes = self.routes.write();
        if routes.contains_key(&id) {
            return Err(PostError::AlreadyRegistered(id));
        }
        routes.insert(id, mailbox);
        Ok(())
    }

    /// Registers a plain unbounded inbox and hands back its receiving end.
    pub fn open_inbox(&self, id: AgentId) -> Result<Receiver<Envelope>, PostError> {
        let (sender, receiver) = unbounded();
        self.register(id, Arc::new(sender))?;
        Ok(receiver)
    }

    pub fn unregister(&self, id: &AgentId) -> bool {
        self.routes.write().remove(id).is_some()
    }

    pub fn is_registered(&self, id: &AgentId) -> bool {
        self.routes.read().contains_key(id)
    }

    pub fn send(&self, envelope: Envelope) -> Result<(), PostError> {
        // Clone the route out so delivery happens without holding the lock.
        let mailbox = self
            .routes
            .read()
            .get(&envelope.receiver)
            .cloned()
            .ok_or_else(|| PostError::UnknownReceiver(envelope.receiver.clone()))?;
        trace!(
            from = %envelope.sender,
            to = %envelope.receiver,
            protocol = %envelope.protocol,
            performative = ?envelope.performative,
            "deliver"
        );
        mailbox.deliver(envelope)
    }
}
