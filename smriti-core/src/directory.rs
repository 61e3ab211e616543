//! Event directory collaborator.
//!
//! Resolves an access passkey to the storage namespace and face collection of
//! one event. Guests present the user passkey to search; the event owner
//! presents the client passkey to upload.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Storage prefix and face collection of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScope {
    pub prefix: String,
    pub collection_id: String,
}

impl EventScope {
    pub fn new(prefix: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            collection_id: collection_id.into(),
        }
    }
}

/// Lookup of events by passkey.
///
/// `Ok(None)` means the passkey is unknown; callers surface that as
/// [`crate::SmritiError::InvalidPasskey`].
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Resolve a guest (search) passkey.
    async fn resolve_guest(&self, passkey: &str) -> Result<Option<EventScope>>;

    /// Resolve an owner (upload) passkey.
    async fn resolve_owner(&self, passkey: &str) -> Result<Option<EventScope>>;
}

/// Directory held in memory, configured up front.
#[derive(Debug, Clone, Default)]
pub struct StaticEventDirectory {
    guests: HashMap<String, EventScope>,
    owners: HashMap<String, EventScope>,
}

impl StaticEventDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event reachable by a guest passkey and an owner passkey.
    pub fn with_event(
        mut self,
        guest_passkey: impl Into<String>,
        owner_passkey: impl Into<String>,
        scope: EventScope,
    ) -> Self {
        self.guests.insert(guest_passkey.into(), scope.clone());
        self.owners.insert(owner_passkey.into(), scope);
        self
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }
}

#[async_trait]
impl EventDirectory for StaticEventDirectory {
    async fn resolve_guest(&self, passkey: &str) -> Result<Option<EventScope>> {
        Ok(self.guests.get(passkey.trim()).cloned())
    }

    async fn resolve_owner(&self, passkey: &str) -> Result<Option<EventScope>> {
        Ok(self.owners.get(passkey.trim()).cloned())
    }
}
