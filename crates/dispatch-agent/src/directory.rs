//! Entity-to-agent address book.

use std::collections::HashMap;

use dispatch_core::EntityRef;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::DirectoryError;
use crate::runtime::AgentAddress;

/// Maps each entity to the live address of its agent.
///
/// Handed to agents in the init handshake; never ambient.
#[derive(Debug, Default)]
pub struct Directory {
    entries: RwLock<HashMap<EntityRef, AgentAddress>>,
}

impl Directory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the agent of `entity`.
    pub fn resolve(&self, entity: &EntityRef) -> Result<AgentAddress, DirectoryError> {
        self.entries
            .read()
            .get(entity)
            .cloned()
            .ok_or_else(|| DirectoryError::Unknown(entity.clone()))
    }

    /// Registers the agent of `entity`, replacing any previous one.
    pub fn register(&self, entity: EntityRef, address: AgentAddress) {
        if self.entries.write().insert(entity.clone(), address).is_some() {
            warn!(%entity, "replaced existing directory entry");
        } else {
            debug!(%entity, "registered agent");
        }
    }

    /// Removes the entry of `entity`.
    pub fn unregister(&self, entity: &EntityRef) -> Option<AgentAddress> {
        self.entries.write().remove(entity)
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// All registered entities.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityRef> {
        self.entries.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::runtime::{Tracker, mailbox};
    use dispatch_core::{CourierId, OrderId};

    #[test]
    fn register_resolve_unregister() {
        let directory = Directory::new();
        let entity = EntityRef::Courier(CourierId::new("1"));
        let (address, _inbox) = mailbox(entity.clone(), Arc::new(Tracker::new()));

        assert_eq!(
            directory.resolve(&entity),
            Err(DirectoryError::Unknown(entity.clone()))
        );
        directory.register(entity.clone(), address.clone());
        assert_eq!(directory.resolve(&entity).expect("registered"), address);
        assert_eq!(directory.len(), 1);

        assert_eq!(directory.unregister(&entity), Some(address));
        assert!(directory.is_empty());
    }

    #[test]
    fn couriers_and_orders_do_not_collide() {
        let directory = Directory::new();
        let courier = EntityRef::Courier(CourierId::new("1"));
        let order = EntityRef::Order(OrderId::new("1"));
        let tracker = Arc::new(Tracker::new());
        let (a, _ra) = mailbox(courier.clone(), Arc::clone(&tracker));
        let (b, _rb) = mailbox(order.clone(), tracker);
        directory.register(courier.clone(), a.clone());
        directory.register(order.clone(), b.clone());
        assert_eq!(directory.resolve(&courier).expect("courier"), a);
        assert_eq!(directory.resolve(&order).expect("order"), b);
    }
}
