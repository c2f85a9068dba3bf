//! Shared registry of entity profiles.

use std::collections::BTreeMap;
use std::sync::Arc;

use dispatch_core::{Courier, CourierId, EntityRef, Order, OrderId};
use parking_lot::RwLock;

/// Static profiles of every live courier and order.
///
/// Profiles never change once registered; negotiated state lives in the
/// owning agent.
#[derive(Debug, Default)]
pub struct Scene {
    couriers: RwLock<BTreeMap<CourierId, Arc<Courier>>>,
    orders: RwLock<BTreeMap<OrderId, Arc<Order>>>,
}

impl Scene {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a courier profile.
    pub fn add_courier(&self, courier: Arc<Courier>) {
        self.couriers.write().insert(courier.id.clone(), courier);
    }

    /// Adds or replaces an order profile.
    pub fn add_order(&self, order: Arc<Order>) {
        self.orders.write().insert(order.id.clone(), order);
    }

    /// Removes an entity's profile. Returns true if it was present.
    pub fn remove(&self, entity: &EntityRef) -> bool {
        match entity {
            EntityRef::Courier(id) => self.couriers.write().remove(id).is_some(),
            EntityRef::Order(id) => self.orders.write().remove(id).is_some(),
        }
    }

    /// Returns true if the entity has a profile.
    #[must_use]
    pub fn contains(&self, entity: &EntityRef) -> bool {
        match entity {
            EntityRef::Courier(id) => self.couriers.read().contains_key(id),
            EntityRef::Order(id) => self.orders.read().contains_key(id),
        }
    }

    /// Looks up a courier.
    #[must_use]
    pub fn courier(&self, id: &CourierId) -> Option<Arc<Courier>> {
        self.couriers.read().get(id).cloned()
    }

    /// Looks up an order.
    #[must_use]
    pub fn order(&self, id: &OrderId) -> Option<Arc<Order>> {
        self.orders.read().get(id).cloned()
    }

    /// All couriers, by id.
    #[must_use]
    pub fn couriers(&self) -> Vec<Arc<Courier>> {
        self.couriers.read().values().cloned().collect()
    }

    /// All orders, by id.
    #[must_use]
    pub fn orders(&self) -> Vec<Arc<Order>> {
        self.orders.read().values().cloned().collect()
    }

    /// Human-readable name of an entity.
    #[must_use]
    pub fn display_name(&self, entity: &EntityRef) -> Option<String> {
        match entity {
            EntityRef::Courier(id) => self.courier(id).map(|c| c.name.clone()),
            EntityRef::Order(id) => self.order(id).map(|o| o.name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_lookup_remove() {
        let scene = Scene::new();
        let courier = Courier::builder(CourierId::new("1"), "Kuznetsov")
            .build()
            .expect("valid courier");
        let order = Order::builder(OrderId::new("2"), "books")
            .build()
            .expect("valid order");
        scene.add_courier(Arc::new(courier));
        scene.add_order(Arc::new(order));

        let courier_ref = EntityRef::Courier(CourierId::new("1"));
        assert_eq!(scene.display_name(&courier_ref).as_deref(), Some("Kuznetsov"));
        assert_eq!(
            scene
                .display_name(&EntityRef::Order(OrderId::new("2")))
                .as_deref(),
            Some("books")
        );
        assert_eq!(scene.couriers().len(), 1);
        assert_eq!(scene.orders().len(), 1);

        assert!(scene.remove(&courier_ref));
        assert!(!scene.remove(&courier_ref));
        assert!(!scene.contains(&courier_ref));
        assert!(scene.courier(&CourierId::new("1")).is_none());
    }
}
