//! The dispatcher: spawns, tears down and queries agents.

use std::collections::BTreeMap;
use std::sync::Arc;

use dispatch_core::{Courier, DispatchConfig, EntityRef, Order, OrderId};
use dispatch_schedule::ScheduleRecord;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::courier::CourierAgent;
use crate::directory::Directory;
use crate::error::{AgentError, DirectoryError, Result};
use crate::message::{InitPayload, Letter, Message};
use crate::order::{OrderAgent, OrderStatus};
use crate::runtime::{Agent, Tracker, mailbox, spawn};
use crate::scene::Scene;

/// Owns the shared scene and directory and the agents living in them.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct Dispatcher {
    scene: Arc<Scene>,
    directory: Arc<Directory>,
    config: Arc<DispatchConfig>,
    tracker: Arc<Tracker>,
    tasks: Mutex<BTreeMap<EntityRef, JoinHandle<()>>>,
}

impl Dispatcher {
    /// Creates a dispatcher with no agents.
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            scene: Arc::new(Scene::new()),
            directory: Arc::new(Directory::new()),
            config: Arc::new(config),
            tracker: Arc::new(Tracker::new()),
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Shared entity profiles.
    #[must_use]
    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// Shared address book.
    #[must_use]
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Negotiation tuning.
    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Spawns an agent for a courier.
    pub fn add_courier(&self, courier: Courier) -> Result<EntityRef> {
        let courier = Arc::new(courier);
        let entity = EntityRef::Courier(courier.id.clone());
        self.add_entity(entity, CourierAgent::new(), || {
            self.scene.add_courier(courier);
        })
    }

    /// Spawns an agent for an order.
    pub fn add_order(&self, order: Order) -> Result<EntityRef> {
        let order = Arc::new(order);
        let entity = EntityRef::Order(order.id.clone());
        self.add_entity(entity, OrderAgent::new(), || {
            self.scene.add_order(order);
        })
    }

    /// Registers the agent's address, then the entity profile, then sends
    /// the init letter. Every profile in the scene is therefore resolvable.
    fn add_entity<A: Agent>(
        &self,
        entity: EntityRef,
        agent: A,
        publish: impl FnOnce(),
    ) -> Result<EntityRef> {
        if self.directory.resolve(&entity).is_ok() {
            return Err(AgentError::Protocol(format!("{entity} already has an agent")));
        }
        let (address, inbox) = mailbox(entity.clone(), Arc::clone(&self.tracker));
        self.directory.register(entity.clone(), address.clone());
        publish();
        let task = spawn(agent, address.clone(), inbox);
        self.tasks.lock().insert(entity.clone(), task);
        address.post(Letter::Init(InitPayload {
            scene: Arc::clone(&self.scene),
            directory: Arc::clone(&self.directory),
            entity: entity.clone(),
            config: Arc::clone(&self.config),
        }))?;
        info!(%entity, "agent added");
        Ok(entity)
    }

    /// Tears down the agent of `entity`. Its teardown hook still runs and
    /// can notify counterparts.
    pub fn remove_agent(&self, entity: &EntityRef) -> Result<()> {
        self.detach(entity).map(drop)
    }

    /// Tears down every agent, orders first, and waits for their tasks.
    pub async fn shutdown(&self) {
        let mut entities = self.directory.entities();
        entities.sort_by_key(|e| matches!(e, EntityRef::Courier(_)));
        let mut tasks = Vec::new();
        for entity in entities {
            match self.detach(&entity) {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => {}
                Err(err) => warn!(%entity, error = %err, "teardown failed"),
            }
        }
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "agent task ended abnormally");
            }
        }
    }

    fn detach(&self, entity: &EntityRef) -> Result<Option<JoinHandle<()>>> {
        self.scene.remove(entity);
        let address = self
            .directory
            .unregister(entity)
            .ok_or_else(|| DirectoryError::Unknown(entity.clone()))?;
        let task = self.tasks.lock().remove(entity);
        address.post(Letter::Exit)?;
        info!(%entity, "agent removed");
        Ok(task)
    }

    /// Live agents with their display identity, sorted by entity.
    #[must_use]
    pub fn agents(&self) -> Vec<(EntityRef, String)> {
        let mut agents: Vec<_> = self
            .directory
            .entities()
            .into_iter()
            .map(|entity| {
                let role = match entity {
                    EntityRef::Courier(_) => CourierAgent::ROLE,
                    EntityRef::Order(_) => OrderAgent::ROLE,
                };
                let name = self
                    .scene
                    .display_name(&entity)
                    .unwrap_or_else(|| entity.to_string());
                let label = format!("{role} {name}");
                (entity, label)
            })
            .collect();
        agents.sort();
        agents
    }

    /// Flat schedules of every courier, courier by courier.
    pub async fn export_schedules(&self) -> Vec<ScheduleRecord> {
        let mut couriers: Vec<_> = self
            .directory
            .entities()
            .into_iter()
            .filter(|e| matches!(e, EntityRef::Courier(_)))
            .collect();
        couriers.sort();

        let mut records = Vec::new();
        for entity in couriers {
            let (tx, rx) = oneshot::channel();
            let sent = self
                .directory
                .resolve(&entity)
                .map_err(AgentError::from)
                .and_then(|address| address.send(Message::ExportSchedule(tx), None));
            if let Err(err) = sent {
                warn!(%entity, error = %err, "schedule export skipped");
                continue;
            }
            match rx.await {
                Ok(schedule) => records.extend(schedule),
                Err(_) => warn!(%entity, "courier went away during export"),
            }
        }
        records
    }

    /// Negotiation state of an order.
    pub async fn order_status(&self, order: &OrderId) -> Result<OrderStatus> {
        let entity = EntityRef::Order(order.clone());
        let address = self.directory.resolve(&entity)?;
        let (tx, rx) = oneshot::channel();
        address.send(Message::DescribeOrder(tx), None)?;
        rx.await.map_err(|_| AgentError::AgentGone(entity))
    }

    /// Letters sent but not yet handled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    /// Resolves once every agent has handled every letter sent to it.
    pub async fn settle(&self) {
        self.tracker.settle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{CourierId, Point};

    fn courier(id: &str, name: &str) -> Courier {
        Courier::builder(CourierId::new(id), name)
            .cargo_types(["food"])
            .build()
            .expect("valid courier")
    }

    #[tokio::test]
    async fn lists_and_removes_agents() {
        let dispatcher = Dispatcher::new(DispatchConfig::default());
        dispatcher.add_courier(courier("1", "Orlov")).expect("add");
        dispatcher.add_courier(courier("2", "Belov")).expect("add");
        dispatcher.settle().await;

        let agents = dispatcher.agents();
        assert_eq!(
            agents,
            vec![
                (EntityRef::Courier(CourierId::new("1")), "courier Orlov".to_string()),
                (EntityRef::Courier(CourierId::new("2")), "courier Belov".to_string()),
            ]
        );

        dispatcher
            .remove_agent(&EntityRef::Courier(CourierId::new("1")))
            .expect("remove");
        dispatcher.settle().await;
        assert_eq!(dispatcher.agents().len(), 1);
        assert!(dispatcher.scene().courier(&CourierId::new("1")).is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_every_agent() {
        let dispatcher = Dispatcher::new(DispatchConfig::default());
        let entity = dispatcher.add_courier(courier("1", "Orlov")).expect("add");
        let address = dispatcher.directory().resolve(&entity).expect("registered");
        dispatcher.shutdown().await;
        assert!(dispatcher.agents().is_empty());
        assert!(address.is_closed());
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn duplicate_entity_is_rejected() {
        let dispatcher = Dispatcher::new(DispatchConfig::default());
        dispatcher.add_courier(courier("1", "Orlov")).expect("add");
        assert!(matches!(
            dispatcher.add_courier(courier("1", "Orlov")),
            Err(AgentError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn removing_unknown_entity_fails() {
        let dispatcher = Dispatcher::new(DispatchConfig::default());
        let err = dispatcher
            .remove_agent(&EntityRef::Order(OrderId::new("9")))
            .expect_err("unknown");
        assert!(matches!(err, AgentError::Directory(DirectoryError::Unknown(_))));
    }

    #[tokio::test]
    async fn single_order_is_placed_and_exported() {
        let dispatcher = Dispatcher::new(DispatchConfig::default());
        dispatcher.add_courier(courier("1", "Orlov")).expect("add");
        let order = Order::builder(OrderId::new("10"), "soup")
            .route(Point::new(3.0, 4.0), Point::new(3.0, 10.0))
            .cargo_type("food")
            .price(50.0)
            .build()
            .expect("valid order");
        dispatcher.add_order(order).expect("add");
        dispatcher.settle().await;

        let status = dispatcher
            .order_status(&OrderId::new("10"))
            .await
            .expect("status");
        assert_eq!(status.phase, crate::order::OrderPhase::Placed);
        assert_eq!(status.delivery.price(), Some(11.0));

        let records = dispatcher.export_schedules().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].resource_name, "Orlov");
        assert_eq!(records[1].task_name, "soup");
        assert_eq!(records[1].end_time, 11.0);
    }
}
