//! The agent runtime.
//!
//! Every agent runs as its own tokio task draining an unbounded inbox, one
//! letter at a time. The first letter must be [`Letter::Init`]; messages
//! that arrive earlier are dropped. Handler errors and panics are logged and
//! never stop the agent. [`Letter::Exit`] runs the agent's teardown hook and
//! ends the task.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dispatch_core::{DispatchConfig, EntityRef};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, warn};
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::{AgentError, Result};
use crate::message::{InitPayload, Letter, Message, MessageKind};
use crate::scene::Scene;

/// Counts letters that were sent but not yet handled.
#[derive(Debug, Default)]
pub struct Tracker {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Tracker {
    /// Creates a tracker with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Letters currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Resolves once no letter is in flight.
    pub async fn settle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Where to send letters for one agent.
#[derive(Debug, Clone)]
pub struct AgentAddress {
    id: Uuid,
    entity: EntityRef,
    tx: mpsc::UnboundedSender<Letter>,
    tracker: Arc<Tracker>,
}

impl AgentAddress {
    /// Unique id of the agent instance.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The entity the agent negotiates for.
    #[must_use]
    pub const fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// Returns true if the agent has stopped accepting letters.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Delivers a message, fire-and-forget.
    pub fn send(&self, message: Message, sender: Option<AgentAddress>) -> Result<()> {
        self.post(Letter::Deliver { message, sender })
    }

    pub(crate) fn post(&self, letter: Letter) -> Result<()> {
        self.tracker.begin();
        if self.tx.send(letter).is_err() {
            self.tracker.done();
            return Err(AgentError::AgentGone(self.entity.clone()));
        }
        Ok(())
    }
}

impl PartialEq for AgentAddress {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AgentAddress {}

/// Message kinds an agent handles.
#[derive(Debug)]
pub struct HandlerTable {
    role: &'static str,
    kinds: BTreeSet<MessageKind>,
}

impl HandlerTable {
    fn new(role: &'static str) -> Self {
        Self {
            role,
            kinds: BTreeSet::new(),
        }
    }

    /// Registers a handler for `kind`. Registering a kind twice is a
    /// configuration error and is reported.
    pub fn subscribe(&mut self, kind: MessageKind) -> &mut Self {
        if !self.kinds.insert(kind) {
            warn!(role = self.role, %kind, "message kind subscribed twice");
        }
        self
    }

    /// Returns true if `kind` has a handler.
    #[must_use]
    pub fn handles(&self, kind: MessageKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// What an agent sees of the world once initialized.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// The agent's own address.
    pub me: AgentAddress,
    /// Display identity, "<role> <entity name>".
    pub name: String,
    /// The bound entity.
    pub entity: EntityRef,
    /// Shared entity profiles.
    pub scene: Arc<Scene>,
    /// Shared address book.
    pub directory: Arc<Directory>,
    /// Negotiation tuning.
    pub config: Arc<DispatchConfig>,
}

impl AgentContext {
    /// Sends a message to the agent of `to`, signed with this agent's
    /// address.
    pub fn send(&self, to: &EntityRef, message: Message) -> Result<()> {
        let address = self.directory.resolve(to)?;
        address.send(message, Some(self.me.clone()))
    }

    /// Sends a message straight to an address.
    pub fn reply(&self, to: &AgentAddress, message: Message) -> Result<()> {
        to.send(message, Some(self.me.clone()))
    }
}

/// A negotiation agent.
///
/// Handlers are synchronous and never wait on other agents; multi-step
/// protocols keep their progress in the agent's own state.
pub trait Agent: Send + 'static {
    /// Role prefix of the display identity.
    const ROLE: &'static str;

    /// Declares the message kinds the agent handles.
    fn subscribe(table: &mut HandlerTable);

    /// Binds the agent to its entity. Runs once, on the init letter.
    fn on_init(&mut self, ctx: &AgentContext) -> Result<()>;

    /// Handles one subscribed message.
    fn handle(
        &mut self,
        ctx: &AgentContext,
        message: Message,
        sender: Option<AgentAddress>,
    ) -> Result<()>;

    /// Runs on teardown, before the agent stops.
    fn on_removed(&mut self, _ctx: &AgentContext) -> Result<()> {
        Ok(())
    }
}

/// Creates an inbox for an agent of `entity`.
pub(crate) fn mailbox(
    entity: EntityRef,
    tracker: Arc<Tracker>,
) -> (AgentAddress, mpsc::UnboundedReceiver<Letter>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let address = AgentAddress {
        id: Uuid::new_v4(),
        entity,
        tx,
        tracker,
    };
    (address, rx)
}

/// Spawns the agent's task.
pub(crate) fn spawn<A: Agent>(
    agent: A,
    address: AgentAddress,
    inbox: mpsc::UnboundedReceiver<Letter>,
) -> JoinHandle<()> {
    tokio::spawn(run(agent, address, inbox))
}

async fn run<A: Agent>(
    mut agent: A,
    address: AgentAddress,
    mut inbox: mpsc::UnboundedReceiver<Letter>,
) {
    let mut table = HandlerTable::new(A::ROLE);
    A::subscribe(&mut table);
    let mut ctx: Option<AgentContext> = None;

    while let Some(letter) = inbox.recv().await {
        let exit = matches!(letter, Letter::Exit);
        process(&mut agent, &table, &mut ctx, &address, letter);
        address.tracker.done();
        if exit {
            break;
        }
    }

    inbox.close();
    while inbox.try_recv().is_ok() {
        address.tracker.done();
    }
    debug!(entity = %address.entity, "agent stopped");
}

fn process<A: Agent>(
    agent: &mut A,
    table: &HandlerTable,
    ctx: &mut Option<AgentContext>,
    address: &AgentAddress,
    letter: Letter,
) {
    match letter {
        Letter::Init(payload) => {
            if ctx.is_some() {
                warn!(entity = %address.entity, "duplicate init ignored");
                return;
            }
            let bound = bind::<A>(address, payload);
            let span = info_span!("agent", name = %bound.name);
            let _guard = span.enter();
            if guarded(|| agent.on_init(&bound)) {
                *ctx = Some(bound);
            }
        }
        Letter::Deliver { message, sender } => {
            let kind = message.kind();
            let Some(ctx) = ctx.as_ref() else {
                warn!(entity = %address.entity, %kind, "{}", AgentError::NotInitialized);
                return;
            };
            let span = info_span!("agent", name = %ctx.name);
            let _guard = span.enter();
            if !table.handles(kind) {
                warn!("{}", AgentError::Unsupported(kind));
                return;
            }
            guarded(|| agent.handle(ctx, message, sender));
        }
        Letter::Exit => {
            let Some(ctx) = ctx.as_ref() else {
                return;
            };
            let span = info_span!("agent", name = %ctx.name);
            let _guard = span.enter();
            guarded(|| agent.on_removed(ctx));
        }
    }
}

fn bind<A: Agent>(address: &AgentAddress, payload: InitPayload) -> AgentContext {
    let InitPayload {
        scene,
        directory,
        entity,
        config,
    } = payload;
    let entity_name = scene
        .display_name(&entity)
        .unwrap_or_else(|| entity.to_string());
    AgentContext {
        me: address.clone(),
        name: format!("{} {entity_name}", A::ROLE),
        entity,
        scene,
        directory,
        config,
    }
}

/// Runs a handler, logging its error or panic. Returns true on success.
fn guarded(handler: impl FnOnce() -> Result<()>) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(AgentError::HandlerPanicked(reason))
    });
    match outcome {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, "handler failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{CourierId, OrderId};
    use parking_lot::Mutex;

    /// Records what it handles; panics on `NewCourier("boom")`.
    #[derive(Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Agent for Recorder {
        const ROLE: &'static str = "recorder";

        fn subscribe(table: &mut HandlerTable) {
            table.subscribe(MessageKind::NewCourier);
            table.subscribe(MessageKind::NewCourier);
        }

        fn on_init(&mut self, ctx: &AgentContext) -> Result<()> {
            self.seen.lock().push(format!("init {}", ctx.name));
            Ok(())
        }

        fn handle(
            &mut self,
            _ctx: &AgentContext,
            message: Message,
            _sender: Option<AgentAddress>,
        ) -> Result<()> {
            match message {
                Message::NewCourier(id) if id.as_str() == "boom" => {
                    unreachable!("recorder asked to fail")
                }
                Message::NewCourier(id) if id.as_str() == "err" => {
                    Err(AgentError::Protocol("recorder error".into()))
                }
                Message::NewCourier(id) => {
                    self.seen.lock().push(format!("courier {id}"));
                    Ok(())
                }
                other => Err(AgentError::Unsupported(other.kind())),
            }
        }

        fn on_removed(&mut self, _ctx: &AgentContext) -> Result<()> {
            self.seen.lock().push("removed".into());
            Ok(())
        }
    }

    fn payload(entity: EntityRef) -> InitPayload {
        InitPayload {
            scene: Arc::new(Scene::new()),
            directory: Arc::new(Directory::new()),
            entity,
            config: Arc::new(DispatchConfig::default()),
        }
    }

    fn courier(id: &str) -> Message {
        Message::NewCourier(CourierId::new(id))
    }

    #[tokio::test]
    async fn processes_letters_in_order_and_survives_failures() {
        let tracker = Arc::new(Tracker::new());
        let entity = EntityRef::Order(OrderId::new("1"));
        let (address, inbox) = mailbox(entity.clone(), Arc::clone(&tracker));
        let recorder = Recorder::default();
        let seen = Arc::clone(&recorder.seen);
        let task = spawn(recorder, address.clone(), inbox);

        address.send(courier("early"), None).expect("send");
        address.post(Letter::Init(payload(entity))).expect("init");
        address.send(courier("a"), None).expect("send");
        address.send(courier("boom"), None).expect("send");
        address.send(courier("err"), None).expect("send");
        address
            .send(Message::CourierRemoved(CourierId::new("x")), None)
            .expect("send");
        address.send(courier("b"), None).expect("send");
        tracker.settle().await;

        assert_eq!(
            *seen.lock(),
            vec![
                "init recorder order:1".to_string(),
                "courier a".to_string(),
                "courier b".to_string(),
            ]
        );

        address.post(Letter::Exit).expect("exit");
        task.await.expect("agent task");
        assert_eq!(seen.lock().last().map(String::as_str), Some("removed"));
        assert!(address.is_closed());
        assert!(matches!(
            address.send(courier("late"), None),
            Err(AgentError::AgentGone(_))
        ));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn settle_returns_immediately_when_idle() {
        let tracker = Tracker::new();
        tracker.settle().await;
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn duplicate_subscription_keeps_one_entry() {
        let mut table = HandlerTable::new("recorder");
        Recorder::subscribe(&mut table);
        assert!(table.handles(MessageKind::NewCourier));
        assert!(!table.handles(MessageKind::PriceRequest));
        assert_eq!(table.kinds.len(), 1);
    }
}
