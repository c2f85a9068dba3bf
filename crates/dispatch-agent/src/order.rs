//! Order negotiation state machine.
//!
//! ```text
//!            ┌──────────── courier removed ─────────────┐
//!            ▼                                          │
//!  Unplaced ──▶ Quoting ──▶ (select) ──▶ AwaitingPlacement ──▶ Placed
//!     ▲            ▲                        │   │
//!     │            └── pool exhausted ──────┘   │ rejected: next variant
//!     └── no couriers / retry budget spent      └──────────▶ (select)
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dispatch_core::{CourierId, DeliveryData, EntityRef, Order, OrderId};
use dispatch_schedule::{KpiScores, Variant};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::kpi;
use crate::message::{Message, MessageKind};
use crate::runtime::{Agent, AgentAddress, AgentContext, HandlerTable};

/// Where an order is in its negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPhase {
    /// No courier, not negotiating.
    Unplaced,
    /// Waiting for price responses.
    Quoting,
    /// Waiting for a courier to confirm a placement.
    AwaitingPlacement,
    /// A courier has committed.
    Placed,
}

impl fmt::Display for OrderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unplaced => f.write_str("unplaced"),
            Self::Quoting => f.write_str("quoting"),
            Self::AwaitingPlacement => f.write_str("awaiting placement"),
            Self::Placed => f.write_str("placed"),
        }
    }
}

/// Snapshot of an order's negotiation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatus {
    /// The order.
    pub order: OrderId,
    /// Current phase.
    pub phase: OrderPhase,
    /// Last confirmed delivery data.
    pub delivery: DeliveryData,
    /// Quote rounds started since the order was last placed.
    pub quote_rounds: u32,
}

/// Ranks variants in place and returns the index of the best one.
///
/// Fills each variant's normalized start, finish and price scores (earlier
/// and cheaper score higher) and sets its efficiency to
/// `order.price - variant.price`. The highest efficiency wins; ties go to
/// the variant evaluated first.
pub fn rank(order: &Order, variants: &mut [Variant]) -> Option<usize> {
    let bounds = |f: fn(&Variant) -> f64| {
        variants.iter().map(f).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
    };
    let start = bounds(|v| v.window.from);
    let finish = bounds(|v| v.window.to);
    let price = bounds(|v| v.price);

    let mut best: Option<(usize, f64)> = None;
    for (n, variant) in variants.iter_mut().enumerate() {
        variant.scores = KpiScores {
            start: kpi::decreasing(variant.window.from, start.0, start.1).unwrap_or(-1.0),
            finish: kpi::decreasing(variant.window.to, finish.0, finish.1).unwrap_or(-1.0),
            price: kpi::decreasing(variant.price, price.0, price.1).unwrap_or(-1.0),
        };
        variant.efficiency = order.price - variant.price;
        debug!(
            courier = %variant.courier,
            provenance = %variant.provenance,
            window = %variant.window,
            price = variant.price,
            efficiency = variant.efficiency,
            "scored variant"
        );
        if best.is_none_or(|(_, e)| variant.efficiency > e) {
            best = Some((n, variant.efficiency));
        }
    }
    best.map(|(n, _)| n)
}

struct OrderState {
    order: Arc<Order>,
    phase: OrderPhase,
    delivery: DeliveryData,
    outstanding: HashSet<CourierId>,
    pool: Vec<Variant>,
    pending: Option<Variant>,
    quote_rounds: u32,
}

impl OrderState {
    fn status(&self) -> OrderStatus {
        OrderStatus {
            order: self.order.id.clone(),
            phase: self.phase,
            delivery: self.delivery.clone(),
            quote_rounds: self.quote_rounds,
        }
    }

    /// Sends price requests to every eligible courier.
    fn start_quoting(&mut self, ctx: &AgentContext) {
        self.outstanding.clear();
        self.pool.clear();
        self.pending = None;
        self.phase = OrderPhase::Unplaced;

        if self.quote_rounds >= ctx.config.max_quote_rounds {
            warn!(rounds = self.quote_rounds, "giving up after repeated failed rounds");
            return;
        }
        self.quote_rounds += 1;

        for courier in ctx.scene.couriers() {
            if let Err(reason) = courier.check_eligibility(&self.order) {
                debug!(courier = %courier.id, %reason, "courier not eligible");
                continue;
            }
            let to = EntityRef::Courier(courier.id.clone());
            match ctx.send(&to, Message::PriceRequest(Arc::clone(&self.order))) {
                Ok(()) => {
                    self.outstanding.insert(courier.id.clone());
                }
                Err(err) => warn!(courier = %courier.id, error = %err, "price request not sent"),
            }
        }

        if self.outstanding.is_empty() {
            info!("no eligible courier");
        } else {
            info!(couriers = self.outstanding.len(), round = self.quote_rounds, "quoting");
            self.phase = OrderPhase::Quoting;
        }
    }

    /// Picks the best variant of the pool and asks its courier to commit.
    fn select(&mut self, ctx: &AgentContext) {
        loop {
            let Some(best) = rank(&self.order, &mut self.pool) else {
                info!("variant pool exhausted, quoting again");
                self.start_quoting(ctx);
                return;
            };
            let variant = self.pool.remove(best);
            let to = EntityRef::Courier(variant.courier.clone());
            let request = Message::PlacementRequest {
                order: Arc::clone(&self.order),
                variant: variant.clone(),
            };
            match ctx.send(&to, request) {
                Ok(()) => {
                    info!(
                        courier = %variant.courier,
                        window = %variant.window,
                        price = variant.price,
                        "requesting placement"
                    );
                    self.pending = Some(variant);
                    self.phase = OrderPhase::AwaitingPlacement;
                    return;
                }
                Err(err) => {
                    warn!(courier = %variant.courier, error = %err, "placement request not sent");
                }
            }
        }
    }

    fn on_price_response(
        &mut self,
        ctx: &AgentContext,
        courier: CourierId,
        variants: Vec<Variant>,
    ) {
        if self.phase != OrderPhase::Quoting || !self.outstanding.remove(&courier) {
            debug!(%courier, "stale price response");
            return;
        }
        self.pool.extend(variants);
        if !self.outstanding.is_empty() {
            return;
        }
        if self.pool.is_empty() {
            info!("no possible variants");
            self.phase = OrderPhase::Unplaced;
            return;
        }
        self.select(ctx);
    }

    fn on_placement_response(&mut self, ctx: &AgentContext, variant: Variant, success: bool) {
        let expected = self.phase == OrderPhase::AwaitingPlacement
            && self
                .pending
                .as_ref()
                .is_some_and(|p| p.courier == variant.courier && p.window == variant.window);
        if !expected {
            debug!(courier = %variant.courier, "stale placement response");
            return;
        }
        self.pending = None;
        if success {
            info!(courier = %variant.courier, window = %variant.window, price = variant.price, "placed");
            self.delivery = DeliveryData::Assigned {
                courier: variant.courier,
                price: variant.price,
                window: variant.window,
            };
            self.phase = OrderPhase::Placed;
            self.pool.clear();
            self.quote_rounds = 0;
        } else {
            info!(courier = %variant.courier, "placement rejected");
            self.select(ctx);
        }
    }

    fn on_courier_removed(&mut self, ctx: &AgentContext, courier: &CourierId) {
        self.pool.retain(|v| &v.courier != courier);
        match self.phase {
            OrderPhase::Placed if self.delivery.courier() == Some(courier) => {
                info!(%courier, "assigned courier removed");
                self.delivery = DeliveryData::Unassigned;
                self.quote_rounds = 0;
                self.start_quoting(ctx);
            }
            OrderPhase::Quoting if self.outstanding.remove(courier) => {
                if self.outstanding.is_empty() {
                    if self.pool.is_empty() {
                        self.phase = OrderPhase::Unplaced;
                    } else {
                        self.select(ctx);
                    }
                }
            }
            OrderPhase::AwaitingPlacement
                if self.pending.as_ref().is_some_and(|p| &p.courier == courier) =>
            {
                info!(%courier, "courier removed before confirming placement");
                self.pending = None;
                self.select(ctx);
            }
            _ => {}
        }
    }

    /// A shift proposal is a forced auction with a single option.
    fn on_shift_proposal(
        &self,
        ctx: &AgentContext,
        variant: Variant,
        reply_to: &AgentAddress,
    ) -> Result<()> {
        let mut single = [variant];
        rank(&self.order, &mut single);
        let [variant] = single;
        info!(
            courier = %variant.courier,
            window = %variant.window,
            efficiency = variant.efficiency,
            "evaluated shift proposal"
        );
        ctx.reply(reply_to, Message::ShiftResponse(variant))
    }
}

/// Agent negotiating on behalf of one order.
#[derive(Default)]
pub struct OrderAgent {
    state: Option<OrderState>,
}

impl OrderAgent {
    /// Creates an unbound order agent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Agent for OrderAgent {
    const ROLE: &'static str = "order";

    fn subscribe(table: &mut HandlerTable) {
        table
            .subscribe(MessageKind::PriceResponse)
            .subscribe(MessageKind::PlacementResponse)
            .subscribe(MessageKind::NewCourier)
            .subscribe(MessageKind::CourierRemoved)
            .subscribe(MessageKind::PlacementChanged)
            .subscribe(MessageKind::ShiftProposal)
            .subscribe(MessageKind::DescribeOrder);
    }

    fn on_init(&mut self, ctx: &AgentContext) -> Result<()> {
        let order = match &ctx.entity {
            EntityRef::Order(id) => ctx.scene.order(id),
            EntityRef::Courier(_) => None,
        }
        .ok_or_else(|| AgentError::WrongEntity(ctx.entity.clone()))?;

        let mut state = OrderState {
            order,
            phase: OrderPhase::Unplaced,
            delivery: DeliveryData::Unassigned,
            outstanding: HashSet::new(),
            pool: Vec::new(),
            pending: None,
            quote_rounds: 0,
        };
        state.start_quoting(ctx);
        self.state = Some(state);
        Ok(())
    }

    fn handle(
        &mut self,
        ctx: &AgentContext,
        message: Message,
        sender: Option<AgentAddress>,
    ) -> Result<()> {
        let state = self.state.as_mut().ok_or(AgentError::NotInitialized)?;
        match message {
            Message::PriceResponse { courier, variants } => {
                state.on_price_response(ctx, courier, variants);
            }
            Message::PlacementResponse { variant, success } => {
                state.on_placement_response(ctx, variant, success);
            }
            Message::NewCourier(courier) => {
                if state.phase == OrderPhase::Unplaced {
                    info!(%courier, "new courier, quoting again");
                    state.quote_rounds = 0;
                    state.start_quoting(ctx);
                }
            }
            Message::CourierRemoved(courier) => state.on_courier_removed(ctx, &courier),
            Message::PlacementChanged(delivery) => {
                info!(?delivery, "placement changed by courier");
                if !delivery.is_assigned() && state.phase == OrderPhase::Placed {
                    state.phase = OrderPhase::Unplaced;
                }
                state.delivery = delivery;
            }
            Message::ShiftProposal { courier, variant } => {
                let reply_to = sender.ok_or_else(|| {
                    AgentError::Protocol(format!("shift proposal from {courier} without sender"))
                })?;
                state.on_shift_proposal(ctx, variant, &reply_to)?;
            }
            Message::DescribeOrder(reply) => {
                if reply.send(state.status()).is_err() {
                    debug!("status requester went away");
                }
            }
            other @ (Message::PriceRequest(_)
            | Message::PlacementRequest { .. }
            | Message::UnplacementRequest(_)
            | Message::ShiftResponse(_)
            | Message::ExportSchedule(_)) => return Err(AgentError::Unsupported(other.kind())),
        }
        Ok(())
    }

    fn on_removed(&mut self, ctx: &AgentContext) -> Result<()> {
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };
        if let (OrderPhase::Placed, Some(courier)) = (state.phase, state.delivery.courier()) {
            info!(%courier, "withdrawing from courier");
            ctx.send(
                &EntityRef::Courier(courier.clone()),
                Message::UnplacementRequest(state.order.id.clone()),
            )?;
        }
        Ok(())
    }
}
