//! Courier negotiation state machine and the displacement protocol.
//!
//! A placement request that collides with committed orders opens a
//! displacement batch: every displaced order is sent a forced shift
//! proposal, and the courier commits only once all of them have answered
//! and the batch strictly improves on the status quo. While a batch is open,
//! further placement requests are queued and replayed in arrival order once
//! it resolves.

use std::collections::VecDeque;
use std::sync::Arc;

use dispatch_core::{DeliveryData, EntityRef, Order, OrderId};
use dispatch_schedule::{NegotiationParams, Provenance, Removal, Schedule, Variant};
use tracing::{debug, info, warn};

use crate::displacement::{PendingDisplacement, Resolved};
use crate::error::{AgentError, Result};
use crate::message::{Message, MessageKind};
use crate::runtime::{Agent, AgentAddress, AgentContext, HandlerTable};

struct Deferred {
    order: Arc<Order>,
    variant: Variant,
    reply_to: AgentAddress,
}

struct CourierState {
    schedule: Schedule,
    pending: Option<PendingDisplacement>,
    deferred: VecDeque<Deferred>,
}

impl CourierState {
    fn on_price_request(
        &self,
        ctx: &AgentContext,
        order: &Order,
        reply_to: &AgentAddress,
    ) -> Result<()> {
        let courier = self.schedule.courier();
        let variants = match courier.check_eligibility(order) {
            Ok(()) => self.schedule.quote(order, ctx.config.variant_search),
            Err(reason) => {
                debug!(order = %order.id, %reason, "not eligible, quoting nothing");
                Vec::new()
            }
        };
        info!(order = %order.id, variants = variants.len(), "quoted");
        ctx.reply(
            reply_to,
            Message::PriceResponse {
                courier: courier.id.clone(),
                variants,
            },
        )
    }

    fn on_placement_request(
        &mut self,
        ctx: &AgentContext,
        order: Arc<Order>,
        variant: Variant,
        reply_to: AgentAddress,
    ) -> Result<()> {
        if self.pending.is_some() {
            debug!(order = %order.id, "displacement in progress, deferring placement");
            self.deferred.push_back(Deferred {
                order,
                variant,
                reply_to,
            });
            return Ok(());
        }
        self.place(ctx, order, variant, reply_to)
    }

    fn place(
        &mut self,
        ctx: &AgentContext,
        order: Arc<Order>,
        variant: Variant,
        reply_to: AgentAddress,
    ) -> Result<()> {
        let courier = self.schedule.courier().id.clone();
        if variant.courier != courier || variant.order != order.id {
            self.respond(ctx, variant, false, &reply_to, None);
            return Err(AgentError::Protocol(format!(
                "placement request for order {} does not match its variant",
                order.id
            )));
        }

        if variant.provenance == Provenance::IdleGap {
            self.place_in_gap(ctx, &order, variant, &reply_to);
            return Ok(());
        }

        let Some(plan) = self
            .schedule
            .plan_shifts(&order, variant.window, ctx.config.max_shift_chain)
        else {
            info!(order = %order.id, "shift cascade infeasible");
            self.respond(ctx, variant, false, &reply_to, None);
            return Ok(());
        };

        if plan.is_empty() {
            if variant.is_earliest_available() {
                let before = self.schedule.clone();
                let params = NegotiationParams::new(variant.provenance, variant.efficiency);
                let placed = self
                    .schedule
                    .try_insert(&order, variant.window, variant.price, params);
                self.respond(ctx, variant, placed, &reply_to, Some(before));
            } else {
                self.place_in_gap(ctx, &order, variant, &reply_to);
            }
            return Ok(());
        }

        for (displaced, shift) in &plan.shifts {
            let proposal = Message::ShiftProposal {
                courier: courier.clone(),
                variant: shift.clone(),
            };
            if let Err(err) = ctx.send(&EntityRef::Order(displaced.id.clone()), proposal) {
                warn!(order = %displaced.id, error = %err, "shift proposal undeliverable, aborting batch");
                self.respond(ctx, variant, false, &reply_to, None);
                return Ok(());
            }
        }
        info!(order = %order.id, displaced = plan.len(), "displacement proposed");
        self.pending = Some(PendingDisplacement::new(
            order,
            variant,
            reply_to,
            plan,
            &self.schedule,
        ));
        Ok(())
    }

    /// Places an order ahead of an existing one and re-routes that
    /// follower from the new dropoff.
    fn place_in_gap(
        &mut self,
        ctx: &AgentContext,
        order: &Arc<Order>,
        variant: Variant,
        reply_to: &AgentAddress,
    ) {
        let before = self.schedule.clone();
        let params = NegotiationParams::new(variant.provenance, variant.efficiency);
        let placed = self.schedule.try_insert_in_gap(
            variant.anchor,
            order,
            variant.window,
            variant.price,
            params,
        );
        if self.respond(ctx, variant, placed, reply_to, Some(before)) && placed {
            if let Some(follower) = self.schedule.follower(&order.id) {
                self.notify_changed(ctx, &follower);
            }
        }
    }

    fn on_shift_response(&mut self, ctx: &AgentContext, response: Variant) {
        let Some(pending) = self.pending.as_mut() else {
            debug!(order = %response.order, "shift response without open batch");
            return;
        };
        if !pending.record(response) || !pending.is_complete() {
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        let accepted = pending.verdict(ctx.config.displacement_rule, ctx.config.epsilon);
        info!(
            proposed = pending.proposed(),
            committed = pending.committed(),
            accepted,
            "displacement batch decided"
        );
        let Resolved {
            requester,
            variant,
            reply_to,
            shifts,
        } = pending.resolve();

        if accepted {
            let before = self.schedule.clone();
            if self
                .schedule
                .commit_displacement(&requester, &variant, &shifts)
            {
                let follower = self.schedule.batch_follower(&requester, &variant, &shifts);
                if self.respond(ctx, variant, true, &reply_to, Some(before)) {
                    for (displaced, _) in &shifts {
                        self.notify_changed(ctx, &displaced.id);
                    }
                    if let Some(follower) = follower {
                        self.notify_changed(ctx, &follower);
                    }
                }
            } else {
                warn!(order = %requester.id, "displacement no longer fits, rejecting");
                self.respond(ctx, variant, false, &reply_to, None);
            }
        } else {
            self.respond(ctx, variant, false, &reply_to, None);
        }
        self.drain_deferred(ctx);
    }

    fn on_unplacement_request(&mut self, ctx: &AgentContext, order: &OrderId) {
        if self.pending.as_ref().is_some_and(|p| p.involves(order)) {
            if let Some(pending) = self.pending.take() {
                info!(%order, "order withdrew during displacement, aborting batch");
                let Resolved {
                    variant, reply_to, ..
                } = pending.resolve();
                self.respond(ctx, variant, false, &reply_to, None);
            }
        }
        self.deferred.retain(|d| &d.order.id != order);

        match self.schedule.remove(order) {
            Removal::NotFound => debug!(%order, "unplacement of unknown order"),
            Removal::Removed { affected } => {
                info!(%order, "order unplaced");
                if let Some((affected, delivery)) = affected {
                    self.send_changed(ctx, &affected, delivery);
                }
            }
        }
        self.drain_deferred(ctx);
    }

    fn drain_deferred(&mut self, ctx: &AgentContext) {
        while self.pending.is_none() {
            let Some(next) = self.deferred.pop_front() else {
                break;
            };
            if let Err(err) = self.place(ctx, next.order, next.variant, next.reply_to) {
                warn!(error = %err, "deferred placement failed");
            }
        }
    }

    /// Answers a placement request. Returns false if the requester is gone,
    /// in which case a confirmed placement is rolled back to `before`.
    fn respond(
        &mut self,
        ctx: &AgentContext,
        variant: Variant,
        success: bool,
        reply_to: &AgentAddress,
        before: Option<Schedule>,
    ) -> bool {
        let order = variant.order.clone();
        if success {
            info!(%order, window = %variant.window, price = variant.price, "placement accepted");
        } else {
            info!(%order, "placement rejected");
        }
        match ctx.reply(reply_to, Message::PlacementResponse { variant, success }) {
            Ok(()) => true,
            Err(err) => {
                if let (true, Some(before)) = (success, before) {
                    warn!(%order, error = %err, "requester gone, rolling back placement");
                    self.schedule = before;
                } else {
                    debug!(%order, error = %err, "requester gone");
                }
                false
            }
        }
    }

    fn notify_changed(&self, ctx: &AgentContext, order: &OrderId) {
        let delivery = self.schedule.delivery_data(order);
        self.send_changed(ctx, order, delivery);
    }

    fn send_changed(
        &self,
        ctx: &AgentContext,
        order: &OrderId,
        delivery: DeliveryData,
    ) {
        let to = EntityRef::Order(order.clone());
        if let Err(err) = ctx.send(&to, Message::PlacementChanged(delivery)) {
            warn!(%order, error = %err, "placement change not delivered");
        }
    }
}

/// Agent negotiating on behalf of one courier. Owns the courier's schedule.
#[derive(Default)]
pub struct CourierAgent {
    state: Option<CourierState>,
}

impl CourierAgent {
    /// Creates an unbound courier agent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Agent for CourierAgent {
    const ROLE: &'static str = "courier";

    fn subscribe(table: &mut HandlerTable) {
        table
            .subscribe(MessageKind::PriceRequest)
            .subscribe(MessageKind::PlacementRequest)
            .subscribe(MessageKind::UnplacementRequest)
            .subscribe(MessageKind::ShiftResponse)
            .subscribe(MessageKind::ExportSchedule);
    }

    fn on_init(&mut self, ctx: &AgentContext) -> Result<()> {
        let courier = match &ctx.entity {
            EntityRef::Courier(id) => ctx.scene.courier(id),
            EntityRef::Order(_) => None,
        }
        .ok_or_else(|| AgentError::WrongEntity(ctx.entity.clone()))?;

        let id = courier.id.clone();
        self.state = Some(CourierState {
            schedule: Schedule::new((*courier).clone(), ctx.config.epsilon),
            pending: None,
            deferred: VecDeque::new(),
        });

        for order in ctx.scene.orders() {
            let to = EntityRef::Order(order.id.clone());
            if let Err(err) = ctx.send(&to, Message::NewCourier(id.clone())) {
                warn!(order = %order.id, error = %err, "new courier announcement not delivered");
            }
        }
        info!(home = %courier.home, "courier ready");
        Ok(())
    }

    fn handle(
        &mut self,
        ctx: &AgentContext,
        message: Message,
        sender: Option<AgentAddress>,
    ) -> Result<()> {
        let state = self.state.as_mut().ok_or(AgentError::NotInitialized)?;
        let kind = message.kind();
        let reply_to = || {
            sender
                .clone()
                .ok_or_else(|| AgentError::Protocol(format!("{kind} without sender")))
        };
        match message {
            Message::PriceRequest(order) => state.on_price_request(ctx, &order, &reply_to()?)?,
            Message::PlacementRequest { order, variant } => {
                state.on_placement_request(ctx, order, variant, reply_to()?)?;
            }
            Message::UnplacementRequest(order) => state.on_unplacement_request(ctx, &order),
            Message::ShiftResponse(response) => state.on_shift_response(ctx, response),
            Message::ExportSchedule(reply) => {
                if reply.send(state.schedule.records()).is_err() {
                    debug!("export requester went away");
                }
            }
            other @ (Message::PriceResponse { .. }
            | Message::PlacementResponse { .. }
            | Message::NewCourier(_)
            | Message::PlacementChanged(_)
            | Message::CourierRemoved(_)
            | Message::ShiftProposal { .. }
            | Message::DescribeOrder(_)) => return Err(AgentError::Unsupported(other.kind())),
        }
        Ok(())
    }

    fn on_removed(&mut self, ctx: &AgentContext) -> Result<()> {
        let Some(state) = self.state.as_ref() else {
            return Ok(());
        };
        let id = state.schedule.courier().id.clone();
        info!(
            planned = state.schedule.planned_orders().len(),
            "courier leaving, notifying orders"
        );
        for order in ctx.scene.orders() {
            let to = EntityRef::Order(order.id.clone());
            if let Err(err) = ctx.send(&to, Message::CourierRemoved(id.clone())) {
                warn!(order = %order.id, error = %err, "removal notice not delivered");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Letter;
    use crate::order::OrderPhase;
    use crate::runtime::{Tracker, mailbox};
    use crate::system::Dispatcher;
    use dispatch_core::{
        Courier, CourierId, DeliveryData, DispatchConfig, DisplacementRule, Point, TimeWindow,
    };
    use dispatch_schedule::KpiScores;
    use tokio::sync::mpsc;

    /// Stands in for an order agent, collecting what the courier answers.
    struct Requester {
        address: AgentAddress,
        inbox: mpsc::UnboundedReceiver<Letter>,
    }

    impl Requester {
        fn new(id: &str) -> Self {
            let (address, inbox) =
                mailbox(EntityRef::Order(OrderId::new(id)), Arc::new(Tracker::new()));
            Self { address, inbox }
        }

        fn placement_result(&mut self) -> Option<bool> {
            while let Ok(letter) = self.inbox.try_recv() {
                if let Letter::Deliver {
                    message: Message::PlacementResponse { success, .. },
                    ..
                } = letter
                {
                    return Some(success);
                }
            }
            None
        }
    }

    fn courier_id() -> CourierId {
        CourierId::new("c")
    }

    fn order(id: &str, pickup: (f64, f64), dropoff: (f64, f64), price: f64) -> Order {
        Order::builder(OrderId::new(id), id)
            .route(Point::new(pickup.0, pickup.1), Point::new(dropoff.0, dropoff.1))
            .cargo_type("parcel")
            .price(price)
            .build()
            .expect("valid order")
    }

    /// Courier at (0,0) with velocity 1 and rate 1, carrying order `o`
    /// from (0,0) to (10,0) during 0..10.
    async fn placed(rule: DisplacementRule) -> Dispatcher {
        let dispatcher =
            Dispatcher::new(DispatchConfig::default().with_displacement_rule(rule));
        let courier = Courier::builder(courier_id(), "Volkov")
            .cargo_types(["parcel"])
            .build()
            .expect("valid courier");
        dispatcher.add_courier(courier).expect("add courier");
        dispatcher
            .add_order(order("o", (0.0, 0.0), (10.0, 0.0), 20.0))
            .expect("add order");
        dispatcher.settle().await;
        dispatcher
    }

    fn variant(
        order: &str,
        window: (f64, f64),
        price: f64,
        anchor: Point,
        provenance: Provenance,
        efficiency: f64,
    ) -> Variant {
        Variant {
            courier: courier_id(),
            order: OrderId::new(order),
            window: TimeWindow::new(window.0, window.1),
            price,
            anchor,
            provenance,
            scores: KpiScores::default(),
            efficiency,
        }
    }

    /// O2 from (10,0) to (20,0), slotted before `o`: 0..20 for 20.
    fn request_before_o(dispatcher: &Dispatcher, requester: &Requester, price: f64) {
        let o2 = order("o2", (10.0, 0.0), (20.0, 0.0), price);
        let variant = variant(
            "o2",
            (0.0, 20.0),
            20.0,
            Point::default(),
            Provenance::AfterExistingOrder,
            price - 20.0,
        );
        let courier = dispatcher
            .directory()
            .resolve(&EntityRef::Courier(courier_id()))
            .expect("courier registered");
        courier
            .send(
                Message::PlacementRequest {
                    order: Arc::new(o2),
                    variant,
                },
                Some(requester.address.clone()),
            )
            .expect("send");
    }

    fn o_delivery(window: (f64, f64), price: f64) -> DeliveryData {
        DeliveryData::Assigned {
            courier: courier_id(),
            price,
            window: TimeWindow::new(window.0, window.1),
        }
    }

    #[tokio::test]
    async fn displacement_that_hurts_displaced_order_is_rejected() {
        let dispatcher = placed(DisplacementRule::DisplacedOnly).await;
        let before = dispatcher.export_schedules().await;
        let mut requester = Requester::new("o2");

        request_before_o(&dispatcher, &requester, 5.0);
        dispatcher.settle().await;

        assert_eq!(requester.placement_result(), Some(false));
        assert_eq!(dispatcher.export_schedules().await, before);
        let status = dispatcher
            .order_status(&OrderId::new("o"))
            .await
            .expect("status");
        assert_eq!(status.phase, OrderPhase::Placed);
        assert_eq!(status.delivery, o_delivery((0.0, 10.0), 10.0));
    }

    #[tokio::test]
    async fn net_gain_rule_commits_profitable_displacement() {
        let dispatcher = placed(DisplacementRule::NetGain).await;
        let mut requester = Requester::new("o2");

        request_before_o(&dispatcher, &requester, 60.0);
        dispatcher.settle().await;

        assert_eq!(requester.placement_result(), Some(true));
        let status = dispatcher
            .order_status(&OrderId::new("o"))
            .await
            .expect("status");
        assert_eq!(status.delivery, o_delivery((20.0, 50.0), 30.0));

        let loaded: Vec<_> = dispatcher
            .export_schedules()
            .await
            .into_iter()
            .filter(|r| r.kind == dispatch_schedule::SegmentKind::LoadedTravel)
            .map(|r| (r.task_id, r.start_time, r.end_time))
            .collect();
        assert_eq!(
            loaded,
            vec![("o2".to_string(), 10.0, 20.0), ("o".to_string(), 40.0, 50.0)]
        );
    }

    #[tokio::test]
    async fn placements_during_open_batch_are_replayed() {
        let dispatcher = placed(DisplacementRule::DisplacedOnly).await;
        let mut first = Requester::new("o2");
        let mut second = Requester::new("o3");

        request_before_o(&dispatcher, &first, 5.0);
        let o3 = order("o3", (10.0, 0.0), (20.0, 0.0), 15.0);
        let after_o = variant(
            "o3",
            (10.0, 20.0),
            10.0,
            Point::new(10.0, 0.0),
            Provenance::EarliestAvailable,
            5.0,
        );
        dispatcher
            .directory()
            .resolve(&EntityRef::Courier(courier_id()))
            .expect("courier registered")
            .send(
                Message::PlacementRequest {
                    order: Arc::new(o3),
                    variant: after_o,
                },
                Some(second.address.clone()),
            )
            .expect("send");
        dispatcher.settle().await;

        assert_eq!(first.placement_result(), Some(false));
        assert_eq!(second.placement_result(), Some(true));
        assert_eq!(dispatcher.export_schedules().await.len(), 2);
    }

    #[tokio::test]
    async fn confirmation_to_vanished_requester_is_rolled_back() {
        let dispatcher = placed(DisplacementRule::DisplacedOnly).await;
        let before = dispatcher.export_schedules().await;
        let Requester { address, inbox } = Requester::new("o3");
        drop(inbox);

        let o3 = order("o3", (10.0, 0.0), (20.0, 0.0), 15.0);
        let after_o = variant(
            "o3",
            (10.0, 20.0),
            10.0,
            Point::new(10.0, 0.0),
            Provenance::EarliestAvailable,
            5.0,
        );
        dispatcher
            .directory()
            .resolve(&EntityRef::Courier(courier_id()))
            .expect("courier registered")
            .send(
                Message::PlacementRequest {
                    order: Arc::new(o3),
                    variant: after_o,
                },
                Some(address),
            )
            .expect("send");
        dispatcher.settle().await;

        assert_eq!(dispatcher.export_schedules().await, before);
    }

    #[tokio::test]
    async fn withdrawal_of_displaced_order_aborts_batch() {
        let dispatcher = placed(DisplacementRule::NetGain).await;
        let mut requester = Requester::new("o2");

        request_before_o(&dispatcher, &requester, 60.0);
        dispatcher
            .directory()
            .resolve(&EntityRef::Courier(courier_id()))
            .expect("courier registered")
            .send(Message::UnplacementRequest(OrderId::new("o")), None)
            .expect("send");
        dispatcher.settle().await;

        assert_eq!(requester.placement_result(), Some(false));
        assert!(dispatcher.export_schedules().await.is_empty());
    }

    #[tokio::test]
    async fn mismatched_variant_is_refused() {
        let dispatcher = placed(DisplacementRule::DisplacedOnly).await;
        let mut requester = Requester::new("o9");
        let o9 = order("o9", (10.0, 0.0), (20.0, 0.0), 15.0);
        let wrong = variant(
            "someone-else",
            (10.0, 20.0),
            10.0,
            Point::new(10.0, 0.0),
            Provenance::EarliestAvailable,
            5.0,
        );
        dispatcher
            .directory()
            .resolve(&EntityRef::Courier(courier_id()))
            .expect("courier registered")
            .send(
                Message::PlacementRequest {
                    order: Arc::new(o9),
                    variant: wrong,
                },
                Some(requester.address.clone()),
            )
            .expect("send");
        dispatcher.settle().await;
        assert_eq!(requester.placement_result(), Some(false));
    }
}
