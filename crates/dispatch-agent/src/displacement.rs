//! Courier-side state of an open displacement batch.

use std::collections::HashMap;
use std::sync::Arc;

use dispatch_core::{DisplacementRule, Order, OrderId};
use dispatch_schedule::{Schedule, ShiftPlan, Variant};

use crate::runtime::AgentAddress;

/// A placement waiting on the displaced orders' verdicts.
#[derive(Debug)]
pub(crate) struct PendingDisplacement {
    requester: Arc<Order>,
    variant: Variant,
    reply_to: AgentAddress,
    shifts: Vec<(Arc<Order>, Variant)>,
    committed: f64,
    responses: HashMap<OrderId, Variant>,
}

/// The pieces of a resolved batch.
pub(crate) struct Resolved {
    pub requester: Arc<Order>,
    pub variant: Variant,
    pub reply_to: AgentAddress,
    pub shifts: Vec<(Arc<Order>, Variant)>,
}

impl PendingDisplacement {
    /// Opens a batch. The status quo is the sum of the efficiencies the
    /// displaced orders committed with.
    pub fn new(
        requester: Arc<Order>,
        variant: Variant,
        reply_to: AgentAddress,
        plan: ShiftPlan,
        schedule: &Schedule,
    ) -> Self {
        let committed = plan
            .displaced()
            .filter_map(|id| schedule.committed_efficiency(id))
            .sum();
        Self {
            requester,
            variant,
            reply_to,
            shifts: plan.shifts,
            committed,
            responses: HashMap::new(),
        }
    }

    /// Returns true if `order` is the requester or one of the displaced.
    pub fn involves(&self, order: &OrderId) -> bool {
        &self.requester.id == order || self.shifts.iter().any(|(o, _)| &o.id == order)
    }

    /// Records a displaced order's scored answer. Returns false for answers
    /// this batch did not ask for.
    pub fn record(&mut self, response: Variant) -> bool {
        let asked = self
            .shifts
            .iter()
            .any(|(o, v)| {
                o.id == response.order && v.courier == response.courier && v.window == response.window
            });
        if !asked || self.responses.contains_key(&response.order) {
            return false;
        }
        self.responses.insert(response.order.clone(), response);
        true
    }

    /// Returns true once every displaced order has answered.
    pub fn is_complete(&self) -> bool {
        self.responses.len() == self.shifts.len()
    }

    /// Efficiency the displaced orders would have after the shift.
    pub fn proposed(&self) -> f64 {
        self.responses.values().map(|v| v.efficiency).sum()
    }

    /// Efficiency the displaced orders have now.
    pub const fn committed(&self) -> f64 {
        self.committed
    }

    /// Whether the batch strictly improves on the status quo.
    pub fn verdict(&self, rule: DisplacementRule, epsilon: f64) -> bool {
        rule.accepts(
            self.proposed(),
            self.committed,
            self.variant.efficiency,
            epsilon,
        )
    }

    /// Closes the batch. Shift terms come from the plan; only the scores
    /// come from the displaced orders.
    pub fn resolve(self) -> Resolved {
        let Self {
            requester,
            variant,
            reply_to,
            shifts,
            responses,
            ..
        } = self;
        let shifts = shifts
            .into_iter()
            .map(|(order, mut shift)| {
                if let Some(answer) = responses.get(&order.id) {
                    shift.scores = answer.scores;
                    shift.efficiency = answer.efficiency;
                }
                (order, shift)
            })
            .collect();
        Resolved {
            requester,
            variant,
            reply_to,
            shifts,
        }
    }
}
