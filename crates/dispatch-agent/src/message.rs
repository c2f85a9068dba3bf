//! Protocol messages and the letters that carry them.

use std::fmt;
use std::sync::Arc;

use dispatch_core::{CourierId, DeliveryData, DispatchConfig, EntityRef, Order, OrderId};
use dispatch_schedule::{ScheduleRecord, Variant};
use tokio::sync::oneshot;

use crate::directory::Directory;
use crate::order::OrderStatus;
use crate::runtime::AgentAddress;
use crate::scene::Scene;

/// One step of the negotiation protocol.
#[derive(Debug)]
pub enum Message {
    /// Order asks a courier for offers.
    PriceRequest(Arc<Order>),
    /// Courier answers a price request.
    PriceResponse {
        /// Answering courier.
        courier: CourierId,
        /// Offers, possibly none.
        variants: Vec<Variant>,
    },
    /// Order asks a courier to commit to a variant.
    PlacementRequest {
        /// Order to place.
        order: Arc<Order>,
        /// Chosen variant.
        variant: Variant,
    },
    /// Courier answers a placement request.
    PlacementResponse {
        /// The variant that was requested.
        variant: Variant,
        /// Whether the courier committed to it.
        success: bool,
    },
    /// A courier joined.
    NewCourier(CourierId),
    /// Order withdraws from a courier's schedule.
    UnplacementRequest(OrderId),
    /// Courier changed an order's committed terms.
    PlacementChanged(DeliveryData),
    /// A courier left.
    CourierRemoved(CourierId),
    /// Courier proposes a forced re-slotting.
    ShiftProposal {
        /// Proposing courier.
        courier: CourierId,
        /// The forced variant.
        variant: Variant,
    },
    /// Order's scored answer to a shift proposal.
    ShiftResponse(Variant),
    /// Query a courier's flat schedule.
    ExportSchedule(oneshot::Sender<Vec<ScheduleRecord>>),
    /// Query an order's negotiation state.
    DescribeOrder(oneshot::Sender<OrderStatus>),
}

/// Discriminant of a [`Message`], used for subscriptions and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKind {
    /// [`Message::PriceRequest`].
    PriceRequest,
    /// [`Message::PriceResponse`].
    PriceResponse,
    /// [`Message::PlacementRequest`].
    PlacementRequest,
    /// [`Message::PlacementResponse`].
    PlacementResponse,
    /// [`Message::NewCourier`].
    NewCourier,
    /// [`Message::UnplacementRequest`].
    UnplacementRequest,
    /// [`Message::PlacementChanged`].
    PlacementChanged,
    /// [`Message::CourierRemoved`].
    CourierRemoved,
    /// [`Message::ShiftProposal`].
    ShiftProposal,
    /// [`Message::ShiftResponse`].
    ShiftResponse,
    /// [`Message::ExportSchedule`].
    ExportSchedule,
    /// [`Message::DescribeOrder`].
    DescribeOrder,
}

impl Message {
    /// The message's kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::PriceRequest(_) => MessageKind::PriceRequest,
            Self::PriceResponse { .. } => MessageKind::PriceResponse,
            Self::PlacementRequest { .. } => MessageKind::PlacementRequest,
            Self::PlacementResponse { .. } => MessageKind::PlacementResponse,
            Self::NewCourier(_) => MessageKind::NewCourier,
            Self::UnplacementRequest(_) => MessageKind::UnplacementRequest,
            Self::PlacementChanged(_) => MessageKind::PlacementChanged,
            Self::CourierRemoved(_) => MessageKind::CourierRemoved,
            Self::ShiftProposal { .. } => MessageKind::ShiftProposal,
            Self::ShiftResponse(_) => MessageKind::ShiftResponse,
            Self::ExportSchedule(_) => MessageKind::ExportSchedule,
            Self::DescribeOrder(_) => MessageKind::DescribeOrder,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PriceRequest => "price-request",
            Self::PriceResponse => "price-response",
            Self::PlacementRequest => "placement-request",
            Self::PlacementResponse => "placement-response",
            Self::NewCourier => "new-courier",
            Self::UnplacementRequest => "unplacement-request",
            Self::PlacementChanged => "placement-changed",
            Self::CourierRemoved => "courier-removed",
            Self::ShiftProposal => "shift-proposal",
            Self::ShiftResponse => "shift-response",
            Self::ExportSchedule => "export-schedule",
            Self::DescribeOrder => "describe-order",
        };
        f.write_str(name)
    }
}

/// Capabilities handed to an agent by the init handshake.
#[derive(Debug, Clone)]
pub struct InitPayload {
    /// Shared entity profiles.
    pub scene: Arc<Scene>,
    /// Shared address book.
    pub directory: Arc<Directory>,
    /// The entity the agent negotiates for.
    pub entity: EntityRef,
    /// Negotiation tuning.
    pub config: Arc<DispatchConfig>,
}

/// What travels through an agent's inbox.
#[derive(Debug)]
pub enum Letter {
    /// Mandatory first letter.
    Init(InitPayload),
    /// A protocol message with the sender's address, if any.
    Deliver {
        /// The message.
        message: Message,
        /// Who to answer.
        sender: Option<AgentAddress>,
    },
    /// Teardown request.
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let msg = Message::UnplacementRequest(OrderId::new("1"));
        assert_eq!(msg.kind(), MessageKind::UnplacementRequest);
        assert_eq!(msg.kind().to_string(), "unplacement-request");
        let msg = Message::CourierRemoved(CourierId::new("2"));
        assert_eq!(msg.kind(), MessageKind::CourierRemoved);
    }
}
