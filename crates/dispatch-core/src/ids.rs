//! Stable entity identities.
//!
//! Identities come from the imported records (a courier's personnel number,
//! an order's number) and never change for the lifetime of the entity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a courier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourierId(String);

impl CourierId {
    /// Creates a courier identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Creates an order identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to any entity that can be bound to an agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    /// A courier.
    Courier(CourierId),
    /// An order.
    Order(OrderId),
}

impl EntityRef {
    /// Parses the textual form produced by [`fmt::Display`] (`courier:7`, `order:12`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        match kind {
            "courier" => Some(Self::Courier(CourierId::new(id))),
            "order" => Some(Self::Order(OrderId::new(id))),
            _ => None,
        }
    }
}

impl From<CourierId> for EntityRef {
    fn from(id: CourierId) -> Self {
        Self::Courier(id)
    }
}

impl From<OrderId> for EntityRef {
    fn from(id: OrderId) -> Self {
        Self::Order(id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Courier(id) => write!(f, "courier:{id}"),
            Self::Order(id) => write!(f, "order:{id}"),
        }
    }
}
