//! Error types for dispatch-agent.

use dispatch_core::EntityRef;
use thiserror::Error;

use crate::message::MessageKind;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Directory lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// No agent is registered for the entity.
    #[error("no agent registered for {0}")]
    Unknown(EntityRef),
}

/// Errors raised while an agent handles a letter.
///
/// None of these stop the agent: the runtime logs them and moves on to the
/// next letter.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A message arrived before the init handshake.
    #[error("agent not initialized")]
    NotInitialized,

    /// The init handshake named an entity this agent cannot represent.
    #[error("cannot bind to {0}")]
    WrongEntity(EntityRef),

    /// A counterpart could not be resolved.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The destination agent has shut down.
    #[error("agent {0} is gone")]
    AgentGone(EntityRef),

    /// The agent does not handle this kind of message.
    #[error("unsupported message: {0}")]
    Unsupported(MessageKind),

    /// A message violated the negotiation protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A handler panicked.
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}

/// KPI normalization failures.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum KpiError {
    /// The value lies outside `[min, max]`.
    #[error("value {value} outside [{min}, {max}]")]
    OutOfRange {
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::CourierId;

    #[test]
    fn directory_error_is_transparent() {
        let err: AgentError = DirectoryError::Unknown(EntityRef::Courier(CourierId::new("3"))).into();
        assert_eq!(err.to_string(), "no agent registered for courier:3");
    }

    #[test]
    fn kpi_error_display() {
        let err = KpiError::OutOfRange {
            value: 5.0,
            min: 0.0,
            max: 1.0,
        };
        assert_eq!(err.to_string(), "value 5 outside [0, 1]");
    }
}
