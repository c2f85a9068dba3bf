//! Error types for the dispatch CLI.

use dispatch_agent::AgentError;
use dispatch_core::CoreError;
use thiserror::Error;

/// Errors raised while loading scenarios or executing commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file or stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An entity or configuration was rejected.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The agent system refused the operation.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// The interactive command was not recognized.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The interactive command is missing its argument.
    #[error("{command} expects {expected}")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// Description of the expected argument.
        expected: &'static str,
    },

    /// No live agent matches the given id.
    #[error("no agent with id {0}")]
    UnknownEntity(String),

    /// A bare id matches both a courier and an order.
    #[error("id {0} is ambiguous, use courier:{0} or order:{0}")]
    AmbiguousEntity(String),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;
