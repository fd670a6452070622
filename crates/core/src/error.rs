//! Error types for the trellis engine.

use thiserror::Error;

/// Result type alias for trellis operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for network construction and propagation.
///
/// Three families exist. Internal-consistency errors signal a bug in network
/// construction and leave the session unusable. Usage errors are raised while
/// composing streams or feeding a session. Data errors are raised when a fact
/// does not have the shape a closure expected, and name that fact.
#[derive(Debug, Error)]
pub enum Error {
    /// A node observed a state that correct construction makes impossible.
    #[error("Impossible state in {node}: {message}")]
    InternalConsistency { node: String, message: String },
    /// A stream was requested over a type that was never declared.
    #[error("Fact type {type_name} is not declared (declared types: {valid:?})")]
    UndeclaredFactType {
        type_name: String,
        valid: Vec<String>,
    },
    /// A stream composition is not valid (arity, foreign factory, ...).
    #[error("Invalid stream: {message}")]
    InvalidStream { message: String },
    /// The fact was inserted twice into the same session.
    #[error("Fact already inserted: {fact}")]
    FactAlreadyInserted { fact: String },
    /// The fact is not known to the session.
    #[error("Unknown fact: {fact}")]
    UnknownFact { fact: String },
    /// The variable name is not declared on the fact type.
    #[error("Variable {variable} is not declared on {type_name}")]
    UnknownVariable { type_name: String, variable: String },
    /// An after-change notification arrived without its before-change.
    #[error("Variable change for {variable} on {fact} was not announced")]
    UnpairedVariableChange { fact: String, variable: String },
    /// The dataset does not belong to the session's network.
    #[error("Dataset {dataset} is not part of this network")]
    ForeignDataset { dataset: usize },
    /// A fact could not be read the way a stream function expected.
    #[error("Data error on {fact}: {message}")]
    Data { fact: String, message: String },
    /// A previous propagation failed part way through.
    #[error("Session was poisoned by a failed propagation and must be rebuilt")]
    SessionPoisoned,
}

impl Error {
    /// Creates an internal-consistency error attributed to a node.
    pub fn internal(node: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InternalConsistency {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Creates an undeclared fact type error.
    pub fn undeclared_fact_type(type_name: impl Into<String>, valid: Vec<String>) -> Self {
        Error::UndeclaredFactType {
            type_name: type_name.into(),
            valid,
        }
    }

    /// Creates an invalid stream error.
    pub fn invalid_stream(message: impl Into<String>) -> Self {
        Error::InvalidStream {
            message: message.into(),
        }
    }

    /// Creates a data error attributed to a fact.
    pub fn data(fact: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Data {
            fact: fact.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that indicate a broken network rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::InternalConsistency { .. })
    }
}
