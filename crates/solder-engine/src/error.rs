//! Engine error taxonomy
//!
//! Build-time problems (`BindError`) are detected while constructing a
//! calling sequence and never retried automatically. Call-time problems
//! (`CallError`) abort the specific invocation after scratch teardown.
//! Upcall stub creation has its own taxonomy (`UpcallError`).

use solder_core::scope::ScopeError;
use solder_core::value::Carrier;

/// Position of one value within a function shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSite {
    /// Argument at a zero-based call position.
    Argument(usize),
    /// The return value.
    Return,
}

impl std::fmt::Display for ValueSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSite::Argument(index) => write!(f, "argument {index}"),
            ValueSite::Return => f.write_str("return value"),
        }
    }
}

/// Errors detected while building a calling sequence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// Arity or void-ness disagreement between signature and descriptor.
    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    /// A carrier cannot legally describe the layout at its position.
    #[error("carrier {carrier:?} incompatible with the layout of {site}")]
    IncompatibleCarrier {
        /// Where the offending value sits.
        site: ValueSite,
        /// The offending carrier.
        carrier: Carrier,
    },

    /// A value shape has no defined storage mapping on this platform.
    #[error("unsupported carrier shape: {0}")]
    UnsupportedCarrier(String),
}

/// Errors raised by a downcall invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Sequence construction failed.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// A scope operation failed during marshaling.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// The call shape cannot be transferred by this platform's adapter.
    #[error("unsupported call shape: {0}")]
    UnsupportedShape(String),

    /// Argument or return marshaling failed before or after the transition.
    #[error("marshaling failed: {0}")]
    MarshalFailed(String),
}

/// Errors raised while creating an upcall stub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpcallError {
    /// The handler's first parameter is not the scope-lifetime token.
    #[error("handler shape invalid: {0}")]
    HandlerShape(String),

    /// Sequence construction failed.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// A scope operation failed.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// All trampoline pool slots are taken.
    #[error("upcall stub pool exhausted")]
    PoolExhausted,

    /// The descriptor needs storage the trampolines cannot expose.
    #[error("unsupported upcall shape: {0}")]
    UnsupportedShape(String),
}
