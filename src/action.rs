// src/action.rs

//! Shared outcome vocabulary for reconciliation actions

/// How a single action invocation ended.
///
/// `PreconditionFailed` is operator-visible but non-fatal: it terminates
/// this action only, never the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// A remote transition was performed
    Performed,
    /// The declared state already held; nothing was done
    UpToDate,
    /// The action's precondition did not hold
    PreconditionFailed(String),
}
