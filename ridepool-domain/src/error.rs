/// Errors raised by lifecycle transition preconditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid transition from {from} to {to}: record is terminal")]
    AlreadyTerminal { from: String, to: String },

    #[error("ride cannot be completed before its departure time")]
    DepartureNotReached,
}
