pub mod coordinator;
pub mod inventory;
pub mod memory;
pub mod store;
pub mod validator;

pub use coordinator::{CancelSummary, Coordinator, EngineError, NewBooking, NewRide};
pub use inventory::{InventoryError, SeatInventory};
pub use memory::MemoryStore;
pub use store::{
    BookingStore, ReleaseOutcome, ReserveOutcome, RideFilter, RideStore, StoreError,
    TransitionOutcome,
};
pub use validator::{LedgerService, NoopLedger, ReferenceValidator, ValidationError};
