pub mod booking;
pub mod error;
pub mod ledger;
pub mod ride;

pub use booking::{Booking, BookingStatus};
pub use error::LifecycleError;
pub use ledger::{LedgerRef, MalformedReference, ReferenceRole};
pub use ride::{Ride, RideStatus};
