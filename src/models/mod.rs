//! Typed domain records.
//!
//! The core works on explicit structs per entity; anything presentation-only
//! travels in the opaque `extras` map and is never interpreted here.

pub mod booking;
pub mod order;

pub use booking::{Booking, BookingState, Salaried};
pub use order::{Order, OrderState};
