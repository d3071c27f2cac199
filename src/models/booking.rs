use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Currency;

/// Lifecycle state of a single booking.
///
/// `cancelled` is terminal; `reserved` is entered at creation time when the
/// purchasable was oversold and leaves once stock is confirmed.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BookingState {
    New,
    Processing,
    Reserved,
    Finished,
    Cancelled,
}

/// Paid flag of a booking or an order aggregate.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Salaried {
    Yes,
    No,
}

/// One purchased line item within an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique identifier for the booking.
    pub id: Uuid,

    /// Owning order.
    pub order_id: Uuid,

    /// The purchasable item this booking was made for.
    pub buyable_id: Uuid,

    /// Vendor partition owning this booking; drives scope checks.
    pub vendor_id: Uuid,

    /// Display title of the purchasable at checkout time.
    pub title: String,

    /// Customer comment attached to the line item.
    pub comment: String,

    /// Ordered count. Greater than zero unless the booking is cancelled.
    pub quantity: u32,

    /// Unit of measurement (e.g. "pcs", "ticket").
    pub quantity_unit: String,

    /// Per-unit net price.
    pub unit_net: Decimal,

    /// Per-unit discount. Never exceeds the unit net price.
    pub unit_discount: Decimal,

    /// VAT rate in percent.
    pub vat_rate: Decimal,

    /// Currency, immutable once set (no patch field exists for it).
    pub currency: Currency,

    /// Lifecycle state; mutated through the transition engine only.
    pub state: BookingState,

    /// Paid flag; frozen once the booking is cancelled.
    pub salaried: Salaried,

    /// Marker set by the surrounding export flow.
    pub exported: bool,

    /// Identity of the checkout creator.
    pub creator: String,

    /// Creation timestamp.
    pub created: DateTime<Utc>,

    /// Timestamp of the last main-state change; used by the aggregate
    /// disagreement policy.
    pub state_changed: DateTime<Utc>,

    /// Presentation-only passthrough fields; never interpreted by the core.
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Booking {
    /// A fresh booking in state `new` (or `reserved` when oversold).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: Uuid,
        buyable_id: Uuid,
        vendor_id: Uuid,
        title: String,
        quantity: u32,
        unit_net: Decimal,
        currency: Currency,
        creator: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            buyable_id,
            vendor_id,
            title,
            comment: String::new(),
            quantity,
            quantity_unit: "pcs".to_string(),
            unit_net,
            unit_discount: Decimal::ZERO,
            vat_rate: Decimal::ZERO,
            currency,
            state: BookingState::New,
            salaried: Salaried::No,
            exported: false,
            creator,
            created: now,
            state_changed: now,
            extras: BTreeMap::new(),
        }
    }

    /// True unless the booking is cancelled.
    pub fn is_active(&self) -> bool {
        self.state != BookingState::Cancelled
    }

    /// True once the booking can no longer be corrected by vendor tools.
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, BookingState::Finished | BookingState::Cancelled)
    }

    /// Applies a main-state change, stamping `state_changed`.
    pub fn set_state(&mut self, state: BookingState) {
        self.state = state;
        self.state_changed = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn booking() -> Booking {
        Booking::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Widget".to_string(),
            2,
            dec!(10.00),
            Currency::new("EUR").unwrap(),
            "alice".to_string(),
        )
    }

    #[test]
    fn new_booking_starts_unpaid_and_active() {
        let b = booking();
        assert_eq!(b.state, BookingState::New);
        assert_eq!(b.salaried, Salaried::No);
        assert!(b.is_active());
        assert!(!b.is_finalized());
        assert!(!b.exported);
    }

    #[test]
    fn cancelled_is_inactive_and_finalized() {
        let mut b = booking();
        b.set_state(BookingState::Cancelled);
        assert!(!b.is_active());
        assert!(b.is_finalized());
    }

    #[test]
    fn set_state_stamps_change_time() {
        let mut b = booking();
        let before = b.state_changed;
        b.set_state(BookingState::Processing);
        assert_eq!(b.state, BookingState::Processing);
        assert!(b.state_changed >= before);
    }

    #[test]
    fn state_codes_round_trip() {
        assert_eq!(BookingState::Processing.to_string(), "processing");
        assert_eq!(
            BookingState::from_str("reserved").unwrap(),
            BookingState::Reserved
        );
        assert_eq!(Salaried::Yes.to_string(), "yes");
        assert_eq!(Salaried::from_str("no").unwrap(), Salaried::No);
    }
}
