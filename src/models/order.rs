use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::{BookingState, Salaried};
use crate::money::Currency;

/// Aggregate lifecycle state of an order.
///
/// Mirrors [`BookingState`] plus `mixed`, which is reserved strictly for the
/// reserved/non-reserved conflict among active bookings.
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
pub enum OrderState {
    New,
    Processing,
    Reserved,
    Finished,
    Cancelled,
    Mixed,
}

impl From<BookingState> for OrderState {
    fn from(state: BookingState) -> Self {
        match state {
            BookingState::New => OrderState::New,
            BookingState::Processing => OrderState::Processing,
            BookingState::Reserved => OrderState::Reserved,
            BookingState::Finished => OrderState::Finished,
            BookingState::Cancelled => OrderState::Cancelled,
        }
    }
}

/// The aggregate of one checkout.
///
/// `state`, `salaried` and `vendor_ids` are caches derived from the owned
/// bookings — kept on the record so list queries can filter on them, and
/// recomputed by the transition engine whenever any owned booking changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier for the order.
    pub id: Uuid,

    /// Human-readable order number.
    pub order_number: String,

    /// Identity of the checkout creator.
    pub creator: String,

    /// Checkout email; used by the anonymous order lookup.
    pub email: String,

    /// Payment method label chosen at checkout.
    pub payment_label: String,

    /// Checkout currency; bookings are created in it.
    pub currency: Currency,

    /// Order-level shipping figures.
    pub shipping_net: Decimal,
    pub shipping_vat: Decimal,

    /// Cart-level discount figures (line discounts live on the bookings).
    pub discount_net: Decimal,
    pub discount_vat: Decimal,

    /// Owned bookings, insertion order preserved.
    pub booking_ids: Vec<Uuid>,

    /// Derived aggregate main state (cached).
    pub state: OrderState,

    /// Derived aggregate paid flag (cached).
    pub salaried: Salaried,

    /// Vendors owning at least one booking of this order (cached).
    pub vendor_ids: BTreeSet<Uuid>,

    /// Creation timestamp.
    pub created: DateTime<Utc>,

    /// Timestamp of the last mutation.
    pub updated: Option<DateTime<Utc>>,

    /// Opaque personal/billing/delivery data and other presentation-only
    /// fields; passed through, never interpreted.
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Order {
    pub fn new(
        order_number: String,
        creator: String,
        email: String,
        payment_label: String,
        currency: Currency,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_number,
            creator,
            email,
            payment_label,
            currency,
            shipping_net: Decimal::ZERO,
            shipping_vat: Decimal::ZERO,
            discount_net: Decimal::ZERO,
            discount_vat: Decimal::ZERO,
            booking_ids: Vec::new(),
            state: OrderState::New,
            salaried: Salaried::No,
            vendor_ids: BTreeSet::new(),
            created: Utc::now(),
            updated: None,
            extras: BTreeMap::new(),
        }
    }

    /// Insertion position of a booking, the tie-break key for the aggregate
    /// disagreement policy.
    pub fn booking_position(&self, booking_id: Uuid) -> Option<usize> {
        self.booking_ids.iter().position(|id| *id == booking_id)
    }
}
