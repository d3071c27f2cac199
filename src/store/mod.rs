//! Record store port.
//!
//! The persistence engine is an external collaborator; the core only depends
//! on this trait. Updates are patch-style: a patch carries exactly the fields
//! a caller may change, so invariants like currency immutability hold by
//! construction. [`memory::MemoryStore`] is the bundled reference
//! implementation used by composition roots and tests.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Booking, BookingState, Order, OrderState, Salaried};

pub use memory::MemoryStore;

/// Backend failure taxonomy of the store port.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} does not exist")]
    MissingRecord(Uuid),

    #[error("duplicate record {0}")]
    DuplicateRecord(Uuid),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Mutable subset of a booking record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingPatch {
    pub state: Option<BookingState>,
    pub state_changed: Option<DateTime<Utc>>,
    pub salaried: Option<Salaried>,
    pub comment: Option<String>,
    pub unit_net: Option<Decimal>,
    pub unit_discount: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
    pub exported: Option<bool>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Mutable subset of an order record (derived caches and bookkeeping only).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub state: Option<OrderState>,
    pub salaried: Option<Salaried>,
    pub updated: Option<DateTime<Utc>>,
}

/// Predicates for order list queries. All fields are conjunctive; the vendor
/// set is the scope intersection and is always present for vendor-facing
/// listings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderFilter {
    /// Match orders owning at least one booking of one of these vendors.
    pub vendor_ids: Option<BTreeSet<Uuid>>,
    /// Match the checkout creator exactly.
    pub creator: Option<String>,
    /// Match the cached aggregate main state.
    pub state: Option<OrderState>,
    /// Match the cached aggregate paid flag.
    pub salaried: Option<Salaried>,
    /// Naive full-text term over order number, email and creator.
    pub text: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Created,
    OrderNumber,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    pub descending: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            key: SortKey::Created,
            descending: true,
        }
    }
}

/// The store interface the core consumes.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError>;

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError>;

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Bookings of an order, in insertion order.
    async fn bookings_for_order(&self, order_id: Uuid) -> Result<Vec<Booking>, StoreError>;

    async fn query_orders(
        &self,
        filter: &OrderFilter,
        sort: &Sort,
    ) -> Result<Vec<Order>, StoreError>;

    /// Applies a patch and returns the updated record.
    async fn update_booking(
        &self,
        id: Uuid,
        patch: BookingPatch,
    ) -> Result<Booking, StoreError>;

    /// Applies a patch and returns the updated record.
    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError>;
}
