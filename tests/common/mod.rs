//! Shared harness for the integration suites: a core wired to the in-memory
//! store, checkout seeding helpers, and store wrappers that inject failures
//! or latency.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use orders_core::config::CoreConfig;
use orders_core::events::{channel, Event};
use orders_core::models::{Booking, Order};
use orders_core::scope::Scope;
use orders_core::services::orders::{CreateBookingRequest, CreateOrderRequest};
use orders_core::store::{
    BookingPatch, MemoryStore, OrderFilter, OrderPatch, RecordStore, Sort, StoreError,
};
use orders_core::money::Currency;
use orders_core::OrdersCore;

pub fn init() {
    orders_core::logging::init_tracing();
}

pub fn test_config(lock_timeout_ms: u64) -> CoreConfig {
    CoreConfig {
        lock_timeout_ms,
        event_buffer: 64,
        ..Default::default()
    }
}

/// A core over the plain in-memory store plus the bus receiver.
pub struct TestCore {
    pub core: OrdersCore<MemoryStore>,
    pub events: mpsc::Receiver<Event>,
}

impl TestCore {
    pub fn new() -> Self {
        init();
        let (sender, events) = channel(64);
        let core = OrdersCore::new(
            test_config(1_000),
            Arc::new(MemoryStore::new()),
            Some(sender),
        );
        Self { core, events }
    }

    /// Drains every event published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub fn eur() -> Currency {
    Currency::new("EUR").unwrap()
}

pub fn booking_request(vendor: Uuid, title: &str, net: Decimal, vat_rate: Decimal) -> CreateBookingRequest {
    CreateBookingRequest {
        buyable_id: Uuid::new_v4(),
        vendor_id: vendor,
        title: title.to_string(),
        comment: String::new(),
        quantity: 1,
        quantity_unit: "pcs".to_string(),
        unit_net: net,
        unit_discount: Decimal::ZERO,
        vat_rate,
        reserved: false,
        extras: Default::default(),
    }
}

pub fn order_request(
    order_number: &str,
    creator: &str,
    bookings: Vec<CreateBookingRequest>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        order_number: order_number.to_string(),
        creator: creator.to_string(),
        email: format!("{creator}@example.com"),
        payment_label: "invoice".to_string(),
        currency: eur(),
        shipping_net: Decimal::ZERO,
        shipping_vat: Decimal::ZERO,
        discount_net: Decimal::ZERO,
        discount_vat: Decimal::ZERO,
        bookings,
        extras: Default::default(),
    }
}

/// A seeded checkout: the created order and a scope covering its vendor.
pub struct Seeded {
    pub order: Order,
    pub vendor: Uuid,
    pub scope: Scope,
}

/// Creates an order with two one-piece bookings (10.00 and 15.00 EUR at 21%
/// VAT) for a single vendor — the reference scenario.
pub async fn seed_two_bookings<S: RecordStore>(core: &OrdersCore<S>, number: &str) -> Seeded {
    let vendor = Uuid::new_v4();
    let request = order_request(
        number,
        "alice",
        vec![
            booking_request(vendor, "First widget", Decimal::new(1000, 2), Decimal::from(21)),
            booking_request(vendor, "Second widget", Decimal::new(1500, 2), Decimal::from(21)),
        ],
    );
    let order = core.orders.create_order(request).await.expect("seed order");
    let scope = Scope::for_vendors([vendor]).unwrap();
    Seeded {
        order,
        vendor,
        scope,
    }
}

/// Store wrapper that can be told to fail updates, for atomicity tests.
pub struct FlakyStore {
    inner: MemoryStore,
    fail_order_updates: AtomicBool,
    booking_updates_before_failure: AtomicUsize,
    booking_updates_seen: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_order_updates: AtomicBool::new(false),
            booking_updates_before_failure: AtomicUsize::new(usize::MAX),
            booking_updates_seen: AtomicUsize::new(0),
        }
    }

    pub fn fail_order_updates(&self) {
        self.fail_order_updates.store(true, Ordering::SeqCst);
    }

    /// Let `n` booking updates through, then fail the next ones. Reverts are
    /// admitted again after `heal_booking_updates`.
    pub fn fail_booking_updates_after(&self, n: usize) {
        self.booking_updates_before_failure.store(n, Ordering::SeqCst);
        self.booking_updates_seen.store(0, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_order_updates.store(false, Ordering::SeqCst);
        self.booking_updates_before_failure
            .store(usize::MAX, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        self.inner.insert_order(order).await
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        self.inner.insert_booking(booking).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        self.inner.get_order(id).await
    }

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        self.inner.get_order_by_number(order_number).await
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.inner.get_booking(id).await
    }

    async fn bookings_for_order(&self, order_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        self.inner.bookings_for_order(order_id).await
    }

    async fn query_orders(
        &self,
        filter: &OrderFilter,
        sort: &Sort,
    ) -> Result<Vec<Order>, StoreError> {
        self.inner.query_orders(filter, sort).await
    }

    async fn update_booking(&self, id: Uuid, patch: BookingPatch) -> Result<Booking, StoreError> {
        let threshold = self.booking_updates_before_failure.load(Ordering::SeqCst);
        let seen = self.booking_updates_seen.fetch_add(1, Ordering::SeqCst);
        if seen >= threshold {
            // One-shot: later updates (the engine's reverts) go through.
            self.booking_updates_before_failure
                .store(usize::MAX, Ordering::SeqCst);
            return Err(StoreError::Backend("injected booking failure".to_string()));
        }
        self.inner.update_booking(id, patch).await
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError> {
        if self.fail_order_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected order failure".to_string()));
        }
        self.inner.update_order(id, patch).await
    }
}

/// Store wrapper that sleeps inside booking updates, to hold the order lock
/// long enough for contention tests.
pub struct SlowStore {
    inner: MemoryStore,
    update_delay: Duration,
}

impl SlowStore {
    pub fn new(update_delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            update_delay,
        }
    }
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        self.inner.insert_order(order).await
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        self.inner.insert_booking(booking).await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        self.inner.get_order(id).await
    }

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        self.inner.get_order_by_number(order_number).await
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.inner.get_booking(id).await
    }

    async fn bookings_for_order(&self, order_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        self.inner.bookings_for_order(order_id).await
    }

    async fn query_orders(
        &self,
        filter: &OrderFilter,
        sort: &Sort,
    ) -> Result<Vec<Order>, StoreError> {
        self.inner.query_orders(filter, sort).await
    }

    async fn update_booking(&self, id: Uuid, patch: BookingPatch) -> Result<Booking, StoreError> {
        tokio::time::sleep(self.update_delay).await;
        self.inner.update_booking(id, patch).await
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError> {
        self.inner.update_order(id, patch).await
    }
}
