//! Order service: checkout creation, scope-filtered views and listings, and
//! the vendor correction tools.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::aggregate::booking as line;
use crate::aggregate::order::{aggregate_main_state, aggregate_salaried};
use crate::aggregate::{DisagreementPolicy, OrderView};
use crate::errors::{CoreError, CoreResult};
use crate::events::{Event, EventSender};
use crate::models::{Booking, BookingState, Order, OrderState, Salaried};
use crate::money::Currency;
use crate::scope::Scope;
use crate::store::{BookingPatch, OrderFilter, RecordStore, Sort};

use super::OrderLocks;

/// How callers address an order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderRef {
    Id(Uuid),
    Number(String),
}

/// One line item of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub buyable_id: Uuid,
    pub vendor_id: Uuid,
    #[validate(length(min = 1, message = "Booking title is required"))]
    pub title: String,
    #[serde(default)]
    pub comment: String,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: u32,
    #[serde(default = "default_quantity_unit")]
    pub quantity_unit: String,
    pub unit_net: Decimal,
    #[serde(default)]
    pub unit_discount: Decimal,
    #[serde(default)]
    pub vat_rate: Decimal,
    /// Set by the purchasing flow when the purchasable is oversold; the
    /// booking then starts in `reserved` instead of `new`.
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

fn default_quantity_unit() -> String {
    "pcs".to_string()
}

/// A checkout: the order and its initial booking set, created atomically.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order number is required"))]
    pub order_number: String,
    #[validate(length(min = 1, message = "Creator is required"))]
    pub creator: String,
    #[validate(email(message = "A valid checkout email is required"))]
    pub email: String,
    #[serde(default)]
    pub payment_label: String,
    pub currency: Currency,
    #[serde(default)]
    pub shipping_net: Decimal,
    #[serde(default)]
    pub shipping_vat: Decimal,
    #[serde(default)]
    pub discount_net: Decimal,
    #[serde(default)]
    pub discount_vat: Decimal,
    pub bookings: Vec<CreateBookingRequest>,
    #[serde(default)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

/// Vendor-facing listing query; every field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct OrderListQuery {
    /// Narrow to one vendor; must be within the caller's scope.
    pub vendor: Option<Uuid>,
    pub creator: Option<String>,
    pub state: Option<OrderState>,
    pub salaried: Option<Salaried>,
    pub text: Option<String>,
    pub sort: Sort,
}

/// Price-field correction applied by the owning vendor, pre-finalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingCorrection {
    pub unit_net: Option<Decimal>,
    pub unit_discount: Option<Decimal>,
    pub vat_rate: Option<Decimal>,
}

pub struct OrderService<S: RecordStore> {
    store: Arc<S>,
    locks: Arc<OrderLocks>,
    events: Option<EventSender>,
    lock_timeout: Duration,
    policy: DisagreementPolicy,
}

impl<S: RecordStore> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: self.locks.clone(),
            events: self.events.clone(),
            lock_timeout: self.lock_timeout,
            policy: self.policy,
        }
    }
}

impl<S: RecordStore> OrderService<S> {
    pub fn new(
        store: Arc<S>,
        locks: Arc<OrderLocks>,
        events: Option<EventSender>,
        lock_timeout: Duration,
        policy: DisagreementPolicy,
    ) -> Self {
        Self {
            store,
            locks,
            events,
            lock_timeout,
            policy,
        }
    }

    /// Creates an order atomically with its initial booking set.
    #[instrument(skip(self, request), fields(order_number = %request.order_number, creator = %request.creator))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> CoreResult<Order> {
        request.validate()?;
        if request.bookings.is_empty() {
            return Err(CoreError::Validation(
                "an order needs at least one booking".to_string(),
            ));
        }
        for item in &request.bookings {
            item.validate()?;
        }
        for figure in [
            request.shipping_net,
            request.shipping_vat,
            request.discount_net,
            request.discount_vat,
        ] {
            if figure.is_sign_negative() {
                return Err(CoreError::Validation(
                    "order-level figures must not be negative".to_string(),
                ));
            }
        }
        if self
            .store
            .get_order_by_number(&request.order_number)
            .await?
            .is_some()
        {
            return Err(CoreError::Validation(format!(
                "order number '{}' already exists",
                request.order_number
            )));
        }

        let mut order = Order::new(
            request.order_number,
            request.creator,
            request.email,
            request.payment_label,
            request.currency,
        );
        order.shipping_net = request.shipping_net;
        order.shipping_vat = request.shipping_vat;
        order.discount_net = request.discount_net;
        order.discount_vat = request.discount_vat;
        order.extras = request.extras;

        let mut bookings = Vec::with_capacity(request.bookings.len());
        for item in request.bookings {
            let mut booking = Booking::new(
                order.id,
                item.buyable_id,
                item.vendor_id,
                item.title,
                item.quantity,
                item.unit_net,
                order.currency.clone(),
                order.creator.clone(),
            );
            booking.comment = item.comment;
            booking.quantity_unit = item.quantity_unit;
            booking.unit_discount = item.unit_discount;
            booking.vat_rate = item.vat_rate;
            booking.extras = item.extras;
            if item.reserved {
                booking.state = BookingState::Reserved;
            }
            line::validate_figures(&booking)?;
            order.booking_ids.push(booking.id);
            order.vendor_ids.insert(booking.vendor_id);
            bookings.push(booking);
        }

        order.state = aggregate_main_state(&bookings, self.policy);
        order.salaried = aggregate_salaried(&bookings);

        // Bookings first: they are unreachable until the order record lands.
        for booking in &bookings {
            self.store.insert_booking(booking.clone()).await?;
        }
        self.store.insert_order(order.clone()).await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            bookings = bookings.len(),
            "order created"
        );
        self.publish(Event::OrderCreated {
            order_id: order.id,
            order_number: order.order_number.clone(),
        })
        .await;

        Ok(order)
    }

    /// The scope-filtered projection of an order.
    #[instrument(skip(self, scope))]
    pub async fn order_view(&self, order: OrderRef, scope: &Scope) -> CoreResult<OrderView> {
        let order = self.resolve(order).await?;
        let bookings = self.store.bookings_for_order(order.id).await?;
        OrderView::build(order, bookings, scope, self.policy)
    }

    /// A creator's own orders, newest first by default.
    #[instrument(skip(self))]
    pub async fn my_orders(&self, creator: &str, sort: Sort) -> CoreResult<Vec<Order>> {
        let filter = OrderFilter {
            creator: Some(creator.to_string()),
            ..Default::default()
        };
        Ok(self.store.query_orders(&filter, &sort).await?)
    }

    /// The creator's own full projection of one of their orders.
    #[instrument(skip(self))]
    pub async fn my_order_view(&self, order_id: Uuid, creator: &str) -> CoreResult<OrderView> {
        let order = self.resolve(OrderRef::Id(order_id)).await?;
        if order.creator != creator {
            return Err(CoreError::Unauthorized(format!(
                "order {order_id} was not created by '{creator}'"
            )));
        }
        let scope = Scope::for_vendors(order.vendor_ids.iter().copied())?;
        let bookings = self.store.bookings_for_order(order.id).await?;
        OrderView::build(order, bookings, &scope, self.policy)
    }

    /// Anonymous lookup by order number and checkout email.
    ///
    /// A wrong email reports `NotFound`, never `Unauthorized` — the error
    /// must not reveal which order numbers exist.
    #[instrument(skip(self, email))]
    pub async fn guest_order_view(
        &self,
        order_number: &str,
        email: &str,
    ) -> CoreResult<OrderView> {
        let not_found =
            || CoreError::NotFound("no order for the given number and email".to_string());
        let order = self
            .store
            .get_order_by_number(order_number)
            .await?
            .ok_or_else(not_found)?;
        if !order.email.eq_ignore_ascii_case(email) {
            return Err(not_found());
        }
        let scope = Scope::for_vendors(order.vendor_ids.iter().copied())?;
        let bookings = self.store.bookings_for_order(order.id).await?;
        OrderView::build(order, bookings, &scope, self.policy)
    }

    /// Scope-filtered order listing with optional narrowing filters.
    #[instrument(skip(self, scope, query))]
    pub async fn list_orders(
        &self,
        query: OrderListQuery,
        scope: &Scope,
    ) -> CoreResult<Vec<Order>> {
        let effective = match query.vendor {
            Some(vendor) => scope.restrict_to(vendor)?,
            None => scope.clone(),
        };
        let filter = OrderFilter {
            vendor_ids: Some(effective.vendor_ids().clone()),
            creator: query.creator,
            state: query.state,
            salaried: query.salaried,
            text: query.text,
        };
        Ok(self.store.query_orders(&filter, &query.sort).await?)
    }

    /// Updates a booking's comment (vendor correction tool).
    #[instrument(skip(self, scope, comment))]
    pub async fn update_booking_comment(
        &self,
        booking_id: Uuid,
        comment: String,
        scope: &Scope,
    ) -> CoreResult<Booking> {
        let booking = self.fetch_booking_in_scope(booking_id, scope).await?;
        let _guard = self
            .locks
            .acquire(booking.order_id, self.lock_timeout)
            .await?;
        let patch = BookingPatch {
            comment: Some(comment),
            ..Default::default()
        };
        let updated = self.store.update_booking(booking_id, patch).await?;
        info!(booking_id = %booking_id, "booking comment updated");
        Ok(updated)
    }

    /// Corrects a booking's price fields. Rejected once the booking is
    /// finalized (finished or cancelled).
    #[instrument(skip(self, scope, correction))]
    pub async fn correct_booking(
        &self,
        booking_id: Uuid,
        correction: BookingCorrection,
        scope: &Scope,
    ) -> CoreResult<Booking> {
        let probe = self.fetch_booking_in_scope(booking_id, scope).await?;
        let _guard = self
            .locks
            .acquire(probe.order_id, self.lock_timeout)
            .await?;
        // Re-read under the lock; a transition may have finalized it.
        let booking = self.fetch_booking_in_scope(booking_id, scope).await?;
        if booking.is_finalized() {
            return Err(CoreError::Validation(format!(
                "booking {booking_id} is {} and can no longer be corrected",
                booking.state
            )));
        }

        let mut corrected = booking.clone();
        if let Some(unit_net) = correction.unit_net {
            corrected.unit_net = unit_net;
        }
        if let Some(unit_discount) = correction.unit_discount {
            corrected.unit_discount = unit_discount;
        }
        if let Some(vat_rate) = correction.vat_rate {
            corrected.vat_rate = vat_rate;
        }
        line::validate_figures(&corrected)?;

        let patch = BookingPatch {
            unit_net: correction.unit_net,
            unit_discount: correction.unit_discount,
            vat_rate: correction.vat_rate,
            ..Default::default()
        };
        let updated = self.store.update_booking(booking_id, patch).await?;
        info!(booking_id = %booking_id, "booking price fields corrected");
        Ok(updated)
    }

    /// Sets or clears the exported marker on a batch of bookings, for the
    /// surrounding CSV export flow. All-or-nothing on authorization.
    #[instrument(skip(self, scope, booking_ids), fields(count = booking_ids.len()))]
    pub async fn mark_exported(
        &self,
        booking_ids: &[Uuid],
        exported: bool,
        scope: &Scope,
    ) -> CoreResult<usize> {
        // Authorize the whole batch before the first write.
        for booking_id in booking_ids {
            self.fetch_booking_in_scope(*booking_id, scope).await?;
        }
        let mut updated = 0;
        for booking_id in booking_ids {
            let patch = BookingPatch {
                exported: Some(exported),
                ..Default::default()
            };
            self.store.update_booking(*booking_id, patch).await?;
            updated += 1;
        }
        info!(count = updated, exported, "bookings export marker updated");
        Ok(updated)
    }

    async fn resolve(&self, order: OrderRef) -> CoreResult<Order> {
        match order {
            OrderRef::Id(id) => self
                .store
                .get_order(id)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("order {id}"))),
            OrderRef::Number(number) => self
                .store
                .get_order_by_number(&number)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("order '{number}'"))),
        }
    }

    async fn fetch_booking_in_scope(&self, id: Uuid, scope: &Scope) -> CoreResult<Booking> {
        let booking = self
            .store
            .get_booking(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {id}")))?;
        if !scope.covers(booking.vendor_id) {
            return Err(CoreError::Unauthorized(format!(
                "booking {id} is outside the caller's scope"
            )));
        }
        Ok(booking)
    }

    async fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            if let Err(e) = events.send(event).await {
                warn!(error = %e, "failed to publish order event");
            }
        }
    }
}
