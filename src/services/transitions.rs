//! Transition execution against orders and bookings.
//!
//! The engine is the only writer of state fields. Every execution runs under
//! the order's advisory lock, stages all changes before the first write, and
//! re-derives the order's cached aggregate fields synchronously before
//! returning — callers never observe a stale aggregate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::aggregate::order::{aggregate_main_state, aggregate_salaried};
use crate::aggregate::{DisagreementPolicy, OrderView};
use crate::errors::{CoreError, CoreResult};
use crate::events::{Event, EventSender};
use crate::models::{Booking, BookingState, Order, OrderState, Salaried};
use crate::scope::Scope;
use crate::store::{BookingPatch, OrderPatch, RecordStore};
use crate::transitions::{
    transitions_of_booking_state, transitions_of_main_state, transitions_of_salaried_state,
    SalariedTransition, StateTransition, Transition,
};

use super::OrderLocks;

/// The entity a transition is requested against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRef {
    Order(Uuid),
    Booking(Uuid),
}

/// State machine executor shared by the order and booking vocabularies.
pub struct TransitionEngine<S: RecordStore> {
    store: Arc<S>,
    locks: Arc<OrderLocks>,
    events: Option<EventSender>,
    lock_timeout: Duration,
    policy: DisagreementPolicy,
}

impl<S: RecordStore> Clone for TransitionEngine<S> {
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

impl<S: RecordStore> TransitionEngine<S> {
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

    /// Main-state transitions offered from the entity's current state, for
    /// presentation dropdowns.
    pub async fn allowed_state_transitions(
        &self,
        entity: EntityRef,
        scope: &Scope,
    ) -> CoreResult<&'static [StateTransition]> {
        match entity {
            EntityRef::Booking(id) => {
                let booking = self.fetch_booking_in_scope(id, scope).await?;
                Ok(transitions_of_booking_state(booking.state))
            }
            EntityRef::Order(id) => {
                let (_, in_scope) = self.fetch_order_in_scope(id, scope).await?;
                Ok(transitions_of_main_state(aggregate_main_state(
                    &in_scope,
                    self.policy,
                )))
            }
        }
    }

    /// Salaried transitions offered from the entity's current paid flag.
    pub async fn allowed_salaried_transitions(
        &self,
        entity: EntityRef,
        scope: &Scope,
    ) -> CoreResult<&'static [SalariedTransition]> {
        match entity {
            EntityRef::Booking(id) => {
                let booking = self.fetch_booking_in_scope(id, scope).await?;
                if !booking.is_active() {
                    return Ok(&[]);
                }
                Ok(transitions_of_salaried_state(booking.salaried))
            }
            EntityRef::Order(id) => {
                let (_, in_scope) = self.fetch_order_in_scope(id, scope).await?;
                Ok(transitions_of_salaried_state(aggregate_salaried(&in_scope)))
            }
        }
    }

    /// Executes a transition and returns the re-derived view.
    ///
    /// Idempotent: requesting a transition whose resulting state is already
    /// reached succeeds without side effects. Never partially persists; a
    /// mid-update store failure reverts the bookings written so far.
    #[instrument(skip(self, scope), fields(entity = ?entity, transition = %transition))]
    pub async fn execute(
        &self,
        entity: EntityRef,
        transition: Transition,
        scope: &Scope,
    ) -> CoreResult<OrderView> {
        let order_id = match entity {
            EntityRef::Order(id) => id,
            EntityRef::Booking(id) => self.fetch_booking_in_scope(id, scope).await?.order_id,
        };

        let _guard = self.locks.acquire(order_id, self.lock_timeout).await?;

        let order = self.fetch_order(order_id).await?;
        let mut bookings = self.store.bookings_for_order(order_id).await?;
        let in_scope: Vec<&Booking> = bookings
            .iter()
            .filter(|b| scope.covers(b.vendor_id))
            .collect();
        if in_scope.is_empty() {
            return Err(CoreError::Unauthorized(format!(
                "no bookings of order {order_id} within the caller's scope"
            )));
        }

        let target_ids: Vec<Uuid> = match entity {
            EntityRef::Booking(id) => {
                let booking = bookings
                    .iter()
                    .find(|b| b.id == id)
                    .ok_or_else(|| CoreError::NotFound(format!("booking {id}")))?;
                if !scope.covers(booking.vendor_id) {
                    return Err(CoreError::Unauthorized(format!(
                        "booking {id} is outside the caller's scope"
                    )));
                }
                vec![id]
            }
            EntityRef::Order(_) => in_scope
                .iter()
                .filter(|b| b.is_active())
                .map(|b| b.id)
                .collect(),
        };

        let outcome = match transition {
            Transition::State(t) => {
                self.execute_state(entity, t, &order, &mut bookings, &target_ids, scope)
                    .await?
            }
            Transition::Salaried(t) => {
                self.execute_salaried(entity, t, &order, &mut bookings, &target_ids, scope)
                    .await?
            }
        };

        let (updated_order, changed) = match outcome {
            Some(result) => result,
            None => {
                // Resulting state already reached; succeed without writes.
                info!(order_id = %order_id, transition = %transition, "transition is a no-op");
                (order, false)
            }
        };

        if changed {
            info!(
                order_id = %order_id,
                transition = %transition,
                order_state = %updated_order.state,
                order_salaried = %updated_order.salaried,
                "transition applied"
            );
        }

        OrderView::build(updated_order, bookings, scope, self.policy)
    }

    /// Stages and persists a main-state transition. Returns `None` for an
    /// idempotent repeat, `Some((order, true))` after a successful write.
    async fn execute_state(
        &self,
        entity: EntityRef,
        transition: StateTransition,
        order: &Order,
        bookings: &mut [Booking],
        target_ids: &[Uuid],
        scope: &Scope,
    ) -> CoreResult<Option<(Order, bool)>> {
        let target = transition.target();

        // Stage every change before the first write.
        let mut staged: Vec<Uuid> = Vec::new();
        for booking in bookings.iter().filter(|b| target_ids.contains(&b.id)) {
            if booking.state == target {
                continue;
            }
            if !transition.is_legal_from(booking.state) {
                return Err(CoreError::IllegalTransition {
                    transition: transition.to_string(),
                    from: booking.state.to_string(),
                });
            }
            staged.push(booking.id);
        }

        if staged.is_empty() {
            let satisfied = match entity {
                EntityRef::Booking(id) => bookings
                    .iter()
                    .find(|b| b.id == id)
                    .map(|b| b.state == target)
                    .unwrap_or(false),
                EntityRef::Order(_) => {
                    let in_scope: Vec<Booking> = bookings
                        .iter()
                        .filter(|b| scope.covers(b.vendor_id))
                        .cloned()
                        .collect();
                    aggregate_main_state(&in_scope, self.policy) == OrderState::from(target)
                }
            };
            if satisfied {
                return Ok(None);
            }
            return Err(CoreError::IllegalTransition {
                transition: transition.to_string(),
                from: self.entity_state_label(entity, bookings, scope),
            });
        }

        let now = Utc::now();
        let mut applied: Vec<(Uuid, BookingPatch)> = Vec::new();
        let mut previous: Vec<(Uuid, BookingState)> = Vec::new();
        for booking in bookings.iter().filter(|b| staged.contains(&b.id)) {
            let patch = BookingPatch {
                state: Some(target),
                state_changed: Some(now),
                ..Default::default()
            };
            let revert = BookingPatch {
                state: Some(booking.state),
                state_changed: Some(booking.state_changed),
                ..Default::default()
            };
            if let Err(e) = self.store.update_booking(booking.id, patch).await {
                error!(booking_id = %booking.id, error = %e, "booking update failed, reverting");
                self.revert(&applied).await;
                return Err(e.into());
            }
            previous.push((booking.id, booking.state));
            applied.push((booking.id, revert));
        }

        for booking in bookings.iter_mut().filter(|b| staged.contains(&b.id)) {
            booking.state = target;
            booking.state_changed = now;
        }

        let updated_order = self
            .persist_aggregate(order, bookings, now, &applied)
            .await?;

        for (booking_id, prev) in &previous {
            self.publish(Event::BookingStateChanged {
                booking_id: *booking_id,
                order_id: order.id,
                previous: *prev,
                new: target,
                occurred_at: now,
            })
            .await;
            if target == BookingState::Cancelled {
                self.publish(Event::BookingCancelled {
                    booking_id: *booking_id,
                    order_id: order.id,
                })
                .await;
            }
        }
        self.publish_aggregate_changes(order, &updated_order).await;

        Ok(Some((updated_order, true)))
    }

    /// Stages and persists a salaried transition; same contract as
    /// [`Self::execute_state`].
    async fn execute_salaried(
        &self,
        entity: EntityRef,
        transition: SalariedTransition,
        order: &Order,
        bookings: &mut [Booking],
        target_ids: &[Uuid],
        scope: &Scope,
    ) -> CoreResult<Option<(Order, bool)>> {
        let target = transition.target();

        let mut staged: Vec<Uuid> = Vec::new();
        for booking in bookings.iter().filter(|b| target_ids.contains(&b.id)) {
            if booking.salaried == target {
                continue;
            }
            // A cancelled booking's paid flag is frozen.
            if !booking.is_active() {
                return Err(CoreError::IllegalTransition {
                    transition: transition.to_string(),
                    from: booking.state.to_string(),
                });
            }
            staged.push(booking.id);
        }

        if staged.is_empty() {
            let satisfied = match entity {
                EntityRef::Booking(id) => bookings
                    .iter()
                    .find(|b| b.id == id)
                    .map(|b| b.salaried == target)
                    .unwrap_or(false),
                EntityRef::Order(_) => {
                    let in_scope: Vec<Booking> = bookings
                        .iter()
                        .filter(|b| scope.covers(b.vendor_id))
                        .cloned()
                        .collect();
                    aggregate_salaried(&in_scope) == target
                }
            };
            if satisfied {
                return Ok(None);
            }
            return Err(CoreError::IllegalTransition {
                transition: transition.to_string(),
                from: self.entity_state_label(entity, bookings, scope),
            });
        }

        let now = Utc::now();
        let mut applied: Vec<(Uuid, BookingPatch)> = Vec::new();
        let mut previous: Vec<(Uuid, Salaried)> = Vec::new();
        for booking in bookings.iter().filter(|b| staged.contains(&b.id)) {
            let patch = BookingPatch {
                salaried: Some(target),
                ..Default::default()
            };
            let revert = BookingPatch {
                salaried: Some(booking.salaried),
                ..Default::default()
            };
            if let Err(e) = self.store.update_booking(booking.id, patch).await {
                error!(booking_id = %booking.id, error = %e, "booking update failed, reverting");
                self.revert(&applied).await;
                return Err(e.into());
            }
            previous.push((booking.id, booking.salaried));
            applied.push((booking.id, revert));
        }

        for booking in bookings.iter_mut().filter(|b| staged.contains(&b.id)) {
            booking.salaried = target;
        }

        let updated_order = self
            .persist_aggregate(order, bookings, now, &applied)
            .await?;

        for (booking_id, prev) in &previous {
            self.publish(Event::BookingSalariedChanged {
                booking_id: *booking_id,
                order_id: order.id,
                previous: *prev,
                new: target,
            })
            .await;
        }
        self.publish_aggregate_changes(order, &updated_order).await;

        Ok(Some((updated_order, true)))
    }

    /// Re-derives the cached aggregate fields over the full booking set and
    /// persists them; reverts the booking writes if the order write fails.
    async fn persist_aggregate(
        &self,
        order: &Order,
        bookings: &[Booking],
        now: chrono::DateTime<Utc>,
        applied: &[(Uuid, BookingPatch)],
    ) -> CoreResult<Order> {
        let patch = OrderPatch {
            state: Some(aggregate_main_state(bookings, self.policy)),
            salaried: Some(aggregate_salaried(bookings)),
            updated: Some(now),
        };
        match self.store.update_order(order.id, patch).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                error!(order_id = %order.id, error = %e, "aggregate update failed, reverting bookings");
                self.revert(applied).await;
                Err(e.into())
            }
        }
    }

    /// Best-effort rollback of booking writes, most recent first.
    async fn revert(&self, applied: &[(Uuid, BookingPatch)]) {
        for (booking_id, patch) in applied.iter().rev() {
            if let Err(e) = self.store.update_booking(*booking_id, patch.clone()).await {
                error!(
                    booking_id = %booking_id,
                    error = %e,
                    "failed to revert booking after persistence failure"
                );
            }
        }
    }

    async fn publish(&self, event: Event) {
        if let Some(events) = &self.events {
            if let Err(e) = events.send(event).await {
                warn!(error = %e, "failed to publish transition event");
            }
        }
    }

    async fn publish_aggregate_changes(&self, before: &Order, after: &Order) {
        if before.state != after.state {
            self.publish(Event::OrderStateChanged {
                order_id: after.id,
                previous: before.state,
                new: after.state,
            })
            .await;
        }
        if before.salaried != after.salaried {
            self.publish(Event::OrderSalariedChanged {
                order_id: after.id,
                previous: before.salaried,
                new: after.salaried,
            })
            .await;
        }
    }

    fn entity_state_label(
        &self,
        entity: EntityRef,
        bookings: &[Booking],
        scope: &Scope,
    ) -> String {
        match entity {
            EntityRef::Booking(id) => bookings
                .iter()
                .find(|b| b.id == id)
                .map(|b| b.state.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            EntityRef::Order(_) => {
                let in_scope: Vec<Booking> = bookings
                    .iter()
                    .filter(|b| scope.covers(b.vendor_id))
                    .cloned()
                    .collect();
                aggregate_main_state(&in_scope, self.policy).to_string()
            }
        }
    }

    async fn fetch_order(&self, id: Uuid) -> CoreResult<Order> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("order {id}")))
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

    async fn fetch_order_in_scope(
        &self,
        id: Uuid,
        scope: &Scope,
    ) -> CoreResult<(Order, Vec<Booking>)> {
        let order = self.fetch_order(id).await?;
        let in_scope: Vec<Booking> = self
            .store
            .bookings_for_order(id)
            .await?
            .into_iter()
            .filter(|b| scope.covers(b.vendor_id))
            .collect();
        if in_scope.is_empty() {
            return Err(CoreError::Unauthorized(format!(
                "no bookings of order {id} within the caller's scope"
            )));
        }
        Ok((order, in_scope))
    }
}
