//! Orders Core Library
//!
//! Vendor-scoped commerce order aggregation: bookings (line items) progress
//! through independent lifecycle states while the owning order presents one
//! aggregated main state, one aggregated salaried flag and consistent money
//! totals. Transitions are serialized per order and never partially persist.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod aggregate;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod money;
pub mod scope;
pub mod services;
pub mod store;
pub mod transitions;

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::events::EventSender;
use crate::services::{OrderLocks, OrderService, TransitionEngine};
use crate::store::RecordStore;

/// Composition root wiring the store, the services and the event bus.
///
/// The event bus receiver stays with the composing application (typically the
/// mail-notification subsystem); the core only publishes.
pub struct OrdersCore<S: RecordStore> {
    pub config: CoreConfig,
    pub store: Arc<S>,
    pub orders: OrderService<S>,
    pub transitions: TransitionEngine<S>,
}

impl<S: RecordStore> Clone for OrdersCore<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            orders: self.orders.clone(),
            transitions: self.transitions.clone(),
        }
    }
}

impl<S: RecordStore> OrdersCore<S> {
    pub fn new(config: CoreConfig, store: Arc<S>, events: Option<EventSender>) -> Self {
        let locks = Arc::new(OrderLocks::new());
        let orders = OrderService::new(
            store.clone(),
            locks.clone(),
            events.clone(),
            config.lock_timeout(),
            config.disagreement_policy,
        );
        let transitions = TransitionEngine::new(
            store.clone(),
            locks,
            events,
            config.lock_timeout(),
            config.disagreement_policy,
        );
        Self {
            config,
            store,
            orders,
            transitions,
        }
    }
}

pub mod prelude {
    pub use crate::aggregate::{BookingView, DisagreementPolicy, OrderView};
    pub use crate::config::CoreConfig;
    pub use crate::errors::{CoreError, CoreResult};
    pub use crate::events::{channel as event_channel, Event, EventSender};
    pub use crate::models::{Booking, BookingState, Order, OrderState, Salaried};
    pub use crate::money::{Currency, Money};
    pub use crate::scope::Scope;
    pub use crate::services::{EntityRef, OrderRef, OrderService, TransitionEngine};
    pub use crate::store::{MemoryStore, RecordStore};
    pub use crate::transitions::{
        transitions_of_booking_state, transitions_of_main_state, transitions_of_salaried_state,
        SalariedTransition, StateTransition, Transition,
    };
    pub use crate::OrdersCore;
}
