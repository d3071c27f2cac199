//! Core event bus.
//!
//! The bus is constructed and owned by the composing application; the core
//! only publishes. The surrounding mail-notification subsystem subscribes to
//! the receiver half — delivery is not the core's responsibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{BookingState, OrderState, Salaried};

/// Events published by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// An order and its initial booking set were created at checkout.
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },

    /// A booking's main state changed.
    BookingStateChanged {
        booking_id: Uuid,
        order_id: Uuid,
        previous: BookingState,
        new: BookingState,
        occurred_at: DateTime<Utc>,
    },

    /// A booking reached `cancelled`; emitted in addition to the state
    /// change so cancellation notifications need no state diffing.
    BookingCancelled {
        booking_id: Uuid,
        order_id: Uuid,
    },

    /// A booking's paid flag changed.
    BookingSalariedChanged {
        booking_id: Uuid,
        order_id: Uuid,
        previous: Salaried,
        new: Salaried,
    },

    /// The order's derived aggregate main state changed.
    OrderStateChanged {
        order_id: Uuid,
        previous: OrderState,
        new: OrderState,
    },

    /// The order's derived aggregate paid flag changed.
    OrderSalariedChanged {
        order_id: Uuid,
        previous: Salaried,
        new: Salaried,
    },
}

/// Sending half of the bus, cloned into services.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }
}

/// Builds a bounded bus; the receiver goes to the subscribing subsystem.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (sender, receiver) = mpsc::channel(buffer);
    (EventSender::new(sender), receiver)
}
