//! Transition vocabularies for the booking main-state machine and the
//! salaried machine.
//!
//! This module is pure: it answers "what is allowed from here" and "where
//! does this transition lead". Execution, scoping and persistence live in
//! [`crate::services::transitions`].

use serde::{Deserialize, Serialize};

use crate::models::{BookingState, OrderState, Salaried};

/// Main-state transitions.
///
/// `new → processing → finished` is the normal forward path; `cancel` is
/// legal from every non-terminal state; `reserved` rejoins the forward path
/// once stock is confirmed.
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
pub enum StateTransition {
    Process,
    Finish,
    Cancel,
}

impl StateTransition {
    /// The booking state this transition leads to.
    pub fn target(self) -> BookingState {
        match self {
            Self::Process => BookingState::Processing,
            Self::Finish => BookingState::Finished,
            Self::Cancel => BookingState::Cancelled,
        }
    }

    /// Whether this transition is defined from the given booking state.
    pub fn is_legal_from(self, from: BookingState) -> bool {
        match (self, from) {
            (Self::Process, BookingState::New | BookingState::Reserved) => true,
            (Self::Finish, BookingState::Processing | BookingState::Reserved) => true,
            (Self::Cancel, state) => state != BookingState::Cancelled,
            _ => false,
        }
    }
}

/// Salaried transitions, permitted at any booking main-state except
/// `cancelled` (a cancelled booking's paid flag is frozen).
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
pub enum SalariedTransition {
    MarkPaid,
    MarkUnpaid,
}

impl SalariedTransition {
    pub fn target(self) -> Salaried {
        match self {
            Self::MarkPaid => Salaried::Yes,
            Self::MarkUnpaid => Salaried::No,
        }
    }
}

/// Either machine's transition, as requested against an order or a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    State(StateTransition),
    Salaried(SalariedTransition),
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::State(t) => write!(f, "{t}"),
            Self::Salaried(t) => write!(f, "{t}"),
        }
    }
}

/// Transitions offered from a booking's current main state.
pub fn transitions_of_booking_state(state: BookingState) -> &'static [StateTransition] {
    match state {
        BookingState::New => &[StateTransition::Process, StateTransition::Cancel],
        BookingState::Processing => &[StateTransition::Finish, StateTransition::Cancel],
        BookingState::Reserved => &[
            StateTransition::Process,
            StateTransition::Finish,
            StateTransition::Cancel,
        ],
        BookingState::Finished => &[StateTransition::Cancel],
        BookingState::Cancelled => &[],
    }
}

/// Transitions offered from an order's aggregate main state.
///
/// `mixed` offers the full set so a vendor can drive disagreeing bookings
/// back to one state; per-booking legality is still enforced at execution.
pub fn transitions_of_main_state(state: OrderState) -> &'static [StateTransition] {
    match state {
        OrderState::New => &[StateTransition::Process, StateTransition::Cancel],
        OrderState::Processing => &[StateTransition::Finish, StateTransition::Cancel],
        OrderState::Reserved => &[
            StateTransition::Process,
            StateTransition::Finish,
            StateTransition::Cancel,
        ],
        OrderState::Finished => &[StateTransition::Cancel],
        OrderState::Cancelled => &[],
        OrderState::Mixed => &[
            StateTransition::Process,
            StateTransition::Finish,
            StateTransition::Cancel,
        ],
    }
}

/// Transitions offered from a salaried state.
pub fn transitions_of_salaried_state(state: Salaried) -> &'static [SalariedTransition] {
    match state {
        Salaried::No => &[SalariedTransition::MarkPaid],
        Salaried::Yes => &[SalariedTransition::MarkUnpaid],
    }
}
