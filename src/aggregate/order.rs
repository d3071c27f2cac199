//! Order-level aggregation: totals, shared currency and the two derived
//! aggregate states.
//!
//! The aggregate states are a pure function of the booking set. The view
//! returned to a caller derives over the in-scope subset; the cached fields
//! on the order record derive over all bookings (see the transition engine).

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, CoreResult};
use crate::models::{Booking, BookingState, Order, OrderState, Salaried};
use crate::money::{Currency, Money};
use crate::scope::Scope;

use super::booking as line;

/// Policy for the order main state when active bookings disagree outside the
/// reserved/non-reserved conflict. Configurable; `mixed` is never produced by
/// this policy, it is reserved strictly for the reserved conflict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisagreementPolicy {
    /// State of the most-recently-changed booking; ties broken by insertion
    /// order, lowest position wins.
    #[default]
    MostRecentlyChanged,
    /// State of the first booking in insertion order.
    FirstBooking,
}

/// Aggregate main state over a booking set, in priority order: no active
/// bookings → `cancelled`; unanimous → that state; reserved among mixed
/// active states → `mixed`; otherwise the disagreement policy decides.
pub fn aggregate_main_state(bookings: &[Booking], policy: DisagreementPolicy) -> OrderState {
    let active: Vec<(usize, &Booking)> = bookings
        .iter()
        .enumerate()
        .filter(|(_, b)| b.is_active())
        .collect();
    let Some(&(_, first)) = active.first() else {
        return OrderState::Cancelled;
    };
    if active.iter().all(|(_, b)| b.state == first.state) {
        return first.state.into();
    }
    if active.iter().any(|(_, b)| b.state == BookingState::Reserved) {
        return OrderState::Mixed;
    }
    match policy {
        DisagreementPolicy::MostRecentlyChanged => active
            .iter()
            .max_by(|(pos_a, a), (pos_b, b)| {
                a.state_changed
                    .cmp(&b.state_changed)
                    .then_with(|| pos_b.cmp(pos_a))
            })
            .map(|(_, b)| b.state.into())
            .expect("non-empty active set"),
        DisagreementPolicy::FirstBooking => first.state.into(),
    }
}

/// Aggregate paid flag: `yes` only if every active booking is flagged paid.
/// An empty active set is vacuously `yes`; the `cancelled` main state
/// dominates presentation in that case.
pub fn aggregate_salaried(bookings: &[Booking]) -> Salaried {
    let all_paid = bookings
        .iter()
        .filter(|b| b.is_active())
        .all(|b| b.salaried == Salaried::Yes);
    if all_paid {
        Salaried::Yes
    } else {
        Salaried::No
    }
}

/// The shared currency of a booking set, or `None` when the set is empty or
/// the bookings disagree.
pub fn shared_currency(bookings: &[Booking]) -> Option<Currency> {
    let mut shared: Option<&Currency> = None;
    for booking in bookings {
        match shared {
            None => shared = Some(&booking.currency),
            Some(currency) if *currency != booking.currency => return None,
            Some(_) => {}
        }
    }
    shared.cloned()
}

/// One booking as seen through the view: the raw record plus its rounded
/// line figures.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub net: Money,
    pub vat: Money,
    pub discount: Money,
}

/// Read-only projection of an order within a caller's scope.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub bookings: Vec<BookingView>,
    pub net: Money,
    pub vat: Money,
    pub discount_net: Money,
    pub discount_vat: Money,
    pub shipping_net: Money,
    pub shipping_vat: Money,
    pub total: Money,
    /// Shared currency of the in-scope bookings; `None` when they disagree.
    pub currency: Option<Currency>,
    pub state: OrderState,
    pub salaried: Salaried,
}

impl OrderView {
    /// Builds the view over the bookings visible within `scope`.
    ///
    /// `bookings` must be the order's bookings in insertion order. Fails with
    /// `Unauthorized` when the scope covers none of them, and with
    /// `CurrencyMismatch` when an active booking's currency cannot be
    /// combined with the order currency — totals are never understated by
    /// dropping a booking.
    pub fn build(
        order: Order,
        bookings: Vec<Booking>,
        scope: &Scope,
        policy: DisagreementPolicy,
    ) -> CoreResult<Self> {
        let in_scope: Vec<Booking> = bookings
            .into_iter()
            .filter(|b| scope.covers(b.vendor_id))
            .collect();
        if in_scope.is_empty() {
            return Err(CoreError::Unauthorized(format!(
                "no bookings of order {} within the caller's scope",
                order.id
            )));
        }

        let mut net = Money::zero(order.currency.clone());
        let mut vat = Money::zero(order.currency.clone());
        for booking in in_scope.iter().filter(|b| b.is_active()) {
            net = net.add(&line::line_net(booking)?)?;
            vat = vat.add(&line::line_vat(booking)?)?;
        }

        let discount_net = Money::new(order.discount_net, order.currency.clone());
        let discount_vat = Money::new(order.discount_vat, order.currency.clone());
        let shipping_net = Money::new(order.shipping_net, order.currency.clone());
        let shipping_vat = Money::new(order.shipping_vat, order.currency.clone());

        let total = net
            .add(&vat)?
            .sub(&discount_net)?
            .sub(&discount_vat)?
            .add(&shipping_net)?
            .add(&shipping_vat)?
            .clamp_non_negative();

        let state = aggregate_main_state(&in_scope, policy);
        let salaried = aggregate_salaried(&in_scope);
        let currency = shared_currency(&in_scope);

        let bookings = in_scope
            .into_iter()
            .map(|booking| {
                let net = line::line_net(&booking)?.rounded();
                let vat = line::line_vat(&booking)?.rounded();
                let discount = line::line_discount(&booking)?.rounded();
                Ok(BookingView {
                    booking,
                    net,
                    vat,
                    discount,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self {
            order,
            bookings,
            net: net.rounded(),
            vat: vat.rounded(),
            discount_net: discount_net.rounded(),
            discount_vat: discount_vat.rounded(),
            shipping_net: shipping_net.rounded(),
            shipping_vat: shipping_vat.rounded(),
            total: total.rounded(),
            currency,
            state,
            salaried,
        })
    }
}
