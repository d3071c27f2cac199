//! Per-booking derived figures.
//!
//! Cancelled bookings yield zero for every line figure — that is the
//! cancellation-excluded value the order totals expect. Malformed numeric
//! fields fail with `InvalidBookingData`; nothing is silently coerced.

use crate::errors::{CoreError, CoreResult};
use crate::models::Booking;
use crate::money::Money;

/// True unless the booking is cancelled.
pub fn is_active(booking: &Booking) -> bool {
    booking.is_active()
}

/// Rejects bookings whose numeric fields cannot produce meaningful figures.
pub fn validate_figures(booking: &Booking) -> CoreResult<()> {
    if booking.unit_net.is_sign_negative() {
        return Err(CoreError::InvalidBookingData(format!(
            "booking {}: negative unit net {}",
            booking.id, booking.unit_net
        )));
    }
    if booking.unit_discount.is_sign_negative() {
        return Err(CoreError::InvalidBookingData(format!(
            "booking {}: negative unit discount {}",
            booking.id, booking.unit_discount
        )));
    }
    if booking.unit_discount > booking.unit_net {
        return Err(CoreError::InvalidBookingData(format!(
            "booking {}: discount {} exceeds net {}",
            booking.id, booking.unit_discount, booking.unit_net
        )));
    }
    if booking.vat_rate.is_sign_negative() {
        return Err(CoreError::InvalidBookingData(format!(
            "booking {}: negative VAT rate {}",
            booking.id, booking.vat_rate
        )));
    }
    if booking.quantity == 0 && booking.is_active() {
        return Err(CoreError::InvalidBookingData(format!(
            "booking {}: zero quantity on an active booking",
            booking.id
        )));
    }
    Ok(())
}

/// Total discount of the line: quantity × per-unit discount.
pub fn line_discount(booking: &Booking) -> CoreResult<Money> {
    if !booking.is_active() {
        return Ok(Money::zero(booking.currency.clone()));
    }
    validate_figures(booking)?;
    Ok(Money::new(booking.unit_discount, booking.currency.clone()).times(booking.quantity))
}

/// Net of the line: quantity × unit net − discount. Full precision; round at
/// output only.
pub fn line_net(booking: &Booking) -> CoreResult<Money> {
    if !booking.is_active() {
        return Ok(Money::zero(booking.currency.clone()));
    }
    validate_figures(booking)?;
    let gross_net = Money::new(booking.unit_net, booking.currency.clone()).times(booking.quantity);
    gross_net.sub(&line_discount(booking)?)
}

/// VAT of the line: line net × vat rate / 100.
pub fn line_vat(booking: &Booking) -> CoreResult<Money> {
    Ok(line_net(booking)?.percent(booking.vat_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingState;
    use crate::money::Currency;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn booking(quantity: u32, unit_net: Decimal, vat_rate: Decimal) -> Booking {
        let mut b = Booking::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Widget".to_string(),
            quantity,
            unit_net,
            Currency::new("EUR").unwrap(),
            "alice".to_string(),
        );
        b.vat_rate = vat_rate;
        b
    }

    #[test]
    fn line_net_is_quantity_times_unit_net_minus_discount() {
        let mut b = booking(3, dec!(10.00), dec!(21));
        b.unit_discount = dec!(1.50);
        assert_eq!(line_net(&b).unwrap().amount(), dec!(25.50));
        assert_eq!(line_discount(&b).unwrap().amount(), dec!(4.50));
    }

    #[test]
    fn line_vat_is_percentage_of_net() {
        let b = booking(2, dec!(12.50), dec!(21));
        assert_eq!(line_net(&b).unwrap().amount(), dec!(25.00));
        assert_eq!(line_vat(&b).unwrap().amount(), dec!(5.2500));
    }

    #[test]
    fn cancelled_booking_figures_collapse_to_zero() {
        let mut b = booking(2, dec!(12.50), dec!(21));
        b.set_state(BookingState::Cancelled);
        assert!(!is_active(&b));
        assert!(line_net(&b).unwrap().is_zero());
        assert!(line_vat(&b).unwrap().is_zero());
        assert!(line_discount(&b).unwrap().is_zero());
    }

    #[test]
    fn cancelled_booking_with_zero_quantity_is_tolerated() {
        let mut b = booking(1, dec!(12.50), dec!(21));
        b.quantity = 0;
        b.set_state(BookingState::Cancelled);
        assert!(line_net(&b).unwrap().is_zero());
    }

    #[test]
    fn zero_quantity_on_active_booking_is_invalid() {
        let mut b = booking(1, dec!(12.50), dec!(21));
        b.quantity = 0;
        assert!(matches!(
            line_net(&b),
            Err(CoreError::InvalidBookingData(_))
        ));
    }

    #[test]
    fn negative_figures_are_invalid() {
        let mut b = booking(1, dec!(-1.00), dec!(21));
        assert!(matches!(
            line_net(&b),
            Err(CoreError::InvalidBookingData(_))
        ));

        let mut c = booking(1, dec!(10.00), dec!(-5));
        assert!(matches!(
            line_vat(&c),
            Err(CoreError::InvalidBookingData(_))
        ));

        b = booking(1, dec!(10.00), dec!(21));
        b.unit_discount = dec!(-0.01);
        assert!(matches!(
            line_discount(&b),
            Err(CoreError::InvalidBookingData(_))
        ));
        c = booking(1, dec!(10.00), dec!(21));
        c.unit_discount = dec!(10.01);
        assert!(matches!(
            line_net(&c),
            Err(CoreError::InvalidBookingData(_))
        ));
    }

    #[test]
    fn net_plus_vat_is_non_negative_for_valid_bookings() {
        let mut b = booking(4, dec!(2.35), dec!(19));
        b.unit_discount = dec!(2.35);
        let net = line_net(&b).unwrap();
        let vat = line_vat(&b).unwrap();
        assert!(!net.add(&vat).unwrap().is_negative());
    }
}
