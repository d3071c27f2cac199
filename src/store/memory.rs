//! In-memory reference implementation of the record store port.
//!
//! Backed by `dashmap`; suitable for tests, demos and single-process
//! composition roots. Per-record updates are atomic under the map's shard
//! locks; cross-record consistency is the transition engine's job.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{BookingPatch, OrderFilter, OrderPatch, RecordStore, Sort, SortKey, StoreError};
use crate::models::{Booking, Order};

#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: DashMap<Uuid, Order>,
    bookings: DashMap<Uuid, Booking>,
    order_numbers: DashMap<String, Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(&self, order: &Order, filter: &OrderFilter) -> bool {
        if let Some(vendor_ids) = &filter.vendor_ids {
            if order.vendor_ids.is_disjoint(vendor_ids) {
                return false;
            }
        }
        if let Some(creator) = &filter.creator {
            if &order.creator != creator {
                return false;
            }
        }
        if let Some(state) = filter.state {
            if order.state != state {
                return false;
            }
        }
        if let Some(salaried) = filter.salaried {
            if order.salaried != salaried {
                return false;
            }
        }
        if let Some(text) = &filter.text {
            let term = text.to_lowercase();
            let haystack = [&order.order_number, &order.email, &order.creator];
            if !haystack
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
            {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        if self.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateRecord(order.id));
        }
        self.order_numbers
            .insert(order.order_number.clone(), order.id);
        self.orders.insert(order.id, order);
        Ok(())
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        if self.bookings.contains_key(&booking.id) {
            return Err(StoreError::DuplicateRecord(booking.id));
        }
        self.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        let Some(id) = self.order_numbers.get(order_number).map(|entry| *entry) else {
            return Ok(None);
        };
        self.get_order(id).await
    }

    async fn get_booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(&id).map(|entry| entry.value().clone()))
    }

    async fn bookings_for_order(&self, order_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(StoreError::MissingRecord(order_id))?;
        order
            .booking_ids
            .iter()
            .map(|id| {
                self.bookings
                    .get(id)
                    .map(|entry| entry.value().clone())
                    .ok_or(StoreError::MissingRecord(*id))
            })
            .collect()
    }

    async fn query_orders(
        &self,
        filter: &OrderFilter,
        sort: &Sort,
    ) -> Result<Vec<Order>, StoreError> {
        let mut result: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| self.matches(entry.value(), filter))
            .map(|entry| entry.value().clone())
            .collect();
        match sort.key {
            SortKey::Created => result.sort_by(|a, b| {
                a.created
                    .cmp(&b.created)
                    .then_with(|| a.order_number.cmp(&b.order_number))
            }),
            SortKey::OrderNumber => result.sort_by(|a, b| a.order_number.cmp(&b.order_number)),
        }
        if sort.descending {
            result.reverse();
        }
        Ok(result)
    }

    async fn update_booking(
        &self,
        id: Uuid,
        patch: BookingPatch,
    ) -> Result<Booking, StoreError> {
        let mut entry = self
            .bookings
            .get_mut(&id)
            .ok_or(StoreError::MissingRecord(id))?;
        let booking = entry.value_mut();
        if let Some(state) = patch.state {
            booking.state = state;
        }
        if let Some(state_changed) = patch.state_changed {
            booking.state_changed = state_changed;
        }
        if let Some(salaried) = patch.salaried {
            booking.salaried = salaried;
        }
        if let Some(comment) = patch.comment {
            booking.comment = comment;
        }
        if let Some(unit_net) = patch.unit_net {
            booking.unit_net = unit_net;
        }
        if let Some(unit_discount) = patch.unit_discount {
            booking.unit_discount = unit_discount;
        }
        if let Some(vat_rate) = patch.vat_rate {
            booking.vat_rate = vat_rate;
        }
        if let Some(exported) = patch.exported {
            booking.exported = exported;
        }
        Ok(booking.clone())
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError> {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or(StoreError::MissingRecord(id))?;
        let order = entry.value_mut();
        if let Some(state) = patch.state {
            order.state = state;
        }
        if let Some(salaried) = patch.salaried {
            order.salaried = salaried;
        }
        if let Some(updated) = patch.updated {
            order.updated = Some(updated);
        }
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingState, OrderState, Salaried};
    use crate::money::Currency;
    use rust_decimal_macros::dec;

    fn eur() -> Currency {
        Currency::new("EUR").unwrap()
    }

    fn seeded_order(creator: &str, number: &str, vendor_id: Uuid) -> Order {
        let mut order = Order::new(
            number.to_string(),
            creator.to_string(),
            format!("{creator}@example.com"),
            "invoice".to_string(),
            eur(),
        );
        order.vendor_ids.insert(vendor_id);
        order
    }

    async fn seed(store: &MemoryStore, order: &Order) {
        store.insert_order(order.clone()).await.unwrap();
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = MemoryStore::new();
        let order = seeded_order("alice", "2026-0001", Uuid::new_v4());
        seed(&store, &order).await;

        let fetched = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(fetched, order);
        let by_number = store
            .get_order_by_number("2026-0001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_number.id, order.id);
        assert!(store.get_order(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        let order = seeded_order("alice", "2026-0001", Uuid::new_v4());
        seed(&store, &order).await;
        let err = store.insert_order(order).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord(_)));
    }

    #[tokio::test]
    async fn bookings_come_back_in_insertion_order() {
        let store = MemoryStore::new();
        let vendor = Uuid::new_v4();
        let mut order = seeded_order("alice", "2026-0001", vendor);
        let first = Booking::new(
            order.id,
            Uuid::new_v4(),
            vendor,
            "First".to_string(),
            1,
            dec!(10.00),
            eur(),
            "alice".to_string(),
        );
        let second = Booking::new(
            order.id,
            Uuid::new_v4(),
            vendor,
            "Second".to_string(),
            1,
            dec!(5.00),
            eur(),
            "alice".to_string(),
        );
        order.booking_ids = vec![first.id, second.id];
        seed(&store, &order).await;
        // Insert in reverse to prove ordering comes from the order record.
        store.insert_booking(second.clone()).await.unwrap();
        store.insert_booking(first.clone()).await.unwrap();

        let bookings = store.bookings_for_order(order.id).await.unwrap();
        assert_eq!(bookings[0].title, "First");
        assert_eq!(bookings[1].title, "Second");
    }

    #[tokio::test]
    async fn query_filters_by_vendor_state_and_text() {
        let store = MemoryStore::new();
        let vendor_a = Uuid::new_v4();
        let vendor_b = Uuid::new_v4();
        let mut order_a = seeded_order("alice", "2026-0001", vendor_a);
        order_a.state = OrderState::Processing;
        let order_b = seeded_order("bob", "2026-0002", vendor_b);
        seed(&store, &order_a).await;
        seed(&store, &order_b).await;

        let filter = OrderFilter {
            vendor_ids: Some([vendor_a].into_iter().collect()),
            ..Default::default()
        };
        let hits = store.query_orders(&filter, &Sort::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, order_a.id);

        let filter = OrderFilter {
            state: Some(OrderState::Processing),
            ..Default::default()
        };
        let hits = store.query_orders(&filter, &Sort::default()).await.unwrap();
        assert_eq!(hits.len(), 1);

        let filter = OrderFilter {
            text: Some("BOB@EXAMPLE".to_string()),
            ..Default::default()
        };
        let hits = store.query_orders(&filter, &Sort::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].creator, "bob");

        let filter = OrderFilter {
            salaried: Some(Salaried::Yes),
            ..Default::default()
        };
        assert!(store
            .query_orders(&filter, &Sort::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn query_sorts_by_order_number() {
        let store = MemoryStore::new();
        let vendor = Uuid::new_v4();
        seed(&store, &seeded_order("alice", "2026-0002", vendor)).await;
        seed(&store, &seeded_order("alice", "2026-0001", vendor)).await;

        let sort = Sort {
            key: SortKey::OrderNumber,
            descending: false,
        };
        let hits = store
            .query_orders(&OrderFilter::default(), &sort)
            .await
            .unwrap();
        assert_eq!(hits[0].order_number, "2026-0001");
        assert_eq!(hits[1].order_number, "2026-0002");
    }

    #[tokio::test]
    async fn update_booking_applies_only_patch_fields() {
        let store = MemoryStore::new();
        let vendor = Uuid::new_v4();
        let mut order = seeded_order("alice", "2026-0001", vendor);
        let booking = Booking::new(
            order.id,
            Uuid::new_v4(),
            vendor,
            "Widget".to_string(),
            2,
            dec!(10.00),
            eur(),
            "alice".to_string(),
        );
        order.booking_ids.push(booking.id);
        seed(&store, &order).await;
        store.insert_booking(booking.clone()).await.unwrap();

        let patch = BookingPatch {
            state: Some(BookingState::Processing),
            exported: Some(true),
            ..Default::default()
        };
        let updated = store.update_booking(booking.id, patch).await.unwrap();
        assert_eq!(updated.state, BookingState::Processing);
        assert!(updated.exported);
        assert_eq!(updated.unit_net, booking.unit_net);
        assert_eq!(updated.currency, booking.currency);

        let err = store
            .update_booking(Uuid::new_v4(), BookingPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingRecord(_)));
    }
}
