//! Integration tests for the order lifecycle.
//!
//! These tests drive checkout, administration and customer cancellation
//! through the service against the in-memory store and catalog.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{CustomerId, Money, OrderStatus, ProductId, StoreId};
use domain::{
    CheckoutLine, CheckoutRequest, DomainError, Notification, Notifications, OrderError,
    OrderService, RecordingNotifier,
};
use order_store::{InMemoryCatalog, InMemoryOrderStore, OrderFilter, OrderStore, Product};

const STORE: StoreId = StoreId::new(1);
const OTHER_STORE: StoreId = StoreId::new(2);
const CUSTOMER: CustomerId = CustomerId::new(42);

struct Fixture {
    service: OrderService<InMemoryOrderStore, InMemoryCatalog>,
    store: InMemoryOrderStore,
    catalog: InMemoryCatalog,
    notifier: RecordingNotifier,
    mug: Product,
    tote: Product,
}

/// Helper to create a service over a small two-product catalog
async fn fixture() -> Fixture {
    let catalog = InMemoryCatalog::new();
    let mug = catalog
        .add_product(STORE, "Mug", Money::from_major(50), 10)
        .await;
    let tote = catalog
        .add_product(STORE, "Tote", Money::from_major(20), 5)
        .await;
    let store = InMemoryOrderStore::with_catalog(catalog.clone());
    let notifier = RecordingNotifier::new();
    let service = OrderService::new(
        store.clone(),
        catalog.clone(),
        Notifications::inline(Arc::new(notifier.clone())),
    );
    Fixture {
        service,
        store,
        catalog,
        notifier,
        mug,
        tote,
    }
}

fn checkout(lines: Vec<CheckoutLine>) -> CheckoutRequest {
    CheckoutRequest {
        customer_name: "Aina Rahman".to_string(),
        customer_email: "aina@example.com".to_string(),
        customer_phone: Some("+60123456789".to_string()),
        customer_address: "1 Jalan Ampang, Kuala Lumpur".to_string(),
        items: lines,
        payment_method: "stripe".to_string(),
        notes: Some("Gift wrap please".to_string()),
    }
}

fn two_items(f: &Fixture) -> Vec<CheckoutLine> {
    vec![
        CheckoutLine::new(f.mug.id, 1),
        CheckoutLine::new(f.tote.id, 2),
    ]
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn two_item_order_totals_ninety_ringgit() {
        let f = fixture().await;

        let order = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, Money::from_cents(9000));
        assert_eq!(order.total_amount.to_string(), "RM90.00");
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items_total(), order.total_amount);
        assert_eq!(order.items[1].unit_price, Money::from_major(20));
        assert_eq!(order.items[1].total_price, Money::from_major(40));
        assert!(order.order_number.starts_with("ORD-"));
        assert_eq!(order.payment_reference, None);
        assert_eq!(order.customer_id, None);
    }

    #[tokio::test]
    async fn checkout_does_not_touch_stock() {
        let f = fixture().await;

        f.service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        assert_eq!(f.catalog.stock_of(f.mug.id).await, Some(10));
        assert_eq!(f.catalog.stock_of(f.tote.id).await, Some(5));
    }

    #[tokio::test]
    async fn insufficient_stock_creates_nothing() {
        let f = fixture().await;

        let err = f
            .service
            .checkout(STORE, checkout(vec![CheckoutLine::new(f.tote.id, 6)]))
            .await
            .unwrap_err();

        match err {
            DomainError::Order(OrderError::InsufficientStock {
                product_name,
                available,
                requested,
                ..
            }) => {
                assert_eq!(product_name, "Tote");
                assert_eq!(available, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn inactive_product_is_unavailable() {
        let f = fixture().await;
        f.catalog.set_active(f.mug.id, false).await;

        let err = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::ProductUnavailable { product_id }) if product_id == f.mug.id
        ));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn cross_store_product_is_unavailable() {
        let f = fixture().await;

        let err = f
            .service
            .checkout(OTHER_STORE, checkout(two_items(&f)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::ProductUnavailable { .. })
        ));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_unavailable() {
        let f = fixture().await;

        let err = f
            .service
            .checkout(STORE, checkout(vec![CheckoutLine::new(ProductId::new(999), 1)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::ProductUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_payment_method_is_a_field_error() {
        let f = fixture().await;
        let mut request = checkout(two_items(&f));
        request.payment_method = "paypal".to_string();

        let err = f.service.checkout(STORE, request).await.unwrap_err();

        match err {
            DomainError::Order(OrderError::ValidationFailed { fields }) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "payment_method");
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_confirmation_email_keeps_the_order() {
        let f = fixture().await;
        f.notifier.set_fail_on_send(true);

        let order = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        assert_eq!(f.notifier.sent_for(order.id), vec![Notification::Confirmation]);
        assert!(f.store.find_by_id(order.id).await.unwrap().is_some());
    }
}

mod administration {
    use super::*;

    #[tokio::test]
    async fn completed_order_cannot_return_to_paid() {
        let f = fixture().await;
        let order = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        for status in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Completed] {
            f.service
                .update_status(STORE, order.id, status)
                .await
                .unwrap();
        }

        let err = f
            .service
            .update_status(STORE, order.id, OrderStatus::Paid)
            .await
            .unwrap_err();

        match err {
            DomainError::Order(OrderError::InvalidTransition(t)) => {
                assert_eq!(t.current, OrderStatus::Completed);
                assert_eq!(t.target, OrderStatus::Paid);
                assert!(t.allowed.is_empty());
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert!(OrderStatus::Completed.allowed_transitions().is_empty());
    }

    #[tokio::test]
    async fn every_status_change_notifies() {
        let f = fixture().await;
        let order = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        f.service
            .update_status(STORE, order.id, OrderStatus::Paid)
            .await
            .unwrap();
        f.service
            .update_status(STORE, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(
            f.notifier.sent_for(order.id),
            vec![
                Notification::Confirmation,
                Notification::StatusChanged {
                    previous: OrderStatus::Pending,
                    new: OrderStatus::Paid,
                },
                Notification::StatusChanged {
                    previous: OrderStatus::Paid,
                    new: OrderStatus::Cancelled,
                },
            ]
        );
    }

    #[tokio::test]
    async fn listing_filters_by_status_and_date() {
        let f = fixture().await;
        let first = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();
        let second = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();
        f.service
            .update_status(STORE, first.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        let all = f
            .service
            .list_store_orders(STORE, OrderFilter::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let pending = f
            .service
            .list_store_orders(STORE, OrderFilter::new().status(OrderStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        let future = f
            .service
            .list_store_orders(
                STORE,
                OrderFilter::new().date_from(Utc::now() + Duration::days(1)),
            )
            .await
            .unwrap();
        assert!(future.is_empty());

        let foreign = f
            .service
            .list_store_orders(OTHER_STORE, OrderFilter::new())
            .await
            .unwrap();
        assert!(foreign.is_empty());
    }

    #[tokio::test]
    async fn stats_count_only_confirmed_revenue() {
        let f = fixture().await;
        let paid = f
            .service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();
        f.service
            .checkout(STORE, checkout(vec![CheckoutLine::new(f.mug.id, 1)]))
            .await
            .unwrap();
        f.service
            .update_status(STORE, paid.id, OrderStatus::Paid)
            .await
            .unwrap();

        let stats = f.service.order_stats(STORE).await.unwrap();

        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.count(OrderStatus::Paid), 1);
        assert_eq!(stats.count(OrderStatus::Pending), 1);
        assert_eq!(stats.count(OrderStatus::Shipped), 0);
        assert_eq!(stats.total_revenue, Money::from_cents(9000));
    }
}

mod customer {
    use super::*;

    #[tokio::test]
    async fn customer_cancels_own_pending_order() {
        let f = fixture().await;
        let order = f
            .service
            .checkout_as_customer(CUSTOMER, STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        let cancelled = f
            .service
            .cancel_customer_order(CUSTOMER, order.id)
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(f.catalog.stock_of(f.mug.id).await, Some(10));
    }

    #[tokio::test]
    async fn customer_cannot_cancel_paid_order() {
        let f = fixture().await;
        let order = f
            .service
            .checkout_as_customer(CUSTOMER, STORE, checkout(two_items(&f)))
            .await
            .unwrap();
        f.service
            .update_status(STORE, order.id, OrderStatus::Paid)
            .await
            .unwrap();

        let err = f
            .service
            .cancel_customer_order(CUSTOMER, order.id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::CancellationNotAllowed {
                current: OrderStatus::Paid
            })
        ));
        let reloaded = f.service.get_receipt(order.id).await.unwrap();
        assert_eq!(reloaded.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn customer_cannot_cancel_someone_elses_order() {
        let f = fixture().await;
        let order = f
            .service
            .checkout_as_customer(CUSTOMER, STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        let err = f
            .service
            .cancel_customer_order(CustomerId::new(7), order.id)
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn customer_lists_only_own_orders() {
        let f = fixture().await;
        f.service
            .checkout_as_customer(CUSTOMER, STORE, checkout(two_items(&f)))
            .await
            .unwrap();
        f.service
            .checkout(STORE, checkout(two_items(&f)))
            .await
            .unwrap();

        let mine = f.service.list_customer_orders(CUSTOMER).await.unwrap();

        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].customer_id, Some(CUSTOMER));
    }

    #[tokio::test]
    async fn phone_is_optional_for_signed_in_checkout() {
        let f = fixture().await;
        let mut request = checkout(two_items(&f));
        request.customer_phone = None;

        let order = f
            .service
            .checkout_as_customer(CUSTOMER, STORE, request)
            .await
            .unwrap();

        assert_eq!(order.customer_phone, None);
    }
}
