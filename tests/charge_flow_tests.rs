mod common;

use chargeflow::application::recorder::Outcome;
use chargeflow::domain::customer::{Customer, CustomerId, UserId};
use chargeflow::domain::deductible::{AdjustmentKind, Discount};
use chargeflow::domain::fulfillment::{Fulfillment, FulfillmentState, FulfillmentType, Recipient};
use chargeflow::domain::money::{Currency, Money};
use chargeflow::domain::order::{OrderId, ProductId};
use chargeflow::domain::ports::RemoteStatus;
use chargeflow::domain::transaction::TransactionStatus;
use chargeflow::error::ChargeError;
use chargeflow::interfaces::webhook::{AmountMoney, PaymentStatus, RemotePayment, WebhookEvent};
use common::{ScriptedGateway, Step, engine_with, order_of_2200};
use std::collections::BTreeSet;
use std::sync::Arc;

const TOKEN: &str = "cnon:card-nonce-ok";

#[tokio::test]
async fn test_empty_order_makes_no_gateway_call() {
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine_with(gateway.clone());
    let id = OrderId::new("empty");
    engine.create_order(id.clone(), None).await.unwrap();

    let result = engine.charge(&id, TOKEN).await;
    assert!(matches!(result, Err(ChargeError::EmptyOrder(_))));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_empty_token_is_rejected_before_reservation() {
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine_with(gateway.clone());
    let id = order_of_2200(&engine, "o1").await;

    let result = engine.charge(&id, "").await;
    assert!(matches!(result, Err(ChargeError::ValidationError(_))));
    assert!(engine.transactions(&id, None).await.unwrap().is_empty());
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_fully_discounted_order_is_not_charged() {
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine_with(gateway.clone());
    let id = order_of_2200(&engine, "o1").await;
    engine
        .apply_discount(&id, Discount::new("free", AdjustmentKind::Fixed(Money(5000))))
        .await
        .unwrap();

    let result = engine.charge(&id, TOKEN).await;
    assert!(matches!(result, Err(ChargeError::ValidationError(_))));
    assert_eq!(gateway.calls(), 0);
}

#[tokio::test]
async fn test_amount_mismatch_fails_transaction() {
    let gateway = Arc::new(ScriptedGateway::confirming(Money(2000)));
    let engine = engine_with(gateway);
    let id = order_of_2200(&engine, "o1").await;

    let result = engine.charge(&id, TOKEN).await;
    match result {
        Err(ChargeError::AmountMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, Money(2200));
            assert_eq!(actual, Money(2000));
        }
        other => panic!("expected AmountMismatch, got {:?}", other),
    }

    let failed = engine.failed_transactions(&id).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(engine.passed_transactions(&id).await.unwrap().is_empty());
    assert!(!engine.order(&id).await.unwrap().is_archived());
}

#[tokio::test]
async fn test_confirmation_in_other_currency_fails_transaction() {
    let gateway = Arc::new(ScriptedGateway::confirming_in("JPY".parse().unwrap()));
    let engine = engine_with(gateway);
    let id = order_of_2200(&engine, "o1").await;

    match engine.charge(&id, TOKEN).await {
        Err(ChargeError::AmountMismatch {
            expected,
            expected_currency,
            actual,
            actual_currency,
            ..
        }) => {
            assert_eq!(expected, actual);
            assert_eq!(expected_currency, Currency::default());
            assert_eq!(actual_currency.code(), "JPY");
        }
        other => panic!("expected AmountMismatch, got {:?}", other),
    }
    assert_eq!(engine.failed_transactions(&id).await.unwrap().len(), 1);
    assert!(!engine.order(&id).await.unwrap().is_archived());
}

#[tokio::test]
async fn test_webhook_in_other_currency_is_not_accepted() {
    let gateway = Arc::new(ScriptedGateway::new(vec![Step::Answer(RemoteStatus::Pending)]));
    let engine = engine_with(gateway);
    let id = order_of_2200(&engine, "o1").await;
    let tx = engine.charge(&id, TOKEN).await.unwrap();

    let event = WebhookEvent::payment_updated(RemotePayment {
        id: "remote-77".to_string(),
        status: PaymentStatus::Completed,
        amount_money: AmountMoney {
            amount: Money(2200),
            currency: "JPY".parse().unwrap(),
        },
        reference_id: tx.idempotency_key(),
    });

    assert!(matches!(
        engine.handle_webhook(event).await,
        Err(ChargeError::AmountMismatch { .. })
    ));
    assert!(engine.passed_transactions(&id).await.unwrap().is_empty());
    assert!(!engine.order(&id).await.unwrap().is_archived());
}

#[tokio::test]
async fn test_product_removal_drops_its_discounts() {
    let engine = engine_with(Arc::new(ScriptedGateway::default()));
    let id = order_of_2200(&engine, "o1").await;
    engine
        .add_product(&id, chargeflow::domain::order::Product::new("p2", Money(500)), 1)
        .await
        .unwrap();
    engine
        .apply_discount(
            &id,
            Discount::new("p2-off", AdjustmentKind::Fixed(Money(100))).on_product(ProductId::new("p2")),
        )
        .await
        .unwrap();
    assert_eq!(engine.quote(&id).await.unwrap().total, Money(2640));

    assert!(engine.remove_product(&id, &ProductId::new("p2")).await.unwrap());
    assert!(!engine.has_product(&id, &ProductId::new("p2")).await.unwrap());
    assert_eq!(engine.quote(&id).await.unwrap().total, Money(2200));
    assert!(!engine.remove_deductible(&id, "p2-off").await.unwrap());
}

#[tokio::test]
async fn test_webhook_completes_pending_charge() {
    let gateway = Arc::new(ScriptedGateway::new(vec![Step::Answer(RemoteStatus::Pending)]));
    let engine = engine_with(gateway);
    let id = order_of_2200(&engine, "o1").await;

    let tx = engine.charge(&id, TOKEN).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Opened);

    let event = WebhookEvent::payment_updated(RemotePayment {
        id: "remote-77".to_string(),
        status: PaymentStatus::Completed,
        amount_money: AmountMoney {
            amount: Money(2200),
            currency: Currency::default(),
        },
        reference_id: tx.idempotency_key(),
    });

    let settled = engine.handle_webhook(event.clone()).await.unwrap().unwrap();
    assert_eq!(settled.status, TransactionStatus::Passed);
    assert_eq!(settled.remote_id.as_deref(), Some("remote-77"));
    assert!(engine.order(&id).await.unwrap().is_archived());

    // Redelivery is a no-op
    let again = engine.handle_webhook(event).await.unwrap().unwrap();
    assert_eq!(again, settled);
}

#[tokio::test]
async fn test_finalize_rejects_conflicting_outcome() {
    let engine = engine_with(Arc::new(ScriptedGateway::default()));
    let id = order_of_2200(&engine, "o1").await;
    let tx = engine.charge(&id, TOKEN).await.unwrap();

    let result = engine
        .finalize(
            tx.id,
            Outcome::Failed {
                reason: "late decline".to_string(),
                remote_id: None,
            },
        )
        .await;
    assert!(matches!(result, Err(ChargeError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_fulfillments_progress_after_charge() {
    let engine = engine_with(Arc::new(ScriptedGateway::default()));
    let id = order_of_2200(&engine, "o1").await;
    engine
        .add_fulfillment(
            &id,
            Fulfillment::new(
                "f1",
                FulfillmentType::Pickup,
                Recipient {
                    display_name: "Ada".to_string(),
                    ..Recipient::default()
                },
            ),
        )
        .await
        .unwrap();
    engine.charge(&id, TOKEN).await.unwrap();

    engine
        .advance_fulfillment(&id, "f1", FulfillmentState::Reserved)
        .await
        .unwrap();
    let result = engine
        .advance_fulfillment(&id, "f1", FulfillmentState::Completed)
        .await;
    assert!(matches!(result, Err(ChargeError::ValidationError(_))));

    let order = engine.order(&id).await.unwrap();
    assert_eq!(order.fulfillments[0].state, FulfillmentState::Reserved);
}

#[tokio::test]
async fn test_customer_link_survives_charge() {
    let engine = engine_with(Arc::new(ScriptedGateway::default()));
    let id = order_of_2200(&engine, "o1").await;
    let customer = CustomerId::new("c1");

    let mut record = Customer::new(customer.clone());
    record.email = Some("ada@example.com".to_string());
    engine.upsert_customer(record).await.unwrap();
    engine.link_user(&customer, UserId::new("u1")).await.unwrap();
    engine.charge(&id, TOKEN).await.unwrap();

    // Attaching a customer does not change the amount, so it works on archived orders
    engine.attach_customer(&id, &customer).await.unwrap();
    engine.link_remote_order(&id, "remote-order-1").await.unwrap();

    assert!(engine.has_customer(&id, &customer).await.unwrap());
    let orders = engine.orders_for_customer(&customer).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].remote_order_id.as_deref(), Some("remote-order-1"));

    let mut update = Customer::new(customer.clone());
    update.given_name = Some("Ada".to_string());
    let merged = engine.upsert_customer(update).await.unwrap();
    assert_eq!(merged.email.as_deref(), Some("ada@example.com"));
    assert!(merged.has_user(&UserId::new("u1")));
}

#[tokio::test]
async fn test_customers_and_orders_are_many_to_many() {
    let engine = engine_with(Arc::new(ScriptedGateway::default()));
    let first = order_of_2200(&engine, "o1").await;
    let second = order_of_2200(&engine, "o2").await;
    let ada = CustomerId::new("ada");
    let bob = CustomerId::new("bob");
    engine.upsert_customer(Customer::new(ada.clone())).await.unwrap();
    engine.upsert_customer(Customer::new(bob.clone())).await.unwrap();

    assert!(engine.attach_customer(&first, &ada).await.unwrap());
    assert!(engine.attach_customer(&first, &bob).await.unwrap());
    assert!(engine.attach_customer(&second, &ada).await.unwrap());
    assert!(!engine.attach_customer(&second, &ada).await.unwrap());

    assert!(engine.has_customer(&first, &ada).await.unwrap());
    assert!(engine.has_customer(&first, &bob).await.unwrap());
    let ada_orders: BTreeSet<OrderId> = engine
        .orders_for_customer(&ada)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ada_orders, BTreeSet::from([first.clone(), second.clone()]));

    assert!(engine.detach_customer(&first, &ada).await.unwrap());
    assert!(!engine.has_customer(&first, &ada).await.unwrap());
    assert!(engine.has_customer(&first, &bob).await.unwrap());
    assert_eq!(engine.orders_for_customer(&ada).await.unwrap().len(), 1);
    assert!(!engine.detach_customer(&first, &ada).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_user_links_are_all_kept() {
    let engine = Arc::new(engine_with(Arc::new(ScriptedGateway::default())));
    let customer = CustomerId::new("c1");
    engine.upsert_customer(Customer::new(customer.clone())).await.unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let engine = engine.clone();
        let customer = customer.clone();
        handles.push(tokio::spawn(async move {
            engine.link_user(&customer, UserId::new(&format!("u{}", n))).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    for n in 0..8 {
        let found = engine
            .customers_for_user(&UserId::new(&format!("u{}", n)))
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "user u{} lost its link", n);
    }
}
