use chargeflow::domain::customer::{Customer, CustomerId, UserId};
use chargeflow::domain::money::{Currency, Money};
use chargeflow::domain::order::{Order, OrderId, Product};
use chargeflow::domain::ports::{
    ChargeRequest, RemoteStatus, SharedCustomerStore, SharedLedgerStore, SharedPaymentGateway,
};
use chargeflow::infrastructure::in_memory::{InMemoryCustomerStore, InMemoryLedgerStore};
use chargeflow::infrastructure::sandbox::{NONCE_OK, SandboxGateway};

#[tokio::test]
async fn test_ports_as_trait_objects() {
    let ledger: SharedLedgerStore = std::sync::Arc::new(InMemoryLedgerStore::new());
    let customers: SharedCustomerStore = std::sync::Arc::new(InMemoryCustomerStore::new());
    let gateway: SharedPaymentGateway = std::sync::Arc::new(SandboxGateway::new());

    let mut order = Order::new(OrderId::new("o1"));
    order
        .add_product(Product::new("p1", Money(100)), 1)
        .unwrap();

    let mut customer = Customer::new(CustomerId::new("c1"));
    customer.link_user(UserId::new("u1"));

    // Verify Send + Sync by spawning tasks
    let ledger_handle = tokio::spawn(async move {
        ledger.save_order(order).await.unwrap();
        ledger.order(&OrderId::new("o1")).await.unwrap().unwrap()
    });

    let customer_handle = tokio::spawn(async move {
        customers.store(customer).await.unwrap();
        customers.for_user(&UserId::new("u1")).await.unwrap()
    });

    let gateway_handle = tokio::spawn(async move {
        let request = ChargeRequest {
            amount: Money(100),
            currency: Currency::default(),
            source_token: NONCE_OK.to_string(),
            idempotency_key: "key-1".to_string(),
            location_id: "main".to_string(),
            remote_order_id: None,
        };
        gateway.charge(&request).await.unwrap()
    });

    let retrieved_order = ledger_handle.await.unwrap();
    assert_eq!(retrieved_order.id, OrderId::new("o1"));

    let linked = customer_handle.await.unwrap();
    assert_eq!(linked.len(), 1);

    let charge = gateway_handle.await.unwrap();
    assert_eq!(charge.status, RemoteStatus::Completed);
}
