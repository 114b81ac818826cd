use crate::domain::customer::{Customer, CustomerId, UserId};
use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{
    CustomerStore, LedgerStore, Reservation, ReservationPlan, check_order_write, check_settlement,
    plan_reservation,
};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Ledger {
    orders: HashMap<OrderId, Order>,
    transactions: HashMap<Uuid, Transaction>,
}

impl Ledger {
    fn transactions_for(&self, order: &OrderId) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .values()
            .filter(|tx| &tx.order_id == order)
            .cloned()
            .collect();
        txs.sort_by_key(|tx| tx.created_at);
        txs
    }
}

/// A thread-safe in-memory ledger of orders and transactions.
///
/// Orders and transactions sit behind one `RwLock`, so reserving, settling
/// and saving an order each happen under a single write guard.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    ledger: Arc<RwLock<Ledger>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn save_order(&self, order: Order) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        let transactions = ledger.transactions_for(&order.id);
        check_order_write(ledger.orders.get(&order.id), &order, &transactions)?;
        ledger.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn order(&self, id: &OrderId) -> Result<Option<Order>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.orders.get(id).cloned())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        let ledger = self.ledger.read().await;
        let mut orders: Vec<Order> = ledger.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(orders)
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.transactions.get(&id).cloned())
    }

    async fn transactions_for(&self, order: &OrderId) -> Result<Vec<Transaction>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.transactions_for(order))
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let ledger = self.ledger.read().await;
        let mut txs: Vec<Transaction> = ledger.transactions.values().cloned().collect();
        txs.sort_by_key(|tx| tx.created_at);
        Ok(txs)
    }

    async fn reserve(
        &self,
        candidate: Transaction,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Reservation> {
        let mut ledger = self.ledger.write().await;
        let existing = ledger.transactions_for(&candidate.order_id);
        let plan = plan_reservation(
            ledger.orders.get(&candidate.order_id),
            &existing,
            &candidate,
            now,
            stale_after,
        )?;

        match plan {
            ReservationPlan::Existing(tx) => Ok(Reservation::Existing(tx)),
            ReservationPlan::Insert { abandoned } => {
                for tx in &abandoned {
                    ledger.transactions.insert(tx.id, tx.clone());
                }
                ledger.transactions.insert(candidate.id, candidate.clone());
                Ok(Reservation::Reserved {
                    transaction: candidate,
                    abandoned,
                })
            }
        }
    }

    async fn settle(&self, tx: Transaction) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        check_settlement(ledger.transactions.get(&tx.id), &tx)?;

        if tx.status == TransactionStatus::Passed
            && let Some(order) = ledger.orders.get_mut(&tx.order_id)
        {
            order.archive();
        }
        ledger.transactions.insert(tx.id, tx);
        Ok(())
    }
}

/// A thread-safe in-memory store for customers.
#[derive(Default, Clone)]
pub struct InMemoryCustomerStore {
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
}

impl InMemoryCustomerStore {
    /// Creates a new, empty in-memory customer store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn store(&self, customer: Customer) -> Result<()> {
        let mut customers = self.customers.write().await;
        customers.insert(customer.id.clone(), customer);
        Ok(())
    }

    async fn get(&self, id: &CustomerId) -> Result<Option<Customer>> {
        let customers = self.customers.read().await;
        Ok(customers.get(id).cloned())
    }

    async fn for_user(&self, user: &UserId) -> Result<Vec<Customer>> {
        let customers = self.customers.read().await;
        let mut linked: Vec<Customer> = customers
            .values()
            .filter(|c| c.has_user(user))
            .cloned()
            .collect();
        linked.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(linked)
    }
}
