use crate::domain::customer::{Customer, CustomerId, UserId};
use crate::domain::order::{Order, OrderId};
use crate::domain::ports::{
    CustomerStore, LedgerStore, Reservation, ReservationPlan, check_order_write, check_settlement,
    plan_reservation,
};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{ChargeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for charge transactions, keyed by order then transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family mapping a transaction id to its key in [`CF_TRANSACTIONS`].
pub const CF_TRANSACTION_INDEX: &str = "transaction_index";
/// Column Family for customers.
pub const CF_CUSTOMERS: &str = "customers";

/// A persistent store implementation using RocksDB.
///
/// Orders, transactions and customers live in separate Column Families.
/// Transaction keys start with their order's key so one order's attempts are
/// a contiguous range; point lookups by id go through the index family.
/// Multi-record writes go through a `WriteBatch`, and read-check-write
/// sequences (reserve, settle, save order, store customer) are serialized by
/// `write_lock`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path,
    /// creating any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_ORDERS, CF_TRANSACTIONS, CF_TRANSACTION_INDEX, CF_CUSTOMERS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ChargeError::InternalError(Box::new(std::io::Error::other(format!(
                "Column family {} not found",
                name
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn put_transaction(&self, batch: &mut WriteBatch, tx: &Transaction) -> Result<()> {
        let key = transaction_key(&tx.order_id, tx.id);
        self.put_json(batch, CF_TRANSACTIONS, &key, tx)?;
        let index = self.cf(CF_TRANSACTION_INDEX)?;
        batch.put_cf(index, tx.id.as_bytes(), &key);
        Ok(())
    }

    fn load_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        let index = self.cf(CF_TRANSACTION_INDEX)?;
        match self.db.get_pinned_cf(index, id.as_bytes())? {
            Some(key) => self.get_json(CF_TRANSACTIONS, &key),
            None => Ok(None),
        }
    }

    fn load_transactions_for(&self, order: &OrderId) -> Result<Vec<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let prefix = order_prefix(order);
        let mut txs = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            txs.push(serde_json::from_slice::<Transaction>(&value)?);
        }
        txs.sort_by_key(|tx| tx.created_at);
        Ok(txs)
    }
}

/// Length-prefixed so that no order's prefix is a prefix of another's.
fn order_prefix(order: &OrderId) -> Vec<u8> {
    let id = order.0.as_bytes();
    let mut prefix = Vec::with_capacity(4 + id.len());
    prefix.extend_from_slice(&(id.len() as u32).to_be_bytes());
    prefix.extend_from_slice(id);
    prefix
}

fn transaction_key(order: &OrderId, id: Uuid) -> Vec<u8> {
    let mut key = order_prefix(order);
    key.extend_from_slice(id.as_bytes());
    key
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn save_order(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored: Option<Order> = self.get_json(CF_ORDERS, order.id.0.as_bytes())?;
        let transactions = self.load_transactions_for(&order.id)?;
        check_order_write(stored.as_ref(), &order, &transactions)?;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, order.id.0.as_bytes(), &order)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn order(&self, id: &OrderId) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, id.0.as_bytes())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        // Keys iterate in byte order, which is id order
        self.scan(CF_ORDERS)
    }

    async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.load_transaction(id)
    }

    async fn transactions_for(&self, order: &OrderId) -> Result<Vec<Transaction>> {
        self.load_transactions_for(order)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self.scan(CF_TRANSACTIONS)?;
        txs.sort_by_key(|tx| tx.created_at);
        Ok(txs)
    }

    async fn reserve(
        &self,
        candidate: Transaction,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Reservation> {
        let _guard = self.write_lock.lock().await;
        let order: Option<Order> = self.get_json(CF_ORDERS, candidate.order_id.0.as_bytes())?;
        let existing = self.load_transactions_for(&candidate.order_id)?;

        match plan_reservation(order.as_ref(), &existing, &candidate, now, stale_after)? {
            ReservationPlan::Existing(tx) => Ok(Reservation::Existing(tx)),
            ReservationPlan::Insert { abandoned } => {
                let mut batch = WriteBatch::default();
                for tx in &abandoned {
                    self.put_transaction(&mut batch, tx)?;
                }
                self.put_transaction(&mut batch, &candidate)?;
                self.db.write(batch)?;
                Ok(Reservation::Reserved {
                    transaction: candidate,
                    abandoned,
                })
            }
        }
    }

    async fn settle(&self, tx: Transaction) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored = self.load_transaction(tx.id)?;
        check_settlement(stored.as_ref(), &tx)?;

        let mut batch = WriteBatch::default();
        self.put_transaction(&mut batch, &tx)?;
        if tx.status == TransactionStatus::Passed
            && let Some(mut order) = self.get_json::<Order>(CF_ORDERS, tx.order_id.0.as_bytes())?
        {
            order.archive();
            self.put_json(&mut batch, CF_ORDERS, order.id.0.as_bytes(), &order)?;
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for RocksDBStore {
    async fn store(&self, customer: Customer) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_CUSTOMERS, customer.id.0.as_bytes(), &customer)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: &CustomerId) -> Result<Option<Customer>> {
        self.get_json(CF_CUSTOMERS, id.0.as_bytes())
    }

    async fn for_user(&self, user: &UserId) -> Result<Vec<Customer>> {
        Ok(self
            .scan::<Customer>(CF_CUSTOMERS)?
            .into_iter()
            .filter(|c| c.has_user(user))
            .collect())
    }
}
