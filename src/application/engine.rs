use super::aggregator::{OrderTotals, compute_total};
use super::gateway::GatewayAdapter;
use super::guard::IdempotencyGuard;
use super::recorder::{Outcome, TransactionRecorder};
use crate::config::ChargeConfig;
use crate::domain::customer::{Customer, CustomerId, UserId};
use crate::domain::deductible::{Discount, Tax};
use crate::domain::fulfillment::{Fulfillment, FulfillmentState};
use crate::domain::money::Currency;
use crate::domain::order::{Order, OrderId, Product, ProductId};
use crate::domain::ports::{
    RemoteCharge, RemoteStatus, SharedCustomerStore, SharedLedgerStore, SharedPaymentGateway,
};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{ChargeError, GatewayError, Rejection, Result};
use crate::interfaces::webhook::WebhookEvent;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// The main entry point for charging orders.
///
/// `ChargeEngine` owns the stores and the provider adapter. Order and
/// customer edits are load-modify-save sequences serialized by `edit_lock`;
/// charging itself relies on the atomic reservation in the ledger and holds
/// no lock across the provider call.
pub struct ChargeEngine {
    ledger: SharedLedgerStore,
    customers: SharedCustomerStore,
    guard: IdempotencyGuard,
    gateway: GatewayAdapter,
    recorder: TransactionRecorder,
    stale_after: chrono::Duration,
    edit_lock: Mutex<()>,
}

impl ChargeEngine {
    /// Creates a new `ChargeEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `ledger` - The store for orders and their transactions.
    /// * `customers` - The store for customers.
    /// * `gateway` - The payment provider client.
    /// * `config` - Merchant context, staleness window and retry settings.
    pub fn new(
        ledger: SharedLedgerStore,
        customers: SharedCustomerStore,
        gateway: SharedPaymentGateway,
        config: &ChargeConfig,
    ) -> Self {
        Self {
            guard: IdempotencyGuard::new(ledger.clone(), config.staleness_window()),
            gateway: GatewayAdapter::new(gateway, config.merchant.clone(), &config.gateway),
            recorder: TransactionRecorder::new(ledger.clone()),
            stale_after: config.staleness_window(),
            ledger,
            customers,
            edit_lock: Mutex::new(()),
        }
    }

    pub async fn create_order(&self, id: OrderId, currency: Option<Currency>) -> Result<Order> {
        let _guard = self.edit_lock.lock().await;
        if self.ledger.order(&id).await?.is_some() {
            return Err(ChargeError::ValidationError(format!(
                "Order {} already exists",
                id
            )));
        }
        let mut order = Order::new(id);
        order.currency = currency;
        self.ledger.save_order(order.clone()).await?;
        tracing::debug!(order = %order.id, "Created order");
        Ok(order)
    }

    pub async fn order(&self, id: &OrderId) -> Result<Order> {
        self.ledger
            .order(id)
            .await?
            .ok_or_else(|| ChargeError::OrderNotFound(id.clone()))
    }

    async fn edit_order<T>(
        &self,
        id: &OrderId,
        edit: impl FnOnce(&mut Order) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.edit_lock.lock().await;
        let mut order = self.order(id).await?;
        let value = edit(&mut order)?;
        self.ledger.save_order(order).await?;
        Ok(value)
    }

    pub async fn add_product(&self, order: &OrderId, product: Product, quantity: u32) -> Result<()> {
        self.edit_order(order, |o| o.add_product(product, quantity))
            .await
    }

    /// Returns `false` if the product was not on the order.
    pub async fn remove_product(&self, order: &OrderId, product: &ProductId) -> Result<bool> {
        self.edit_order(order, |o| o.remove_product(product)).await
    }

    pub async fn apply_tax(&self, order: &OrderId, tax: Tax) -> Result<()> {
        self.edit_order(order, |o| o.apply(tax.into())).await
    }

    pub async fn apply_discount(&self, order: &OrderId, discount: Discount) -> Result<()> {
        self.edit_order(order, |o| o.apply(discount.into())).await
    }

    pub async fn remove_deductible(&self, order: &OrderId, id: &str) -> Result<bool> {
        self.edit_order(order, |o| o.remove_deductible(id)).await
    }

    pub async fn link_remote_order(&self, order: &OrderId, remote_order_id: &str) -> Result<()> {
        self.edit_order(order, |o| {
            o.link_remote_order(remote_order_id);
            Ok(())
        })
        .await
    }

    pub async fn add_fulfillment(&self, order: &OrderId, fulfillment: Fulfillment) -> Result<()> {
        self.edit_order(order, |o| o.add_fulfillment(fulfillment))
            .await
    }

    pub async fn advance_fulfillment(
        &self,
        order: &OrderId,
        fulfillment: &str,
        next: FulfillmentState,
    ) -> Result<()> {
        self.edit_order(order, |o| o.advance_fulfillment(fulfillment, next))
            .await
    }

    /// Attaches an existing customer to the order. An order may carry
    /// several customers and a customer may sit on several orders.
    ///
    /// Returns `false` if the customer was already attached.
    pub async fn attach_customer(&self, order: &OrderId, customer: &CustomerId) -> Result<bool> {
        if self.customers.get(customer).await?.is_none() {
            return Err(ChargeError::CustomerNotFound(customer.to_string()));
        }
        self.edit_order(order, |o| Ok(o.attach_customer(customer.clone())))
            .await
    }

    /// Returns `false` if the customer was not attached to the order.
    pub async fn detach_customer(&self, order: &OrderId, customer: &CustomerId) -> Result<bool> {
        self.edit_order(order, |o| Ok(o.detach_customer(customer)))
            .await
    }

    /// Computes what `charge` would ask for, without reserving anything.
    pub async fn quote(&self, order: &OrderId) -> Result<OrderTotals> {
        let order = self.order(order).await?;
        compute_total(&order, self.gateway.context())
    }

    /// Charges the order's current total to `source_token`.
    ///
    /// Returns the transaction in its final state, or still `opened` if the
    /// provider reported the payment as pending. Provider rejections finalize
    /// the transaction as failed before the error is returned. Any other
    /// error after the reservation leaves it opened for [`Self::reconcile`].
    pub async fn charge(&self, order_id: &OrderId, source_token: &str) -> Result<Transaction> {
        if source_token.trim().is_empty() {
            return Err(ChargeError::ValidationError(
                "Payment source token must not be empty".to_string(),
            ));
        }

        let order = self.order(order_id).await?;
        if order.line_items.is_empty() {
            return Err(ChargeError::EmptyOrder(order.id));
        }
        let totals = compute_total(&order, self.gateway.context())?;
        if totals.total.is_zero() {
            return Err(ChargeError::ValidationError(format!(
                "Order {} totals zero, nothing to charge",
                order.id
            )));
        }

        let tx = self.guard.reserve(&order, &totals).await?;

        let result = self
            .gateway
            .charge(
                tx.amount,
                source_token,
                &tx.currency,
                &tx.idempotency_key(),
                order.remote_order_id.as_deref(),
            )
            .await;

        match result {
            Ok(remote) => match outcome_of(remote) {
                Some(Outcome::Failed { reason, remote_id }) => {
                    self.recorder
                        .finalize(
                            tx.id,
                            Outcome::Failed {
                                reason: reason.clone(),
                                remote_id,
                            },
                        )
                        .await?;
                    Err(GatewayError::Rejected(Rejection::Declined(reason)).into())
                }
                Some(outcome) => self.recorder.finalize(tx.id, outcome).await,
                None => {
                    tracing::info!(transaction = %tx.id, order = %tx.order_id, "Payment pending at provider");
                    Ok(tx)
                }
            },
            Err(ChargeError::Gateway(GatewayError::Rejected(rejection))) => {
                self.recorder
                    .finalize(
                        tx.id,
                        Outcome::Failed {
                            reason: rejection.to_string(),
                            remote_id: None,
                        },
                    )
                    .await?;
                Err(GatewayError::Rejected(rejection).into())
            }
            Err(err) => {
                tracing::warn!(
                    transaction = %tx.id,
                    order = %tx.order_id,
                    error = %err,
                    "Charge left opened for reconciliation"
                );
                Err(err)
            }
        }
    }

    /// Asks the provider what became of an opened transaction and records it.
    ///
    /// A charge the provider has never seen is failed once the transaction is
    /// older than the staleness window; before that the call may still be in
    /// flight and the transaction stays opened. A pending one also stays
    /// opened. Transactions that are already final are returned unchanged.
    pub async fn reconcile(&self, transaction_id: Uuid) -> Result<Transaction> {
        let tx = self
            .ledger
            .transaction(transaction_id)
            .await?
            .ok_or(ChargeError::TransactionNotFound(transaction_id))?;
        if !tx.is_opened() {
            return Ok(tx);
        }

        let outcome = match self.gateway.lookup(&tx.idempotency_key()).await? {
            None if tx.is_stale(Utc::now(), self.stale_after) => Some(Outcome::Failed {
                reason: "charge never reached provider".to_string(),
                remote_id: None,
            }),
            None => {
                tracing::info!(
                    transaction = %tx.id,
                    opened_at = %tx.created_at,
                    "Provider has no record yet, leaving transaction opened"
                );
                return Ok(tx);
            }
            Some(remote) => outcome_of(remote),
        };

        match outcome {
            Some(outcome) => {
                tracing::info!(transaction = %tx.id, order = %tx.order_id, "Reconciling transaction");
                self.recorder.finalize(tx.id, outcome).await
            }
            None => {
                tracing::info!(transaction = %tx.id, "Provider still reports the payment as pending");
                Ok(tx)
            }
        }
    }

    /// Reconciles every opened transaction, continuing past individual failures.
    pub async fn reconcile_opened(&self) -> Result<Vec<Transaction>> {
        let mut reconciled = Vec::new();
        for tx in self.ledger.all_transactions().await? {
            if !tx.is_opened() {
                continue;
            }
            match self.reconcile(tx.id).await {
                Ok(tx) => reconciled.push(tx),
                Err(err) => {
                    tracing::warn!(transaction = %tx.id, error = %err, "Reconciliation failed")
                }
            }
        }
        Ok(reconciled)
    }

    pub async fn finalize(&self, transaction_id: Uuid, outcome: Outcome) -> Result<Transaction> {
        self.recorder.finalize(transaction_id, outcome).await
    }

    /// Applies a provider notification. Events that carry no final outcome are ignored.
    pub async fn handle_webhook(&self, event: WebhookEvent) -> Result<Option<Transaction>> {
        match event.into_outcome()? {
            Some((transaction_id, outcome)) => {
                tracing::debug!(transaction = %transaction_id, "Handling provider webhook");
                self.recorder.finalize(transaction_id, outcome).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Transactions of one order, oldest first, optionally filtered by status.
    pub async fn transactions(
        &self,
        order: &OrderId,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<Transaction>> {
        let txs = self.ledger.transactions_for(order).await?;
        Ok(match status {
            Some(status) => txs.into_iter().filter(|tx| tx.status == status).collect(),
            None => txs,
        })
    }

    pub async fn passed_transactions(&self, order: &OrderId) -> Result<Vec<Transaction>> {
        self.transactions(order, Some(TransactionStatus::Passed))
            .await
    }

    pub async fn opened_transactions(&self, order: &OrderId) -> Result<Vec<Transaction>> {
        self.transactions(order, Some(TransactionStatus::Opened))
            .await
    }

    pub async fn failed_transactions(&self, order: &OrderId) -> Result<Vec<Transaction>> {
        self.transactions(order, Some(TransactionStatus::Failed))
            .await
    }

    pub async fn has_customer(&self, order: &OrderId, customer: &CustomerId) -> Result<bool> {
        Ok(self.order(order).await?.has_customer(customer))
    }

    pub async fn has_product(&self, order: &OrderId, product: &ProductId) -> Result<bool> {
        Ok(self.order(order).await?.has_product(product))
    }

    pub async fn orders_for_customer(&self, customer: &CustomerId) -> Result<Vec<Order>> {
        Ok(self
            .ledger
            .orders()
            .await?
            .into_iter()
            .filter(|o| o.has_customer(customer))
            .collect())
    }

    pub async fn customers_for_user(&self, user: &UserId) -> Result<Vec<Customer>> {
        self.customers.for_user(user).await
    }

    /// Stores `customer`, merging contact fields into an existing record.
    pub async fn upsert_customer(&self, customer: Customer) -> Result<Customer> {
        let _guard = self.edit_lock.lock().await;
        let merged = match self.customers.get(&customer.id).await? {
            Some(mut existing) => {
                existing.merge(customer);
                existing
            }
            None => customer,
        };
        self.customers.store(merged.clone()).await?;
        Ok(merged)
    }

    pub async fn link_user(&self, customer: &CustomerId, user: UserId) -> Result<bool> {
        let _guard = self.edit_lock.lock().await;
        let mut stored = self.customer(customer).await?;
        let linked = stored.link_user(user);
        self.customers.store(stored).await?;
        Ok(linked)
    }

    pub async fn unlink_user(&self, customer: &CustomerId, user: &UserId) -> Result<bool> {
        let _guard = self.edit_lock.lock().await;
        let mut stored = self.customer(customer).await?;
        let unlinked = stored.unlink_user(user);
        self.customers.store(stored).await?;
        Ok(unlinked)
    }

    async fn customer(&self, id: &CustomerId) -> Result<Customer> {
        self.customers
            .get(id)
            .await?
            .ok_or_else(|| ChargeError::CustomerNotFound(id.to_string()))
    }

    /// Consumes the engine and returns every transaction, oldest first.
    pub async fn into_results(self) -> Result<Vec<Transaction>> {
        self.ledger.all_transactions().await
    }
}

/// Maps a provider answer to a final outcome. `None` while the payment is pending.
fn outcome_of(remote: RemoteCharge) -> Option<Outcome> {
    match remote.status {
        RemoteStatus::Completed => Some(Outcome::Passed {
            remote_id: remote.remote_id,
            amount: remote.amount,
            currency: remote.currency,
        }),
        RemoteStatus::Failed(reason) => Some(Outcome::Failed {
            reason,
            remote_id: Some(remote.remote_id),
        }),
        RemoteStatus::Pending => None,
    }
}
