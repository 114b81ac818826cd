use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct ReceiptRow<'a> {
    order: &'a str,
    transaction: Uuid,
    status: TransactionStatus,
    amount: u64,
    currency: &'a str,
    remote_id: &'a str,
}

/// Writes one CSV row per transaction.
pub struct ReceiptWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReceiptWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes the header followed by `transactions`, then flushes.
    ///
    /// Amounts are in minor currency units.
    pub fn write_transactions<I>(&mut self, transactions: I) -> Result<()>
    where
        I: IntoIterator<Item = Transaction>,
    {
        let mut wrote_any = false;
        for tx in transactions {
            self.writer.serialize(ReceiptRow {
                order: &tx.order_id.0,
                transaction: tx.id,
                status: tx.status,
                amount: tx.amount.minor_units(),
                currency: tx.currency.code(),
                remote_id: tx.remote_id.as_deref().unwrap_or(""),
            })?;
            wrote_any = true;
        }
        if !wrote_any {
            self.writer.write_record([
                "order",
                "transaction",
                "status",
                "amount",
                "currency",
                "remote_id",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Currency, Money};
    use crate::domain::order::OrderId;

    #[test]
    fn test_writes_header_and_rows() {
        let mut passed = Transaction::open(OrderId::new("o1"), 1, Money(1925), Currency::default());
        passed.pass("remote-1").unwrap();
        let opened = Transaction::open(OrderId::new("o2"), 1, Money(500), Currency::default());

        let mut out = Vec::new();
        ReceiptWriter::new(&mut out)
            .write_transactions(vec![passed.clone(), opened.clone()])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "order,transaction,status,amount,currency,remote_id");
        assert_eq!(lines[1], format!("o1,{},passed,1925,USD,remote-1", passed.id));
        assert_eq!(lines[2], format!("o2,{},opened,500,USD,", opened.id));
    }

    #[test]
    fn test_empty_output_still_has_header() {
        let mut out = Vec::new();
        ReceiptWriter::new(&mut out)
            .write_transactions(Vec::new())
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "order,transaction,status,amount,currency,remote_id\n"
        );
    }
}
