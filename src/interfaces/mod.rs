//! Inbound and outbound adapters: command scripts, receipts and provider webhooks.

pub mod csv;
pub mod jsonl;
pub mod webhook;
