//! Domain entities, value objects and the ports the application layer talks through.

pub mod customer;
pub mod deductible;
pub mod fulfillment;
pub mod money;
pub mod order;
pub mod ports;
pub mod transaction;
