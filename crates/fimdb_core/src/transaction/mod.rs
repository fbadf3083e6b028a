//! Table-scoped transactions.
//!
//! A transaction spans one scan of one table. It is opened through the
//! [`TransactionManager`], fed observed entities, asked for the rows that
//! vanished, and closed. Unlike a database transaction it never rolls back:
//! each upsert is applied as soon as it is submitted.

mod manager;
mod state;

pub use manager::TransactionManager;
pub use state::{ChangeCallback, Transaction, TransactionState, TxnStats};
