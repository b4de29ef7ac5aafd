//! `PostgreSQL` ledger for the Gearbook scheduler.
//!
//! This crate provides [`PostgresLedger`], a production implementation of the
//! `LedgerStore` trait from `gearbook-core`. It uses sqlx and supports:
//!
//! - Serializable commits with row locks on every touched unit
//! - An exclusion constraint that rejects overlapping active reservations
//! - Connection pooling
//! - Embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use gearbook_postgres::{PoolSettings, PostgresLedger};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = PostgresLedger::connect("postgres://localhost/gearbook", PoolSettings::default()).await?;
//!     ledger.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod ledger;
mod rows;

pub use ledger::{PoolSettings, PostgresLedger};
