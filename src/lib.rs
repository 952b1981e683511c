//! FinanceView: a small expense tracking backend.
//!
//! Expenses are recorded and listed through a GraphQL API ([`graph`]); the
//! save path lives in [`expense`] and the storage backends in the
//! `financeview-*` workspace crates.

pub mod config;
pub mod expense;
pub mod graph;
pub mod server;
pub mod storage;
