//! Atlas answers questions over a fixed family of flat operational datasets
//! (purchase orders, sales orders, on-hand inventory, license plates and
//! serials) by compiling a classified request into a short relational plan and
//! running that plan against lazily loaded CSV sources.
//!
//! The crate is organised in three layers:
//!
//! * [`storage`] loads CSV files into immutable [`storage::Relation`]s, once
//!   per [`storage::Source`], behind a shared [`storage::AdapterRegistry`].
//! * [`query`] owns column canonicalization, predicate evaluation, the
//!   [`query::PlanBuilder`] and the [`query::PlanExecutor`].
//! * [`service`] glues both together for callers such as the `atlas` CLI.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod service;
pub mod storage;

pub use error::{AtlasError, Result};
