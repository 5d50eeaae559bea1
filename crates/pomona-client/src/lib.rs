//! Pomona Client - HTTP fetcher and job-board adapters
//!
//! This crate provides the outbound side of ingestion:
//!
//! - [`ReqwestFetcher`] - executes provider requests over a pooled HTTP client
//! - Provider adapters: [`adzuna`], [`jooble`], [`usajobs`], [`reed`],
//!   [`themuse`], [`theirstack`], [`rss`], [`greenhouse`] and [`lever`]
//! - [`AdapterFactoryEnum`] - builds the right adapter for a registry entry
//!
//! # Overview
//!
//! Adapters only build requests and normalize payloads. Fetching, pagination,
//! freshness filtering and persistence are driven by `pomona-core`.

pub mod adzuna;
pub mod factory;
pub mod greenhouse;
pub mod http;
pub mod jooble;
pub mod lever;
pub mod reed;
pub mod rss;
pub mod text;
pub mod theirstack;
pub mod themuse;
pub mod usajobs;

// Re-export main client types
pub use factory::{AdapterFactoryEnum, SourceAdapterEnum};
pub use http::ReqwestFetcher;
