//! apitest client: session handling, caching and CRUD flows for the API test
//! management backend.
//!
//! The backend owns all persistence and test execution. This crate keeps a
//! bearer token, a couple of selections and a tab-scoped cache on disk, and
//! drives the backend's REST surface.

pub mod api;
pub mod auth;
// Read-through cache for dashboard and route listings
pub mod cache;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod form;
pub mod logging;
pub mod models;
// Page flows used by the CLI
pub mod pages;
pub mod rest;
pub mod storage;

pub use context::AppContext;
pub use error::{ClientError, Result};
