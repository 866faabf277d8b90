//! AgentSmart backend
//!
//! A thin HTTP backend that proxies RSS feed parsing and Airtable record
//! CRUD, plus placeholder login and content-generation endpoints. Startup
//! binds the listener through a bounded retry loop that can reclaim a port
//! held by a stale process.

pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod feeds;
pub mod reclaim;
pub mod routes;
pub mod startup;
pub mod store;
