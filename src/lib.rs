//! Process-isolated fraud inference bridge.
//!
//! Classification requests are answered by short-lived worker processes
//! supervised from [`web::worker`]; the HTTP surface lives in [`web::routes`].

pub mod web;

pub use fraud_bridge_types as types;
