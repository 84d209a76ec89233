//! Star-schema warehouse: DDL, row mapping, dimensional loads and the
//! post-load integrity checks.

pub mod loader;
pub mod models;
pub mod schema;
pub mod validator;
