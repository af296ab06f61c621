pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod model;
pub mod models;
pub mod routes;
pub mod service;
pub mod store;

pub use error::{CoreError, CoreResult};
pub use service::{AttendanceEngine, Policy};
