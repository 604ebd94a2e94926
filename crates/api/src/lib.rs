//! Stockwatch API server.
//!
//! Endpoints:
//! - POST /api/cron/check-expiry: run the notification pipeline (bearer secret)
//! - GET  /api/notifications: recent notification log entries (bearer secret)
//! - GET  /health: liveness and scheduler status

pub mod middleware;
pub mod routes;
pub mod scheduler;
pub mod shutdown;
pub mod state;
