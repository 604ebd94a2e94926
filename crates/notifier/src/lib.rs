//! Outbound webhook delivery: body templating and the concurrent dispatcher.

pub mod template;
pub mod webhook;
