pub mod dedup;
pub mod pipeline;
pub mod run_guard;
pub mod selector;
pub mod store;
