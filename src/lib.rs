pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod patch;
pub mod platform;
pub mod queue;
pub mod server;
pub mod shutdown;
pub mod webhook;
pub mod workflow;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_support;
