//! Core library for the `sockme` CLI.
//!
//! `sockme` opens many persistent WebSocket connections against one or more
//! endpoints, drives each with randomized traffic for a fixed duration, and
//! aggregates what happened into a summary. Connections are hosted by a pool
//! of workers (child processes or threads), admitted in paced batches per URL,
//! and reported back over a typed event stream. The primary user-facing
//! interface is the `sockme` command-line application; library APIs may evolve
//! as the CLI grows.
pub mod agent;
pub mod args;
pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod generator;
pub mod logger;
pub mod metrics;
pub mod orchestrator;
pub mod ramp;
pub mod shutdown;
pub mod shutdown_handlers;
pub mod sinks;
mod system;
pub mod worker;

#[cfg(test)]
mod test_support;
