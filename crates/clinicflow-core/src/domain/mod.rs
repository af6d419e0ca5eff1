//! Domain model for the Clinicflow engine
//!
//! Aggregates, value objects, events, and the repository traits they are
//! persisted through.

pub mod definition;
pub mod events;
pub mod graph;
pub mod instance;
pub mod repository;
pub mod rule;
pub mod task;
