//! Application services for the Clinicflow engine
//!
//! Orchestration lives here; the domain layer holds the state machines.

pub mod definition_service;
pub mod engine;
pub mod replay;
pub mod rules;
pub mod task_service;
