//! AI study-plan generation and validation pipeline.
//!
//! Takes a user's scheduling constraints, renders them into prompts for an
//! external text-generation provider (with a secondary fallback), then
//! sanitizes, parses and validates the returned schedule, repairing it where
//! mechanically safe before handing it to the caller.

pub mod error;
pub mod models;
pub mod services;
pub mod utils;
