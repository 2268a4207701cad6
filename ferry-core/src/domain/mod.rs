//! Core domain types
//!
//! This module contains the core domain structures used across Ferry crates.
//! These types describe a background job and its evolving state; they are
//! owned by the engine (which mutates them) and copied out to every reader.

pub mod args;
pub mod job;
pub mod log;
