//! Data Transfer Objects for the public job API
//!
//! This module contains the payloads exchanged between the engine and its
//! callers (the HTTP server, the client and the CLI). Everything here is
//! plain structured data: strings, numbers, booleans, mappings, sequences.

pub mod error;
pub mod job;
pub mod log;
