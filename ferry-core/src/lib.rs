//! Ferry Core
//!
//! Core types shared by every Ferry component.
//!
//! This crate contains:
//! - Domain types: the job record, its status machine, invocation arguments and log lines
//! - DTOs: the plain structured payloads exchanged across the public job API

pub mod domain;
pub mod dto;
