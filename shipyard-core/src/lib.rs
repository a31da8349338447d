//! Shipyard Core
//!
//! Core types and abstractions for the Shipyard deployment engine.
//!
//! This crate contains:
//! - Domain types: environment substitution, command descriptors,
//!   pipeline events and the per-version build history
//! - DTOs: payloads exchanged with the status API

pub mod domain;
pub mod dto;
