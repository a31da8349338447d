//! Core domain types
//!
//! This module contains the structures shared by the orchestrator
//! workflows (which produce them) and the status API (which reads them).

pub mod env;
pub mod event;
pub mod exec;
pub mod state;
