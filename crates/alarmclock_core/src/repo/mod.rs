//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the alarm record store contract.
//! - Isolate SQLite query details from scheduling orchestration.
//!
//! # Invariants
//! - Store writes enforce `AlarmRecord::validate()` before persistence.
//! - Store APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod alarm_store;
