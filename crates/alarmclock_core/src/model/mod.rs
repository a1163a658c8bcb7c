//! Alarm domain model.
//!
//! # Responsibility
//! - Define canonical data structures shared by store, repository and UI feed.
//!
//! # Invariants
//! - Every persisted alarm is identified by a store-assigned `AlarmId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod alarm;
