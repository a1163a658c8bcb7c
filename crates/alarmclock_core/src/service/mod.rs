//! Alarm use-case services.
//!
//! # Responsibility
//! - Reconcile the alarm store with registered wake-ups.
//! - Route lifecycle signals and UI commands onto the repository.

pub mod alarm_repository;
pub mod command_service;
pub mod view_state;
