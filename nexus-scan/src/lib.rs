//! # Nexus Scan
//!
//! Ticket check-in controller for fest hosts: camera sampling, QR decoding
//! (pluggable), duplicate suppression, ticket verification against the
//! Nexus backend, and the operator's allow/deny/dismiss cycle.

pub mod api;
pub mod auth;
pub mod camera;
pub mod checkin;
pub mod config;
pub mod console;
pub mod controller;
pub mod decoder;
pub mod dedup;
pub mod error;
pub mod scan_loop;
pub mod stats;
pub mod verification;

pub use controller::{CheckInController, OperatorCommand};
pub use error::{ApiError, CameraError, ScanError, ScanResult};
