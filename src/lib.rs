//! Labor Engine library crate.
//!
//! This crate turns raw clock-in/clock-out records and administrative
//! schedules into legal-violation flags, scheduling conflicts,
//! overtime calculations and planned-vs-actual variance reports.
//! Applications construct a [`engine::ComplianceEngine`] with their own
//! [`repository::TimeRepository`] and a [`constraints::LegalConstraints`]
//! value, then call the operations exposed by the component modules.
//!
//! Every result is a point-in-time judgment over the data the
//! repository returned.  The engine performs no writes, so callers that
//! need "validate then commit" to be atomic must serialize that
//! sequence per employee and day themselves.

pub mod error;
pub mod models;
pub mod interval;
pub mod constraints;
pub mod repository;
pub mod engine;
pub mod validator;
pub mod conflicts;
pub mod overtime;
pub mod anomalies;
pub mod comparator;
pub mod resolution;
