//! Entity lifecycle and audit core for the pet marketplace.
//!
//! Adoption applications, shelter/vendor verification and user access control
//! all run through [`lifecycle`], which keeps related records consistent inside
//! a single datastore transaction and appends an audit trail for privileged
//! changes.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod telemetry;
