//! series-watch - new-volume detection for tracked book series
//!
//! Periodically checks the marketplace series of every watched library series
//! and stores the volumes the library does not have yet.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod scheduling;

#[cfg(test)]
pub(crate) mod test_utils;
