//! Analysis module for post-hoc inspection
//!
//! This module provides checks run on the rolling window a collector
//! retains after disconnecting:
//! - Dropped-sample detection from gaps in the sample counter

pub mod drops;

pub use drops::DropReport;
