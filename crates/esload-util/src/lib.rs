#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Filesystem helpers for esload.
//!
//! Pure functions with no logging; callers decide what to report.

pub mod fs;
