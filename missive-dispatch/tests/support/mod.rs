#![allow(dead_code, clippy::unwrap_used)] // Test utility module - not all helpers used in every test

pub mod fixture;
pub mod transport;
