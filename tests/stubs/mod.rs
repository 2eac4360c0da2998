#![allow(dead_code)]
// Each integration test binary uses a different subset of the stubs

pub mod config;
pub mod session;
