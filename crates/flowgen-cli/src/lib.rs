//! Library half of the `flowgen` binary, so integration tests can drive
//! the same command code paths.

pub mod commands;
