#![forbid(unsafe_code)]

pub mod apply;
pub mod cleanup;
pub mod discover;
pub mod worker;
