#![forbid(unsafe_code)]

pub mod keys;
pub mod record;
pub mod remote;
pub mod repository;
pub mod sqlite;
