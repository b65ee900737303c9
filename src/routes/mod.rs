//! Router construction.

pub mod routes;
