//! HTTP request handlers.

pub mod meetings;
