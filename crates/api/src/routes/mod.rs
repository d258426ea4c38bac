//! HTTP Route Handlers

pub mod forecast;
pub mod ingest;
pub mod measurements;
pub mod models;
