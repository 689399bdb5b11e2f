//! Admin REST API: export launch and status, item sync scheduling, job inspection.

pub mod auth;
pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;
