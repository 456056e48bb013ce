//! Library crate for estimation-room-back, exposing modules for binaries and integration tests.

pub mod config;
pub mod credentials;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
