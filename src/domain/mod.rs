//! Core data model shared by both link roles: peer identities, payload
//! validation, connection phases, callback events and configuration.

pub mod error;
pub mod models;
pub mod settings;
