//! Core module - configuration, session state, events and errors

pub mod config;
pub mod error;
pub mod events;
pub mod state;
