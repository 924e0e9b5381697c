//! Session state shared with views and commands.

pub mod auth;
