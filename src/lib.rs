//! Inbox triage: picks at most one action per email and remembers each thread.

pub mod actions;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
