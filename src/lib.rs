//! Sprintdesk - project management operations from natural language
//!
//! Batches of typed operations (create, update, delete, assign, query) run
//! in order against a remote project API, with results of earlier
//! operations chained into later ones.

pub mod api;
pub mod core;
pub mod engine;
pub mod llm;
