//! LLM-backed translation of free text into operation batches

pub mod client;
pub mod context;
pub mod translator;

pub use client::{Complete, LlmClient, LlmSettings, Provider};
pub use context::WorkspaceContext;
pub use translator::translate;
