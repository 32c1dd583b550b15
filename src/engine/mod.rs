//! Operation execution engine
//!
//! Batches of typed operations run in order against a `ProjectApi`.
//! Results of earlier operations are reachable from later ones through
//! `$name.field` references.

pub mod executor;
pub mod handlers;
pub mod matcher;
pub mod narrative;
pub mod operation;
pub mod references;
pub mod schedule;
pub mod stats;
pub mod summary;

pub use executor::Engine;
pub use handlers::query::{QueryOutcome, QuerySubject};
pub use narrative::{KeywordClassifier, QueryClassifier, QueryIntent};
pub use operation::{
    parse_batch, Batch, BatchOutcome, ExecutionResult, Operation, OperationKind, ResultType,
};
pub use stats::StatsSnapshot;
