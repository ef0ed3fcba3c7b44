//! Triage pipeline.
//!
//! Every fetched message flows through:
//! 1. Dedup check against the processed set
//! 2. `DecisionEngine::decide()`: one registered action or none
//! 3. `ActionExecutor::execute()`: side effects, then mark read
//! 4. Mark processed
//! 5. `ThreadSummarizer::resummarize()`: thread memory overwrite
//!
//! `TriageProcessor` drives the cycle; `ThreadLocks` keeps cycles on the
//! same thread from interleaving.

pub mod decision;
pub mod executor;
pub mod locks;
pub mod poller;
pub mod processor;
pub mod summarizer;
pub mod types;

pub use decision::DecisionEngine;
pub use executor::{ActionExecutor, ExecutionReport};
pub use locks::ThreadLocks;
pub use poller::spawn_triage_poller;
pub use processor::TriageProcessor;
pub use summarizer::ThreadSummarizer;
pub use types::{Message, MessageOutcome, OutcomeStatus, ResultTag, Stage};
