//! The aggregation side of AIPerf: record processors convert raw inference
//! results into metric records, and the records manager folds those into
//! processing stats, completion tracking, and final results.

pub mod completion;
pub mod manager;
pub mod processor;
pub mod results;

pub use completion::PhaseCompletionChecker;
pub use manager::RecordsManager;
pub use processor::RecordProcessor;
