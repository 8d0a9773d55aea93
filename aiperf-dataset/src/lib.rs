//! The dataset manager: owns the conversation corpus and serves turns and
//! timing schedules to the rest of the system.

pub mod composer;
pub mod manager;

pub use composer::{load_corpus_file, SyntheticComposer};
pub use manager::DatasetManager;
