//! # DTF Testing Utils
//!
//! Test support for the scheduler workspace: scripted task-type plugins,
//! builders for subtasks and task creation parameters, and a `TestStore`
//! wrapper around the in-memory coordination store that seeds task,
//! subtask and generation records the way the pipeline writes them.
//!
//! ```rust
//! use dtf_testing_utils::{MockTaskGenerator, RecordingExecutor, TestStore};
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
