// ============================================================================
// Book Pipeline
// ============================================================================
//
// Admission gate and asynchronous persistence for books.
//
// - sequence   - counter + Fibonacci classification
// - admission  - create workflow and the status / queue / reset reads
// - kafka      - envelope, publisher, consumer and the in-process log
// - worker     - consumer loop storing books by classification
// - storage    - ready / staging / cover tables
//
// ============================================================================

pub mod admission;
pub mod kafka;
pub mod logging;
pub mod metrics;
pub mod sequence;
pub mod storage;
pub mod worker;

pub use admission::{BookAdmission, CreateBookResult};
pub use book_types::{Book, BookCover};
pub use sequence::{SequenceTracker, TrackerStatus};
pub use worker::{BookWorker, WorkerPhase, WorkerStats};
