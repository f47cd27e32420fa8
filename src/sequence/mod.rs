// ============================================================================
// Sequence Classifier
// ============================================================================
//
// The admission gate. Every admission advances a shared counter by one and
// the new position is classified by Fibonacci membership:
// - member     -> the book goes to the ready table
// - non-member -> the book is deferred to the staging table
//
// fibonacci.rs - exact membership test and next-member search
// tracker.rs   - counter + pending set behind one lock
//
// ============================================================================

pub mod fibonacci;
pub mod tracker;

pub use fibonacci::{is_fibonacci, next_fibonacci_after};
pub use tracker::{Admission, SequenceTracker, TrackerStatus};
