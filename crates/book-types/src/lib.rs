// ============================================================================
// Book Types - Core Data Types
// ============================================================================
//
// Core entities shared by the admission service, the Kafka envelope and the
// storage layer. No dependencies on business logic, databases, or brokers.
//
// Contents:
// - Book (the entity being admitted and persisted)
// - BookCover (cover metadata stored next to a ready book)
// - BookListQuery (search, filter, sort and paging over a book table)
//
// ============================================================================

pub mod book;
pub mod query;

pub use book::*;
pub use query::*;
