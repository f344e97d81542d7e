//! Process-wide utilities shared by the outbox engine and its adapters.
//!
//! No domain knowledge lives here, only the millisecond clock and the
//! backoff policy used by the table-backed distributed lock.

pub mod backoff;
pub mod time;

pub use backoff::Backoff;
pub use time::now_ms;
