//! Library domain records.
//!
//! # Responsibility
//! - Define the records persisted by both backends.
//! - Keep records plain data: no storage or identity logic lives here.
//!
//! # Invariants
//! - `id` is `None` before first persistence and stable afterwards.
//! - Every field defaults, so partially populated JSON still loads.
//! - Timestamps are epoch milliseconds.

pub mod author;
pub mod book;
pub mod category;
pub mod member;
pub mod publisher;

pub use author::Author;
pub use book::{Book, LoanRecord};
pub use category::Category;
pub use member::{
    ActiveLoan, ContactInfo, EmergencyContact, Member, MemberPreferences, ReadingStats,
};
pub use publisher::Publisher;
