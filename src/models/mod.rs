//! Rail dispatching domain models.
//!
//! Provides the data types for describing a scheduling request (network
//! elements, trains) and its solution (entry-time arena, timetables,
//! conflicts).
//!
//! # Domain Mappings
//!
//! | u-rail | Resource-constrained scheduling |
//! |--------|--------------------------------|
//! | NetworkElement | Cumulative resource |
//! | Train | Job with a chain of operations |
//! | Visit | Operation |
//! | Schedule | Start-time assignment |

mod conflict;
mod element;
mod network;
mod schedule;
mod train;

pub use conflict::{Conflict, ConflictKind};
pub use element::{ElementKind, NetworkElement};
pub use network::{ElementIdx, Network, NetworkRegistry};
pub use schedule::{Assignment, Schedule, TrainIdx, TrainTimetable, VisitRef};
pub use train::{Priority, Train};
