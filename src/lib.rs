//! Train dispatching core for the U-Engine ecosystem.
//!
//! Assigns time-ordered track occupancy to trains sharing a finite rail
//! network so that no element exceeds its capacity and every train keeps
//! its route order, while minimizing priority-weighted delay.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `NetworkElement`, `Network`, `Train`,
//!   `Schedule` (entry-time arena), `TrainTimetable`, `Conflict`
//! - **`validation`**: Input integrity checks (duplicate IDs, empty routes,
//!   unknown elements)
//! - **`dispatching`**: Rule engine ranking contending trains
//! - **`scheduler`**: Constraint scheduler, objective, occupancy profiles, KPIs
//! - **`refiner`**: Destroy-and-repair local search over feasible schedules
//! - **`predictor`**: Two-stage delay model with atomic retraining
//! - **`feedback`**: Decision lifecycle, feedback records, analytics
//! - **`service`**: Facade over the request/response payloads
//!
//! # Architecture
//!
//! ```text
//! predictor ──risk──► dispatching ──rank──► scheduler ──► refiner
//!     ▲                                         │
//!     └──── retrain ◄── feedback ◄── decisions ◄┘
//! ```
//!
//! Scheduling is a pure computation over its inputs. The feedback store
//! and the active delay model are the only shared mutable state.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Kolisch (1996), "Serial and parallel resource-constrained project
//!   scheduling methods revisited"
//! - Pisinger & Ropke (2019), "Large Neighborhood Search"

pub mod config;
pub mod dispatching;
pub mod error;
pub mod feedback;
pub mod models;
pub mod predictor;
pub mod refiner;
pub mod scheduler;
pub mod service;
pub mod validation;

pub use error::{Error, Result};
