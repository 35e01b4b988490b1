//! Decision feedback loop.
//!
//! Recommendations are recorded as pending [`Decision`]s, controllers
//! accept or reject them, and the resulting [`FeedbackRecord`]s drive
//! analytics, recommendation confidence and model retraining.
//!
//! | Record | Written by | Mutability |
//! |--------|-----------|------------|
//! | `Decision` | `record`, `resolve` | status changes once |
//! | `FeedbackRecord` | `resolve` | append-only |
//! | `OutcomeRecord` | `record_outcome` | append-only |
//! | `ModelFeedbackRecord` | `record_model_feedback` | append-only |

mod analytics;
mod decision;
mod record;
mod store;

pub use analytics::{aggregate, Analytics, CategoryStats, Window};
pub use decision::{Action, Decision, DecisionCategory, DecisionStatus};
pub use record::{Feedback, FeedbackRecord, ModelFeedbackRecord, ModelPerformance, OutcomeRecord};
pub use store::{FeedbackStore, StoreSnapshot};
