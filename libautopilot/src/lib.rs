//! # libautopilot
//!
//! Core library for Autopilot, a scheduled social publishing pipeline.
//! Schedules move through a small state machine (pending, publishing,
//! published, failed) driven by three recurring jobs: processing due
//! schedules, retrying recoverable failures, and refreshing OAuth tokens
//! before they expire.
//!
//! The binaries (`autopilotd`, `autopilot-ctl`) are thin wrappers over
//! this crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod publisher;
pub mod status;
pub mod store;
pub mod tokens;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{AutopilotError, Result};
pub use jobs::{ProcessScheduledPostsJob, RefreshSocialTokensJob, RetryFailedPostsJob};
pub use publisher::{PlatformPublisher, Publisher, PublisherRegistry};
pub use store::Store;
pub use tokens::{TokenGrant, TokenRefresher};
pub use types::{Platform, Post, PostSchedule, PublishResult, ScheduleStatus, SocialAccount};
