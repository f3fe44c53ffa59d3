//! Asynchronous human-vs-AI text classification.
//!
//! Text is submitted as a job, handed through a bounded queue to a pool of
//! workers that call a [`classifier::Classifier`], and polled for by id.
//! Every completed job is appended to a durable [`audit::AuditLog`].

pub mod app;
pub mod audit;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod queue;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod ui;
pub mod worker;

pub use app::Veracity;
pub use config::VeracityConfig;
pub use error::VeracityError;
