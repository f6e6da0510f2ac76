//! proctor-core: question model, scoring, timing and integrity for exam sessions.
//!
//! This crate defines the data model, the scoring engine, the session clock,
//! the integrity monitor and the session controller that ties them together.
//! Graders and persistent stores plug in through the traits in [`traits`].

pub mod clock;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod integrity;
pub mod loader;
pub mod model;
pub mod presentation;
pub mod scoring;
pub mod session;
pub mod store;
pub mod traits;
