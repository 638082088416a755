//! Seeds and serves a demo banking dataset.
//!
//! The crate has three concerns: a connection-scoped database client
//! ([`db::DbClient`]), a one-shot seeding path ([`seed`]) that materializes
//! the customers/accounts/transactions fixture, and two read-only HTTP
//! endpoints ([`rest`]) over the seeded data. Deployment itself is an
//! external collaborator, described by [`deploy::DeploymentOrchestrator`].

pub mod config;
pub mod db;
pub mod deploy;
pub mod error;
pub mod rest;
pub mod seed;
