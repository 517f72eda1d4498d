//! CVChatter onboarding coordinator: client-side coordination for the
//! resume-upload wizard: step sequencing over a server-authoritative
//! progress record, per-step form aggregation and validation, and the
//! extraction push channel.

pub mod auth;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod forms;
pub mod notifier;
pub mod progress;
pub mod sequencer;
