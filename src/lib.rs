//! ScaleWave: an autoscaling and traffic-split controller for
//! functionally-equivalent Knative-style service revisions.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod observer;
pub mod optimizer;
pub mod platform;
pub mod registry;
pub mod types;
