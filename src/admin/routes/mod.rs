pub mod analytics;
pub mod common;
pub mod deployments;
pub mod docs;
pub mod feeds;
pub mod health;
pub mod metrics;
pub mod sites;
pub mod webhooks;
