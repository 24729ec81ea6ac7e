pub mod file_service;
pub mod publish_service;
pub mod validation_service;

pub use publish_service::{PublishService, RunOutcome};
