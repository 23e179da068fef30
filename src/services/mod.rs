pub mod pricing;
pub mod provider;
pub mod queries;
pub mod reconciler;
pub mod submission;
