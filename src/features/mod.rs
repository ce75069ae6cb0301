// Settings lifecycle: update flow, propagation and read-side summary
pub mod audit;
pub mod flags;
pub mod notifier;
pub mod orchestrator;
pub mod summary;
