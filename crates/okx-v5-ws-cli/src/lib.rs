/*
[INPUT]:  Public API exports for the okx-v5-ws runner
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod runner;

pub use config::RunnerConfig;
pub use runner::run_subscriptions;
