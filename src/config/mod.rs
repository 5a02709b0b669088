//! Configuration for fetches and for the engine that serves them
//!
//! `FetchOptions` is per request and built through a validating builder.
//! `EngineConfig` is per process and can be read from the environment.

pub mod builder;
pub mod engine;
pub mod getters;
pub mod methods;
pub mod types;

pub use builder::FetchOptionsBuilder;
pub use engine::{EngineConfig, RetryPolicy, StabilizationConfig};
pub use types::{Cookie, Device, FetchOptions, PageAction, ResourceType, Viewport};
