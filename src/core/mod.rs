// src/core/mod.rs — Refinement engine: controller, state, retries, cancellation, cost

pub mod cancel;
pub mod controller;
pub mod cost;
pub mod retry;
pub mod types;

pub use cancel::CancelToken;
pub use controller::{ControllerConfig, RefinementController};
