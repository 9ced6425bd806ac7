// src/lib.rs — Library root for labloop

pub mod cli;
pub mod core;
pub mod critique;
pub mod design;
pub mod infra;
pub mod provider;
pub mod report;
pub mod simulation;
pub mod util;
