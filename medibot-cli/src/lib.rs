//! Launcher for the medibot question answering pipeline.
//!
//! Loads configuration (TOML file, then flags), installs tracing, builds a
//! [`medibot_rag::RagPipeline`] and runs one of the commands in [`commands`].

pub mod commands;
pub mod config;
pub mod telemetry;

pub use commands::{
    ask, build_pipeline, build_pipeline_with_key, chat, inspect, render_answer, render_failure,
};
pub use config::{EmbeddingBackend, EmbeddingConfig, LauncherConfig, Overrides};
