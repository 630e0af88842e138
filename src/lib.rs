pub mod config;
pub mod core;
pub mod distribution;
pub mod dns;
pub mod domain;
pub mod error;
pub mod issuance;
pub mod pipeline;
pub mod providers;

pub use config::DeploymentConfig;
pub use error::{ProvisionError, Result};
pub use pipeline::{
    Pipeline, PipelineAction, PipelineError, PipelineStage, ProvisionReport, ProvisionRequest,
};
pub use providers::{ClientProvider, MemoryCloud};
