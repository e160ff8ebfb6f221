pub mod config;
pub mod money;

pub use config::{ConfigError, ExtractionSettings, FusionSettings, PipelineSettings, Settings};
pub use money::Money;
