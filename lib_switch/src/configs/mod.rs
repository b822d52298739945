pub mod config_cloud;
pub mod config_store;

pub use config_cloud::{get_cloud_config, load_cloud_config, CloudConfigError};
pub use config_store::{load_runtime_config, RuntimeConfig, RuntimeConfigError};
