//! Configuration loading for vantage
//!
//! config.yml is parsed into [`DeployConfig`], credentials from the
//! sibling secrets file are merged in by IP, and the result is
//! validated before anything touches the network.

pub mod loader;
pub mod schema;
pub mod secrets;

pub use loader::ConfigLoader;
pub use schema::{
    ClusterMode, DeployConfig, FileTransfer, HttpProxy, PrometheusDeployment, PrometheusServers,
    ServerEntry, TargetServers, ValidationError,
};
pub use secrets::{SecretsFile, ServerCredentials, merge_credentials};
