//! Vantage Core Library
//!
//! Provides the domain logic for deploying a small observability stack
//! (Prometheus, node_exporter, Grafana) onto remote hosts over SSH,
//! driven by a declarative YAML configuration file.

pub mod commands;
pub mod config;
pub mod deploy;
pub mod inventory;
pub mod packages;
pub mod plan;
pub mod render;
pub mod report;
pub mod ssh;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{
        ClusterMode, ConfigLoader, DeployConfig, FileTransfer, HttpProxy, ServerEntry,
        TargetServers, ValidationError,
    };

    // Inventory
    pub use crate::inventory::{Inventory, Role, ServiceKind, Target, TargetGroup};

    // Packages
    pub use crate::packages::{PackageInfo, PackageProvisioner, PackageSet};

    // Deployment
    pub use crate::deploy::Deployer;
    pub use crate::plan::{InstallPlan, Step};
    pub use crate::report::{DeployReport, HostReport, StepOutcome};

    // Remote execution
    pub use crate::ssh::{SshAuth, SshSession};
}
