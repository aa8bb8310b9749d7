//! Live implementations of the controller seams.
//!
//! | Trait | Implementation |
//! |-------|----------------|
//! | `RecordStore` | [`KubeRecordStore`] |
//! | `ClusterQuery` | [`KubeClusterQuery`] |
//! | `Provisioner` | [`KubeProvisioner`] |
//! | [`StorageAdmin`] | [`CliStorageAdmin`] over a [`CommandExecutor`] |

pub mod admin;
pub mod cluster_query;
pub mod provisioner;
pub mod record_store;

pub use admin::{
    AdminConfig, CliStorageAdmin, CommandExecutor, CommandOutput, ProcessExecutor, RealmConfig,
    StorageAdmin,
};
pub use cluster_query::KubeClusterQuery;
pub use provisioner::KubeProvisioner;
pub use record_store::KubeRecordStore;
