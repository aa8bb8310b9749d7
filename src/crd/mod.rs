//! Custom Resource Definitions (CRDs) for objectstore-operator.
//!
//! - `ObjectStore`: the managed gateway deployment
//! - `StorageCluster`: the parent cluster, read-only to this operator

mod object_store;
mod storage_cluster;

pub use object_store::*;
pub use storage_cluster::*;
