//! Resource generation module.
//!
//! Contains utilities for generating Kubernetes resources owned by ObjectStore.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Service | Stable gateway address advertised by the zone |
//! | Deployment | Gateway pods |

pub mod common;
pub mod deployment;
pub mod services;

// Re-export commonly used items from common
pub use common::{gateway_name, owner_reference, standard_labels};
