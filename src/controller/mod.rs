//! Controller module for objectstore-operator.
//!
//! The reconciliation core is split into small components, leaf-first:
//!
//! | Module | Role |
//! |--------|------|
//! | `cluster_info` | Parent cluster identity and version |
//! | `readiness` | Gate on the parent cluster being healthy |
//! | `finalizer` | Deletion guard token |
//! | `status` | Phase and message tracking |
//! | `validation` | Spec and external version checks |
//! | `provisioning` | Creation/update workflow |
//! | `deletion` | Teardown workflow |
//! | `reconciler` | Entry point and kube-rs adapter |
//!
//! The core only talks to the outside world through the traits in
//! `interfaces`.

pub mod cluster_info;
pub mod context;
pub mod deletion;
pub mod error;
pub mod finalizer;
pub mod interfaces;
pub mod provisioning;
pub mod readiness;
pub mod reconciler;
pub mod status;
pub mod validation;
