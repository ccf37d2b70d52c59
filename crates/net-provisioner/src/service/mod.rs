//! Request handling service

mod clients;
mod provisioner;

pub use clients::{ClientFactory, LocalClients};
pub use provisioner::{Provisioner, ReconcileRequest, ReconcileResponse};
