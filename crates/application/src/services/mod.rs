pub mod cluster_service;
pub mod cql_service;
pub mod result_inventory;
pub mod stress_service;

#[cfg(test)]
mod cluster_service_test;
#[cfg(test)]
mod cql_service_test;

pub use cluster_service::ClusterService;
pub use cql_service::CqlService;
pub use result_inventory::ResultInventory;
pub use stress_service::{InsertOptions, StressService};
