//! Repository traits for metadata operations.

pub mod catalog;
pub mod leases;

pub use catalog::CatalogRepo;
pub use leases::LeaseRepo;
