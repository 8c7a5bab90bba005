pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{OrganizationSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryOrganizationDirectory, InMemoryRequestStore, RepositoryError,
    SqlOrganizationDirectory, SqlRequestStore,
};
