//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod cdns;
pub mod locks;
pub mod parameters;
pub mod profiles;
pub mod tokens;

pub use bootstrap::BootstrapRepo;
pub use cdns::CdnRepo;
pub use locks::LockRepo;
pub use parameters::ParameterRepo;
pub use profiles::ProfileRepo;
pub use tokens::TokenRepo;
