//! HTTP request handlers.

pub mod cdns;
pub mod common;
pub mod health;
pub mod locks;
pub mod parameters;
pub mod profiles;
pub mod tokens;

pub use cdns::*;
pub use health::*;
pub use locks::*;
pub use parameters::*;
pub use profiles::*;
pub use tokens::*;
