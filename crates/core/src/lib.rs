//! Core domain types and shared logic for Keel, a CDN control plane.
//!
//! This crate holds everything that does not touch storage or HTTP:
//! - Profile types and name/parameter validation
//! - Conditional request evaluation (ETags, HTTP dates)
//! - List query parsing (pagination window, ordering)
//! - Token roles and authorization
//! - Shared configuration

pub mod conditional;
pub mod config;
pub mod error;
pub mod profile;
pub mod query;
pub mod token;

pub use conditional::{Outcome, ReadConditions, WriteConditions};
pub use error::{Error, Result};
pub use profile::{ProfileDraft, ProfileType};
pub use query::{ListQuery, OrderBy, PageParams, SortOrder, Window};
pub use token::{Role, Token, TokenId};
