//! Organization infrastructure - membership engine and storage backends

mod cascade;
mod counter;
mod guard;
mod in_memory;
mod postgres;
mod service;

pub use cascade::{purge_member_access, CascadeSummary};
pub use counter::sync_member_count;
pub use guard::ensure_not_last_owner;
pub use in_memory::{FailurePoint, InMemoryOrgDatabase, InMemoryOrgTransaction};
pub use postgres::{PostgresOrgDatabase, PostgresOrgTransaction};
pub use service::OrgService;
