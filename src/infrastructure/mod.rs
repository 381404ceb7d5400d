//! Infrastructure layer - Storage backends and the organization engine

pub mod logging;
pub mod org;
pub mod storage;
