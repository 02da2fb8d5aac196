//! Application state shared across handlers

use std::path::PathBuf;

use common::access::AccessGuard;

use crate::{account::AccountService, aggregator::RelationshipAggregator};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub guard: AccessGuard,
    pub accounts: AccountService,
    pub aggregator: RelationshipAggregator,
    /// Staging directory for multipart uploads
    pub upload_dir: PathBuf,
}
