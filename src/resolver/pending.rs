//! Requests that failed for network reasons, waiting for a retry round.

use std::collections::HashMap;

use crate::state::PhotoRecord;
use crate::types::{CacheTier, SizeVariant};

/// Everything needed to replay one `resolve` call.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub record: PhotoRecord,
    pub size: SizeVariant,
    pub tier: CacheTier,
    pub max_retries: u32,
}

/// At most one pending request per `(external id, tier)`; a newer failure
/// for the same key replaces the older one.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    entries: HashMap<(String, CacheTier), PendingRequest>,
}

impl PendingQueue {
    pub(crate) fn insert(&mut self, request: PendingRequest) {
        let key = (request.record.external_id.clone(), request.tier);
        self.entries.insert(key, request);
    }

    pub(crate) fn remove(&mut self, external_id: &str, tier: CacheTier) {
        self.entries.remove(&(external_id.to_string(), tier));
    }

    /// Take the current round, leaving an empty queue for the next one.
    pub(crate) fn take_round(&mut self) -> Vec<PendingRequest> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
