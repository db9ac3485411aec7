//! TTL-guarded availability caching for probed executables

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cached probe results with a time-to-live
///
/// Guarded by the owning component's mutex; a stale read is acceptable,
/// concurrent refreshes just overwrite each other.
#[derive(Debug)]
pub(crate) struct AvailabilityCache {
    map: HashMap<String, bool>,
    refreshed_at: Option<Instant>,
    ttl: Duration,
}

impl AvailabilityCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            refreshed_at: None,
            ttl,
        }
    }

    /// A copy of the cached map, if still within the TTL
    pub(crate) fn fresh(&self) -> Option<HashMap<String, bool>> {
        match self.refreshed_at {
            Some(at) if at.elapsed() < self.ttl => Some(self.map.clone()),
            _ => None,
        }
    }

    pub(crate) fn update(&mut self, map: HashMap<String, bool>) {
        self.map = map;
        self.refreshed_at = Some(Instant::now());
    }
}
