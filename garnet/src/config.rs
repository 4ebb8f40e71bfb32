/// Tuning knobs for call-site caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Cached nodes a dispatch chain may hold before it goes megamorphic.
    pub cache_depth: usize,
    /// Cache refills an interpreter call site tolerates before it stops
    /// caching.
    pub call_site_miss_limit: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            cache_depth: 8,
            call_site_miss_limit: 50,
        }
    }
}

impl DispatchConfig {
    pub fn with_cache_depth(mut self, depth: usize) -> Self {
        self.cache_depth = depth;
        self
    }

    pub fn with_miss_limit(mut self, limit: u32) -> Self {
        self.call_site_miss_limit = limit;
        self
    }
}
