use crate::render::rewriter::RewriteOutcome;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct CspStats {
    request_count: AtomicUsize,
    nonce_generation_count: AtomicUsize,
    placeholder_resolved_count: AtomicUsize,
    placeholder_rejected_count: AtomicUsize,
    header_count: AtomicUsize,
    rewrite_time_ns: AtomicUsize,
    config_update_count: AtomicUsize,
    start_time: Instant,
}

impl Default for CspStats {
    fn default() -> Self {
        Self {
            request_count: Default::default(),
            nonce_generation_count: Default::default(),
            placeholder_resolved_count: Default::default(),
            placeholder_rejected_count: Default::default(),
            header_count: Default::default(),
            rewrite_time_ns: Default::default(),
            config_update_count: Default::default(),
            start_time: Instant::now(),
        }
    }
}

impl CspStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn nonce_generation_count(&self) -> usize {
        self.nonce_generation_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn placeholder_resolved_count(&self) -> usize {
        self.placeholder_resolved_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn placeholder_rejected_count(&self) -> usize {
        self.placeholder_rejected_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn header_count(&self) -> usize {
        self.header_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn config_update_count(&self) -> usize {
        self.config_update_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_rewrite_time_ns(&self) -> usize {
        self.rewrite_time_ns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    #[inline]
    pub(crate) fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_nonce_generation_count(&self) {
        self.nonce_generation_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_header_count(&self) {
        self.header_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_config_update_count(&self) {
        self.config_update_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_rewrite_time(&self, time_ns: usize) {
        self.rewrite_time_ns.fetch_add(time_ns, Ordering::Relaxed);
    }

    pub(crate) fn add_rewrite_outcome(&self, outcome: &RewriteOutcome) {
        self.nonce_generation_count
            .fetch_add(outcome.minted, Ordering::Relaxed);
        self.placeholder_resolved_count
            .fetch_add(outcome.resolved, Ordering::Relaxed);
        self.placeholder_rejected_count
            .fetch_add(outcome.rejected, Ordering::Relaxed);
    }

    #[inline]
    pub fn reset(&self) {
        self.request_count.store(0, Ordering::Relaxed);
        self.nonce_generation_count.store(0, Ordering::Relaxed);
        self.placeholder_resolved_count.store(0, Ordering::Relaxed);
        self.placeholder_rejected_count.store(0, Ordering::Relaxed);
        self.header_count.store(0, Ordering::Relaxed);
        self.rewrite_time_ns.store(0, Ordering::Relaxed);
        self.config_update_count.store(0, Ordering::Relaxed);
    }
}

impl fmt::Display for CspStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CSP Nonce Statistics:")?;
        writeln!(f, "  Uptime: {} seconds", self.uptime_secs())?;
        writeln!(f, "  Requests processed: {}", self.request_count())?;
        writeln!(f, "  Nonces generated: {}", self.nonce_generation_count())?;
        writeln!(
            f,
            "  Placeholders resolved: {}",
            self.placeholder_resolved_count()
        )?;
        writeln!(
            f,
            "  Placeholders rejected: {}",
            self.placeholder_rejected_count()
        )?;
        writeln!(f, "  Headers attached: {}", self.header_count())?;
        writeln!(f, "  Config updates: {}", self.config_update_count())?;
        writeln!(
            f,
            "  Total rewrite time: {} ns",
            self.total_rewrite_time_ns()
        )?;
        Ok(())
    }
}
