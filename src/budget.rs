//! # Transaction Resource Budget
//!
//! The batch orchestrator processes jobs cooperatively inside one
//! transaction and must yield before the runtime's hard per-transaction
//! ceilings are hit. The budget tracks consumption of the monitored
//! resources (query count, mutation count, CPU time, heap bytes) through
//! atomic counters that providers and the orchestrator feed, and reports
//! `can_continue() == false` as soon as any counter reaches the configured
//! safety percentage of its ceiling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::constants::system::{SAFETY_FACTOR_MAX, SAFETY_FACTOR_MIN};

/// Hard per-transaction ceilings the budget guards against.
#[derive(Debug, Clone)]
pub struct TransactionLimits {
    pub max_queries: u64,
    pub max_mutations: u64,
    pub max_cpu: Duration,
    pub max_heap_bytes: u64,
}

impl Default for TransactionLimits {
    fn default() -> Self {
        Self {
            max_queries: 100,
            max_mutations: 150,
            max_cpu: Duration::from_secs(10),
            max_heap_bytes: 6 * 1024 * 1024,
        }
    }
}

/// Ambient consumption counters for the current transaction. Shared with
/// providers so persistence calls are metered where they happen.
#[derive(Debug)]
pub struct ResourceUsage {
    queries: AtomicU64,
    mutations: AtomicU64,
    heap_bytes: AtomicU64,
    started_at: Instant,
}

impl ResourceUsage {
    pub fn new() -> Self {
        Self {
            queries: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
            heap_bytes: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heap_bytes(&self, bytes: u64) {
        self.heap_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    pub fn heap_bytes(&self) -> u64 {
        self.heap_bytes.load(Ordering::Relaxed)
    }

    pub fn cpu_elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for ResourceUsage {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only guard over the transaction's resource consumption.
#[derive(Debug, Clone)]
pub struct Budget {
    safety_factor: u8,
    limits: TransactionLimits,
    usage: Arc<ResourceUsage>,
}

impl Budget {
    /// Build a budget with default limits. Out-of-range safety factors
    /// clamp into `[50, 95]`.
    pub fn new(safety_factor: u8) -> Self {
        Self::with_limits(safety_factor, TransactionLimits::default())
    }

    pub fn with_limits(safety_factor: u8, limits: TransactionLimits) -> Self {
        Self {
            safety_factor: safety_factor.clamp(SAFETY_FACTOR_MIN, SAFETY_FACTOR_MAX),
            limits,
            usage: Arc::new(ResourceUsage::new()),
        }
    }

    pub fn safety_factor(&self) -> u8 {
        self.safety_factor
    }

    /// Counter handle to hand to providers for metering.
    pub fn usage(&self) -> Arc<ResourceUsage> {
        Arc::clone(&self.usage)
    }

    /// False as soon as any monitored resource reaches the safety
    /// percentage of its ceiling.
    pub fn can_continue(&self) -> bool {
        if self.exceeds(self.usage.queries(), self.limits.max_queries) {
            debug!(queries = self.usage.queries(), "Budget exhausted on query count");
            return false;
        }
        if self.exceeds(self.usage.mutations(), self.limits.max_mutations) {
            debug!(mutations = self.usage.mutations(), "Budget exhausted on mutation count");
            return false;
        }
        if self.exceeds(
            self.usage.cpu_elapsed().as_millis() as u64,
            self.limits.max_cpu.as_millis() as u64,
        ) {
            debug!(elapsed_ms = self.usage.cpu_elapsed().as_millis() as u64, "Budget exhausted on CPU time");
            return false;
        }
        if self.exceeds(self.usage.heap_bytes(), self.limits.max_heap_bytes) {
            debug!(heap_bytes = self.usage.heap_bytes(), "Budget exhausted on heap");
            return false;
        }
        true
    }

    fn exceeds(&self, used: u64, limit: u64) -> bool {
        used.saturating_mul(100) >= limit.saturating_mul(u64::from(self.safety_factor))
    }
}
