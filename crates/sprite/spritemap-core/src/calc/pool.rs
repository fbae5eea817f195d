//! Reusable `f64` scratch buffers for the native delegate.
//!
//! Buffers are bucketed by power-of-two size. An acquire reuses the smallest
//! pooled buffer that is large enough and at most `slack_ratio` times the
//! request; a periodic sweep frees buffers idle for longer than `ttl_ms`.

use std::collections::BTreeMap;

use crate::config::PoolConfig;

pub const MIN_BUCKET_SLOTS: usize = 64;

/// Bucket size serving a request of `len` slots.
pub fn bucket_for(len: usize) -> usize {
    len.max(MIN_BUCKET_SLOTS).next_power_of_two()
}

#[derive(Debug)]
struct Idle {
    data: Vec<f64>,
    released_ms: f64,
}

#[derive(Debug)]
pub struct BufferPool {
    config: PoolConfig,
    buckets: BTreeMap<usize, Vec<Idle>>,
    last_sweep_ms: Option<f64>,
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            buckets: BTreeMap::new(),
            last_sweep_ms: None,
        }
    }

    /// Buffer of at least `len` zeroed slots (its length is the bucket size).
    pub fn acquire(&mut self, len: usize) -> Vec<f64> {
        let wanted = bucket_for(len);
        let limit = (wanted as f64 * self.config.slack_ratio) as usize;
        let hit = self
            .buckets
            .range_mut(wanted..=limit.max(wanted))
            .find_map(|(_, idle)| idle.pop());
        match hit {
            Some(idle) => {
                let mut data = idle.data;
                data.fill(0.0);
                data
            }
            None => vec![0.0; wanted],
        }
    }

    /// Return a buffer. Buffers that were not handed out by `acquire` are dropped.
    pub fn release(&mut self, data: Vec<f64>, now_ms: f64) {
        let len = data.len();
        if len < MIN_BUCKET_SLOTS || !len.is_power_of_two() {
            return;
        }
        self.buckets.entry(len).or_default().push(Idle {
            data,
            released_ms: now_ms,
        });
    }

    /// Free buffers idle beyond the TTL, at most once per sweep interval.
    /// Returns how many were freed.
    pub fn maybe_sweep(&mut self, now_ms: f64) -> usize {
        let Some(last) = self.last_sweep_ms else {
            self.last_sweep_ms = Some(now_ms);
            return 0;
        };
        if now_ms - last < self.config.sweep_interval_ms {
            return 0;
        }
        self.last_sweep_ms = Some(now_ms);

        let ttl = self.config.ttl_ms;
        let mut freed = 0;
        self.buckets.retain(|_, idle| {
            let before = idle.len();
            idle.retain(|b| now_ms - b.released_ms <= ttl);
            freed += before - idle.len();
            !idle.is_empty()
        });
        if freed > 0 {
            log::trace!("buffer pool sweep freed {freed} buffers");
        }
        freed
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.last_sweep_ms = None;
    }

    /// Number of idle buffers.
    pub fn idle_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_are_powers_of_two_with_a_floor() {
        assert_eq!(bucket_for(1), 64);
        assert_eq!(bucket_for(64), 64);
        assert_eq!(bucket_for(65), 128);
        assert_eq!(bucket_for(1000), 1024);
    }

    #[test]
    fn reuses_within_slack_only() {
        let mut pool = BufferPool::default();
        let buf = pool.acquire(200);
        assert_eq!(buf.len(), 256);
        pool.release(buf, 0.0);

        // 256 is within 2x of the 128 bucket.
        let reused = pool.acquire(100);
        assert_eq!(reused.len(), 256);
        pool.release(reused, 0.0);

        // ...but not within 2x of the 64 bucket.
        let fresh = pool.acquire(10);
        assert_eq!(fresh.len(), 64);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn sweep_frees_idle_buffers_after_ttl() {
        let mut pool = BufferPool::default();
        assert_eq!(pool.maybe_sweep(0.0), 0);
        let buf = pool.acquire(10);
        pool.release(buf, 0.0);

        assert_eq!(pool.maybe_sweep(1000.0), 0, "interval not elapsed");
        assert_eq!(pool.maybe_sweep(3000.0), 0, "ttl not elapsed");
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.maybe_sweep(6000.0), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn acquired_buffers_are_zeroed() {
        let mut pool = BufferPool::default();
        let mut buf = pool.acquire(4);
        buf.fill(7.0);
        pool.release(buf, 0.0);
        assert!(pool.acquire(4).iter().all(|v| *v == 0.0));
    }
}
