//! Counter metrics for monotonically increasing values.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    /// Get the counter name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the counter help text.
    pub fn help(&self) -> &'static str {
        self.help
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the counter by a specific amount.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset the counter to zero.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Where a directory operation ended up being served.
#[derive(Debug)]
pub struct OperationCounters {
    /// Calls made against this silo's directory, any hop.
    pub issued: Counter,
    /// Calls served by the local partition.
    pub local: Counter,
    /// Calls this silo forwarded to another owner.
    pub remote_sent: Counter,
    /// Calls that arrived here already forwarded (hop > 0).
    pub remote_received: Counter,
}

impl OperationCounters {
    /// Create the four counters for one operation.
    pub const fn new(
        issued: &'static str,
        local: &'static str,
        remote_sent: &'static str,
        remote_received: &'static str,
    ) -> Self {
        Self {
            issued: Counter::new(issued, "Directory calls issued"),
            local: Counter::new(local, "Directory calls served locally"),
            remote_sent: Counter::new(remote_sent, "Directory calls forwarded to the owner"),
            remote_received: Counter::new(remote_received, "Forwarded directory calls received"),
        }
    }

    /// Record a call entering the directory with `hop_count`.
    pub fn record_issued(&self, hop_count: u32) {
        self.issued.inc();
        if hop_count > 0 {
            self.remote_received.inc();
        }
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            issued: self.issued.get(),
            local: self.local.get(),
            remote_sent: self.remote_sent.get(),
            remote_received: self.remote_received.get(),
        }
    }
}

/// Values of one [`OperationCounters`] group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationSnapshot {
    pub issued: u64,
    pub local: u64,
    pub remote_sent: u64,
    pub remote_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "A test counter");

        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.inc_by(5);
        assert_eq!(counter.get(), 6);

        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_operation_counters() {
        let ops = OperationCounters::new("a_issued", "a_local", "a_sent", "a_received");

        ops.record_issued(0);
        ops.record_issued(2);
        ops.local.inc();
        ops.remote_sent.inc();

        let snap = ops.snapshot();
        assert_eq!(snap.issued, 2);
        assert_eq!(snap.remote_received, 1);
        assert_eq!(snap.local, 1);
        assert_eq!(snap.remote_sent, 1);
        assert_eq!(ops.issued.name(), "a_issued");
    }
}
