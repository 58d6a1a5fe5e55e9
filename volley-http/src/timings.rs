use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-request phase breakdown.
///
/// `duration` is `sending + waiting + receiving`. Phases of connection setup (`dns`, `connect`,
/// `tls`) are zero when the request ran on a reused connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub blocked: Duration,
    pub dns: Duration,
    pub connect: Duration,
    pub tls: Duration,
    pub sending: Duration,
    pub waiting: Duration,
    pub receiving: Duration,
    pub duration: Duration,
}

impl Timings {
    /// Fills the wire phases from the instants observed on the connection.
    pub(crate) fn set_exchange(
        &mut self,
        send_start: Instant,
        io: IoSnapshot,
        body_end: Instant,
    ) {
        let last_write = io
            .last_write
            .unwrap_or(send_start)
            .max(send_start)
            .min(body_end);
        let first_read = io.first_read.unwrap_or(body_end).max(last_write).min(body_end);

        self.sending = last_write.saturating_duration_since(send_start);
        self.waiting = first_read.saturating_duration_since(last_write);
        self.receiving = body_end.saturating_duration_since(first_read);
        self.duration = self.sending + self.waiting + self.receiving;
    }
}

/// Timestamps and byte counts written by [`crate::io::TimedIo`] for the current exchange.
///
/// Instants are kept as nanoseconds since `origin`; zero means "not seen yet".
#[derive(Debug)]
pub(crate) struct IoMarks {
    origin: Instant,
    last_write_ns: AtomicU64,
    first_read_ns: AtomicU64,
    written: AtomicU64,
    read: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IoSnapshot {
    pub(crate) last_write: Option<Instant>,
    pub(crate) first_read: Option<Instant>,
    pub(crate) written: u64,
    pub(crate) read: u64,
}

impl IoMarks {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            last_write_ns: AtomicU64::new(0),
            first_read_ns: AtomicU64::new(0),
            written: AtomicU64::new(0),
            read: AtomicU64::new(0),
        })
    }

    fn now_ns(&self) -> u64 {
        let ns = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        ns.max(1)
    }

    fn at(&self, ns: u64) -> Option<Instant> {
        (ns != 0).then(|| self.origin + Duration::from_nanos(ns))
    }

    pub(crate) fn reset(&self) {
        self.last_write_ns.store(0, Ordering::Relaxed);
        self.first_read_ns.store(0, Ordering::Relaxed);
        self.written.store(0, Ordering::Relaxed);
        self.read.store(0, Ordering::Relaxed);
    }

    pub(crate) fn on_write(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.written.fetch_add(n as u64, Ordering::Relaxed);
        self.last_write_ns.store(self.now_ns(), Ordering::Relaxed);
    }

    pub(crate) fn on_read(&self, n: usize) {
        if n == 0 {
            return;
        }
        self.read.fetch_add(n as u64, Ordering::Relaxed);
        // Only the first read after the request went out marks the response start.
        if self.last_write_ns.load(Ordering::Relaxed) != 0 {
            let _ = self.first_read_ns.compare_exchange(
                0,
                self.now_ns(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
    }

    pub(crate) fn snapshot(&self) -> IoSnapshot {
        IoSnapshot {
            last_write: self.at(self.last_write_ns.load(Ordering::Relaxed)),
            first_read: self.at(self.first_read_ns.load(Ordering::Relaxed)),
            written: self.written.load(Ordering::Relaxed),
            read: self.read.load(Ordering::Relaxed),
        }
    }
}
