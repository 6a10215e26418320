//! Token-bucket admission control plus a concurrency gate for every outbound call.
//!
//! The backend imposes two non-negotiable ceilings: a request budget that refills over time
//! and a cap on concurrent connections. [`RateLimiter`] enforces both locally so the backend
//! never has to. [`acquire`](RateLimiter::acquire) suspends the caller until a bucket token
//! and a concurrency slot are both available; the returned [`Lease`] gives the slot back when
//! dropped, on every exit path. Bucket tokens are never given back; they replenish purely
//! with elapsed time. Local throttling only ever delays, it never surfaces as an error.

// crates.io
use async_lock::{Semaphore, SemaphoreGuardArc};
use rand::Rng;
use tokio::time::Instant;
// self
use crate::{_prelude::*, config::BackendDescriptor};

/// Upper bound on the random extra sleep added to bucket waits, in seconds. Spreads out
/// waiters that woke at the same instant so none of them can starve the others indefinitely.
const WAIT_JITTER_SECS: f64 = 0.05;

/// Process-wide admission control: a lazily refilled token bucket combined with a bounded set
/// of concurrency slots.
pub struct RateLimiter {
	capacity: f64,
	refill_per_second: f64,
	bucket: Mutex<Bucket>,
	slots: Arc<Semaphore>,
}
impl RateLimiter {
	/// Creates a limiter with the given bucket capacity, refill rate (tokens per second), and
	/// concurrency ceiling.
	pub fn new(capacity: u32, refill_per_second: f64, max_in_flight: usize) -> Self {
		Self {
			capacity: f64::from(capacity),
			refill_per_second,
			bucket: Mutex::new(Bucket {
				tokens: f64::from(capacity),
				last_refill: Instant::now(),
			}),
			slots: Arc::new(Semaphore::new(max_in_flight)),
		}
	}

	/// Creates a limiter from a descriptor's admission-control knobs.
	pub fn from_descriptor(descriptor: &BackendDescriptor) -> Self {
		Self::new(descriptor.rate_capacity, descriptor.refill_per_second, descriptor.max_in_flight)
	}

	/// Suspends until a concurrency slot and a bucket token are both available, then consumes
	/// one token and occupies one slot.
	///
	/// Admission is not strictly FIFO; waiters sleep out their predicted deficit (plus jitter)
	/// and re-check, so every waiter makes progress as the bucket replenishes.
	pub async fn acquire(&self) -> Lease {
		let slot = self.slots.acquire_arc().await;

		loop {
			let Some(deficit) = self.take_token() else {
				return Lease { _slot: slot };
			};
			let jitter = rand::rng().random_range(0.0..WAIT_JITTER_SECS);

			tokio::time::sleep(std::time::Duration::from_secs_f64(deficit + jitter)).await;
		}
	}

	/// Returns the fraction of the rate budget currently available, in `[0, 1]`.
	///
	/// Read-only gauge for external observers (e.g. to warn when the budget drops below 20%);
	/// the limiter itself never logs.
	pub fn saturation(&self) -> f64 {
		let mut bucket = self.bucket.lock();

		self.refill(&mut bucket);

		bucket.tokens / self.capacity
	}

	/// Takes one token if available, otherwise returns the predicted wait in seconds until one
	/// will be.
	fn take_token(&self) -> Option<f64> {
		let mut bucket = self.bucket.lock();

		self.refill(&mut bucket);

		if bucket.tokens >= 1.0 {
			bucket.tokens -= 1.0;

			None
		} else {
			Some((1.0 - bucket.tokens) / self.refill_per_second)
		}
	}

	fn refill(&self, bucket: &mut Bucket) {
		let now = Instant::now();
		let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();

		bucket.tokens = (bucket.tokens + elapsed * self.refill_per_second).min(self.capacity);
		bucket.last_refill = now;
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("capacity", &self.capacity)
			.field("refill_per_second", &self.refill_per_second)
			.field("saturation", &self.saturation())
			.finish()
	}
}

struct Bucket {
	tokens: f64,
	last_refill: Instant,
}

/// Occupied concurrency slot returned by [`RateLimiter::acquire`].
///
/// Dropping the lease releases the slot exactly once; the consumed bucket token is not
/// restored.
pub struct Lease {
	_slot: SemaphoreGuardArc,
}
impl Debug for Lease {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("Lease(..)")
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[tokio::test(start_paused = true)]
	async fn bucket_drains_and_refills_with_elapsed_time() {
		let limiter = RateLimiter::new(10, 2.0, 4);

		assert!((limiter.saturation() - 1.0).abs() < 1e-9);

		for _ in 0..10 {
			drop(limiter.acquire().await);
		}

		assert!(limiter.saturation() < 1e-9);

		tokio::time::advance(std::time::Duration::from_millis(2_500)).await;

		assert!((limiter.saturation() - 0.5).abs() < 1e-6);
	}

	#[tokio::test(start_paused = true)]
	async fn saturation_never_exceeds_one() {
		let limiter = RateLimiter::new(10, 2.0, 4);

		drop(limiter.acquire().await);
		tokio::time::advance(std::time::Duration::from_secs(3_600)).await;

		assert!((limiter.saturation() - 1.0).abs() < 1e-9);
	}

	#[tokio::test(start_paused = true)]
	async fn empty_bucket_delays_admission() {
		let limiter = RateLimiter::new(2, 1.0, 4);

		drop(limiter.acquire().await);
		drop(limiter.acquire().await);

		let started = Instant::now();

		drop(limiter.acquire().await);

		let waited = started.elapsed().as_secs_f64();

		assert!(waited >= 0.9, "Third admission should wait for a refill; waited {waited}s.");
	}

	#[tokio::test(start_paused = true)]
	async fn rate_ceiling_holds_past_capacity() {
		let limiter = RateLimiter::new(120, 2.0, 10);

		for _ in 0..120 {
			drop(limiter.acquire().await);
		}

		let started = Instant::now();

		drop(limiter.acquire().await);

		let waited = started.elapsed().as_secs_f64();

		assert!(waited >= 0.4, "Admission 121 should wait for the bucket; waited {waited}s.");
	}

	#[tokio::test(start_paused = true)]
	async fn concurrency_slots_never_exceed_the_ceiling() {
		let limiter = Arc::new(RateLimiter::new(1_000, 1_000.0, 3));
		let current = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));
		let mut handles = Vec::new();

		for _ in 0..20 {
			let limiter = limiter.clone();
			let current = current.clone();
			let peak = peak.clone();

			handles.push(tokio::spawn(async move {
				let lease = limiter.acquire().await;
				let holding = current.fetch_add(1, Ordering::SeqCst) + 1;

				peak.fetch_max(holding, Ordering::SeqCst);
				tokio::time::sleep(std::time::Duration::from_millis(5)).await;
				current.fetch_sub(1, Ordering::SeqCst);
				drop(lease);
			}));
		}

		for handle in handles {
			handle.await.expect("Lease holder task should not panic.");
		}

		assert!(peak.load(Ordering::SeqCst) <= 3);
		assert_eq!(current.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_waiter_releases_its_slot() {
		let limiter = Arc::new(RateLimiter::new(100, 100.0, 1));
		let held = limiter.acquire().await;
		let waiter = {
			let limiter = limiter.clone();

			tokio::spawn(async move {
				let _lease = limiter.acquire().await;
			})
		};

		// Let the waiter park on the occupied slot, then abandon it.
		tokio::task::yield_now().await;
		waiter.abort();

		let _ = waiter.await;

		drop(held);

		// The slot freed by the abandoned waiter must still be acquirable.
		drop(limiter.acquire().await);
	}
}
