use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};

/// Serializes cache mutations: one read-modify-write in flight at a time, queued callers
/// observe their predecessor's result.
#[derive(Debug, Default)]
pub struct MutationLock {
    inner: Mutex<()>,
    wait_ms_last: AtomicU64,
    wait_ms_max: AtomicU64,
}

impl MutationLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        let start = Instant::now();
        let guard = self.inner.lock().await;
        self.record_wait(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX));
        guard
    }

    pub fn wait_ms_last(&self) -> u64 {
        self.wait_ms_last.load(Ordering::Relaxed)
    }

    pub fn wait_ms_max(&self) -> u64 {
        self.wait_ms_max.load(Ordering::Relaxed)
    }

    fn record_wait(&self, wait_ms: u64) {
        self.wait_ms_last.store(wait_ms, Ordering::Relaxed);
        let mut current = self.wait_ms_max.load(Ordering::Relaxed);
        while wait_ms > current {
            match self.wait_ms_max.compare_exchange(
                current,
                wait_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(next) => current = next,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn queued_waiter_records_wait_time() {
        let lock = Arc::new(MutationLock::new());
        let guard = lock.acquire().await;
        assert_eq!(lock.wait_ms_max(), 0);

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(guard);
        waiter.await.unwrap();

        assert!(lock.wait_ms_max() >= 20, "max wait {}", lock.wait_ms_max());
        assert_eq!(lock.wait_ms_last(), lock.wait_ms_max());
    }
}
