use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Serializes library commits that share a key (a content fingerprint or an
/// overwritten image id) across all jobs of the process. Entries are dropped
/// once no commit holds them.
#[derive(Debug, Default)]
pub struct CommitLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CommitLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`. Nesting distinct keys is
    /// fine as long as every caller nests them in the same order.
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(key.to_string()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        drop(lock);

        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if map
            .get(key)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            map.remove(key);
        }

        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_fingerprint_never_overlaps() {
        let locks = Arc::new(CommitLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    locks.with_lock("same", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_nested_keys_release_both_entries() {
        let locks = Arc::new(CommitLocks::new());
        let handles: Vec<_> = ["fp-a", "fp-b"]
            .into_iter()
            .map(|fingerprint| {
                let locks = Arc::clone(&locks);
                thread::spawn(move || {
                    locks.with_lock(fingerprint, || {
                        locks.with_lock("image:7", || thread::sleep(Duration::from_millis(10)))
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(locks.is_empty());
    }

    #[test]
    fn test_returns_closure_value() {
        let locks = CommitLocks::new();
        assert_eq!(locks.with_lock("fp", || 42), 42);
        assert!(locks.is_empty());
    }
}
