use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Keyed async mutexes serializing mutations per assembly.
///
/// Mutations against different assemblies proceed concurrently; mutations
/// against the same assembly queue in arrival order on its mutex. Entries
/// with no holder and no waiter are pruned opportunistically on later
/// acquisitions.
#[derive(Default)]
pub struct AssemblyLocks {
    slots: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl AssemblyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutation slot for `assembly_id`, waiting behind any
    /// in-flight mutation of the same assembly.
    pub async fn acquire(&self, assembly_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = match self.slots.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(
                slots
                    .entry(assembly_id)
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_assembly_mutations_are_serialized() {
        let locks = Arc::new(AssemblyLocks::new());
        let assembly_id = Uuid::new_v4();
        let in_flight = Arc::new(AtomicU32::new(0));
        let max_in_flight = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(assembly_id).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_assemblies_do_not_block_each_other() {
        let locks = AssemblyLocks::new();
        let guard_a = locks.acquire(Uuid::new_v4()).await;
        // acquiring a second assembly must not wait on the first
        let guard_b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(Uuid::new_v4()))
            .await
            .expect("unrelated assembly lock should be immediate");
        drop(guard_a);
        drop(guard_b);
    }

    #[tokio::test]
    async fn idle_slots_are_pruned() {
        let locks = AssemblyLocks::new();
        let guard = locks.acquire(Uuid::new_v4()).await;
        drop(guard);
        // next acquisition sweeps out the idle entry
        let _guard = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.slot_count(), 1);
    }
}
