//! # Entity Pool
//!
//! A fixed-size pool of typed worker entities with checkout and return.
//!
//! Entities live in a bounded channel sized to the pool capacity; a parallel
//! bookkeeping map records, per entity id, whether the entity is currently
//! available. The two structures together uphold the pool invariant: at any
//! quiescent moment the entities held by callers plus the entities in the
//! channel are exactly the set created at construction.
//!
//! Checkout, work, and checkin must be return-on-all-paths. The dispatchers
//! in the scheduler return an entity even when the work it performed failed
//! or panicked; a pool that loses entities silently shrinks until every
//! `take` blocks forever.

use crate::error::PoolError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A poolable worker exposing a stable 32-bit id.
///
/// Ids are unique within a pool and never reassigned for the pool's
/// lifetime.
pub trait Entity: Send + 'static {
    fn id(&self) -> u32;
}

enum CasOutcome {
    Missing,
    Unchanged,
    Set,
}

/// A fixed-size pool of entities of one concrete type.
///
/// The original design carried a runtime type descriptor and rejected
/// returns of foreign concrete types; here the type parameter makes such a
/// return unrepresentable.
pub struct Pool<T: Entity> {
    total: u32,
    tx: kanal::AsyncSender<T>,
    rx: kanal::AsyncReceiver<T>,
    // id -> currently available
    availability: Mutex<HashMap<u32, bool>>,
}

impl<T: Entity> Pool<T> {
    /// Builds a pool of `total` entities produced by `factory`.
    ///
    /// Fails on zero capacity and on factories that hand out duplicate ids.
    pub fn new(total: u32, mut factory: impl FnMut() -> T) -> Result<Self, PoolError> {
        if total == 0 {
            return Err(PoolError::ZeroCapacity(total));
        }
        let (tx, rx) = kanal::bounded::<T>(total as usize);
        let mut availability = HashMap::with_capacity(total as usize);
        for _ in 0..total {
            let entity = factory();
            let id = entity.id();
            if availability.insert(id, true).is_some() {
                return Err(PoolError::DuplicateId(id));
            }
            tx.send(entity).map_err(|_| PoolError::Closed)?;
        }
        Ok(Pool {
            total,
            tx: tx.to_async(),
            rx: rx.to_async(),
            availability: Mutex::new(availability),
        })
    }

    /// Checks an entity out, waiting until one is available.
    pub async fn take(&self) -> Result<T, PoolError> {
        let entity = self.rx.recv().await.map_err(|_| PoolError::Closed)?;
        if let Some(flag) = self.availability.lock().get_mut(&entity.id()) {
            *flag = false;
        }
        Ok(entity)
    }

    /// Checks an entity back in.
    ///
    /// Returning an entity the pool never created, or one that is already
    /// checked in, fails and leaves the pool state unchanged.
    pub async fn release(&self, entity: T) -> Result<(), PoolError> {
        let id = entity.id();
        match self.compare_and_set(id, false, true) {
            CasOutcome::Missing => Err(PoolError::UnknownEntity(id)),
            CasOutcome::Unchanged => Err(PoolError::AlreadyReleased(id)),
            CasOutcome::Set => {
                // a slot is guaranteed: the flag transition reserved it
                self.tx.send(entity).await.map_err(|_| PoolError::Closed)
            }
        }
    }

    fn compare_and_set(&self, id: u32, old: bool, new: bool) -> CasOutcome {
        let mut availability = self.availability.lock();
        match availability.get_mut(&id) {
            None => CasOutcome::Missing,
            Some(flag) if *flag != old => CasOutcome::Unchanged,
            Some(flag) => {
                *flag = new;
                CasOutcome::Set
            }
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// The number of entities currently checked out.
    pub fn used(&self) -> u32 {
        self.total - self.rx.len() as u32
    }
}
