//! The shared lock arena.

use crate::error::{CoreError, CoreResult};
use crate::lock::{HolderId, LockMode};
use crate::session::SessionInfo;
use crate::stats::CoreStats;
use crate::types::LockTarget;
use corral_meta::TypeRegistry;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug)]
struct HolderSlot {
    count: usize,
    session: SessionInfo,
}

#[derive(Debug)]
struct LockRecord {
    mode: LockMode,
    holders: HashMap<HolderId, HolderSlot>,
}

/// Arena of lock records keyed by canonical target.
///
/// One coordination mutex guards the whole arena; blocked requesters park
/// on a condvar that every release signals. A record with zero holders is
/// removed, never retained. The same arena type serves both the
/// process-local tracker and the cluster server's arbiter (with
/// node-qualified holders).
pub struct LockTable {
    registry: Arc<TypeRegistry>,
    stats: Arc<CoreStats>,
    state: Mutex<HashMap<LockTarget, LockRecord>>,
    released: Condvar,
}

impl LockTable {
    /// Creates an empty lock arena.
    pub fn new(registry: Arc<TypeRegistry>, stats: Arc<CoreStats>) -> Self {
        Self {
            registry,
            stats,
            state: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Acquires a lock, blocking until granted or the timeout elapses.
    ///
    /// Reentrant per holder: each successful acquire needs a matching
    /// [`LockTable::release`]. On timeout the error carries the session of
    /// a holder currently in the way.
    pub fn acquire(
        &self,
        holder: HolderId,
        session: &SessionInfo,
        target: LockTarget,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        let mut waited = false;

        loop {
            match self.blocker(&state, holder, &target, mode)? {
                None => {
                    grant(&mut state, holder, session, target, mode);
                    trace!(%holder, %target, ?mode, "lock granted");
                    return Ok(());
                }
                Some(_) => {
                    if !waited {
                        self.stats.record_lock_wait();
                        waited = true;
                    }
                    match deadline {
                        None => {
                            self.released.wait(&mut state);
                        }
                        Some(d) => {
                            let timed_out = Instant::now() >= d
                                || self.released.wait_until(&mut state, d).timed_out();
                            if timed_out {
                                // One last look; the holder may be gone.
                                match self.blocker(&state, holder, &target, mode)? {
                                    None => {
                                        grant(&mut state, holder, session, target, mode);
                                        return Ok(());
                                    }
                                    Some(still_there) => {
                                        self.stats.record_lock_timeout();
                                        return Err(CoreError::LockTimeout {
                                            target,
                                            holder: still_there,
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Releases one acquisition of a lock.
    ///
    /// Releasing a target the holder does not hold is a no-op.
    pub fn release(&self, holder: HolderId, target: &LockTarget) -> CoreResult<()> {
        let mut state = self.state.lock();
        let Some(record) = state.get_mut(target) else {
            return Ok(());
        };
        let Some(slot) = record.holders.get_mut(&holder) else {
            return Ok(());
        };

        if slot.count == 0 {
            return Err(CoreError::ReentrancyUnderflow { target: *target });
        }
        slot.count -= 1;
        if slot.count == 0 {
            record.holders.remove(&holder);
        }
        if record.holders.is_empty() {
            state.remove(target);
        }
        self.released.notify_all();
        Ok(())
    }

    /// Releases everything a holder still holds, returning how many targets
    /// were freed. Called on transaction completion.
    pub fn release_all(&self, holder: HolderId) -> usize {
        let mut state = self.state.lock();
        let mut freed = 0;
        state.retain(|_, record| {
            if record.holders.remove(&holder).is_some() {
                freed += 1;
            }
            !record.holders.is_empty()
        });
        if freed > 0 {
            self.released.notify_all();
        }
        freed
    }

    /// Returns true if any holder currently holds the exact target.
    #[must_use]
    pub fn is_held(&self, target: &LockTarget) -> bool {
        self.state.lock().contains_key(target)
    }

    /// Returns the reentrancy count a holder has on the exact target.
    #[must_use]
    pub fn count_of(&self, holder: HolderId, target: &LockTarget) -> usize {
        self.state
            .lock()
            .get(target)
            .and_then(|r| r.holders.get(&holder))
            .map(|s| s.count)
            .unwrap_or(0)
    }

    /// Finds a holder blocking the request, if any.
    fn blocker(
        &self,
        state: &HashMap<LockTarget, LockRecord>,
        holder: HolderId,
        target: &LockTarget,
        mode: LockMode,
    ) -> CoreResult<Option<SessionInfo>> {
        for (held, record) in state {
            if !self.targets_conflict(held, target)? {
                continue;
            }
            let other = record
                .holders
                .iter()
                .find(|(h, _)| **h != holder);
            let Some((_, slot)) = other else {
                // Only the requester holds conflicting targets; relocking
                // and locking related types in the same scope is allowed.
                continue;
            };
            let incompatible =
                mode == LockMode::Exclusive || record.mode == LockMode::Exclusive;
            if incompatible {
                return Ok(Some(slot.session.clone()));
            }
        }
        Ok(None)
    }

    /// True if two targets exclude each other across holders.
    ///
    /// Objects conflict only on identity; a type conflicts with related
    /// types and with objects of related types, in both hierarchy
    /// directions.
    fn targets_conflict(&self, a: &LockTarget, b: &LockTarget) -> CoreResult<bool> {
        Ok(match (a, b) {
            (LockTarget::Object(x), LockTarget::Object(y)) => x == y,
            (LockTarget::Object(o), LockTarget::Type(t))
            | (LockTarget::Type(t), LockTarget::Object(o)) => {
                self.registry.related(*t, o.type_id)?
            }
            (LockTarget::Type(x), LockTarget::Type(y)) => self.registry.related(*x, *y)?,
        })
    }
}

fn grant(
    state: &mut HashMap<LockTarget, LockRecord>,
    holder: HolderId,
    session: &SessionInfo,
    target: LockTarget,
    mode: LockMode,
) {
    let record = state.entry(target).or_insert_with(|| LockRecord {
        mode,
        holders: HashMap::new(),
    });
    if mode == LockMode::Exclusive {
        // Upgrade path: the conflict check guaranteed no other holder.
        record.mode = LockMode::Exclusive;
    }
    let slot = record.holders.entry(holder).or_insert_with(|| HolderSlot {
        count: 0,
        session: session.clone(),
    });
    slot.count += 1;
}
