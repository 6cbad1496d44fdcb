//! Audio system service: the "current track" registry plus shared resources.
//!
//! Exactly one track at a time may accept an overlay mix stream. Instead of a
//! global pointer, the board owns one [`AudioSystem`] and lends it to every
//! track it creates. Creation registers the new track as current (replacing
//! any previous one); destruction unregisters it only if it is still current.
//!
//! The refill interrupt never touches the registry.

use core::cell::Cell;
use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use platform::{AudioPolicy, PcmPool};

/// Identity of a created track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrackId(u32);

impl TrackId {
    /// Raw id, for log lines.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Which track is current.
pub struct TrackRegistry {
    current: Mutex<CriticalSectionRawMutex, Cell<Option<TrackId>>>,
    next_id: AtomicU32,
}

impl TrackRegistry {
    /// An empty registry.
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(Cell::new(None)),
            next_id: AtomicU32::new(1),
        }
    }

    /// Hand out a fresh id.
    pub fn allocate(&self) -> TrackId {
        TrackId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Make `id` current; returns the track it replaced.
    pub fn register(&self, id: TrackId) -> Option<TrackId> {
        self.current.lock(|c| c.replace(Some(id)))
    }

    /// Clear the registration if `id` is still current.
    pub fn unregister(&self, id: TrackId) -> bool {
        self.current.lock(|c| {
            if c.get() == Some(id) {
                c.set(None);
                true
            } else {
                false
            }
        })
    }

    /// `true` if `id` is the current track.
    pub fn is_current(&self, id: TrackId) -> bool {
        self.current() == Some(id)
    }

    /// The current track, if any.
    pub fn current(&self) -> Option<TrackId> {
        self.current.lock(Cell::get)
    }
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Services shared by every track on the board.
pub struct AudioSystem<'a> {
    registry: TrackRegistry,
    pool: PcmPool,
    policy: &'a dyn AudioPolicy,
}

impl<'a> AudioSystem<'a> {
    /// A system with an empty registry and an empty memory pool.
    pub const fn new(policy: &'a dyn AudioPolicy) -> Self {
        Self {
            registry: TrackRegistry::new(),
            pool: PcmPool::new(),
            policy,
        }
    }

    /// The current-track registry.
    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    /// Static PCM partitions.
    pub fn pool(&self) -> &PcmPool {
        &self.pool
    }

    /// Routing / volume policy.
    pub fn policy(&self) -> &'a dyn AudioPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::TablePolicy;

    #[test]
    fn latest_registration_wins() {
        let reg = TrackRegistry::new();
        let a = reg.allocate();
        let b = reg.allocate();
        assert_ne!(a, b);
        assert_eq!(reg.register(a), None);
        assert_eq!(reg.register(b), Some(a));
        assert!(reg.is_current(b));
        assert!(!reg.is_current(a));
    }

    #[test]
    fn stale_unregister_is_ignored() {
        let reg = TrackRegistry::new();
        let a = reg.allocate();
        let b = reg.allocate();
        reg.register(a);
        reg.register(b);
        assert!(!reg.unregister(a));
        assert_eq!(reg.current(), Some(b));
        assert!(reg.unregister(b));
        assert_eq!(reg.current(), None);
    }

    #[test]
    fn system_exposes_its_services() {
        let policy = TablePolicy::default();
        let system = AudioSystem::new(&policy);
        assert!(system.registry().current().is_none());
        assert!(system.pool().available(platform::StreamType::Music).is_none());
    }
}
