//! Static PCM memory partitions
//!
//! Output PCM buffers are never taken from a general heap. The board carves
//! one region per [`StreamType`] out of DMA-capable SRAM at build time and
//! hands them to a [`PcmPool`]; a track takes its stream's region on create
//! and returns it on destroy. A missing region is a creation-time
//! allocation failure, never a runtime one.
//!
//! ```rust,ignore
//! #[link_section = ".axisram"]
//! static MUSIC_PCM: StaticCell<[u8; 8192]> = StaticCell::new();
//!
//! POOL.provide(StreamType::Music, MUSIC_PCM.init([0; 8192]));
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::audio_types::StreamType;

type Slots = [Option<&'static mut [u8]>; StreamType::COUNT];

/// One static region per stream type.
pub struct PcmPool {
    slots: Mutex<CriticalSectionRawMutex, RefCell<Slots>>,
}

impl PcmPool {
    /// An empty pool; regions are added with [`provide`](Self::provide).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new(RefCell::new([None, None, None, None, None, None])),
        }
    }

    /// Install the region for `stream`, returning any region it replaces.
    pub fn provide(&self, stream: StreamType, region: &'static mut [u8]) -> Option<&'static mut [u8]> {
        self.slots.lock(|slots| {
            slots
                .borrow_mut()
                .get_mut(stream.index())
                .and_then(|slot| slot.replace(region))
        })
    }

    /// Take the region for `stream`, leaving the slot empty until restored.
    pub fn take(&self, stream: StreamType) -> Option<&'static mut [u8]> {
        self.slots.lock(|slots| {
            slots
                .borrow_mut()
                .get_mut(stream.index())
                .and_then(Option::take)
        })
    }

    /// Return a region previously obtained from [`take`](Self::take).
    pub fn restore(&self, stream: StreamType, region: &'static mut [u8]) {
        // A slot can only be occupied here if the board re-provided it while
        // the track was alive; the newer region wins.
        self.slots.lock(|slots| {
            if let Some(slot) = slots.borrow_mut().get_mut(stream.index()) {
                if slot.is_none() {
                    *slot = Some(region);
                }
            }
        });
    }

    /// Size of the idle region for `stream`, or `None` if it is taken / missing.
    pub fn available(&self, stream: StreamType) -> Option<usize> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .get(stream.index())
                .and_then(|slot| slot.as_ref().map(|r| r.len()))
        })
    }
}

impl Default for PcmPool {
    fn default() -> Self {
        Self::new()
    }
}
