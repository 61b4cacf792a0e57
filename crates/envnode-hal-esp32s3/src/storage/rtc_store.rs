//! Retained domain in RTC fast memory.
//!
//! The area is never initialized by the runtime, so it keeps its contents
//! across deep sleep and software resets and holds garbage after power-on.
//! A magic word guards the slot lengths; record codecs above validate the
//! bytes themselves.

use core::sync::atomic::{AtomicBool, Ordering};

use envnode_core::store::StoreKey;

pub const RETAINED_SLOT_BYTES: usize = 64;
const SLOT_COUNT: usize = StoreKey::ALL.len();
const AREA_MAGIC: u32 = 0x5254_4E45; // "ENTR"
const PANIC_MAGIC: u32 = 0x4349_4E50; // "PNIC"

#[repr(C)]
struct RetainedArea {
    magic: u32,
    lengths: [u8; SLOT_COUNT],
    slots: [[u8; RETAINED_SLOT_BYTES]; SLOT_COUNT],
}

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut RETAINED: RetainedArea = RetainedArea {
    magic: 0,
    lengths: [0; SLOT_COUNT],
    slots: [[0; RETAINED_SLOT_BYTES]; SLOT_COUNT],
};

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut PANIC_MARKER: u32 = 0;

static TAKEN: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetainedError {
    ValueTooLarge,
}

/// Exclusive handle to the retained area.
#[derive(Debug)]
pub struct RtcStore {
    _private: (),
}

impl RtcStore {
    /// Returns the handle once; later calls get `None`.
    pub fn take() -> Option<Self> {
        if TAKEN.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(Self { _private: () })
    }

    pub fn load(&mut self, key: StoreKey, out: &mut [u8]) -> Option<usize> {
        let area = self.area();
        if area.magic != AREA_MAGIC {
            return None;
        }
        let slot = key.slot();
        let len = area.lengths[slot] as usize;
        if len == 0 || len > RETAINED_SLOT_BYTES || len > out.len() {
            return None;
        }
        out[..len].copy_from_slice(&area.slots[slot][..len]);
        Some(len)
    }

    pub fn store(&mut self, key: StoreKey, data: &[u8]) -> Result<(), RetainedError> {
        if data.len() > RETAINED_SLOT_BYTES {
            return Err(RetainedError::ValueTooLarge);
        }
        let area = self.area_mut();
        if area.magic != AREA_MAGIC {
            area.lengths = [0; SLOT_COUNT];
            area.magic = AREA_MAGIC;
        }
        let slot = key.slot();
        area.slots[slot][..data.len()].copy_from_slice(data);
        area.lengths[slot] = data.len() as u8;
        Ok(())
    }

    fn area(&self) -> &RetainedArea {
        // SAFETY: `TAKEN` guarantees a single handle, and the panic path only
        // touches `PANIC_MARKER`.
        unsafe { &*(&raw const RETAINED) }
    }

    fn area_mut(&mut self) -> &mut RetainedArea {
        // SAFETY: see `area`.
        unsafe { &mut *(&raw mut RETAINED) }
    }
}

/// Called from the panic handler right before the software reset.
pub fn mark_panic() {
    // SAFETY: single word write; nothing else runs once we are panicking.
    unsafe { (&raw mut PANIC_MARKER).write_volatile(PANIC_MAGIC) };
}

/// Reads and clears the marker left by [`mark_panic`].
pub fn take_panic_marker() -> bool {
    // SAFETY: only called once during boot, before any task can panic.
    unsafe {
        let marker = &raw mut PANIC_MARKER;
        let was_set = marker.read_volatile() == PANIC_MAGIC;
        marker.write_volatile(0);
        was_set
    }
}
