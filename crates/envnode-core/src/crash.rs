//! Reset-surviving crash breadcrumbs.
//!
//! The record lives in the retained store domain and is rewritten after every
//! mutation, so whatever was last recorded is still there after a panic or
//! watchdog reset. The next boot inspects it, reports once, then clears it.

use log::{info, warn};

use crate::store::{PersistentStore, StoreDomain, StoreKey};

const CRASH_MAGIC: u32 = 0x4853_5243; // "CRSH"
const CRASH_VERSION: u8 = 1;
pub const FUNCTION_NAME_BYTES: usize = 32;
pub const CRASH_RECORD_LEN: usize = 62;
const CHECKSUM_OFFSET: usize = CRASH_RECORD_LEN - 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ResetReason {
    Unknown = 0,
    PowerOn = 1,
    External = 2,
    Software = 3,
    Panic = 4,
    InterruptWatchdog = 5,
    TaskWatchdog = 6,
    GenericWatchdog = 7,
    DeepSleepWake = 8,
    Brownout = 9,
}

impl ResetReason {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::PowerOn,
            2 => Self::External,
            3 => Self::Software,
            4 => Self::Panic,
            5 => Self::InterruptWatchdog,
            6 => Self::TaskWatchdog,
            7 => Self::GenericWatchdog,
            8 => Self::DeepSleepWake,
            9 => Self::Brownout,
            _ => Self::Unknown,
        }
    }

    pub const fn is_crash(self) -> bool {
        matches!(
            self,
            Self::Panic
                | Self::InterruptWatchdog
                | Self::TaskWatchdog
                | Self::GenericWatchdog
                | Self::Brownout
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::PowerOn => "power_on",
            Self::External => "external",
            Self::Software => "software",
            Self::Panic => "panic",
            Self::InterruptWatchdog => "int_wdt",
            Self::TaskWatchdog => "task_wdt",
            Self::GenericWatchdog => "wdt",
            Self::DeepSleepWake => "deep_sleep",
            Self::Brownout => "brownout",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeapStats {
    pub free_bytes: u32,
}

/// On-store crash record. Valid iff magic and checksum both match.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CrashRecord {
    pub magic: u32,
    pub version: u8,
    pub boot_count: u32,
    pub crash_count: u32,
    pub reset_reason: ResetReason,
    pub last_crash_timestamp_ms: u32,
    pub last_function: [u8; FUNCTION_NAME_BYTES],
    pub free_heap_at_crash: u32,
    pub min_free_heap: u32,
    pub checksum: u16,
}

impl CrashRecord {
    pub const fn zeroed() -> Self {
        Self {
            magic: 0,
            version: 0,
            boot_count: 0,
            crash_count: 0,
            reset_reason: ResetReason::Unknown,
            last_crash_timestamp_ms: 0,
            last_function: [0u8; FUNCTION_NAME_BYTES],
            free_heap_at_crash: 0,
            min_free_heap: 0,
            checksum: 0,
        }
    }

    pub fn encode(&self) -> [u8; CRASH_RECORD_LEN] {
        let mut buf = [0u8; CRASH_RECORD_LEN];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4] = self.version;
        buf[5] = self.reset_reason as u8;
        buf[8..12].copy_from_slice(&self.boot_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.crash_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.last_crash_timestamp_ms.to_le_bytes());
        buf[20..52].copy_from_slice(&self.last_function);
        buf[52..56].copy_from_slice(&self.free_heap_at_crash.to_le_bytes());
        buf[56..60].copy_from_slice(&self.min_free_heap.to_le_bytes());
        buf[CHECKSUM_OFFSET..].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decodes without validating; see [`is_valid`](Self::is_valid).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < CRASH_RECORD_LEN {
            return None;
        }
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut last_function = [0u8; FUNCTION_NAME_BYTES];
        last_function.copy_from_slice(&buf[20..52]);
        Some(Self {
            magic: word(0),
            version: buf[4],
            reset_reason: ResetReason::from_raw(buf[5]),
            boot_count: word(8),
            crash_count: word(12),
            last_crash_timestamp_ms: word(16),
            last_function,
            free_heap_at_crash: word(52),
            min_free_heap: word(56),
            checksum: u16::from_le_bytes([buf[CHECKSUM_OFFSET], buf[CHECKSUM_OFFSET + 1]]),
        })
    }

    pub fn compute_checksum(&self) -> u16 {
        checksum16(&self.encode()[..CHECKSUM_OFFSET])
    }

    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    pub fn magic_matches(&self) -> bool {
        self.magic == CRASH_MAGIC
    }

    pub fn is_valid(&self) -> bool {
        self.magic_matches() && self.version == CRASH_VERSION && self.checksum == self.compute_checksum()
    }

    pub fn last_function(&self) -> &str {
        let len = self
            .last_function
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(FUNCTION_NAME_BYTES);
        core::str::from_utf8(&self.last_function[..len]).unwrap_or("?")
    }
}

/// Rotating XOR over `bytes`. Catches single-byte damage; not tamper-proof.
pub fn checksum16(bytes: &[u8]) -> u16 {
    let mut sum = 0u16;
    for b in bytes {
        sum ^= *b as u16;
        sum = sum.rotate_left(1);
    }
    sum
}

/// Inputs sampled once at boot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BootInfo {
    pub reset_reason: ResetReason,
    pub heap: HeapStats,
    pub uptime_ms: u32,
}

/// What `begin` found in the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CrashBoot {
    pub crash_detected: bool,
    /// The stored record had a good magic but failed validation.
    pub corrupted: bool,
}

/// Snapshot handed to the network phase for publishing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CrashReport {
    pub reset_reason: ResetReason,
    pub boot_count: u32,
    pub crash_count: u32,
    pub last_crash_timestamp_ms: u32,
    pub last_function: [u8; FUNCTION_NAME_BYTES],
    pub free_heap_at_crash: u32,
    pub min_free_heap: u32,
}

impl CrashReport {
    pub fn last_function(&self) -> &str {
        let len = self
            .last_function
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(FUNCTION_NAME_BYTES);
        core::str::from_utf8(&self.last_function[..len]).unwrap_or("?")
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CrashRecorder {
    record: CrashRecord,
    /// Crash details as found at boot, before this cycle's breadcrumbs.
    pending: Option<CrashReport>,
}

impl Default for CrashRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashRecorder {
    pub const fn new() -> Self {
        Self {
            record: CrashRecord::zeroed(),
            pending: None,
        }
    }

    /// Reads the stored record without modifying it.
    pub fn load<S: PersistentStore + ?Sized>(store: &mut S) -> Self {
        let mut buf = [0u8; CRASH_RECORD_LEN];
        let record = match store.load(StoreDomain::Retained, StoreKey::CrashLog, &mut buf) {
            Ok(Some(len)) => CrashRecord::decode(&buf[..len]).unwrap_or(CrashRecord::zeroed()),
            Ok(None) => CrashRecord::zeroed(),
            Err(err) => {
                warn!("crash: record read failed: {:?}", err);
                CrashRecord::zeroed()
            }
        };
        Self {
            record,
            pending: None,
        }
    }

    /// Validates or reinitializes the stored record, then stamps this boot.
    pub fn begin<S: PersistentStore + ?Sized>(&mut self, store: &mut S, boot: BootInfo) -> CrashBoot {
        *self = Self::load(store);
        let mut corrupted = false;

        if self.record.is_valid() {
            self.record.boot_count = self.record.boot_count.wrapping_add(1);
        } else {
            corrupted = self.record.magic_matches();
            if corrupted {
                warn!("crash: stored record failed checksum; reinitializing");
            }
            self.record = CrashRecord::zeroed();
            self.record.magic = CRASH_MAGIC;
            self.record.version = CRASH_VERSION;
            self.record.boot_count = 1;
        }

        let crash_detected = boot.reset_reason.is_crash();
        if crash_detected {
            self.record.reset_reason = boot.reset_reason;
            self.record.crash_count = self.record.crash_count.wrapping_add(1);
            self.record.last_crash_timestamp_ms = boot.uptime_ms;
            self.record.free_heap_at_crash = boot.heap.free_bytes;
            warn!(
                "crash: reset_reason={} crashes={} last_function={}",
                boot.reset_reason.as_str(),
                self.record.crash_count,
                self.record.last_function()
            );
        } else if !self.record.reset_reason.is_crash() {
            // An unreported crash keeps its reason until `mark_reported`.
            self.record.reset_reason = boot.reset_reason;
        }

        if self.record.min_free_heap == 0 || boot.heap.free_bytes < self.record.min_free_heap {
            self.record.min_free_heap = boot.heap.free_bytes;
        }

        self.persist(store);
        self.pending = self.has_crash_info().then(|| self.snapshot());
        info!(
            "crash: boot={} crashes={} reset_reason={}",
            self.record.boot_count,
            self.record.crash_count,
            boot.reset_reason.as_str()
        );
        CrashBoot {
            crash_detected,
            corrupted,
        }
    }

    pub fn has_crash_info(&self) -> bool {
        self.record.is_valid() && self.record.reset_reason.is_crash()
    }

    /// Overwrites the breadcrumb. Names longer than 31 bytes are truncated
    /// on a character boundary.
    pub fn record_function<S: PersistentStore + ?Sized>(&mut self, store: &mut S, name: &str) {
        let mut end = name.len().min(FUNCTION_NAME_BYTES - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.record.last_function = [0u8; FUNCTION_NAME_BYTES];
        self.record.last_function[..end].copy_from_slice(&name.as_bytes()[..end]);
        self.persist(store);
    }

    /// Clears the crash details after they were reported. Counters stay.
    pub fn mark_reported<S: PersistentStore + ?Sized>(&mut self, store: &mut S) {
        if !self.has_crash_info() {
            return;
        }
        self.record.reset_reason = ResetReason::Unknown;
        self.record.last_function = [0u8; FUNCTION_NAME_BYTES];
        self.record.free_heap_at_crash = 0;
        self.pending = None;
        self.persist(store);
        info!("crash: report delivered, record cleared");
    }

    /// Crash details captured at boot, or the stored ones for a recorder
    /// obtained through [`load`](Self::load).
    pub fn report(&self) -> Option<CrashReport> {
        if !self.has_crash_info() {
            return None;
        }
        self.pending.or_else(|| Some(self.snapshot()))
    }

    /// Counters and heap figures regardless of crash state.
    pub fn snapshot(&self) -> CrashReport {
        CrashReport {
            reset_reason: self.record.reset_reason,
            boot_count: self.record.boot_count,
            crash_count: self.record.crash_count,
            last_crash_timestamp_ms: self.record.last_crash_timestamp_ms,
            last_function: self.record.last_function,
            free_heap_at_crash: self.record.free_heap_at_crash,
            min_free_heap: self.record.min_free_heap,
        }
    }

    pub fn record(&self) -> &CrashRecord {
        &self.record
    }

    fn persist<S: PersistentStore + ?Sized>(&mut self, store: &mut S) {
        self.record.seal();
        if let Err(err) = store.store(StoreDomain::Retained, StoreKey::CrashLog, &self.record.encode()) {
            warn!("crash: record write failed: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemoryStore;

    fn boot(reason: ResetReason, free: u32) -> BootInfo {
        BootInfo {
            reset_reason: reason,
            heap: HeapStats { free_bytes: free },
            uptime_ms: 42,
        }
    }

    #[test]
    fn power_on_is_not_a_crash() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();

        let result = recorder.begin(&mut store, boot(ResetReason::PowerOn, 100_000));

        assert!(!result.crash_detected);
        assert!(!result.corrupted);
        assert!(!recorder.has_crash_info());
        assert_eq!(recorder.record().boot_count, 1);
        assert!(recorder.record().is_valid());
    }

    #[test]
    fn panic_reset_is_reported_on_next_boot() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();
        recorder.begin(&mut store, boot(ResetReason::PowerOn, 100_000));
        recorder.record_function(&mut store, "display_phase");

        let mut next = CrashRecorder::new();
        let result = next.begin(&mut store, boot(ResetReason::Panic, 90_000));

        assert!(result.crash_detected);
        assert!(next.has_crash_info());
        let report = next.report().unwrap();
        assert_eq!(report.reset_reason, ResetReason::Panic);
        assert_eq!(report.boot_count, 2);
        assert_eq!(report.crash_count, 1);
        assert_eq!(report.last_function(), "display_phase");
        assert_eq!(report.free_heap_at_crash, 90_000);
        assert_eq!(report.min_free_heap, 90_000);

        next.record_function(&mut store, "boot");
        assert_eq!(next.report().unwrap().last_function(), "display_phase");
    }

    #[test]
    fn every_crash_reason_counts() {
        for reason in [
            ResetReason::Panic,
            ResetReason::InterruptWatchdog,
            ResetReason::TaskWatchdog,
            ResetReason::GenericWatchdog,
            ResetReason::Brownout,
        ] {
            assert!(reason.is_crash());
            let mut store = MemoryStore::new();
            let mut recorder = CrashRecorder::new();
            recorder.begin(&mut store, boot(reason, 1));
            assert!(recorder.has_crash_info(), "{:?}", reason);
            assert_eq!(recorder.record().crash_count, 1);
        }
        for reason in [
            ResetReason::PowerOn,
            ResetReason::External,
            ResetReason::Software,
            ResetReason::DeepSleepWake,
            ResetReason::Unknown,
        ] {
            assert!(!reason.is_crash());
        }
    }

    #[test]
    fn flipped_byte_invalidates_record() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();
        recorder.begin(&mut store, boot(ResetReason::Panic, 1_000));
        assert!(CrashRecorder::load(&mut store).has_crash_info());

        assert!(store.corrupt_byte(StoreDomain::Retained, StoreKey::CrashLog, 10));

        let inspected = CrashRecorder::load(&mut store);
        assert!(inspected.record().magic_matches());
        assert!(!inspected.has_crash_info());
    }

    #[test]
    fn corrupted_record_is_reinitialized_and_flagged() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();
        recorder.begin(&mut store, boot(ResetReason::PowerOn, 1_000));
        recorder.begin(&mut store, boot(ResetReason::DeepSleepWake, 1_000));
        assert_eq!(recorder.record().boot_count, 2);

        store.corrupt_byte(StoreDomain::Retained, StoreKey::CrashLog, 30);
        let result = recorder.begin(&mut store, boot(ResetReason::DeepSleepWake, 1_000));

        assert!(result.corrupted);
        assert_eq!(recorder.record().boot_count, 1);
        assert!(recorder.record().is_valid());
    }

    #[test]
    fn garbage_without_magic_is_not_corruption() {
        let mut store = MemoryStore::new();
        store
            .store(StoreDomain::Retained, StoreKey::CrashLog, &[0xA5; CRASH_RECORD_LEN])
            .unwrap();

        let mut recorder = CrashRecorder::new();
        let result = recorder.begin(&mut store, boot(ResetReason::PowerOn, 1_000));

        assert!(!result.corrupted);
        assert_eq!(recorder.record().boot_count, 1);
    }

    #[test]
    fn reporting_clears_details_but_keeps_counts() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();
        recorder.begin(&mut store, boot(ResetReason::TaskWatchdog, 5_000));
        recorder.mark_reported(&mut store);

        assert!(!recorder.has_crash_info());
        let reloaded = CrashRecorder::load(&mut store);
        assert!(reloaded.record().is_valid());
        assert!(!reloaded.has_crash_info());
        assert_eq!(reloaded.record().crash_count, 1);
        assert_eq!(reloaded.record().boot_count, 1);
    }

    #[test]
    fn unreported_crash_survives_a_clean_reboot() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();
        recorder.begin(&mut store, boot(ResetReason::Brownout, 5_000));
        recorder.begin(&mut store, boot(ResetReason::DeepSleepWake, 5_000));

        assert!(recorder.has_crash_info());
        assert_eq!(recorder.report().unwrap().reset_reason, ResetReason::Brownout);
        assert_eq!(recorder.record().crash_count, 1);
    }

    #[test]
    fn breadcrumb_truncates_to_31_bytes() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();
        recorder.begin(&mut store, boot(ResetReason::PowerOn, 1));

        recorder.record_function(&mut store, "a_function_name_that_is_far_too_long_to_fit");
        assert_eq!(recorder.record().last_function().len(), 31);
        assert_eq!(recorder.record().last_function[31], 0);
        assert!(recorder.record().is_valid());

        recorder.record_function(&mut store, "short");
        assert_eq!(recorder.record().last_function(), "short");
        assert_eq!(CrashRecorder::load(&mut store).record().last_function(), "short");
    }

    #[test]
    fn min_free_heap_tracks_lowest_boot() {
        let mut store = MemoryStore::new();
        let mut recorder = CrashRecorder::new();
        recorder.begin(&mut store, boot(ResetReason::PowerOn, 80_000));
        recorder.begin(&mut store, boot(ResetReason::DeepSleepWake, 60_000));
        recorder.begin(&mut store, boot(ResetReason::DeepSleepWake, 70_000));

        assert_eq!(recorder.record().min_free_heap, 60_000);
    }

    #[test]
    fn checksum_detects_single_byte_changes() {
        let data = *b"envnode crash record payload";
        let base = checksum16(&data);
        for index in 0..data.len() {
            let mut damaged = data;
            damaged[index] ^= 0x10;
            assert_ne!(checksum16(&damaged), base, "index {}", index);
        }
    }
}
