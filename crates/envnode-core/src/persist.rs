//! State carried from one wake cycle to the next.
//!
//! The whole record is written to the retained domain as one checksummed
//! image on every sleep. Operator settings and the corruption counter are
//! also mirrored into the durable domain so they outlive a power cut.

use log::{info, warn};

use crate::refresh::fnv1a;
use crate::store::{PersistentStore, StoreDomain, StoreKey};

const WAKE_MAGIC: [u8; 4] = *b"ENW1";
const WAKE_VERSION: u8 = 1;
pub const WAKE_IMAGE_LEN: usize = 64;
const CHECKSUM_OFFSET: usize = WAKE_IMAGE_LEN - 4;

const FLAG_FULL_REFRESH: u8 = 1 << 0;
const FLAG_FULL_ONLY: u8 = 1 << 1;
const FLAG_DIAGNOSTIC: u8 = 1 << 2;
const FLAG_DURABLE_SYNCED: u8 = 1 << 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordError {
    BadMagic,
    UnsupportedVersion,
    Truncated,
    Checksum,
}

/// Everything the node remembers across deep sleep.
///
/// Defaults are safe to read before anything was loaded: counters are zero,
/// measurements are NaN, the icon is -1 and fingerprints are 0 (none).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PersistentRecord {
    pub wake_count: u32,
    pub last_inside_temp_f: f32,
    pub last_outside_temp_f: f32,
    pub last_inside_rh: f32,
    pub last_outside_rh: f32,
    pub last_pressure_hpa: f32,
    pub last_icon_id: i32,
    pub last_status_crc: u32,
    pub last_weather_crc: u32,
    pub needs_full_refresh_on_boot: bool,
    pub full_only_mode: bool,
    pub trend_reference_f: f32,
    pub partials_since_full: u16,
    pub custom_sleep_interval_s: u32,
    pub diagnostic_mode: bool,
    pub corruption_count: u32,
    pub publish_drops: u32,
}

impl Default for PersistentRecord {
    fn default() -> Self {
        Self {
            wake_count: 0,
            last_inside_temp_f: f32::NAN,
            last_outside_temp_f: f32::NAN,
            last_inside_rh: f32::NAN,
            last_outside_rh: f32::NAN,
            last_pressure_hpa: f32::NAN,
            last_icon_id: -1,
            last_status_crc: 0,
            last_weather_crc: 0,
            needs_full_refresh_on_boot: false,
            full_only_mode: false,
            trend_reference_f: f32::NAN,
            partials_since_full: 0,
            custom_sleep_interval_s: 0,
            diagnostic_mode: false,
            corruption_count: 0,
            publish_drops: 0,
        }
    }
}

impl PersistentRecord {
    fn encode(&self, durable_synced: bool) -> [u8; WAKE_IMAGE_LEN] {
        let mut buf = [0u8; WAKE_IMAGE_LEN];
        buf[0..4].copy_from_slice(&WAKE_MAGIC);
        buf[4] = WAKE_VERSION;

        let mut flags = 0u8;
        if self.needs_full_refresh_on_boot {
            flags |= FLAG_FULL_REFRESH;
        }
        if self.full_only_mode {
            flags |= FLAG_FULL_ONLY;
        }
        if self.diagnostic_mode {
            flags |= FLAG_DIAGNOSTIC;
        }
        if durable_synced {
            flags |= FLAG_DURABLE_SYNCED;
        }
        buf[5] = flags;

        buf[6..8].copy_from_slice(&self.partials_since_full.to_le_bytes());
        buf[8..12].copy_from_slice(&self.wake_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.last_inside_temp_f.to_le_bytes());
        buf[16..20].copy_from_slice(&self.last_outside_temp_f.to_le_bytes());
        buf[20..24].copy_from_slice(&self.last_inside_rh.to_le_bytes());
        buf[24..28].copy_from_slice(&self.last_outside_rh.to_le_bytes());
        buf[28..32].copy_from_slice(&self.last_pressure_hpa.to_le_bytes());
        buf[32..36].copy_from_slice(&self.last_icon_id.to_le_bytes());
        buf[36..40].copy_from_slice(&self.last_status_crc.to_le_bytes());
        buf[40..44].copy_from_slice(&self.last_weather_crc.to_le_bytes());
        buf[44..48].copy_from_slice(&self.trend_reference_f.to_le_bytes());
        buf[48..52].copy_from_slice(&self.custom_sleep_interval_s.to_le_bytes());
        buf[52..56].copy_from_slice(&self.corruption_count.to_le_bytes());
        buf[56..60].copy_from_slice(&self.publish_drops.to_le_bytes());

        let checksum = fnv1a(&buf[..CHECKSUM_OFFSET]);
        buf[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Returns the record and whether the durable mirror was in sync when
    /// the image was written.
    fn decode(buf: &[u8]) -> Result<(Self, bool), RecordError> {
        if buf.len() < 5 {
            return Err(RecordError::Truncated);
        }
        if buf[0..4] != WAKE_MAGIC {
            return Err(RecordError::BadMagic);
        }
        if buf[4] != WAKE_VERSION {
            return Err(RecordError::UnsupportedVersion);
        }
        if buf.len() < WAKE_IMAGE_LEN {
            return Err(RecordError::Truncated);
        }

        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let f32_at = |at: usize| f32::from_bits(u32_at(at));

        if u32_at(CHECKSUM_OFFSET) != fnv1a(&buf[..CHECKSUM_OFFSET]) {
            return Err(RecordError::Checksum);
        }

        let flags = buf[5];
        let record = Self {
            wake_count: u32_at(8),
            last_inside_temp_f: f32_at(12),
            last_outside_temp_f: f32_at(16),
            last_inside_rh: f32_at(20),
            last_outside_rh: f32_at(24),
            last_pressure_hpa: f32_at(28),
            last_icon_id: u32_at(32) as i32,
            last_status_crc: u32_at(36),
            last_weather_crc: u32_at(40),
            needs_full_refresh_on_boot: flags & FLAG_FULL_REFRESH != 0,
            full_only_mode: flags & FLAG_FULL_ONLY != 0,
            trend_reference_f: f32_at(44),
            partials_since_full: u16::from_le_bytes([buf[6], buf[7]]),
            custom_sleep_interval_s: u32_at(48),
            diagnostic_mode: flags & FLAG_DIAGNOSTIC != 0,
            corruption_count: u32_at(52),
            publish_drops: u32_at(56),
        };
        Ok((record, flags & FLAG_DURABLE_SYNCED != 0))
    }
}

/// How the record for this cycle was obtained.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOrigin {
    /// Retained image was intact.
    Resumed,
    /// No retained image; first boot after power loss.
    ColdBoot,
    /// Retained image failed its checksum and was discarded.
    Corrupted,
}

/// Last values known to be in the durable domain. `None` forces a write.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct DurableMirror {
    custom_sleep_interval_s: Option<u32>,
    full_only_mode: Option<bool>,
    diagnostic_mode: Option<bool>,
    corruption_count: Option<u32>,
}

impl DurableMirror {
    fn from_record(record: &PersistentRecord) -> Self {
        Self {
            custom_sleep_interval_s: Some(record.custom_sleep_interval_s),
            full_only_mode: Some(record.full_only_mode),
            diagnostic_mode: Some(record.diagnostic_mode),
            corruption_count: Some(record.corruption_count),
        }
    }

    fn matches(&self, record: &PersistentRecord) -> bool {
        *self == Self::from_record(record)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PersistentState {
    record: PersistentRecord,
    durable: DurableMirror,
    origin: LoadOrigin,
}

impl PersistentState {
    /// Resumes from the retained image, or rebuilds from durable settings.
    pub fn load<S: PersistentStore + ?Sized>(store: &mut S) -> Self {
        let mut buf = [0u8; WAKE_IMAGE_LEN];
        let decoded = match store.load(StoreDomain::Retained, StoreKey::WakeState, &mut buf) {
            Ok(Some(len)) => Some(PersistentRecord::decode(&buf[..len])),
            Ok(None) => None,
            Err(err) => {
                warn!("persist: retained read failed: {:?}", err);
                None
            }
        };

        let origin = match decoded {
            Some(Ok((record, synced))) => {
                let durable = if synced {
                    DurableMirror::from_record(&record)
                } else {
                    DurableMirror::default()
                };
                info!(
                    "persist: resumed wake_count={} full_refresh={}",
                    record.wake_count, record.needs_full_refresh_on_boot
                );
                return Self {
                    record,
                    durable,
                    origin: LoadOrigin::Resumed,
                };
            }
            Some(Err(RecordError::Checksum)) => LoadOrigin::Corrupted,
            Some(Err(err)) => {
                info!("persist: retained image unusable ({:?}), cold boot", err);
                LoadOrigin::ColdBoot
            }
            None => LoadOrigin::ColdBoot,
        };

        let mut record = PersistentRecord::default();
        let durable = DurableMirror {
            custom_sleep_interval_s: read_durable(store, StoreKey::CustomSleepInterval, |s, k| {
                s.load_u32(StoreDomain::Durable, k)
            }),
            full_only_mode: read_durable(store, StoreKey::FullOnlyMode, |s, k| {
                s.load_bool(StoreDomain::Durable, k)
            }),
            diagnostic_mode: read_durable(store, StoreKey::DiagnosticMode, |s, k| {
                s.load_bool(StoreDomain::Durable, k)
            }),
            corruption_count: read_durable(store, StoreKey::CorruptionCount, |s, k| {
                s.load_u32(StoreDomain::Durable, k)
            }),
        };
        record.custom_sleep_interval_s = durable.custom_sleep_interval_s.unwrap_or(0);
        record.full_only_mode = durable.full_only_mode.unwrap_or(false);
        record.diagnostic_mode = durable.diagnostic_mode.unwrap_or(false);
        record.corruption_count = durable.corruption_count.unwrap_or(0);
        record.needs_full_refresh_on_boot = true;

        let mut state = Self {
            record,
            durable,
            origin,
        };
        if origin == LoadOrigin::Corrupted {
            warn!("persist: retained image failed checksum, discarded");
            state.note_corruption();
        } else {
            info!("persist: cold boot, forcing full refresh");
        }
        state
    }

    pub const fn origin(&self) -> LoadOrigin {
        self.origin
    }

    pub const fn record(&self) -> &PersistentRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut PersistentRecord {
        &mut self.record
    }

    /// Counts a discarded record and forces a full redraw.
    pub fn note_corruption(&mut self) {
        self.record.corruption_count = self.record.corruption_count.saturating_add(1);
        self.record.needs_full_refresh_on_boot = true;
    }

    pub fn increment_wake_count(&mut self) -> u32 {
        self.record.wake_count = self.record.wake_count.wrapping_add(1);
        self.record.wake_count
    }

    /// Operator reset; nothing else lowers the wake count.
    pub fn reset_wake_count(&mut self) {
        info!("persist: wake count reset from {}", self.record.wake_count);
        self.record.wake_count = 0;
    }

    /// Stages changed durable keys and commits them together, then writes
    /// the retained image.
    ///
    /// Every write is attempted; the first error is returned.
    pub fn save<S: PersistentStore + ?Sized>(&mut self, store: &mut S) -> Result<(), S::Error> {
        let mut first_error = None;
        let record = self.record;
        let mut staged = self.durable;

        if staged.custom_sleep_interval_s != Some(record.custom_sleep_interval_s) {
            match store.store_u32(
                StoreDomain::Durable,
                StoreKey::CustomSleepInterval,
                record.custom_sleep_interval_s,
            ) {
                Ok(()) => staged.custom_sleep_interval_s = Some(record.custom_sleep_interval_s),
                Err(err) => keep_first(&mut first_error, err),
            }
        }
        if staged.full_only_mode != Some(record.full_only_mode) {
            match store.store_bool(StoreDomain::Durable, StoreKey::FullOnlyMode, record.full_only_mode) {
                Ok(()) => staged.full_only_mode = Some(record.full_only_mode),
                Err(err) => keep_first(&mut first_error, err),
            }
        }
        if staged.diagnostic_mode != Some(record.diagnostic_mode) {
            match store.store_bool(StoreDomain::Durable, StoreKey::DiagnosticMode, record.diagnostic_mode) {
                Ok(()) => staged.diagnostic_mode = Some(record.diagnostic_mode),
                Err(err) => keep_first(&mut first_error, err),
            }
        }
        if staged.corruption_count != Some(record.corruption_count) {
            match store.store_u32(StoreDomain::Durable, StoreKey::CorruptionCount, record.corruption_count) {
                Ok(()) => staged.corruption_count = Some(record.corruption_count),
                Err(err) => keep_first(&mut first_error, err),
            }
        }

        if staged != self.durable {
            match store.commit() {
                Ok(()) => self.durable = staged,
                Err(err) => keep_first(&mut first_error, err),
            }
        }

        let image = record.encode(self.durable.matches(&record));
        if let Err(err) = store.store(StoreDomain::Retained, StoreKey::WakeState, &image) {
            keep_first(&mut first_error, err);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn read_durable<S, T>(
    store: &mut S,
    key: StoreKey,
    read: impl FnOnce(&mut S, StoreKey) -> Result<Option<T>, S::Error>,
) -> Option<T>
where
    S: PersistentStore + ?Sized,
    T: Default,
{
    match read(store, key) {
        Ok(Some(value)) => Some(value),
        // Never written: the default is what the durable domain implies.
        Ok(None) => Some(T::default()),
        Err(err) => {
            warn!("persist: durable {} read failed: {:?}", key.as_str(), err);
            None
        }
    }
}

fn keep_first<E>(slot: &mut Option<E>, err: E) {
    if slot.is_none() {
        *slot = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemoryStore;

    #[test]
    fn cold_boot_forces_full_refresh_with_safe_defaults() {
        let mut store = MemoryStore::new();
        let state = PersistentState::load(&mut store);

        assert_eq!(state.origin(), LoadOrigin::ColdBoot);
        let record = state.record();
        assert!(record.needs_full_refresh_on_boot);
        assert_eq!(record.wake_count, 0);
        assert!(record.last_inside_temp_f.is_nan());
        assert!(record.last_pressure_hpa.is_nan());
        assert_eq!(record.last_icon_id, -1);
        assert_eq!(record.last_status_crc, 0);
        assert_eq!(record.corruption_count, 0);
    }

    #[test]
    fn saved_record_resumes_after_sleep() {
        let mut store = MemoryStore::new();
        let mut state = PersistentState::load(&mut store);
        {
            let record = state.record_mut();
            record.needs_full_refresh_on_boot = false;
            record.last_inside_temp_f = 71.5;
            record.last_icon_id = 3;
            record.last_weather_crc = 0xDEAD_BEEF;
            record.partials_since_full = 7;
            record.publish_drops = 2;
        }
        state.increment_wake_count();
        state.save(&mut store).unwrap();

        let resumed = PersistentState::load(&mut store);
        assert_eq!(resumed.origin(), LoadOrigin::Resumed);
        let record = resumed.record();
        assert_eq!(record.wake_count, 1);
        assert!(!record.needs_full_refresh_on_boot);
        assert_eq!(record.last_inside_temp_f, 71.5);
        assert_eq!(record.last_icon_id, 3);
        assert_eq!(record.last_weather_crc, 0xDEAD_BEEF);
        assert_eq!(record.partials_since_full, 7);
        assert_eq!(record.publish_drops, 2);
        assert!(record.last_outside_rh.is_nan());
    }

    #[test]
    fn unchanged_settings_are_not_rewritten_to_flash() {
        let mut store = MemoryStore::new();
        let mut state = PersistentState::load(&mut store);
        state.save(&mut store).unwrap();
        assert_eq!(store.write_count(StoreDomain::Durable), 0);

        let mut state = PersistentState::load(&mut store);
        state.record_mut().custom_sleep_interval_s = 900;
        state.save(&mut store).unwrap();
        assert_eq!(store.write_count(StoreDomain::Durable), 1);

        let mut state = PersistentState::load(&mut store);
        state.increment_wake_count();
        state.save(&mut store).unwrap();
        assert_eq!(store.write_count(StoreDomain::Durable), 1);
        assert_eq!(store.write_count(StoreDomain::Retained), 3);
    }

    #[test]
    fn changed_settings_share_one_commit() {
        let mut store = MemoryStore::new();
        let mut state = PersistentState::load(&mut store);
        state.save(&mut store).unwrap();
        assert_eq!(store.commit_count(), 0);

        state.record_mut().custom_sleep_interval_s = 900;
        state.record_mut().full_only_mode = true;
        state.record_mut().diagnostic_mode = true;
        state.note_corruption();
        state.save(&mut store).unwrap();

        assert_eq!(store.write_count(StoreDomain::Durable), 4);
        assert_eq!(store.commit_count(), 1);

        state.increment_wake_count();
        state.save(&mut store).unwrap();
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn settings_survive_power_loss_but_wake_count_does_not() {
        let mut store = MemoryStore::new();
        let mut state = PersistentState::load(&mut store);
        state.record_mut().full_only_mode = true;
        state.record_mut().diagnostic_mode = true;
        state.record_mut().custom_sleep_interval_s = 600;
        state.increment_wake_count();
        state.save(&mut store).unwrap();

        store.power_cycle();
        let state = PersistentState::load(&mut store);

        assert_eq!(state.origin(), LoadOrigin::ColdBoot);
        assert!(state.record().full_only_mode);
        assert!(state.record().diagnostic_mode);
        assert_eq!(state.record().custom_sleep_interval_s, 600);
        assert_eq!(state.record().wake_count, 0);
    }

    #[test]
    fn corrupted_image_is_discarded_and_counted() {
        let mut store = MemoryStore::new();
        let mut state = PersistentState::load(&mut store);
        state.record_mut().needs_full_refresh_on_boot = false;
        state.record_mut().last_inside_temp_f = 70.0;
        state.save(&mut store).unwrap();

        assert!(store.corrupt_byte(StoreDomain::Retained, StoreKey::WakeState, 13));
        let mut state = PersistentState::load(&mut store);

        assert_eq!(state.origin(), LoadOrigin::Corrupted);
        assert_eq!(state.record().corruption_count, 1);
        assert!(state.record().needs_full_refresh_on_boot);
        assert!(state.record().last_inside_temp_f.is_nan());

        state.save(&mut store).unwrap();
        assert_eq!(
            store.load_u32(StoreDomain::Durable, StoreKey::CorruptionCount),
            Ok(Some(1))
        );
    }

    #[test]
    fn unknown_version_is_treated_as_absent() {
        let mut store = MemoryStore::new();
        let mut image = PersistentRecord::default().encode(true);
        image[4] = WAKE_VERSION + 1;
        store
            .store(StoreDomain::Retained, StoreKey::WakeState, &image)
            .unwrap();

        let state = PersistentState::load(&mut store);
        assert_eq!(state.origin(), LoadOrigin::ColdBoot);
        assert_eq!(state.record().corruption_count, 0);
    }

    #[test]
    fn decode_reports_each_failure() {
        let image = PersistentRecord::default().encode(false);
        assert_eq!(
            PersistentRecord::decode(&image[..10]),
            Err(RecordError::Truncated)
        );
        let mut bad_magic = image;
        bad_magic[0] = b'X';
        assert_eq!(
            PersistentRecord::decode(&bad_magic),
            Err(RecordError::BadMagic)
        );
        let mut bad_sum = image;
        bad_sum[CHECKSUM_OFFSET] ^= 0xFF;
        assert_eq!(
            PersistentRecord::decode(&bad_sum),
            Err(RecordError::Checksum)
        );
    }

    #[test]
    fn failed_durable_write_is_retried_next_save() {
        let mut store = MemoryStore::new();
        let mut state = PersistentState::load(&mut store);
        state.record_mut().diagnostic_mode = true;
        store.set_fail_writes(true);
        assert!(state.save(&mut store).is_err());

        store.set_fail_writes(false);
        state.save(&mut store).unwrap();
        assert_eq!(
            store.load_bool(StoreDomain::Durable, StoreKey::DiagnosticMode),
            Ok(Some(true))
        );
    }

    #[test]
    fn wake_count_reset_is_explicit() {
        let mut store = MemoryStore::new();
        let mut state = PersistentState::load(&mut store);
        for _ in 0..5 {
            state.increment_wake_count();
        }
        assert_eq!(state.record().wake_count, 5);
        state.reset_wake_count();
        assert_eq!(state.record().wake_count, 0);
    }
}
