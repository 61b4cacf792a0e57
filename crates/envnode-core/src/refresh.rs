//! Per-region content fingerprints that gate partial display refreshes.

use core::fmt::Write;

use heapless::{String, Vec};
use log::debug;

pub const MAX_REGIONS: usize = 16;
pub const CANONICAL_BYTES: usize = 32;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Canonical text for a numeric value at `precision` decimals.
///
/// `72.50` and `72.5` at one decimal produce the same string, so they hash
/// the same. Non-finite values render as `--`.
pub fn canonical_value(value: f32, precision: u8) -> String<CANONICAL_BYTES> {
    let mut out = String::new();
    if value.is_finite() {
        let _ = write!(out, "{:.*}", precision as usize, value);
    } else {
        let _ = out.push_str("--");
    }
    out
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegionState {
    pub region_id: u8,
    /// `None` until content has been hashed once.
    pub content_hash: Option<u32>,
    pub dirty: bool,
}

/// Cumulative diagnostics, resettable.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RefreshStats {
    pub total_checks: u32,
    pub actual_updates: u32,
    pub skipped_updates: u32,
    pub rejected_registrations: u32,
}

/// Tracks which display regions need a redraw.
///
/// A region reports changed while its dirty flag is set, so a redraw that
/// failed or was cut short is retried without re-hashing. Callers clear the
/// flag with [`mark_clean`](Self::mark_clean) once the panel shows the new
/// content.
#[derive(Clone, Debug, Default)]
pub struct ChangeDetector {
    regions: Vec<RegionState, MAX_REGIONS>,
    stats: RefreshStats,
}

impl ChangeDetector {
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
            stats: RefreshStats {
                total_checks: 0,
                actual_updates: 0,
                skipped_updates: 0,
                rejected_registrations: 0,
            },
        }
    }

    /// Registers `id`. Already-registered ids are left as they are; ids
    /// beyond capacity are dropped and counted.
    pub fn register_region(&mut self, id: u8) {
        self.insert(RegionState {
            region_id: id,
            content_hash: None,
            dirty: false,
        });
    }

    /// Registers `id` as clean with a hash carried over from before sleep.
    pub fn restore_region(&mut self, id: u8, content_hash: u32) {
        match self.find_mut(id) {
            Some(region) => {
                region.content_hash = Some(content_hash);
                region.dirty = false;
            }
            None => self.insert(RegionState {
                region_id: id,
                content_hash: Some(content_hash),
                dirty: false,
            }),
        }
    }

    fn insert(&mut self, state: RegionState) {
        if self.find(state.region_id).is_some() {
            return;
        }
        if self.regions.push(state).is_err() {
            self.stats.rejected_registrations = self.stats.rejected_registrations.saturating_add(1);
            debug!("refresh: region table full, dropped id={}", state.region_id);
        }
    }

    pub fn is_registered(&self, id: u8) -> bool {
        self.find(id).is_some()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Hashes `content` and reports whether region `id` needs a redraw.
    /// Unregistered ids always report changed.
    pub fn has_content_changed(&mut self, id: u8, content: &str) -> bool {
        self.has_hash_changed(id, fnv1a(content.as_bytes()))
    }

    pub fn has_value_changed(&mut self, id: u8, value: f32, precision: u8) -> bool {
        self.has_content_changed(id, canonical_value(value, precision).as_str())
    }

    pub fn has_hash_changed(&mut self, id: u8, hash: u32) -> bool {
        self.stats.total_checks = self.stats.total_checks.saturating_add(1);

        let changed = match self.find_mut(id) {
            Some(region) => {
                let changed = region.dirty || region.content_hash != Some(hash);
                if changed {
                    region.content_hash = Some(hash);
                    region.dirty = true;
                }
                changed
            }
            None => true,
        };

        if changed {
            self.stats.actual_updates = self.stats.actual_updates.saturating_add(1);
        } else {
            self.stats.skipped_updates = self.stats.skipped_updates.saturating_add(1);
        }
        debug!("refresh: region={} changed={}", id, changed);
        changed
    }

    /// Stored hash for `id`, if any content has been seen.
    pub fn content_hash(&self, id: u8) -> Option<u32> {
        self.find(id).and_then(|region| region.content_hash)
    }

    pub fn is_dirty(&self, id: u8) -> bool {
        self.find(id).is_some_and(|region| region.dirty)
    }

    pub fn mark_dirty(&mut self, id: u8) {
        if let Some(region) = self.find_mut(id) {
            region.dirty = true;
        }
    }

    pub fn mark_clean(&mut self, id: u8) {
        if let Some(region) = self.find_mut(id) {
            region.dirty = false;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for region in self.regions.iter_mut() {
            region.dirty = true;
        }
    }

    /// Bit `n` set when region id `n` is dirty. Ids above 31 are not
    /// representable and are left out.
    pub fn dirty_mask(&self) -> u32 {
        self.regions
            .iter()
            .filter(|region| region.dirty && region.region_id < 32)
            .fold(0u32, |mask, region| mask | (1u32 << region.region_id))
    }

    pub fn stats(&self) -> RefreshStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RefreshStats::default();
    }

    fn find(&self, id: u8) -> Option<&RegionState> {
        self.regions.iter().find(|region| region.region_id == id)
    }

    fn find_mut(&mut self, id: u8) -> Option<&mut RegionState> {
        self.regions.iter_mut().find(|region| region.region_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0x811C_9DC5);
        assert_eq!(fnv1a(b"a"), 0xE40C_292C);
        assert_eq!(fnv1a(b"foobar"), 0xBF9C_F968);
    }

    #[test]
    fn canonical_value_normalizes_precision() {
        assert_eq!(canonical_value(72.50, 1).as_str(), "72.5");
        assert_eq!(canonical_value(72.5, 1).as_str(), "72.5");
        assert_eq!(canonical_value(45.0, 0).as_str(), "45");
        assert_eq!(canonical_value(f32::NAN, 1).as_str(), "--");
    }

    #[test]
    fn fresh_region_reports_changed_then_settles() {
        let mut detector = ChangeDetector::new();
        detector.register_region(0);

        assert!(detector.has_content_changed(0, "72.5"));
        detector.mark_clean(0);
        assert!(!detector.has_content_changed(0, "72.5"));
        assert!(detector.has_content_changed(0, "72.6"));
    }

    #[test]
    fn dirty_flag_is_sticky_until_cleaned() {
        let mut detector = ChangeDetector::new();
        detector.register_region(3);

        assert!(detector.has_content_changed(3, "a"));
        // Redraw never happened: same content still needs drawing.
        assert!(detector.has_content_changed(3, "a"));
        detector.mark_clean(3);
        assert!(!detector.has_content_changed(3, "a"));

        detector.mark_dirty(3);
        assert!(detector.has_content_changed(3, "a"));
    }

    #[test]
    fn equal_values_at_precision_do_not_redraw() {
        let mut detector = ChangeDetector::new();
        detector.register_region(1);

        assert!(detector.has_value_changed(1, 72.50, 1));
        detector.mark_clean(1);
        assert!(!detector.has_value_changed(1, 72.5, 1));
        assert!(!detector.has_value_changed(1, 72.54, 1));
        assert!(detector.has_value_changed(1, 72.7, 1));
    }

    #[test]
    fn unregistered_region_always_changes() {
        let mut detector = ChangeDetector::new();
        assert!(detector.has_content_changed(9, "x"));
        assert!(detector.has_content_changed(9, "x"));
        assert!(!detector.is_registered(9));
    }

    #[test]
    fn dirty_mask_reflects_marked_regions() {
        let mut detector = ChangeDetector::new();
        for id in 0..3 {
            detector.register_region(id);
        }
        detector.mark_dirty(0);
        detector.mark_dirty(2);

        assert_eq!(detector.dirty_mask(), 0b101);

        detector.mark_all_dirty();
        assert_eq!(detector.dirty_mask(), 0b111);
    }

    #[test]
    fn duplicate_registration_is_a_noop() {
        let mut detector = ChangeDetector::new();
        detector.register_region(4);
        assert!(detector.has_content_changed(4, "x"));
        detector.mark_clean(4);

        detector.register_region(4);
        assert_eq!(detector.region_count(), 1);
        assert!(!detector.has_content_changed(4, "x"));
    }

    #[test]
    fn registrations_past_capacity_are_dropped() {
        let mut detector = ChangeDetector::new();
        for id in 0..20u8 {
            detector.register_region(id);
        }

        assert_eq!(detector.region_count(), MAX_REGIONS);
        assert!(detector.is_registered(15));
        assert!(!detector.is_registered(16));
        assert_eq!(detector.stats().rejected_registrations, 4);
    }

    #[test]
    fn restored_region_starts_clean() {
        let mut detector = ChangeDetector::new();
        detector.restore_region(2, fnv1a(b"71.3"));

        assert!(!detector.has_content_changed(2, "71.3"));
        assert!(detector.has_content_changed(2, "71.4"));
    }

    #[test]
    fn stats_count_checks_and_reset() {
        let mut detector = ChangeDetector::new();
        detector.register_region(0);
        detector.has_content_changed(0, "a");
        detector.mark_clean(0);
        detector.has_content_changed(0, "a");
        detector.has_content_changed(0, "b");

        let stats = detector.stats();
        assert_eq!(stats.total_checks, 3);
        assert_eq!(stats.actual_updates, 2);
        assert_eq!(stats.skipped_updates, 1);

        detector.reset_stats();
        assert_eq!(detector.stats(), RefreshStats::default());
    }
}
