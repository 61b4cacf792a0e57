use heapless::Vec;

use super::{PersistentStore, StoreDomain, StoreKey};

const MOCK_VALUE_BYTES: usize = 128;
const KEY_COUNT: usize = StoreKey::ALL.len();

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MockStoreError {
    WriteRejected,
    ValueTooLarge,
}

/// RAM-only store used on the host and as a stand-in during bring-up.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    retained: [Option<Vec<u8, MOCK_VALUE_BYTES>>; KEY_COUNT],
    durable: [Option<Vec<u8, MOCK_VALUE_BYTES>>; KEY_COUNT],
    fail_writes: bool,
    writes: [u32; 2],
    commits: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `store` and `commit` call fail until cleared.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Number of successful writes to `domain`.
    pub fn write_count(&self, domain: StoreDomain) -> u32 {
        self.writes[Self::domain_index(domain)]
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u32 {
        self.commits
    }

    /// Drops the retained domain, like a full power cycle does.
    pub fn power_cycle(&mut self) {
        self.retained = Default::default();
    }

    /// Raw view of a stored value.
    pub fn raw(&self, domain: StoreDomain, key: StoreKey) -> Option<&[u8]> {
        self.slots(domain)[key.slot()].as_deref()
    }

    /// Flips one bit of a stored value; returns `false` if nothing is there.
    pub fn corrupt_byte(&mut self, domain: StoreDomain, key: StoreKey, index: usize) -> bool {
        let slot = match domain {
            StoreDomain::Retained => &mut self.retained[key.slot()],
            StoreDomain::Durable => &mut self.durable[key.slot()],
        };
        match slot.as_mut().and_then(|value| value.get_mut(index)) {
            Some(byte) => {
                *byte ^= 0x01;
                true
            }
            None => false,
        }
    }

    fn slots(&self, domain: StoreDomain) -> &[Option<Vec<u8, MOCK_VALUE_BYTES>>; KEY_COUNT] {
        match domain {
            StoreDomain::Retained => &self.retained,
            StoreDomain::Durable => &self.durable,
        }
    }

    fn domain_index(domain: StoreDomain) -> usize {
        match domain {
            StoreDomain::Retained => 0,
            StoreDomain::Durable => 1,
        }
    }
}

impl PersistentStore for MemoryStore {
    type Error = MockStoreError;

    fn load(
        &mut self,
        domain: StoreDomain,
        key: StoreKey,
        out: &mut [u8],
    ) -> Result<Option<usize>, Self::Error> {
        let Some(value) = self.slots(domain)[key.slot()].as_ref() else {
            return Ok(None);
        };
        let len = value.len().min(out.len());
        out[..len].copy_from_slice(&value[..len]);
        Ok(Some(len))
    }

    fn store(
        &mut self,
        domain: StoreDomain,
        key: StoreKey,
        data: &[u8],
    ) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MockStoreError::WriteRejected);
        }
        let value = Vec::from_slice(data).map_err(|_| MockStoreError::ValueTooLarge)?;
        match domain {
            StoreDomain::Retained => self.retained[key.slot()] = Some(value),
            StoreDomain::Durable => self.durable[key.slot()] = Some(value),
        }
        self.writes[Self::domain_index(domain)] += 1;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MockStoreError::WriteRejected);
        }
        self.commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_values_round_through_the_durable_domain() {
        let mut store = MemoryStore::new();
        store
            .store_u32(StoreDomain::Durable, StoreKey::CustomSleepInterval, 900)
            .unwrap();
        store
            .store_bool(StoreDomain::Durable, StoreKey::FullOnlyMode, true)
            .unwrap();

        assert_eq!(
            store.load_u32(StoreDomain::Durable, StoreKey::CustomSleepInterval),
            Ok(Some(900))
        );
        assert_eq!(
            store.load_bool(StoreDomain::Durable, StoreKey::FullOnlyMode),
            Ok(Some(true))
        );
        assert_eq!(
            store.load_u32(StoreDomain::Retained, StoreKey::CustomSleepInterval),
            Ok(None)
        );
    }

    #[test]
    fn power_cycle_keeps_durable_values_only() {
        let mut store = MemoryStore::new();
        store
            .store(StoreDomain::Retained, StoreKey::WakeState, &[1, 2, 3])
            .unwrap();
        store
            .store_bool(StoreDomain::Durable, StoreKey::DiagnosticMode, true)
            .unwrap();

        store.power_cycle();

        assert_eq!(store.raw(StoreDomain::Retained, StoreKey::WakeState), None);
        assert_eq!(
            store.raw(StoreDomain::Durable, StoreKey::DiagnosticMode),
            Some(&[1u8][..])
        );
    }

    #[test]
    fn rejected_writes_leave_previous_value() {
        let mut store = MemoryStore::new();
        store
            .store_u32(StoreDomain::Durable, StoreKey::CorruptionCount, 1)
            .unwrap();
        store.set_fail_writes(true);

        assert!(
            store
                .store_u32(StoreDomain::Durable, StoreKey::CorruptionCount, 2)
                .is_err()
        );
        assert_eq!(
            store.load_u32(StoreDomain::Durable, StoreKey::CorruptionCount),
            Ok(Some(1))
        );
    }
}
