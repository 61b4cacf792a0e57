//! Board persistence: RTC fast memory for the retained domain, a flash slot
//! table for the durable one.

pub mod flash_store;
pub mod rtc_store;

use envnode_core::store::{PersistentStore, StoreDomain, StoreKey};

use flash_store::{FlashStore, FlashStoreError};
use rtc_store::{RetainedError, RtcStore};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StoreError {
    Retained(RetainedError),
    Flash(FlashStoreError),
    /// Flash could not be mapped at boot; durable keys behave as absent
    /// and writes fail.
    DurableUnavailable,
}

#[derive(Debug)]
pub struct BoardStore {
    retained: RtcStore,
    durable: Option<FlashStore>,
}

impl BoardStore {
    pub fn new(retained: RtcStore, durable: Option<FlashStore>) -> Self {
        Self { retained, durable }
    }

    pub fn has_durable(&self) -> bool {
        self.durable.is_some()
    }
}

impl PersistentStore for BoardStore {
    type Error = StoreError;

    fn load(
        &mut self,
        domain: StoreDomain,
        key: StoreKey,
        out: &mut [u8],
    ) -> Result<Option<usize>, Self::Error> {
        match domain {
            StoreDomain::Retained => Ok(self.retained.load(key, out)),
            StoreDomain::Durable => match self.durable.as_mut() {
                Some(flash) => flash.load(key, out).map_err(StoreError::Flash),
                None => Ok(None),
            },
        }
    }

    fn store(&mut self, domain: StoreDomain, key: StoreKey, data: &[u8]) -> Result<(), Self::Error> {
        match domain {
            StoreDomain::Retained => self.retained.store(key, data).map_err(StoreError::Retained),
            StoreDomain::Durable => self
                .durable
                .as_mut()
                .ok_or(StoreError::DurableUnavailable)?
                .store(key, data)
                .map_err(StoreError::Flash),
        }
    }

    fn commit(&mut self) -> Result<(), Self::Error> {
        match self.durable.as_mut() {
            Some(flash) => flash.commit().map_err(StoreError::Flash),
            None => Ok(()),
        }
    }
}
