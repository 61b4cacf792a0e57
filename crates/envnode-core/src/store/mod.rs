//! Persistent key/value storage abstraction.

pub mod mock;

/// Which memory survives what.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreDomain {
    /// Low-power RAM: survives deep sleep and soft resets, lost on power loss.
    Retained,
    /// Flash: survives power loss. Writes wear the part, keep them rare.
    Durable,
}

/// Keys understood by every store backend.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreKey {
    WakeState,
    CrashLog,
    CustomSleepInterval,
    FullOnlyMode,
    DiagnosticMode,
    CorruptionCount,
}

impl StoreKey {
    pub const ALL: [StoreKey; 6] = [
        Self::WakeState,
        Self::CrashLog,
        Self::CustomSleepInterval,
        Self::FullOnlyMode,
        Self::DiagnosticMode,
        Self::CorruptionCount,
    ];

    /// Stable slot index used by backends that lay keys out in a table.
    pub const fn slot(self) -> usize {
        match self {
            Self::WakeState => 0,
            Self::CrashLog => 1,
            Self::CustomSleepInterval => 2,
            Self::FullOnlyMode => 3,
            Self::DiagnosticMode => 4,
            Self::CorruptionCount => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WakeState => "wake_state",
            Self::CrashLog => "crash_log",
            Self::CustomSleepInterval => "custom_sleep",
            Self::FullOnlyMode => "full_only",
            Self::DiagnosticMode => "diag_mode",
            Self::CorruptionCount => "corruptions",
        }
    }
}

/// Abstract persistence backend with separate retained and durable spaces.
///
/// Blob values are opaque to the store; integrity checking belongs to the
/// record codecs layered on top.
pub trait PersistentStore {
    type Error: core::fmt::Debug;

    /// Copies the stored value into `out`, returning its length, or `None`
    /// when nothing is stored under `key`.
    fn load(
        &mut self,
        domain: StoreDomain,
        key: StoreKey,
        out: &mut [u8],
    ) -> Result<Option<usize>, Self::Error>;

    /// Durable writes may be staged until [`PersistentStore::commit`];
    /// retained writes take effect immediately.
    fn store(&mut self, domain: StoreDomain, key: StoreKey, data: &[u8])
    -> Result<(), Self::Error>;

    /// Makes every durable write staged since the last commit permanent in
    /// one pass over the backing medium.
    fn commit(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn load_u32(&mut self, domain: StoreDomain, key: StoreKey) -> Result<Option<u32>, Self::Error> {
        let mut buf = [0u8; 4];
        match self.load(domain, key, &mut buf)? {
            Some(4) => Ok(Some(u32::from_le_bytes(buf))),
            _ => Ok(None),
        }
    }

    fn store_u32(&mut self, domain: StoreDomain, key: StoreKey, value: u32) -> Result<(), Self::Error> {
        self.store(domain, key, &value.to_le_bytes())
    }

    fn load_bool(&mut self, domain: StoreDomain, key: StoreKey) -> Result<Option<bool>, Self::Error> {
        let mut buf = [0u8; 1];
        match self.load(domain, key, &mut buf)? {
            Some(1) => Ok(Some(buf[0] != 0)),
            _ => Ok(None),
        }
    }

    fn store_bool(&mut self, domain: StoreDomain, key: StoreKey, value: bool) -> Result<(), Self::Error> {
        self.store(domain, key, &[value as u8])
    }
}
