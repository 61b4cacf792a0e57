//! Durable domain: a small slot table in the last sector of a data partition.
//!
//! Writes are staged in the cached table and reach flash on `commit`, one
//! sector erase per commit however many keys changed.

use embedded_storage::{ReadStorage, Storage};
use envnode_core::{refresh::fnv1a, store::StoreKey};
use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_rom_sys::rom::spiflash::{
    ESP_ROM_SPIFLASH_RESULT_OK, esp_rom_spiflash_erase_sector, esp_rom_spiflash_read,
    esp_rom_spiflash_unlock, esp_rom_spiflash_write,
};
use log::{debug, info, warn};

const FLASH_SECTOR_SIZE: u32 = 4096;
const DEFAULT_FLASH_CAPACITY_BYTES: usize = 16 * 1024 * 1024;

const TABLE_MAGIC: u32 = 0x4456_4E45; // "ENVD"
const TABLE_VERSION: u8 = 1;
pub const DURABLE_SLOT_BYTES: usize = 16;
const SLOT_COUNT: usize = StoreKey::ALL.len();
const HEADER_LEN: usize = 8;
const SLOT_STRIDE: usize = 4 + DURABLE_SLOT_BYTES;
const CHECKSUM_AT: usize = HEADER_LEN + SLOT_COUNT * SLOT_STRIDE;
const TABLE_LEN: usize = CHECKSUM_AT + 4;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashStoreError {
    PartitionTable,
    PartitionMissing,
    PartitionTooSmall,
    FlashOpFailed(i32),
    Unaligned,
    ValueTooLarge,
}

#[derive(Debug)]
struct RawFlash;

impl RawFlash {
    fn new() -> Result<Self, FlashStoreError> {
        let rc = unsafe { esp_rom_spiflash_unlock() };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashStoreError::FlashOpFailed(rc));
        }
        Ok(Self)
    }

    fn erase_sector(&mut self, sector_addr: u32) -> Result<(), FlashStoreError> {
        if !sector_addr.is_multiple_of(FLASH_SECTOR_SIZE) {
            return Err(FlashStoreError::Unaligned);
        }
        let rc = unsafe { esp_rom_spiflash_erase_sector(sector_addr / FLASH_SECTOR_SIZE) };
        if rc != ESP_ROM_SPIFLASH_RESULT_OK {
            return Err(FlashStoreError::FlashOpFailed(rc));
        }
        Ok(())
    }

    /// Word-granular read; `addr` must be 4-byte aligned.
    fn read_aligned(&mut self, addr: u32, out: &mut [u8]) -> Result<(), FlashStoreError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashStoreError::Unaligned);
        }
        for (index, chunk) in out.chunks_mut(4).enumerate() {
            let mut word = 0u32;
            let word_addr = addr + (index * 4) as u32;
            let rc = unsafe {
                esp_rom_spiflash_read(word_addr, &mut word as *mut u32 as *const u32, 4)
            };
            if rc != ESP_ROM_SPIFLASH_RESULT_OK {
                return Err(FlashStoreError::FlashOpFailed(rc));
            }
            chunk.copy_from_slice(&word.to_le_bytes()[..chunk.len()]);
        }
        Ok(())
    }

    /// Programs an erased, 4-byte aligned region. A short tail is padded
    /// with the erased value.
    fn program_aligned(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashStoreError> {
        if !addr.is_multiple_of(4) {
            return Err(FlashStoreError::Unaligned);
        }
        for (index, chunk) in data.chunks(4).enumerate() {
            let mut bytes = [0xFFu8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            let word = u32::from_le_bytes(bytes);
            let word_addr = addr + (index * 4) as u32;
            let rc = unsafe { esp_rom_spiflash_write(word_addr, &word as *const u32, 4) };
            if rc != ESP_ROM_SPIFLASH_RESULT_OK {
                return Err(FlashStoreError::FlashOpFailed(rc));
            }
        }
        Ok(())
    }
}

/// Only used to walk the partition table, which is word aligned.
impl ReadStorage for RawFlash {
    type Error = FlashStoreError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.read_aligned(offset, bytes)
    }

    fn capacity(&self) -> usize {
        DEFAULT_FLASH_CAPACITY_BYTES
    }
}

impl Storage for RawFlash {
    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> Result<(), Self::Error> {
        Err(FlashStoreError::Unaligned)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SlotTable {
    lengths: [u8; SLOT_COUNT],
    slots: [[u8; DURABLE_SLOT_BYTES]; SLOT_COUNT],
}

impl SlotTable {
    const fn empty() -> Self {
        Self {
            lengths: [0; SLOT_COUNT],
            slots: [[0; DURABLE_SLOT_BYTES]; SLOT_COUNT],
        }
    }

    fn get(&self, key: StoreKey) -> Option<&[u8]> {
        let slot = key.slot();
        match self.lengths[slot] as usize {
            0 => None,
            len => self.slots[slot].get(..len),
        }
    }

    fn encode(&self) -> [u8; TABLE_LEN] {
        let mut buf = [0xFFu8; TABLE_LEN];
        buf[0..4].copy_from_slice(&TABLE_MAGIC.to_le_bytes());
        buf[4] = TABLE_VERSION;
        buf[5] = SLOT_COUNT as u8;
        buf[6..8].copy_from_slice(&[0, 0]);
        for slot in 0..SLOT_COUNT {
            let at = HEADER_LEN + slot * SLOT_STRIDE;
            buf[at..at + 4].copy_from_slice(&[self.lengths[slot], 0, 0, 0]);
            buf[at + 4..at + SLOT_STRIDE].copy_from_slice(&self.slots[slot]);
        }
        let checksum = fnv1a(&buf[..CHECKSUM_AT]);
        buf[CHECKSUM_AT..].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// `None` for an erased sector, a foreign layout or a bad checksum.
    fn decode(buf: &[u8; TABLE_LEN]) -> Option<Self> {
        if buf.iter().all(|byte| *byte == 0xFF) {
            debug!("flash-store: sector erased");
            return None;
        }
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != TABLE_MAGIC || buf[4] != TABLE_VERSION || buf[5] as usize != SLOT_COUNT {
            info!("flash-store: unknown table layout; starting empty");
            return None;
        }
        let expected = u32::from_le_bytes([
            buf[CHECKSUM_AT],
            buf[CHECKSUM_AT + 1],
            buf[CHECKSUM_AT + 2],
            buf[CHECKSUM_AT + 3],
        ]);
        if fnv1a(&buf[..CHECKSUM_AT]) != expected {
            warn!("flash-store: table checksum mismatch; starting empty");
            return None;
        }

        let mut table = Self::empty();
        for slot in 0..SLOT_COUNT {
            let at = HEADER_LEN + slot * SLOT_STRIDE;
            let len = buf[at] as usize;
            if len > DURABLE_SLOT_BYTES {
                warn!("flash-store: slot {} length {} out of range", slot, len);
                return None;
            }
            table.lengths[slot] = len as u8;
            table.slots[slot].copy_from_slice(&buf[at + 4..at + SLOT_STRIDE]);
        }
        Some(table)
    }
}

#[derive(Debug)]
pub struct FlashStore {
    flash: RawFlash,
    sector_addr: u32,
    table: Option<SlotTable>,
    /// The cached table holds values not yet in flash.
    dirty: bool,
}

impl FlashStore {
    /// Locates the sector: last sector of the first writable undefined data
    /// partition, falling back to the NVS partition.
    pub fn new() -> Result<Self, FlashStoreError> {
        let mut flash = RawFlash::new()?;

        let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
        let partitions = read_partition_table(&mut flash, &mut table_buf)
            .map_err(|_| FlashStoreError::PartitionTable)?;

        let mut undefined: Option<(u32, u32)> = None;
        let mut nvs: Option<(u32, u32)> = None;
        for entry in partitions.iter() {
            if entry.is_read_only() || entry.len() < FLASH_SECTOR_SIZE {
                continue;
            }
            match entry.partition_type() {
                PartitionType::Data(DataPartitionSubType::Undefined) if undefined.is_none() => {
                    undefined = Some((entry.offset(), entry.len()));
                }
                PartitionType::Data(DataPartitionSubType::Nvs) if nvs.is_none() => {
                    nvs = Some((entry.offset(), entry.len()));
                }
                _ => {}
            }
        }

        let (offset, len) = undefined.or(nvs).ok_or(FlashStoreError::PartitionMissing)?;
        if len < FLASH_SECTOR_SIZE {
            return Err(FlashStoreError::PartitionTooSmall);
        }

        let sector_addr = offset + len - FLASH_SECTOR_SIZE;
        info!("flash-store: sector=0x{:08x}", sector_addr);
        Ok(Self {
            flash,
            sector_addr,
            table: None,
            dirty: false,
        })
    }

    pub fn load(&mut self, key: StoreKey, out: &mut [u8]) -> Result<Option<usize>, FlashStoreError> {
        let table = self.table()?;
        let Some(value) = table.get(key) else {
            return Ok(None);
        };
        let Some(dst) = out.get_mut(..value.len()) else {
            return Ok(None);
        };
        dst.copy_from_slice(value);
        Ok(Some(value.len()))
    }

    pub fn store(&mut self, key: StoreKey, data: &[u8]) -> Result<(), FlashStoreError> {
        if data.len() > DURABLE_SLOT_BYTES {
            return Err(FlashStoreError::ValueTooLarge);
        }
        let mut table = self.table()?;
        if table.get(key) == Some(data) {
            return Ok(());
        }

        let slot = key.slot();
        table.slots[slot] = [0; DURABLE_SLOT_BYTES];
        table.slots[slot][..data.len()].copy_from_slice(data);
        table.lengths[slot] = data.len() as u8;
        self.table = Some(table);
        self.dirty = true;
        debug!("flash-store: staged {} ({} bytes)", key.as_str(), data.len());
        Ok(())
    }

    /// Rewrites the sector when anything was staged. A failed commit keeps
    /// the staged values for the next one.
    pub fn commit(&mut self) -> Result<(), FlashStoreError> {
        if !self.dirty {
            return Ok(());
        }
        let encoded = self.table()?.encode();
        self.flash.erase_sector(self.sector_addr)?;
        self.flash.program_aligned(self.sector_addr, &encoded)?;
        self.dirty = false;
        info!("flash-store: committed table");
        Ok(())
    }

    fn table(&mut self) -> Result<SlotTable, FlashStoreError> {
        if let Some(table) = self.table {
            return Ok(table);
        }
        let mut buf = [0u8; TABLE_LEN];
        self.flash.read_aligned(self.sector_addr, &mut buf)?;
        let table = SlotTable::decode(&buf).unwrap_or(SlotTable::empty());
        self.table = Some(table);
        Ok(table)
    }
}
