//! Device information cache. What we know about peer devices.
//!
//! Records live in an arena and are indexed twice: by device instance and
//! by station address. Either attribute can change after a record is
//! created (a device gets a new address, a blank record learns its
//! identity), so every record remembers the keys it is currently indexed
//! under and `reindex` reconciles them with its contents.
//!
//! A record that loses a key to another record forgets that attribute; one
//! left with no keys at all is freed.

use std::collections::HashMap;

use serde::Serialize;

use bacstack_core::{Address, AppError, IAmRequest, Segmentation};

pub const DEFAULT_MAX_APDU_LENGTH: u16 = 1024;
pub const DEFAULT_MAX_NPDU_LENGTH: u16 = 1497;

/// Everything known about one peer device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Device object instance, once the peer has announced itself.
    pub device_instance: Option<u32>,
    pub address: Address,
    pub max_apdu_length_accepted: u16,
    pub segmentation_supported: Segmentation,
    pub vendor_id: Option<u16>,
    /// Largest NPDU we can send toward this device.
    pub max_npdu_length: u16,
    /// Proposed/actual window size for segmented transfers.
    pub max_segments_accepted: Option<u8>,
}

impl DeviceInfo {
    fn at(address: Address) -> Self {
        Self {
            device_instance: None,
            address,
            max_apdu_length_accepted: DEFAULT_MAX_APDU_LENGTH,
            segmentation_supported: Segmentation::NoSegmentation,
            vendor_id: None,
            max_npdu_length: DEFAULT_MAX_NPDU_LENGTH,
            max_segments_accepted: None,
        }
    }
}

/// Stable handle to a cache record. Stale after `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInfoId {
    index: u32,
    generation: u32,
}

/// Lookup key: a device instance or a station address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    Instance(u32),
    Address(Address),
}

impl From<u32> for DeviceKey {
    fn from(instance: u32) -> Self {
        DeviceKey::Instance(instance)
    }
}

impl From<Address> for DeviceKey {
    fn from(address: Address) -> Self {
        DeviceKey::Address(address)
    }
}

impl From<&Address> for DeviceKey {
    fn from(address: &Address) -> Self {
        DeviceKey::Address(address.clone())
    }
}

struct Entry {
    info: DeviceInfo,
    // (instance, address) this record is currently indexed under
    keys: (Option<u32>, Option<Address>),
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
pub struct DeviceInfoCache {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_instance: HashMap<u32, DeviceInfoId>,
    by_address: HashMap<Address, DeviceInfoId>,
}

impl DeviceInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff some record is indexed under `key`.
    pub fn has(&self, key: impl Into<DeviceKey>) -> bool {
        match key.into() {
            DeviceKey::Instance(instance) => self.by_instance.contains_key(&instance),
            DeviceKey::Address(address) => self.by_address.contains_key(&address),
        }
    }

    /// Find a record. By instance this never creates; by address an unknown
    /// station gets a blank record, indexed under that address only.
    pub fn get(&mut self, key: impl Into<DeviceKey>) -> Result<Option<DeviceInfoId>, AppError> {
        match key.into() {
            DeviceKey::Instance(instance) => Ok(self.by_instance.get(&instance).copied()),
            DeviceKey::Address(address) => self.get_or_create(address).map(Some),
        }
    }

    /// Read-only lookup. Never creates.
    pub fn lookup(&self, key: impl Into<DeviceKey>) -> Option<&DeviceInfo> {
        let id = match key.into() {
            DeviceKey::Instance(instance) => self.by_instance.get(&instance),
            DeviceKey::Address(address) => self.by_address.get(&address),
        };
        id.and_then(|id| self.info(*id))
    }

    pub fn info(&self, id: DeviceInfoId) -> Option<&DeviceInfo> {
        self.entry(id).map(|entry| &entry.info)
    }

    /// Mutable access. Call `reindex` after changing the instance or address.
    pub fn info_mut(&mut self, id: DeviceInfoId) -> Option<&mut DeviceInfo> {
        self.entry_mut(id).map(|entry| &mut entry.info)
    }

    /// Fold an I-Am heard from `source` into the cache.
    pub fn ingest(&mut self, source: &Address, iam: &IAmRequest) -> Result<DeviceInfoId, AppError> {
        if !source.is_station() {
            return Err(AppError::InvalidKey(source.clone()));
        }
        let instance = iam.device_identifier.instance;

        let known = self
            .by_instance
            .get(&instance)
            .copied()
            .filter(|id| self.entry(*id).is_some());

        let id = match known {
            Some(id) => {
                if let Some(info) = self.info_mut(id) {
                    if info.address == *source {
                        return Ok(id);
                    }
                    tracing::debug!(
                        instance,
                        old = %info.address,
                        new = %source,
                        "device address changed"
                    );
                    info.address = source.clone();
                }
                id
            }
            None => {
                let id = self.get_or_create(source.clone())?;
                if let Some(info) = self.info_mut(id) {
                    info.device_instance = Some(instance);
                }
                id
            }
        };

        if let Some(info) = self.info_mut(id) {
            info.max_apdu_length_accepted = iam.max_apdu_length_accepted;
            info.segmentation_supported = iam.segmentation_supported;
            info.vendor_id = Some(iam.vendor_id);
        }
        self.reindex(id);
        Ok(id)
    }

    /// Bring the indexes in line with the record's current instance and
    /// address. Not automatic on field assignment.
    pub fn reindex(&mut self, id: DeviceInfoId) {
        let Some(entry) = self.entry(id) else {
            return;
        };
        let (old_instance, old_address) = entry.keys.clone();
        let new_instance = entry.info.device_instance;
        let new_address = Some(entry.info.address.clone()).filter(Address::is_station);

        if old_instance != new_instance {
            if let Some(key) = old_instance {
                if self.by_instance.get(&key) == Some(&id) {
                    self.by_instance.remove(&key);
                }
            }
            if let Some(key) = new_instance {
                if let Some(displaced) = self.by_instance.insert(key, id) {
                    if displaced != id {
                        if let Some(other) = self.entry_mut(displaced) {
                            other.keys.0 = None;
                            other.info.device_instance = None;
                        }
                        self.release_if_unindexed(displaced);
                    }
                }
            }
            tracing::trace!(?old_instance, ?new_instance, "device instance reindexed");
        }

        if old_address != new_address {
            if let Some(key) = &old_address {
                if self.by_address.get(key) == Some(&id) {
                    self.by_address.remove(key);
                }
            }
            if let Some(key) = &new_address {
                if let Some(displaced) = self.by_address.insert(key.clone(), id) {
                    if displaced != id {
                        if let Some(other) = self.entry_mut(displaced) {
                            other.keys.1 = None;
                            other.info.address = Address::Null;
                        }
                        self.release_if_unindexed(displaced);
                    }
                }
            }
            tracing::trace!(?old_address, ?new_address, "device address reindexed");
        }

        if let Some(entry) = self.entry_mut(id) {
            entry.keys = (new_instance, new_address);
        }
    }

    /// Drop the record from both indexes and hand it back to the caller.
    pub fn release(&mut self, id: DeviceInfoId) -> Option<DeviceInfo> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        let (instance, address) = entry.keys;
        if let Some(key) = instance {
            if self.by_instance.get(&key) == Some(&id) {
                self.by_instance.remove(&key);
            }
        }
        if let Some(key) = address {
            if self.by_address.get(&key) == Some(&id) {
                self.by_address.remove(&key);
            }
        }
        Some(entry.info)
    }

    /// A record that lost its last index entry to another record can never
    /// be found again, so its slot is freed.
    fn release_if_unindexed(&mut self, id: DeviceInfoId) {
        let unindexed = self
            .entry(id)
            .is_some_and(|entry| entry.keys.0.is_none() && entry.keys.1.is_none());
        if unindexed {
            if let Some(info) = self.release(id) {
                tracing::debug!(address = %info.address, "displaced device record dropped");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceInfoId, &DeviceInfo)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    DeviceInfoId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &entry.info,
                )
            })
        })
    }

    fn get_or_create(&mut self, address: Address) -> Result<DeviceInfoId, AppError> {
        if !address.is_station() {
            return Err(AppError::InvalidKey(address));
        }
        if let Some(id) = self.by_address.get(&address) {
            return Ok(*id);
        }

        tracing::trace!(%address, "new device info record");
        let id = self.allocate(Entry {
            info: DeviceInfo::at(address.clone()),
            keys: (None, Some(address.clone())),
        });
        self.by_address.insert(address, id);
        Ok(id)
    }

    fn allocate(&mut self, entry: Entry) -> DeviceInfoId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            DeviceInfoId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            DeviceInfoId {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: DeviceInfoId) -> Option<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, id: DeviceInfoId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }
}
