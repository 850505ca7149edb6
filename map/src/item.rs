//! Placed map items, their inventory payloads, and the fixed-capacity pool
//! they are allocated from.

use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use tactics_core::constants::ItemFlags;
use tactics_core::Rect;

use crate::error::{MapError, MapResult};

/// Index of a slot in the [`ItemPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u32);

/// Render-side model instance owned by a placed item. Allocated by the map
/// when the item is added and dropped with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(pub u32);

/// Inventory attached to a map object: item name to count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Storage {
    items: BTreeMap<String, u32>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, count: u32) {
        if count == 0 {
            return;
        }
        *self.items.entry(name.to_string()).or_insert(0) += count;
    }

    /// Takes `count` of `name` out. Returns false (and changes nothing) when
    /// fewer than `count` are stored.
    pub fn remove(&mut self, name: &str, count: u32) -> bool {
        let Some(stored) = self.items.get_mut(name) else {
            return count == 0;
        };
        if *stored < count {
            return false;
        }
        *stored -= count;
        if *stored == 0 {
            self.items.remove(name);
        }
        true
    }

    pub fn count(&self, name: &str) -> u32 {
        self.items.get(name).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.items.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

impl ToSql for Storage {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let bytes = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.to_string().into()))?;
        Ok(ToSqlOutput::from(bytes))
    }
}

impl FromSql for Storage {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let bytes = value.as_blob()?;
        let (storage, _consumed) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| FromSqlError::Other(e.to_string().into()))?;
        Ok(storage)
    }
}

/// A placed instance of an archetype.
#[derive(Debug, Clone, PartialEq)]
pub struct MapItem {
    pub x: u8,
    pub y: u8,
    /// quarter turns clockwise, 0..=3
    pub rot: u8,
    /// index into the archetype table, never 0
    pub def_index: u8,
    pub hp: u16,
    pub flags: ItemFlags,

    /// footprint after rotation
    pub bounds: Rect,

    pub model: ModelHandle,
    pub storage: Option<Storage>,
}

impl MapItem {
    /// Applies damage. Returns true if this destroyed the item.
    pub fn do_damage(&mut self, hp: u16) -> bool {
        if hp >= self.hp {
            self.hp = 0;
            return true;
        }
        self.hp -= hp;
        false
    }

    pub fn destroyed(&self) -> bool {
        self.hp == 0
    }

    pub fn is_open(&self) -> bool {
        self.flags.contains(ItemFlags::OPEN)
    }
}

/// Fixed-capacity arena of placed items with free-slot reuse.
#[derive(Debug, Clone)]
pub struct ItemPool {
    slots: Vec<Option<MapItem>>,
    free: Vec<u32>,
    capacity: usize,
}

impl ItemPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots in use.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty() && self.slots.len() >= self.capacity
    }

    pub fn alloc(&mut self, item: MapItem) -> MapResult<ItemId> {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(item);
            return Ok(ItemId(index));
        }
        if self.slots.len() >= self.capacity {
            return Err(MapError::PoolExhausted {
                capacity: self.capacity,
            });
        }
        self.slots.push(Some(item));
        Ok(ItemId((self.slots.len() - 1) as u32))
    }

    /// Returns the slot to the free list and hands back its item.
    ///
    /// Releasing a slot that is not in use is a bookkeeping bug and panics.
    pub fn release(&mut self, id: ItemId) -> MapItem {
        let item = self
            .slots
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .unwrap_or_else(|| panic!("release of unused item slot {}", id.0));
        self.free.push(id.0);
        item
    }

    pub fn get(&self, id: ItemId) -> Option<&MapItem> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut MapItem> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &MapItem)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (ItemId(i as u32), item)))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}
