//! Archetypes ("item defs"): the reusable templates placed map items are
//! instantiated from.

use tactics_core::constants::{HP_INDESTRUCTIBLE, MAX_ITEM_CX, MAX_ITEM_CY, MAX_ITEM_DEF};
use tactics_core::constants::MaterialFlags;
use tactics_core::EdgeMask;

use crate::error::{MapError, MapResult};

/// Opaque handle to a mesh resource owned by the resource manager. The map
/// only stores and compares these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u32);

/// Per-cell edge masks for one archetype, indexed `[x][y]` in the
/// archetype's unrotated frame.
pub type CellMasks = [[EdgeMask; MAX_ITEM_CY]; MAX_ITEM_CX];

#[derive(Debug, Clone, PartialEq)]
pub struct MapItemDef {
    pub name: String,
    /// footprint along x before rotation, 1..=MAX_ITEM_CX
    pub cx: u8,
    /// footprint along y before rotation, 1..=MAX_ITEM_CY
    pub cy: u8,
    /// starting hit points; `HP_INDESTRUCTIBLE` never takes damage
    pub hp: u16,
    /// 0 opaque - 255 transparent. Stored and persisted for the renderer;
    /// sight and lighting here only read the visibility masks.
    pub transparency: u8,
    /// Stored and persisted for the combat rules; the map never reads them.
    pub material_flags: MaterialFlags,

    pub model: Option<ResourceId>,
    pub model_open: Option<ResourceId>,
    pub model_destroyed: Option<ResourceId>,

    pub pather: CellMasks,
    pub visibility: CellMasks,
    /// masks once destroyed; all open (passable rubble) unless set
    pub destroyed_pather: CellMasks,
    pub destroyed_visibility: CellMasks,

    /// instances may share tiles with other items (doors, decor)
    pub allow_overlap: bool,
}

impl Default for MapItemDef {
    fn default() -> Self {
        Self {
            name: String::new(),
            cx: 1,
            cy: 1,
            hp: HP_INDESTRUCTIBLE,
            transparency: 0,
            material_flags: MaterialFlags::empty(),
            model: None,
            model_open: None,
            model_destroyed: None,
            pather: [[EdgeMask::OPEN; MAX_ITEM_CY]; MAX_ITEM_CX],
            visibility: [[EdgeMask::OPEN; MAX_ITEM_CY]; MAX_ITEM_CX],
            destroyed_pather: [[EdgeMask::OPEN; MAX_ITEM_CY]; MAX_ITEM_CX],
            destroyed_visibility: [[EdgeMask::OPEN; MAX_ITEM_CY]; MAX_ITEM_CX],
            allow_overlap: false,
        }
    }
}

impl MapItemDef {
    /// Returns true if the object can take damage.
    pub fn can_damage(&self) -> bool {
        self.hp != HP_INDESTRUCTIBLE
    }

    pub fn has_valid_footprint(&self) -> bool {
        (1..=MAX_ITEM_CX as u8).contains(&self.cx) && (1..=MAX_ITEM_CY as u8).contains(&self.cy)
    }

    /// Sets the same path and visibility mask on every cell of the footprint.
    pub fn fill(&mut self, pather: EdgeMask, visibility: EdgeMask) {
        for i in 0..self.cx as usize {
            for j in 0..self.cy as usize {
                self.pather[i][j] = pather;
                self.visibility[i][j] = visibility;
            }
        }
    }

    /// The masks an instance contributes in its current state.
    pub fn masks(&self, destroyed: bool) -> (&CellMasks, &CellMasks) {
        if destroyed {
            (&self.destroyed_pather, &self.destroyed_visibility)
        } else {
            (&self.pather, &self.visibility)
        }
    }
}

/// Fixed table of archetypes. Slot 0 is reserved and never defined.
#[derive(Debug, Clone)]
pub struct ItemDefTable {
    defs: Vec<Option<MapItemDef>>,
}

impl Default for ItemDefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemDefTable {
    pub fn new() -> Self {
        Self {
            defs: vec![None; MAX_ITEM_DEF],
        }
    }

    fn check_index(index: usize) -> MapResult<()> {
        if index == 0 || index >= MAX_ITEM_DEF {
            return Err(MapError::InvalidDefIndex(index));
        }
        Ok(())
    }

    /// Resets slot `index` to a default archetype and hands it back for the
    /// caller to populate.
    pub fn init(&mut self, index: usize) -> MapResult<&mut MapItemDef> {
        Self::check_index(index)?;
        Ok(self.defs[index].insert(MapItemDef::default()))
    }

    pub fn get(&self, index: usize) -> Option<&MapItemDef> {
        self.defs.get(index).and_then(Option::as_ref)
    }

    /// Like [`ItemDefTable::get`] but distinguishes a bad index from an
    /// empty slot and checks the footprint.
    pub fn resolve(&self, index: usize) -> MapResult<&MapItemDef> {
        Self::check_index(index)?;
        let def = self.get(index).ok_or(MapError::UndefinedItemDef(index))?;
        if !def.has_valid_footprint() {
            return Err(MapError::InvalidItemDef {
                index,
                cx: def.cx,
                cy: def.cy,
            });
        }
        Ok(def)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.get(index).map(|def| def.name.as_str())
    }

    /// `(index, def)` for every defined slot.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &MapItemDef)> {
        self.defs
            .iter()
            .enumerate()
            .filter_map(|(i, def)| def.as_ref().map(|d| (i, d)))
    }

    pub fn clear(&mut self) {
        self.defs.iter_mut().for_each(|slot| *slot = None);
    }
}
