//! SQLite persistence for placed items and archetypes.
//!
//! Items live in a caller-named table, one row per placed item. Archetypes
//! share a single `item_defs` table; their per-cell masks are stored as
//! 36-byte blobs in archetype-local `[x][y]` order.

use std::path::Path;

use rusqlite::{params, Connection, Row};
use tactics_core::constants::{ItemFlags, MaterialFlags, MAX_ITEM_CX, MAX_ITEM_CY};
use tactics_core::EdgeMask;

use crate::error::{MapError, MapResult};
use crate::item::{MapItem, Storage};
use crate::item_def::{CellMasks, ItemDefTable, ResourceId};

const ITEM_DEF_TABLE: &str = "item_defs";

/// Persisted form of a placed item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub x: u8,
    pub y: u8,
    pub rot: u8,
    pub def_index: u8,
    pub hp: u16,
    pub flags: ItemFlags,
    pub storage: Option<Storage>,
}

impl From<&MapItem> for ItemRow {
    fn from(item: &MapItem) -> Self {
        Self {
            x: item.x,
            y: item.y,
            rot: item.rot,
            def_index: item.def_index,
            hp: item.hp,
            flags: item.flags,
            storage: item.storage.clone(),
        }
    }
}

impl ItemRow {
    /// Reads the seven item columns starting at column `first`.
    fn from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            x: row.get(first)?,
            y: row.get(first + 1)?,
            rot: row.get(first + 2)?,
            def_index: row.get(first + 3)?,
            hp: row.get(first + 4)?,
            flags: ItemFlags::from_bits_truncate(row.get(first + 5)?),
            storage: row.get(first + 6)?,
        })
    }
}

/// Table names are spliced into SQL, so only plain identifiers pass.
fn validate_table_name(table: &str) -> MapResult<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest || table.len() > 64 || table == ITEM_DEF_TABLE {
        return Err(MapError::InvalidTableName(table.to_string()));
    }
    Ok(())
}

fn masks_to_blob(masks: &CellMasks) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_ITEM_CX * MAX_ITEM_CY);
    for column in masks {
        buf.extend(column.iter().map(|m| m.bits()));
    }
    buf
}

/// Short blobs leave the remaining cells open.
fn blob_to_masks(blob: &[u8]) -> CellMasks {
    let mut masks = [[EdgeMask::OPEN; MAX_ITEM_CY]; MAX_ITEM_CX];
    for (i, bits) in blob.iter().take(MAX_ITEM_CX * MAX_ITEM_CY).enumerate() {
        masks[i / MAX_ITEM_CY][i % MAX_ITEM_CY] = EdgeMask::from_bits(*bits);
    }
    masks
}

pub struct MapStore {
    conn: Connection,
    table: String,
}

impl std::fmt::Debug for MapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("table", &self.table)
            .finish()
    }
}

impl MapStore {
    pub fn open(path: impl AsRef<Path>, table: &str) -> MapResult<Self> {
        validate_table_name(table)?;
        let conn = Connection::open(path)?;
        Self::create(conn, table)
    }

    pub fn open_in_memory(table: &str) -> MapResult<Self> {
        validate_table_name(table)?;
        Self::create(Connection::open_in_memory()?, table)
    }

    /// Provisions the item table and the archetype table on `conn`.
    pub fn create(conn: Connection, table: &str) -> MapResult<Self> {
        validate_table_name(table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                rot INTEGER NOT NULL,
                def_index INTEGER NOT NULL,
                hp INTEGER NOT NULL,
                flags INTEGER NOT NULL,
                storage BLOB
            );
            CREATE INDEX IF NOT EXISTS {table}_pos ON {table} (x, y);
            CREATE TABLE IF NOT EXISTS {ITEM_DEF_TABLE} (
                def_index INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                cx INTEGER NOT NULL,
                cy INTEGER NOT NULL,
                hp INTEGER NOT NULL,
                transparency INTEGER NOT NULL,
                material_flags INTEGER NOT NULL,
                model INTEGER,
                model_open INTEGER,
                model_destroyed INTEGER,
                pather BLOB NOT NULL,
                visibility BLOB NOT NULL,
                destroyed_pather BLOB NOT NULL,
                destroyed_visibility BLOB NOT NULL,
                allow_overlap INTEGER NOT NULL
            );"
        ))?;
        log::debug!("map store ready (table {table})");
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Appends `row` and returns its row id.
    pub fn insert_row(&self, row: &ItemRow) -> MapResult<i64> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO {} (x, y, rot, def_index, hp, flags, storage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            self.table
        ))?;
        stmt.execute(params![
            row.x,
            row.y,
            row.rot,
            row.def_index,
            row.hp,
            row.flags.bits(),
            row.storage,
        ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Deletes the row with id `row_id`. Returns how many rows went.
    pub fn delete_row(&self, row_id: i64) -> MapResult<usize> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE id = ?1", self.table))?;
        Ok(stmt.execute(params![row_id])?)
    }

    /// Deletes every row in `row_ids`, all or nothing.
    pub fn delete_rows(&mut self, row_ids: &[i64]) -> MapResult<usize> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare(&format!("DELETE FROM {} WHERE id = ?1", self.table))?;
            for row_id in row_ids {
                deleted += stmt.execute(params![row_id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Rewrites the mutable columns (hp, flags, storage) of row `row_id`.
    pub fn update_row(&self, row_id: i64, row: &ItemRow) -> MapResult<usize> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "UPDATE {} SET hp = ?2, flags = ?3, storage = ?4 WHERE id = ?1",
            self.table
        ))?;
        Ok(stmt.execute(params![
            row_id,
            row.hp,
            row.flags.bits(),
            row.storage,
        ])?)
    }

    /// Every row with its row id, in insertion order.
    pub fn load_keyed_rows(&self) -> MapResult<Vec<(i64, ItemRow)>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT id, x, y, rot, def_index, hp, flags, storage FROM {} ORDER BY id",
            self.table
        ))?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, ItemRow::from_row(r, 1)?)))?;
        let mut result = Vec::new();
        for r in rows {
            result.push(r?);
        }
        Ok(result)
    }

    /// Every row, in insertion order.
    pub fn load_rows(&self) -> MapResult<Vec<ItemRow>> {
        Ok(self
            .load_keyed_rows()?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    /// Replaces the whole table with `rows` in one transaction. Returns the
    /// new row ids, in the order of `rows`.
    pub fn replace_rows(&mut self, rows: &[ItemRow]) -> MapResult<Vec<i64>> {
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.table), [])?;
        let mut row_ids = Vec::with_capacity(rows.len());
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (x, y, rot, def_index, hp, flags, storage)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                self.table
            ))?;
            for row in rows {
                row_ids.push(stmt.insert(params![
                    row.x,
                    row.y,
                    row.rot,
                    row.def_index,
                    row.hp,
                    row.flags.bits(),
                    row.storage,
                ])?);
            }
        }
        tx.commit()?;
        Ok(row_ids)
    }

    pub fn row_count(&self) -> MapResult<usize> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |r| {
                    r.get(0)
                })?;
        Ok(count as usize)
    }

    /// Replaces the stored archetypes with every defined slot of `defs`.
    pub fn save_item_defs(&mut self, defs: &ItemDefTable) -> MapResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {ITEM_DEF_TABLE}"), [])?;
        let mut saved = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {ITEM_DEF_TABLE} (
                    def_index, name, cx, cy, hp, transparency, material_flags,
                    model, model_open, model_destroyed,
                    pather, visibility, destroyed_pather, destroyed_visibility,
                    allow_overlap
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ))?;
            for (index, def) in defs.iter() {
                stmt.execute(params![
                    index as u32,
                    def.name,
                    def.cx,
                    def.cy,
                    def.hp,
                    def.transparency,
                    def.material_flags.bits(),
                    def.model.map(|r| r.0),
                    def.model_open.map(|r| r.0),
                    def.model_destroyed.map(|r| r.0),
                    masks_to_blob(&def.pather),
                    masks_to_blob(&def.visibility),
                    masks_to_blob(&def.destroyed_pather),
                    masks_to_blob(&def.destroyed_visibility),
                    def.allow_overlap,
                ])?;
                saved += 1;
            }
        }
        tx.commit()?;
        Ok(saved)
    }

    /// Populates `defs` from the stored archetypes. Slots with no stored
    /// row are left as they are. Returns the number loaded.
    pub fn load_item_defs(&self, defs: &mut ItemDefTable) -> MapResult<usize> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT def_index, name, cx, cy, hp, transparency, material_flags,
                    model, model_open, model_destroyed,
                    pather, visibility, destroyed_pather, destroyed_visibility,
                    allow_overlap
             FROM {ITEM_DEF_TABLE} ORDER BY def_index"
        ))?;
        let mut rows = stmt.query([])?;
        let mut loaded = 0;
        while let Some(row) = rows.next()? {
            let index: u32 = row.get(0)?;
            let def = defs.init(index as usize)?;
            def.name = row.get(1)?;
            def.cx = row.get(2)?;
            def.cy = row.get(3)?;
            def.hp = row.get(4)?;
            def.transparency = row.get(5)?;
            def.material_flags = MaterialFlags::from_bits_truncate(row.get(6)?);
            def.model = row.get::<_, Option<u32>>(7)?.map(ResourceId);
            def.model_open = row.get::<_, Option<u32>>(8)?.map(ResourceId);
            def.model_destroyed = row.get::<_, Option<u32>>(9)?.map(ResourceId);
            def.pather = blob_to_masks(&row.get::<_, Vec<u8>>(10)?);
            def.visibility = blob_to_masks(&row.get::<_, Vec<u8>>(11)?);
            def.destroyed_pather = blob_to_masks(&row.get::<_, Vec<u8>>(12)?);
            def.destroyed_visibility = blob_to_masks(&row.get::<_, Vec<u8>>(13)?);
            def.allow_overlap = row.get(14)?;
            loaded += 1;
        }
        log::info!("loaded {loaded} archetypes from {ITEM_DEF_TABLE}");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_core::Direction;

    fn row(x: u8, y: u8) -> ItemRow {
        ItemRow {
            x,
            y,
            rot: 1,
            def_index: 2,
            hp: 40,
            flags: ItemFlags::empty(),
            storage: None,
        }
    }

    #[test]
    fn rejects_unsafe_table_names() {
        for bad in ["", "1items", "items; DROP TABLE x", "item-defs", "item_defs"] {
            assert!(
                matches!(
                    MapStore::open_in_memory(bad),
                    Err(MapError::InvalidTableName(_))
                ),
                "{bad}"
            );
        }
        assert!(MapStore::open_in_memory("level_01").is_ok());
    }

    #[test]
    fn insert_update_delete() {
        let store = MapStore::open_in_memory("items").unwrap();
        let first = store.insert_row(&row(1, 2)).unwrap();
        let second = store.insert_row(&row(3, 4)).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.row_count().unwrap(), 2);

        let mut damaged = row(3, 4);
        damaged.hp = 5;
        let mut storage = Storage::new();
        storage.add("grenade", 2);
        damaged.storage = Some(storage);
        assert_eq!(store.update_row(second, &damaged).unwrap(), 1);

        let rows = store.load_keyed_rows().unwrap();
        assert_eq!(rows[1], (second, damaged));

        assert_eq!(store.delete_row(first).unwrap(), 1);
        assert_eq!(store.delete_row(first).unwrap(), 0);
        assert_eq!(store.row_count().unwrap(), 1);
    }

    #[test]
    fn identical_rows_are_addressed_separately() {
        let mut store = MapStore::open_in_memory("items").unwrap();
        let a = store.insert_row(&row(1, 1)).unwrap();
        let b = store.insert_row(&row(1, 1)).unwrap();
        let c = store.insert_row(&row(1, 1)).unwrap();

        let mut damaged = row(1, 1);
        damaged.hp = 3;
        assert_eq!(store.update_row(b, &damaged).unwrap(), 1);
        assert_eq!(store.delete_rows(&[a, c]).unwrap(), 2);
        assert_eq!(store.load_keyed_rows().unwrap(), vec![(b, damaged)]);
    }

    #[test]
    fn failed_batch_delete_keeps_every_row() {
        let mut store = MapStore::open_in_memory("items").unwrap();
        let a = store.insert_row(&row(1, 1)).unwrap();
        store.insert_row(&row(2, 2)).unwrap();
        // Deleting the first row would succeed; the trigger fails the second.
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER keep_row BEFORE DELETE ON items
                 WHEN old.x = 2 BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
            .unwrap();
        let ids: Vec<i64> = store.load_keyed_rows().unwrap().iter().map(|(id, _)| *id).collect();
        assert!(store.delete_rows(&ids).is_err());
        assert_eq!(store.row_count().unwrap(), 2);
        assert_eq!(store.delete_rows(&[a]).unwrap(), 1);
    }

    #[test]
    fn replace_rows_swaps_contents() {
        let mut store = MapStore::open_in_memory("items").unwrap();
        store.insert_row(&row(9, 9)).unwrap();
        let ids = store.replace_rows(&[row(1, 1), row(2, 2)]).unwrap();
        let rows = store.load_keyed_rows().unwrap();
        assert_eq!(rows, vec![(ids[0], row(1, 1)), (ids[1], row(2, 2))]);
    }

    #[test]
    fn archetypes_round_trip() {
        let mut store = MapStore::open_in_memory("items").unwrap();
        let mut defs = ItemDefTable::new();
        {
            let wall = defs.init(4).unwrap();
            wall.name = "wall".to_string();
            wall.cx = 2;
            wall.hp = 120;
            wall.transparency = 96;
            wall.material_flags = MaterialFlags::FLAMMABLE | MaterialFlags::METAL;
            wall.model = Some(ResourceId(77));
            wall.fill(
                EdgeMask::from_directions(&[Direction::North]),
                EdgeMask::SOLID,
            );
            wall.allow_overlap = true;
        }
        assert_eq!(store.save_item_defs(&defs).unwrap(), 1);

        let mut loaded = ItemDefTable::new();
        assert_eq!(store.load_item_defs(&mut loaded).unwrap(), 1);
        assert_eq!(loaded.get(4), defs.get(4));
        let wall = loaded.get(4).unwrap();
        assert_eq!(wall.transparency, 96);
        assert!(wall.material_flags.contains(MaterialFlags::METAL));
        assert!(loaded.get(3).is_none());
    }

    #[test]
    fn short_mask_blob_leaves_cells_open() {
        let masks = blob_to_masks(&[0x0f]);
        assert_eq!(masks[0][0], EdgeMask::SOLID);
        assert_eq!(masks[0][1], EdgeMask::OPEN);
        assert_eq!(blob_to_masks(&masks_to_blob(&masks)), masks);
    }
}
