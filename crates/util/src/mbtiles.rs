use anyhow::{bail, Context, Result};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::json;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};
use types::{Metadata, TileKey};

use crate::geo_math::flip_row;

const SCHEMA: &[&str] = &[
    "PRAGMA application_id = 0x4d504258;",
    "CREATE TABLE metadata (name text, value text);",
    "CREATE TABLE tiles (zoom_level integer, tile_column integer, tile_row integer, tile_data blob);",
    "CREATE UNIQUE INDEX metadata_index on metadata (name);",
    "CREATE UNIQUE INDEX tile_index on tiles (zoom_level, tile_column, tile_row);",
];

const INSERT_TILE: &str = "INSERT OR REPLACE INTO tiles(zoom_level, tile_column, tile_row, tile_data) values(?1, ?2, ?3, ?4)";
const INSERT_METADATA: &str = "INSERT OR REPLACE INTO metadata(name, value) values(?1, ?2)";
const SELECT_TILE: &str =
    "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3";

/// Tile address as persisted: `row` is already flipped to the TMS convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoredTileKey {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl From<&TileKey> for StoredTileKey {
    fn from(key: &TileKey) -> Self {
        StoredTileKey {
            zoom: key.zoom,
            column: key.column,
            row: flip_row(key.zoom, key.row),
        }
    }
}

/// Builds the `json` metadata value listing every layer and its fields.
pub fn vector_layers_json(layers: &BTreeMap<String, BTreeSet<String>>, zoom: u8) -> String {
    let vector_layers: Vec<_> = layers
        .iter()
        .map(|(layer, fields)| {
            let fields: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|field| (field.clone(), json!("String")))
                .collect();
            json!({
                "id": layer,
                "minzoom": zoom,
                "maxzoom": zoom,
                "fields": fields,
            })
        })
        .collect();

    json!({ "vector_layers": vector_layers }).to_string()
}

/// An MBTiles database: a `tiles` blob table plus a `metadata` table.
pub struct TileStore {
    connection: Connection,
    path: PathBuf,
}

impl TileStore {
    /// Opens `path`, creating the schema first if the file did not exist.
    /// Existing tiles are replaced on conflict.
    pub fn create_or_open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let exists = path.exists();
        let connection = Connection::open(path)
            .with_context(|| format!("Could not open database at {}", path.display()))?;

        if !exists {
            info!("Creating database schema in {}", path.display());
            for statement in SCHEMA {
                connection
                    .execute_batch(statement)
                    .with_context(|| format!("Schema statement failed: {statement}"))?;
            }
        }

        Ok(TileStore {
            connection,
            path: path.to_owned(),
        })
    }

    /// Opens an existing database, failing if it is missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            bail!("Could not find database at {}", path.display());
        }
        let connection = Connection::open(path)
            .with_context(|| format!("Could not open database at {}", path.display()))?;

        Ok(TileStore {
            connection,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn transaction(&mut self) -> Result<TileTransaction<'_>> {
        let transaction = self
            .connection
            .transaction()
            .context("Can't start transaction")?;
        Ok(TileTransaction { transaction })
    }

    pub fn tile(&self, key: &StoredTileKey) -> Result<Option<Vec<u8>>> {
        let mut statement = self.connection.prepare_cached(SELECT_TILE)?;
        let data = statement
            .query_row(params![key.zoom, key.column, key.row], |row| row.get(0))
            .optional()
            .with_context(|| {
                format!("Failed to read tile {}/{}/{}", key.zoom, key.column, key.row)
            })?;
        Ok(data)
    }

    pub fn contains(&self, key: &StoredTileKey) -> Result<bool> {
        let mut statement = self.connection.prepare_cached(
            "SELECT 1 FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
        )?;
        Ok(statement.exists(params![key.zoom, key.column, key.row])?)
    }

    pub fn tile_keys(&self) -> Result<Vec<StoredTileKey>> {
        let mut statement = self.connection.prepare(
            "SELECT zoom_level, tile_column, tile_row FROM tiles \
             ORDER BY zoom_level, tile_column, tile_row",
        )?;
        let keys = statement
            .query_map([], |row| {
                Ok(StoredTileKey {
                    zoom: row.get(0)?,
                    column: row.get(1)?,
                    row: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    pub fn tile_count(&self) -> Result<u64> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn metadata(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .connection
            .query_row(
                "SELECT value FROM metadata WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Writes all metadata entries in one transaction.
    pub fn write_metadata(&mut self, meta: &Metadata) -> Result<()> {
        let mut entries: Vec<(&str, String)> = vec![
            ("name", meta.name.clone()),
            ("type", "overlay".to_owned()),
            ("version", "3.3".to_owned()),
            ("description", meta.description.clone()),
            ("format", "pbf".to_owned()),
            ("bounds", meta.bounds.to_string()),
            ("scheme", "tms".to_owned()),
        ];
        if let Some(min_zoom) = meta.min_zoom {
            entries.push(("minzoom", min_zoom.to_string()));
        }
        if let Some(max_zoom) = meta.max_zoom {
            entries.push(("maxzoom", max_zoom.to_string()));
        }
        if let Some(json) = &meta.json {
            entries.push(("json", json.clone()));
        }

        let transaction = self.connection.transaction()?;
        {
            let mut statement = transaction.prepare_cached(INSERT_METADATA)?;
            for (name, value) in &entries {
                statement.execute(params![name, value])?;
            }
        }
        transaction.commit().context("Failed to commit metadata")?;
        debug!("Wrote {} metadata entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

/// A bulk write phase. Dropping it without [`TileTransaction::commit`] rolls
/// every write of the phase back.
pub struct TileTransaction<'a> {
    transaction: Transaction<'a>,
}

impl TileTransaction<'_> {
    pub fn put_tile(&self, key: &StoredTileKey, data: &[u8]) -> Result<()> {
        let mut statement = self.transaction.prepare_cached(INSERT_TILE)?;
        statement
            .execute(params![key.zoom, key.column, key.row, data])
            .with_context(|| format!("Can't write tile {}/{}/{}", key.zoom, key.column, key.row))?;
        Ok(())
    }

    pub fn commit(self) -> Result<()> {
        self.transaction
            .commit()
            .context("Failed to commit transaction")
    }
}
