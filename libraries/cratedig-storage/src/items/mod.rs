use cratedig_core::{error::Result, types::*};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::PathBuf;

const ITEM_COLUMNS: &str = "id, path, title, artist, album, album_artist, track_number, track_total,
     disc_number, disc_total, year, label, catalog_number, length_ms, track_id, album_id";

fn record_from_row(row: &SqliteRow) -> TrackRecord {
    let path: String = row.get("path");
    TrackRecord {
        path: PathBuf::from(path),
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
        album_artist: row.get("album_artist"),
        track_number: row.get::<Option<i64>, _>("track_number").map(|v| v as u32),
        track_total: row.get::<Option<i64>, _>("track_total").map(|v| v as u32),
        disc_number: row.get::<Option<i64>, _>("disc_number").map(|v| v as u32),
        disc_total: row.get::<Option<i64>, _>("disc_total").map(|v| v as u32),
        year: row.get::<Option<i64>, _>("year").map(|v| v as i32),
        label: row.get("label"),
        catalog_number: row.get("catalog_number"),
        length_ms: row.get::<Option<i64>, _>("length_ms").map(|v| v as u64),
        fingerprint: None,
        track_id: row.get("track_id"),
        album_id: row.get("album_id"),
    }
}

/// Identity an item occupies as a singleton
pub fn identity_of(record: &TrackRecord) -> Identity {
    Identity::Item {
        artist: record.artist.clone().unwrap_or_default(),
        title: record.display_title(),
    }
}

/// Items of an album in disc/track order
pub async fn get_by_album(pool: &SqlitePool, album_ref: i64) -> Result<Vec<TrackRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM items
         WHERE album_ref = ?
         ORDER BY disc_number, track_number, id"
    ))
    .bind(album_ref)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<TrackRecord>> {
    let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(record_from_row))
}

/// Singleton items (not part of an album) with this identity key
pub async fn find_singletons(pool: &SqlitePool, identity_key: &str) -> Result<Vec<CatalogEntry>> {
    let rows = sqlx::query(
        "SELECT id, path, title, artist, year FROM items
         WHERE identity_key = ? AND album_ref IS NULL
         ORDER BY id",
    )
    .bind(identity_key)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let path: String = row.get("path");
            let title: Option<String> = row.get("title");
            let artist: Option<String> = row.get("artist");
            CatalogEntry {
                id: EntryId::Item(row.get("id")),
                artist: artist.unwrap_or_default(),
                title: title.unwrap_or_default(),
                year: row.get::<Option<i64>, _>("year").map(|v| v as i32),
                paths: vec![PathBuf::from(path)],
            }
        })
        .collect())
}

/// Paths of every item of an album
pub async fn paths_for_album(conn: &mut SqliteConnection, album_ref: i64) -> Result<Vec<PathBuf>> {
    let rows = sqlx::query("SELECT path FROM items WHERE album_ref = ? ORDER BY id")
        .bind(album_ref)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| PathBuf::from(row.get::<String, _>("path")))
        .collect())
}

/// Paths of items stored anywhere below `dir`
pub async fn paths_under(pool: &SqlitePool, dir: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    let rows = sqlx::query(
        "SELECT path FROM items
         WHERE substr(path, 1, length(?1)) = ?1
         ORDER BY path",
    )
    .bind(&prefix)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PathBuf::from(row.get::<String, _>("path")))
        .collect())
}

/// Insert one item, optionally attached to an album
pub async fn insert(
    conn: &mut SqliteConnection,
    record: &TrackRecord,
    album_ref: Option<i64>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO items (
            album_ref, path, title, artist, album, album_artist, track_number, track_total,
            disc_number, disc_total, year, label, catalog_number, length_ms, track_id, album_id,
            identity_key
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(album_ref)
    .bind(record.path.to_string_lossy().into_owned())
    .bind(&record.title)
    .bind(&record.artist)
    .bind(&record.album)
    .bind(&record.album_artist)
    .bind(record.track_number.map(i64::from))
    .bind(record.track_total.map(i64::from))
    .bind(record.disc_number.map(i64::from))
    .bind(record.disc_total.map(i64::from))
    .bind(record.year.map(i64::from))
    .bind(&record.label)
    .bind(&record.catalog_number)
    .bind(record.length_ms.map(|v| v as i64))
    .bind(&record.track_id)
    .bind(&record.album_id)
    .bind(identity_of(record).key())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Delete one item, returning its path
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<Option<PathBuf>> {
    let row = sqlx::query("SELECT path FROM items WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(Some(PathBuf::from(row.get::<String, _>("path"))))
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM items")
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}
