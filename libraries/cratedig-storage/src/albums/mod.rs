use crate::items;
use cratedig_core::{error::Result, types::*, DigError};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Albums with this identity key, with the paths of their items
pub async fn find_by_identity(pool: &SqlitePool, identity_key: &str) -> Result<Vec<CatalogEntry>> {
    let rows = sqlx::query(
        "SELECT id, album_artist, album, year FROM albums
         WHERE identity_key = ?
         ORDER BY id",
    )
    .bind(identity_key)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        let paths = items::get_by_album(pool, id)
            .await?
            .into_iter()
            .map(|item| item.path)
            .collect();
        entries.push(CatalogEntry {
            id: EntryId::Album(id),
            artist: row.get("album_artist"),
            title: row.get("album"),
            year: row.get::<Option<i64>, _>("year").map(|v| v as i32),
            paths,
        });
    }
    Ok(entries)
}

pub async fn insert(conn: &mut SqliteConnection, album: &NewAlbum) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO albums (album_artist, album, year, label, album_id, identity_key)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&album.album_artist)
    .bind(&album.album)
    .bind(album.year.map(i64::from))
    .bind(&album.label)
    .bind(&album.album_id)
    .bind(album.identity().key())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Delete an album and its items, returning the item paths
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<Vec<std::path::PathBuf>> {
    let paths = items::paths_for_album(&mut *conn, id).await?;

    sqlx::query("DELETE FROM items WHERE album_ref = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DigError::not_found("Album", id.to_string()));
    }
    Ok(paths)
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM albums")
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}
