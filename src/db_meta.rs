use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::schema;

/// Brings the database up to `schema::DB_VERSION`. Missing migrations run
/// in order, each inside its own transaction together with the version
/// stamp, so a failed step leaves the previous version intact.
pub fn ensure_schema(conn: &mut Connection) -> Result<()> {
    trace!("trying to get schema version");

    conn.execute_batch(schema::SETTINGS_SCHEMA)?;

    let db_version: Option<u32> = conn
        .query_row("SELECT db_version FROM Settings", [], |row| row.get(0))
        .optional()?;

    let db_version = match db_version {
        Some(v) => v,
        None => {
            conn.execute("INSERT INTO Settings (db_version) VALUES (0)", [])?;
            0
        }
    };

    if db_version > schema::DB_VERSION {
        error!(
            "unsupported schema version: got {}, expected at most {}",
            db_version,
            schema::DB_VERSION
        );
        return Err(Error::Schema(format!(
            "database version {} is newer than supported version {}",
            db_version,
            schema::DB_VERSION
        )));
    }

    if db_version == schema::DB_VERSION {
        debug!("schema version up-to-date, doing nothing");
        return Ok(());
    }

    for migration in schema::MIGRATIONS {
        if migration.version <= db_version {
            continue;
        }

        debug!("running migration to version {}", migration.version);

        let tran = conn.transaction()?;

        for statement in migration.statements {
            if let Err(e) = tran.execute_batch(statement) {
                error!("migration to version {} failed: {}", migration.version, e);
                return Err(Error::Schema(format!(
                    "migration to version {} failed: {}",
                    migration.version, e
                )));
            }
        }

        tran.execute("UPDATE Settings SET db_version = ?", [migration.version])?;
        tran.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn bootstrap_reaches_target_version() {
        let mut conn = open();
        ensure_schema(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT db_version FROM Settings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, schema::DB_VERSION);
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let mut conn = open();
        ensure_schema(&mut conn).unwrap();
        ensure_schema(&mut conn).unwrap();

        let artists: i64 = conn
            .query_row("SELECT COUNT(*) FROM Artist", [], |row| row.get(0))
            .unwrap();
        assert_eq!(artists, 2);
    }

    #[test]
    fn newer_database_is_rejected() {
        let mut conn = open();
        ensure_schema(&mut conn).unwrap();
        conn.execute("UPDATE Settings SET db_version = ?", [schema::DB_VERSION + 1])
            .unwrap();

        assert!(ensure_schema(&mut conn).is_err());
    }
}
