//! Durable store for rendered migration artifacts.

use crate::error::Error;
use crate::plan::MigrationRecord;
use crate::render;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// A directory of rendered migration files, one `<name>.sql` per record.
#[derive(Debug, Clone)]
pub struct MigrationStore {
    dir: Utf8PathBuf,
}

impl MigrationStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Path a record will be persisted at.
    pub fn path_for(&self, record: &MigrationRecord) -> Utf8PathBuf {
        self.dir.join(format!("{}.sql", record.name))
    }

    /// Serialize `record` and write it under its generated name.
    ///
    /// Writes to a temporary name and renames into place, so a failure
    /// leaves no partial file behind.
    pub fn persist(&self, record: &MigrationRecord) -> Result<Utf8PathBuf, Error> {
        let persist_err = |source: std::io::Error| Error::Persist {
            name: record.name.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(persist_err)?;

        let path = self.path_for(record);
        let tmp = self.dir.join(format!(".{}.sql.tmp", record.name));

        let rendered = render::render_record(record);
        fs::write(&tmp, rendered).map_err(persist_err)?;
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(persist_err(err));
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttributeSpec, ColumnType};
    use crate::plan::{MigrationKind, Operation};

    fn record(name: &str) -> MigrationRecord {
        MigrationRecord {
            name: name.into(),
            kind: MigrationKind::Alter,
            table: "users".into(),
            forward: vec![Operation::AddColumn {
                table: "users".into(),
                column: AttributeSpec::new("avatar_url", ColumnType::Text),
            }],
            reverse: vec![Operation::DropColumn {
                table: "users".into(),
                column: "avatar_url".into(),
            }],
        }
    }

    #[test]
    fn persist_writes_named_artifact() {
        let tmp = std::env::temp_dir().join(format!("remold-store-{}", std::process::id()));
        let dir = Utf8PathBuf::from_path_buf(tmp).unwrap();
        let store = MigrationStore::new(dir.clone());

        let rec = record("20250519165722-alter-user");
        let path = store.persist(&rec).unwrap();

        assert_eq!(path.file_name(), Some("20250519165722-alter-user.sql"));
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("-- up"));
        assert!(contents.contains("-- down"));
        assert!(contents.contains(r#"ADD COLUMN IF NOT EXISTS "avatar_url""#));

        // No temp file left behind.
        let leftovers: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn persist_into_unwritable_store_fails_with_persist_error() {
        let store = MigrationStore::new("/proc/definitely/not/writable");
        let err = store.persist(&record("x")).unwrap_err();
        assert_eq!(err.kind(), "persist");
    }
}
