pub mod models;
mod queries;
mod sqlite;

pub use sqlite::Database;

use crate::error::Error;
use crate::model::{ExtensionRow, MediaRecord, PersistentFolder};
use std::path::Path;

/// Persistence collaborator consumed by the loader.
///
/// Calls are synchronous and only ever made from the controlling thread. Inserts that
/// collide with an existing unique identity fail with [`Error::PersistenceConflict`].
pub trait Store {
    fn load_folders(&self) -> Result<Vec<PersistentFolder>, Error>;

    /// Records stored under `folder`, with `parent` set to the folder's path.
    fn load_records(&self, folder: &PersistentFolder) -> Result<Vec<MediaRecord>, Error>;

    fn load_extensions(&self) -> Result<Vec<ExtensionRow>, Error>;

    fn save_folder(&self, path: &str) -> Result<PersistentFolder, Error>;

    fn save_extension(&self, name: &str) -> Result<ExtensionRow, Error>;

    /// Insert one record row, returning its id.
    fn save_record(
        &self,
        folder: &PersistentFolder,
        extension: &ExtensionRow,
        record: &MediaRecord,
    ) -> Result<i64, Error>;
}

impl Store for Database {
    fn load_folders(&self) -> Result<Vec<PersistentFolder>, Error> {
        Ok(self.get_folders()?)
    }

    fn load_records(&self, folder: &PersistentFolder) -> Result<Vec<MediaRecord>, Error> {
        let parent = Path::new(&folder.path);
        Ok(self
            .get_media_records(folder.id)?
            .into_iter()
            .map(|row| row.into_record(parent))
            .collect())
    }

    fn load_extensions(&self) -> Result<Vec<ExtensionRow>, Error> {
        Ok(self.get_extensions()?)
    }

    fn save_folder(&self, path: &str) -> Result<PersistentFolder, Error> {
        Ok(self.insert_folder(path)?)
    }

    fn save_extension(&self, name: &str) -> Result<ExtensionRow, Error> {
        Ok(self.insert_extension(name)?)
    }

    fn save_record(
        &self,
        folder: &PersistentFolder,
        extension: &ExtensionRow,
        record: &MediaRecord,
    ) -> Result<i64, Error> {
        Ok(self.insert_media_record(folder.id, extension.id, record)?)
    }
}
