use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
};

use crate::common::{Operator, RegistryError};

/// A registry snapshot stored on the filesystem.
///
/// The file is the JSON array of operators produced by a previous run. Keys that were
/// already validated keep their verdict, so the snapshot doubles as a validation cache.
#[derive(Debug, Clone)]
pub struct FilesystemRegistry {
    /// The path to the snapshot file.
    pub path: PathBuf,
    /// The operators loaded from the file.
    pub operators: Vec<Operator>,
}

impl FilesystemRegistry {
    /// Loads the snapshot at the given path.
    pub fn read_from_file(path: PathBuf) -> Result<Self, RegistryError> {
        let file = BufReader::new(File::open(&path)?);
        let operators = serde_json::from_reader(file)?;

        Ok(Self { path, operators })
    }

    /// Writes `operators` as a snapshot to `path`.
    pub fn write_to_file(path: PathBuf, operators: Vec<Operator>) -> Result<Self, RegistryError> {
        let mut file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut file, &operators)?;
        file.flush()?;

        Ok(Self { path, operators })
    }
}
