//! Filesystem snapshot store: one `<generation>.json` file per record.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{PopulationSnapshot, SnapshotStore, StoreError};

/// Extension of completed records.
const RECORD_EXTENSION: &str = "json";

/// Snapshot store backed by a directory.
///
/// Records are written to a temporary file, synced, then renamed into place,
/// so an interrupted save never clobbers an existing record.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    /// Store rooted at `dir`. The directory is created on first save.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Store rooted at `dir`, creating it now.
    pub fn create<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir)?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `generation`.
    pub fn record_path(&self, generation: u32) -> PathBuf {
        self.dir.join(format!("{generation}.{RECORD_EXTENSION}"))
    }

    fn temp_path(&self, generation: u32) -> PathBuf {
        self.dir.join(format!("{generation}.{RECORD_EXTENSION}.tmp"))
    }
}

impl SnapshotStore for DirectoryStore {
    fn save(&mut self, snapshot: &PopulationSnapshot) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let json = snapshot.encode()?;
        let temp = self.temp_path(snapshot.generation);
        let path = self.record_path(snapshot.generation);

        {
            let mut file = File::create(&temp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp, &path)?;

        log::debug!("Saved generation {} to {}", snapshot.generation, path.display());
        Ok(())
    }

    fn generations(&self) -> Result<Vec<u32>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut generations = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == RECORD_EXTENSION)
                && let Some(generation) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u32>().ok())
            {
                generations.push(generation);
            }
        }

        generations.sort_unstable();
        Ok(generations)
    }

    fn load(&self, generation: u32) -> Result<PopulationSnapshot, StoreError> {
        let path = self.record_path(generation);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::Missing(generation));
            }
            Err(e) => return Err(e.into()),
        };

        log::debug!("Loading {}", path.display());
        PopulationSnapshot::decode(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::Population;
    use crate::schema::NeatConfig;
    use tempfile::tempdir;

    fn snapshot(generation: u32, best_fitness: f64) -> PopulationSnapshot {
        let config = NeatConfig {
            population_size: 6,
            input_size: 2,
            output_size: 2,
            random_seed: Some(generation as u64),
            ..Default::default()
        };
        let mut snapshot = Population::new(config).unwrap().snapshot();
        snapshot.generation = generation;
        snapshot.best_fitness = best_fitness;
        snapshot
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path().join("absent"));
        assert!(store.generations().unwrap().is_empty());
        assert!(store.load_latest().unwrap().is_none());
    }

    #[test]
    fn test_latest_generation_wins() {
        let dir = tempdir().unwrap();
        let mut store = DirectoryStore::create(dir.path()).unwrap();

        for generation in [3, 12, 7] {
            store.save(&snapshot(generation, generation as f64)).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        fs::write(dir.path().join("draft.json"), "{}").unwrap();

        assert_eq!(store.generations().unwrap(), vec![3, 7, 12]);
        let latest = store.load_latest().unwrap().unwrap();
        assert_eq!(latest, snapshot(12, 12.0));
    }

    #[test]
    fn test_no_temp_files_left() {
        let dir = tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        store.save(&snapshot(2, 1.0)).unwrap();
        store.save(&snapshot(2, 4.0)).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2.json".to_string()]);
        assert_eq!(store.load(2).unwrap().best_fitness, 4.0);
    }

    #[test]
    fn test_fitness_history() {
        let dir = tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        store.save(&snapshot(1, 0.5)).unwrap();
        store.save(&snapshot(2, 2.5)).unwrap();

        assert_eq!(store.fitness_history().unwrap(), vec![(1, 0.5), (2, 2.5)]);
    }

    #[test]
    fn test_missing_generation() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(matches!(store.load(4), Err(StoreError::Missing(4))));
    }

    #[test]
    fn test_corrupt_record_fails_open() {
        let dir = tempdir().unwrap();
        let mut store = DirectoryStore::new(dir.path());
        store.save(&snapshot(1, 0.0)).unwrap();
        fs::write(store.record_path(2), "{\"version\": 1, \"generation\": 2}").unwrap();

        let result = Population::open(NeatConfig::default(), Box::new(store.clone()));
        assert!(matches!(
            result,
            Err(crate::compute::PopulationError::Store(StoreError::Decode(_)))
        ));
    }
}
