//! Persistent path → digest store used to skip unchanged items on re-scan.
//!
//! The store is a MessagePack file mapping stringified paths to hexadecimal
//! digests (or stringified mtimes). It is created mode 0600 and held under
//! an exclusive lock for the lifetime of the scan. An item counts as cached
//! when its stored digest equals its current digest.

use crate::checksum::{self, Algorithm};
use crate::config::Config;
use crate::errors::ScanError;
use crate::meta::Item;
use crate::output::p2s;
use fnv::FnvHashMap;
use nix::fcntl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::ops::{Deref, DerefMut};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::prelude::*;
use std::path::{Path, PathBuf};

pub const DEFAULT_ALGORITHM: &str = "sha1";
pub const DEFAULT_BLOCKSIZE: usize = 16_384;

/// Creates or opens a store file, mode 0600, with an exclusive flock.
pub fn open_locked<P: AsRef<Path>>(path: P) -> Result<fs::File, ScanError> {
    let f = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(&path)
        .map_err(|source| ScanError::Inaccessible {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
    fcntl::flock(f.as_raw_fd(), fcntl::FlockArg::LockExclusiveNonblock).map_err(|e| {
        ScanError::Report(format!(
            "failed to lock {}: another instance running? ({})",
            p2s(&path),
            e
        ))
    })?;
    Ok(f)
}

/// On-disk data structure. Keys are UTF-8 paths, values UTF-8 digests.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct StoreMap {
    map: FnvHashMap<String, String>,
}

impl StoreMap {
    /// Reads a store file. A damaged or empty file yields an empty map.
    pub fn load<P: AsRef<Path>>(file: &mut fs::File, filename: P) -> io::Result<StoreMap> {
        let mut raw = Vec::new();
        file.seek(io::SeekFrom::Start(0))?;
        file.read_to_end(&mut raw)?;
        if raw.is_empty() {
            return Ok(Self::default());
        }
        match rmp_serde::decode::from_slice(&raw) {
            Ok(map) => Ok(map),
            Err(err) => {
                warn!(
                    "problem while loading incremental state from {}: {} - starting empty",
                    p2s(&filename),
                    err
                );
                Ok(Self::default())
            }
        }
    }

    /// Writes the map into an open store file.
    pub fn save(&self, file: &mut fs::File) -> Result<(), ScanError> {
        file.seek(io::SeekFrom::Start(0))?;
        file.set_len(0)?;
        let raw = rmp_serde::encode::to_vec(self)
            .map_err(|e| ScanError::Report(format!("cannot encode incremental state: {}", e)))?;
        file.write_all(&raw)?;
        Ok(file.flush()?)
    }
}

impl Deref for StoreMap {
    type Target = FnvHashMap<String, String>;

    fn deref(&self) -> &FnvHashMap<String, String> {
        &self.map
    }
}

impl DerefMut for StoreMap {
    fn deref_mut(&mut self) -> &mut FnvHashMap<String, String> {
        &mut self.map
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Digest {
    Mtime,
    Content(Algorithm),
}

#[derive(Debug)]
pub struct Incremental {
    digest: Digest,
    blocksize: usize,
    filename: PathBuf,
    file: fs::File,
    map: StoreMap,
    /// Per-scan memo so querying and adding the same item hashes once.
    memo: HashMap<String, String>,
    dirty: bool,
}

impl Incremental {
    pub fn open(config: &Config) -> Result<Self, ScanError> {
        let database = config.get("incremental", "database").ok_or_else(|| {
            ScanError::MissingOption("incremental".to_string(), "database".to_string())
        })?;
        let algorithm = config.getdefault("incremental", "algorithm", DEFAULT_ALGORITHM);
        let digest = match algorithm.as_str() {
            "mtime" => Digest::Mtime,
            name => Digest::Content(name.parse()?),
        };
        let blocksize = match config.getint("incremental", "blocksize")? {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_BLOCKSIZE,
        };
        let filename = PathBuf::from(&database);
        if let Some(dir) = filename.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let mut file = open_locked(&filename)?;
        let map = StoreMap::load(&mut file, &filename)?;
        debug!(
            "tracking incremental changes in {} ({} entries)",
            p2s(&filename),
            map.len()
        );
        Ok(Incremental {
            digest,
            blocksize,
            filename,
            file,
            map,
            memo: HashMap::new(),
            dirty: false,
        })
    }

    fn digest(&mut self, item: &Item) -> Result<String, ScanError> {
        let key = item.path().display().to_string();
        if let Some(known) = self.memo.get(&key) {
            return Ok(known.clone());
        }
        let value = match self.digest {
            Digest::Mtime => item.stat().mtime.to_string(),
            Digest::Content(algorithm) => {
                let mut handle = item.open()?;
                checksum::hexdigest_reader(algorithm, &mut handle, self.blocksize)?
            }
        };
        self.memo.insert(key, value.clone());
        Ok(value)
    }

    /// True when a prior run recorded a digest equal to the current one.
    pub fn contains(&mut self, item: &Item) -> bool {
        let key = item.path().display().to_string();
        let old = match self.map.get(&key) {
            None => return false,
            Some(old) => old.clone(),
        };
        match self.digest(item) {
            Ok(new) => old == new,
            Err(e) => {
                warn!("cannot compute digest for {}: {}", item, e);
                false
            }
        }
    }

    pub fn add(&mut self, item: &Item) -> Result<(), ScanError> {
        let key = item.path().display().to_string();
        let value = self.digest(item)?;
        self.map.insert(key, value);
        self.dirty = true;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<(), ScanError> {
        if !self.dirty {
            return Ok(());
        }
        debug!(
            "writing {} entries to {}",
            self.map.len(),
            p2s(&self.filename)
        );
        self.map.save(&mut self.file)?;
        self.dirty = false;
        Ok(())
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Item;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fn config(dir: &Path, algorithm: &str) -> Config {
        Config::from_str(&format!(
            "[incremental]\ndatabase = {}\nalgorithm = {}\n",
            dir.join("state.db").display(),
            algorithm
        ))
        .unwrap()
    }

    fn item(path: &Path) -> Item {
        Item::from_fs(path, 1).unwrap()
    }

    #[test]
    fn store_file_should_be_private() {
        let t = tempfile::tempdir().unwrap();
        let _inc = Incremental::open(&config(t.path(), "sha1")).unwrap();
        let mode = fs::metadata(t.path().join("state.db")).unwrap().permissions().mode();
        assert_eq!(0o600, mode & 0o777);
    }

    #[test]
    fn missing_database_option_should_fail() {
        let c = Config::from_str("[incremental]\nalgorithm = sha1\n").unwrap();
        assert!(matches!(
            Incremental::open(&c),
            Err(ScanError::MissingOption(_, _))
        ));
    }

    #[test]
    fn unchanged_item_should_hit_after_add() {
        let t = tempfile::tempdir().unwrap();
        let p = t.path().join("data.txt");
        writeln!(fs::File::create(&p).unwrap(), "stable contents").unwrap();
        let mut inc = Incremental::open(&config(t.path(), "sha1")).unwrap();
        let it = item(&p);
        assert!(!inc.contains(&it));
        inc.add(&it).unwrap();
        assert!(inc.contains(&it));
    }

    #[test]
    fn changed_item_should_miss() {
        let t = tempfile::tempdir().unwrap();
        let p = t.path().join("data.txt");
        writeln!(fs::File::create(&p).unwrap(), "before").unwrap();
        let mut inc = Incremental::open(&config(t.path(), "sha256")).unwrap();
        inc.add(&item(&p)).unwrap();
        inc.memo.clear();
        writeln!(fs::File::create(&p).unwrap(), "after").unwrap();
        assert!(!inc.contains(&item(&p)));
    }

    #[test]
    fn state_should_survive_reopen() {
        let t = tempfile::tempdir().unwrap();
        let p = t.path().join("data.txt");
        writeln!(fs::File::create(&p).unwrap(), "durable").unwrap();
        {
            let mut inc = Incremental::open(&config(t.path(), "sha1")).unwrap();
            inc.add(&item(&p)).unwrap();
            inc.commit().unwrap();
        }
        let mut inc = Incremental::open(&config(t.path(), "sha1")).unwrap();
        assert_eq!(1, inc.len());
        assert!(inc.contains(&item(&p)));
    }

    #[test]
    fn mtime_digest_should_not_read_contents() {
        let t = tempfile::tempdir().unwrap();
        let p = t.path().join("data.txt");
        writeln!(fs::File::create(&p).unwrap(), "whatever").unwrap();
        let mut inc = Incremental::open(&config(t.path(), "mtime")).unwrap();
        let it = item(&p);
        inc.add(&it).unwrap();
        assert_eq!(
            it.stat().mtime.to_string(),
            *inc.map.get(&it.path().display().to_string()).unwrap()
        );
    }

    #[test]
    fn truncated_store_should_start_empty() {
        let t = tempfile::tempdir().unwrap();
        let c = config(t.path(), "sha1");
        {
            let p = t.path().join("data.txt");
            writeln!(fs::File::create(&p).unwrap(), "x").unwrap();
            let mut inc = Incremental::open(&c).unwrap();
            inc.add(&item(&p)).unwrap();
            inc.commit().unwrap();
        }
        let store = t.path().join("state.db");
        let len = fs::metadata(&store).unwrap().len();
        let f = fs::OpenOptions::new().write(true).open(&store).unwrap();
        f.set_len(len / 2).unwrap();
        drop(f);
        let inc = Incremental::open(&c).unwrap();
        assert!(inc.is_empty());
    }
}
