//! Persistence for captured bursts.
//!
//! A store holds named containers, each an append-only collection of
//! datasets named `signal_1`, `signal_2`, ... [`DirStore`] keeps every
//! container as a directory under its root:
//!
//! ```text
//! <root>/<container>/counter            last dataset number handed out
//! <root>/<container>/signal_<n>.cf32    interleaved f32 IQ, native endian
//! <root>/<container>/signal_<n>.toml    CaptureMetadata
//! ```
//!
//! With the `storage_hdf5` feature, `crate::hdf5_store::Hdf5Store` keeps each
//! container as one HDF5 file instead.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use byte_slice_cast::AsByteSlice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    chunk::{interleave, SampleChunk},
    complex::Sample,
    error::{Error, Result},
};

const COUNTER_FILE: &str = "counter";
const DATA_EXT: &str = "cf32";
const META_EXT: &str = "toml";

/// Everything recorded alongside a capture
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureMetadata {
    pub sample_count: u64,
    /// Hz
    pub center_frequency: f64,
    pub duration_seconds: f64,
    pub threshold: f32,
    /// Samples per second
    pub sample_rate: f64,
    pub captured_at: DateTime<Utc>,
}

impl CaptureMetadata {
    pub fn new(
        sample_count: usize,
        center_frequency: f64,
        threshold: f32,
        sample_rate: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sample_count: sample_count as u64,
            center_frequency,
            duration_seconds: sample_count as f64 / sample_rate,
            threshold,
            sample_rate,
            captured_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(u64);

impl DatasetId {
    pub fn new(number: u64) -> Self {
        Self(number)
    }

    pub fn number(&self) -> u64 {
        self.0
    }

    fn data_file(&self) -> String {
        format!("{self}.{DATA_EXT}")
    }

    fn meta_file(&self) -> String {
        format!("{self}.{META_EXT}")
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal_{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix("signal_")
            .and_then(|n| n.parse().ok())
            .map(Self)
            .ok_or_else(|| Error::Storage(format!("not a dataset name: {s}")))
    }
}

pub trait CaptureStore {
    /// Write a new dataset into `container`, never replacing an existing one
    fn save(
        &mut self,
        container: &str,
        samples: &[Sample],
        metadata: &CaptureMetadata,
    ) -> Result<DatasetId>;

    fn load(&self, container: &str, dataset: DatasetId) -> Result<Vec<Sample>>;

    fn metadata(&self, container: &str, dataset: DatasetId) -> Result<CaptureMetadata>;

    /// Datasets in `container`, in the order they were saved
    fn datasets(&self, container: &str) -> Result<Vec<DatasetId>>;

    /// Every container in the store, sorted by name
    fn containers(&self) -> Result<Vec<String>>;
}

/// Reject names that would escape the store's root
pub(crate) fn check_container_name(container: &str) -> Result<()> {
    if container.is_empty()
        || container == "."
        || container == ".."
        || container.contains(|c: char| c == '/' || c == '\\')
    {
        return Err(Error::Storage(format!(
            "invalid container name {container:?}"
        )));
    }
    Ok(())
}

/// Directory-backed capture store
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> Result<PathBuf> {
        check_container_name(container)?;
        Ok(self.root.join(container))
    }

    fn existing_container(&self, container: &str) -> Result<PathBuf> {
        let dir = self.container_dir(container)?;
        if !dir.is_dir() {
            return Err(Error::Storage(format!("no container named {container:?}")));
        }
        Ok(dir)
    }

    fn scan(dir: &Path) -> Result<Vec<DatasetId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DATA_EXT) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Highest dataset number handed out so far
    fn last_number(dir: &Path) -> Result<u64> {
        let counter = match fs::read_to_string(dir.join(COUNTER_FILE)) {
            Ok(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::Storage(format!("corrupt counter in {}", dir.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let newest = Self::scan(dir)?.last().map_or(0, DatasetId::number);
        Ok(counter.max(newest))
    }
}

impl CaptureStore for DirStore {
    fn save(
        &mut self,
        container: &str,
        samples: &[Sample],
        metadata: &CaptureMetadata,
    ) -> Result<DatasetId> {
        let dir = self.container_dir(container)?;
        fs::create_dir_all(&dir)?;
        let id = DatasetId(Self::last_number(&dir)? + 1);

        // A dataset exists once its data file does, so that goes last. Any
        // metadata already at this number belongs to an earlier failed save.
        let meta_path = dir.join(id.meta_file());
        fs::write(&meta_path, toml::to_string(metadata)?)?;
        let data_path = dir.join(id.data_file());
        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&data_path)
            .and_then(|mut file| file.write_all(interleave(samples).as_byte_slice()));
        if let Err(e) = written {
            let _ = fs::remove_file(&data_path);
            let _ = fs::remove_file(&meta_path);
            return Err(e.into());
        }
        fs::write(dir.join(COUNTER_FILE), id.0.to_string())?;
        Ok(id)
    }

    fn load(&self, container: &str, dataset: DatasetId) -> Result<Vec<Sample>> {
        let path = self.existing_container(container)?.join(dataset.data_file());
        let bytes = fs::read(&path)?;
        if bytes.len() % 8 != 0 {
            return Err(Error::Storage(format!(
                "{} is not whole complex samples",
                path.display()
            )));
        }
        // A Vec<u8> carries no f32 alignment, so decode instead of casting
        let raw: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(SampleChunk::from_interleaved(&raw)?.into_samples())
    }

    fn metadata(&self, container: &str, dataset: DatasetId) -> Result<CaptureMetadata> {
        let path = self.existing_container(container)?.join(dataset.meta_file());
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    fn datasets(&self, container: &str) -> Result<Vec<DatasetId>> {
        Self::scan(&self.existing_container(container)?)
    }

    fn containers(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
