//! HDF5 capture store.
//!
//! Every container is one `<root>/<container>.hdf5` file. Each capture is a
//! 1-D `f32` dataset `signal_<n>` of interleaved IQ samples whose attributes
//! carry the [`CaptureMetadata`]. The file's `counter` attribute is the last
//! dataset number handed out.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use hdf5::{types::VarLenUnicode, Dataset, File, Location};

use crate::{
    chunk::{interleave, SampleChunk},
    complex::Sample,
    error::{Error, Result},
    storage::{check_container_name, CaptureMetadata, CaptureStore, DatasetId},
};

const FILE_EXT: &str = "hdf5";
const COUNTER: &str = "counter";

pub struct Hdf5Store {
    root: PathBuf,
}

impl Hdf5Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_path(&self, container: &str) -> Result<PathBuf> {
        check_container_name(container)?;
        Ok(self.root.join(format!("{container}.{FILE_EXT}")))
    }

    fn open(&self, container: &str) -> Result<File> {
        let path = self.container_path(container)?;
        if !path.is_file() {
            return Err(Error::Storage(format!("no container named {container:?}")));
        }
        Ok(File::open(path)?)
    }

    fn scan(file: &File) -> Result<Vec<DatasetId>> {
        let mut ids: Vec<DatasetId> = file
            .member_names()?
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn last_number(file: &File) -> Result<u64> {
        let counter = match file.attr(COUNTER) {
            Ok(attr) => attr.read_scalar::<u64>()?,
            Err(_) => 0,
        };
        let newest = Self::scan(file)?.last().map_or(0, DatasetId::number);
        Ok(counter.max(newest))
    }
}

fn write_attr<T: hdf5::H5Type>(ds: &Dataset, name: &str, value: &T) -> Result<()> {
    ds.new_attr::<T>().create(name)?.write_scalar(value)?;
    Ok(())
}

fn write_metadata(ds: &Dataset, metadata: &CaptureMetadata) -> Result<()> {
    write_attr(ds, "sample_count", &metadata.sample_count)?;
    write_attr(ds, "center_frequency", &metadata.center_frequency)?;
    write_attr(ds, "duration_seconds", &metadata.duration_seconds)?;
    write_attr(ds, "threshold", &metadata.threshold)?;
    write_attr(ds, "sample_rate", &metadata.sample_rate)?;
    let captured_at: VarLenUnicode = metadata
        .captured_at
        .to_rfc3339()
        .parse()
        .map_err(|e| Error::Storage(format!("captured_at: {e}")))?;
    write_attr(ds, "captured_at", &captured_at)
}

fn read_attr<T: hdf5::H5Type>(loc: &Location, name: &str) -> Result<T> {
    Ok(loc.attr(name)?.read_scalar::<T>()?)
}

fn read_metadata(ds: &Dataset) -> Result<CaptureMetadata> {
    let captured_at: VarLenUnicode = read_attr(ds, "captured_at")?;
    let captured_at = DateTime::parse_from_rfc3339(captured_at.as_str())
        .map_err(|e| Error::Storage(format!("captured_at: {e}")))?
        .with_timezone(&Utc);
    Ok(CaptureMetadata {
        sample_count: read_attr(ds, "sample_count")?,
        center_frequency: read_attr(ds, "center_frequency")?,
        duration_seconds: read_attr(ds, "duration_seconds")?,
        threshold: read_attr(ds, "threshold")?,
        sample_rate: read_attr(ds, "sample_rate")?,
        captured_at,
    })
}

impl CaptureStore for Hdf5Store {
    fn save(
        &mut self,
        container: &str,
        samples: &[Sample],
        metadata: &CaptureMetadata,
    ) -> Result<DatasetId> {
        let path = self.container_path(container)?;
        fs::create_dir_all(&self.root)?;
        let file = if path.exists() {
            File::open_rw(&path)?
        } else {
            File::create(&path)?
        };
        let id = DatasetId::new(Self::last_number(&file)? + 1);
        let name = id.to_string();

        let raw = interleave(samples);
        let ds = file
            .new_dataset::<f32>()
            .shape(raw.len())
            .create(name.as_str())?;
        let filled = ds
            .write_raw(raw.as_slice())
            .map_err(Error::from)
            .and_then(|()| write_metadata(&ds, metadata));
        if let Err(e) = filled {
            // Half-written datasets would show up without metadata
            drop(ds);
            let _ = file.unlink(&name);
            return Err(e);
        }

        match file.attr(COUNTER) {
            Ok(attr) => attr.write_scalar(&id.number())?,
            Err(_) => file
                .new_attr::<u64>()
                .create(COUNTER)?
                .write_scalar(&id.number())?,
        }
        Ok(id)
    }

    fn load(&self, container: &str, dataset: DatasetId) -> Result<Vec<Sample>> {
        let raw = self
            .open(container)?
            .dataset(&dataset.to_string())?
            .read_raw::<f32>()?;
        Ok(SampleChunk::from_interleaved(&raw)?.into_samples())
    }

    fn metadata(&self, container: &str, dataset: DatasetId) -> Result<CaptureMetadata> {
        read_metadata(&self.open(container)?.dataset(&dataset.to_string())?)
    }

    fn datasets(&self, container: &str) -> Result<Vec<DatasetId>> {
        Self::scan(&self.open(container)?)
    }

    fn containers(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(n: usize) -> CaptureMetadata {
        CaptureMetadata::new(n, 433.92e6, 0.25, 1e6, Utc::now())
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Hdf5Store::new(dir.path());
        let samples = vec![Sample::new(0.5, -0.25), Sample::new(1.0, 2.0)];
        let m = meta(samples.len());

        let id = store.save("garage", &samples, &m).unwrap();
        assert_eq!(id, DatasetId::new(1));
        assert_eq!(store.load("garage", id).unwrap(), samples);
        let read = store.metadata("garage", id).unwrap();
        assert_eq!(read.sample_count, 2);
        assert_eq!(read.center_frequency, 433.92e6);
        assert_eq!(read.threshold, 0.25);
        // RFC 3339 keeps nanoseconds
        assert_eq!(read.captured_at, m.captured_at);
        assert_eq!(store.containers().unwrap(), vec!["garage"]);
    }

    #[test]
    fn test_append_only_numbering() {
        let dir = tempfile::tempdir().unwrap();
        let one = [Sample::new(1.0, 0.0)];
        {
            let mut store = Hdf5Store::new(dir.path());
            for _ in 0..3 {
                store.save("a", &one, &meta(1)).unwrap();
            }
        }
        let mut again = Hdf5Store::new(dir.path());
        assert_eq!(again.save("a", &one, &meta(1)).unwrap(), DatasetId::new(4));
        assert_eq!(
            again.datasets("a").unwrap(),
            (1..=4).map(DatasetId::new).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_missing_container() {
        let dir = tempfile::tempdir().unwrap();
        let store = Hdf5Store::new(dir.path());
        assert!(matches!(store.datasets("nope"), Err(Error::Storage(_))));
        assert!(store.containers().unwrap().is_empty());
    }
}
