use super::{paginate_sorted_ids, StorageBackend};
use crate::error::StorageError;
use crate::types::{Metadata, Page, Vector, VectorId};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// The only record format version this crate writes or accepts. Unknown
/// versions are a fatal load error rather than a best-effort parse.
const RECORD_VERSION: u8 = 1;

/// Each vector persisted as one record file under `data_dir`, named by id.
pub struct DiskStorage {
    data_dir: PathBuf,
    /// Cached set of known ids so existence checks and listing don't
    /// re-scan the directory on every call.
    index: RwLock<HashSet<VectorId>>,
}

impl DiskStorage {
    /// Open (creating if absent) a data directory, loading the ids of any
    /// existing records so a reopened directory picks up where it left off.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let mut index = HashSet::new();
        for entry in fs::read_dir(&data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(".vec") {
                    if let Ok(id) = VectorId::parse(stem) {
                        index.insert(id);
                    }
                }
            }
        }

        Ok(Self {
            data_dir,
            index: RwLock::new(index),
        })
    }

    fn record_path(&self, id: &VectorId) -> PathBuf {
        self.data_dir.join(format!("{id}.vec"))
    }

    fn write_record(
        &self,
        id: &VectorId,
        vector: &Vector,
        metadata: &Option<Metadata>,
    ) -> Result<(), StorageError> {
        let mut buf = Vec::new();
        buf.push(RECORD_VERSION);

        let id_str = id.to_string();
        buf.extend_from_slice(&(id_str.len() as u32).to_le_bytes());
        buf.extend_from_slice(id_str.as_bytes());

        buf.extend_from_slice(&(vector.len() as u32).to_le_bytes());
        for x in vector {
            buf.extend_from_slice(&x.to_le_bytes());
        }

        match metadata {
            Some(m) => {
                let json = serde_json::to_vec(m)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
                buf.extend_from_slice(&json);
            }
            None => buf.extend_from_slice(&0u32.to_le_bytes()),
        }

        let tmp_path = self.record_path(id).with_extension("vec.tmp");
        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&buf)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, self.record_path(id))?;
        Ok(())
    }

    fn read_record(&self, id: &VectorId) -> Result<(Vector, Option<Metadata>), StorageError> {
        let mut buf = Vec::new();
        fs::File::open(self.record_path(id))?.read_to_end(&mut buf)?;
        let mut cursor = 0usize;

        let take = |cursor: &mut usize, n: usize| -> Result<&[u8], StorageError> {
            let end = *cursor + n;
            let slice = buf
                .get(*cursor..end)
                .ok_or_else(|| StorageError::CorruptRecord("truncated record".to_string()))?;
            *cursor = end;
            Ok(slice)
        };

        let version = *take(&mut cursor, 1)?.first().unwrap();
        if version != RECORD_VERSION {
            return Err(StorageError::CorruptRecord(format!(
                "unsupported record version {version}"
            )));
        }

        let id_len = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
        let _id_bytes = take(&mut cursor, id_len)?;

        let dim = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
        let mut vector = Vec::with_capacity(dim);
        for _ in 0..dim {
            let bytes: [u8; 8] = take(&mut cursor, 8)?.try_into().unwrap();
            vector.push(f64::from_le_bytes(bytes));
        }

        let meta_len = u32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap()) as usize;
        let metadata = if meta_len == 0 {
            None
        } else {
            let meta_bytes = take(&mut cursor, meta_len)?;
            Some(
                serde_json::from_slice(meta_bytes)
                    .map_err(|e| StorageError::CorruptRecord(e.to_string()))?,
            )
        };

        Ok((vector, metadata))
    }
}

impl StorageBackend for DiskStorage {
    fn store_vector(
        &self,
        id: VectorId,
        vector: Vector,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError> {
        {
            let index = self.index.read();
            if index.contains(&id) {
                return Ok(false);
            }
        }
        self.write_record(&id, &vector, &metadata)?;
        self.index.write().insert(id);
        Ok(true)
    }

    fn retrieve_vector(
        &self,
        id: &VectorId,
    ) -> Result<Option<(Vector, Option<Metadata>)>, StorageError> {
        if !self.index.read().contains(id) {
            return Ok(None);
        }
        Ok(Some(self.read_record(id)?))
    }

    fn update_vector(
        &self,
        id: &VectorId,
        vector: Option<Vector>,
        metadata: Option<Metadata>,
    ) -> Result<bool, StorageError> {
        if !self.index.read().contains(id) {
            return Ok(false);
        }
        let (existing_vector, existing_meta) = self.read_record(id)?;
        let new_vector = vector.unwrap_or(existing_vector);
        let new_meta = metadata.or(existing_meta);
        self.write_record(id, &new_vector, &new_meta)?;
        Ok(true)
    }

    fn delete_vector(&self, id: &VectorId) -> Result<bool, StorageError> {
        if !self.index.write().remove(id) {
            return Ok(false);
        }
        let path = self.record_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    fn list_vectors(&self, limit: Option<usize>) -> Result<Vec<VectorId>, StorageError> {
        let index = self.index.read();
        Ok(match limit {
            Some(n) => index.iter().take(n).copied().collect(),
            None => index.iter().copied().collect(),
        })
    }

    fn list_vector_ids_paginated(
        &self,
        page_size: usize,
        cursor: Option<&[u8]>,
    ) -> Result<Page<VectorId>, StorageError> {
        let ids: Vec<VectorId> = self.index.read().iter().copied().collect();
        Ok(paginate_sorted_ids(ids, page_size, cursor))
    }

    fn len(&self) -> usize {
        self.index.read().len()
    }
}
