//! Embedded key/value engine the mapper runs on.
//!
//! Every key lives in one redb table as a bincode encoded [`Entry`]; equality indexes live
//! in a multimap table keyed by `(scope, filter, value)` whose values are primary keys.
//! One closure passed to [`Storage::write`] is one redb write transaction, so each field
//! command together with its index and inventory bookkeeping is atomic.

pub mod codec;
pub mod entry;

use crate::settings::StorageSettings;
use crate::{info, AppError};
use entry::Entry;
use redb::backends::InMemoryBackend;
use redb::{
    Database, MultimapTable, MultimapTableDefinition, ReadOnlyMultimapTable, ReadOnlyTable, ReadableMultimapTable,
    ReadableTable, Table, TableDefinition,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

const KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("keys");
const INDEX: MultimapTableDefinition<(&str, &str, &str), &str> = MultimapTableDefinition::new("index");

#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
    namespace: String,
    path: Option<PathBuf>,
}

impl Storage {
    pub fn in_memory(namespace: &str) -> Result<Storage, AppError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db, namespace, None)
    }

    /// A fresh database file under the temp dir, named after `name` plus a random suffix.
    pub fn temp(name: &str, namespace: &str) -> Result<Storage, AppError> {
        let dir = env::temp_dir().join("dynbit");
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = dir.join(format!("{}_{}.redb", name, rand::random::<u64>()));
        Self::open(&path, namespace, 0)
    }

    pub fn open(path: &Path, namespace: &str, db_cache_size_mb: usize) -> Result<Storage, AppError> {
        let mut builder = Database::builder();
        if db_cache_size_mb > 0 {
            builder.set_cache_size(db_cache_size_mb * 1024 * 1024);
        }
        let db = builder.create(path)?;
        info!("Opened database at {:?} with namespace `{}`", path, namespace);
        Self::init(db, namespace, Some(path.to_path_buf()))
    }

    pub fn from_settings(settings: &StorageSettings) -> Result<Storage, AppError> {
        match &settings.db_path {
            Some(path) => {
                let path = PathBuf::from(path);
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        fs::create_dir_all(parent)?;
                    }
                }
                Self::open(&path, &settings.namespace, settings.db_cache_size_mb)
            }
            None => Self::in_memory(&settings.namespace),
        }
    }

    fn init(db: Database, namespace: &str, path: Option<PathBuf>) -> Result<Storage, AppError> {
        let tx = db.begin_write()?;
        {
            tx.open_table(KEYS)?;
            tx.open_multimap_table(INDEX)?;
        }
        tx.commit()?;
        Ok(Storage { db: Arc::new(db), namespace: namespace.to_string(), path })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `{namespace}:{model}`, prefix of every key and index entry of one model.
    pub fn scope(&self, model: &str) -> String {
        format!("{}:{}", self.namespace, model)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut WriteCtx<'_>) -> Result<R, AppError>) -> Result<R, AppError> {
        let tx = self.db.begin_write()?;
        let result = {
            let mut ctx = WriteCtx { keys: tx.open_table(KEYS)?, index: tx.open_multimap_table(INDEX)? };
            f(&mut ctx)
        };
        match result {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                tx.abort()?;
                Err(err)
            }
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&ReadCtx) -> Result<R, AppError>) -> Result<R, AppError> {
        let tx = self.db.begin_read()?;
        let ctx = ReadCtx { keys: tx.open_table(KEYS)?, index: tx.open_multimap_table(INDEX)? };
        f(&ctx)
    }
}

/// Read access shared by read and write transactions.
pub trait KeyRead {
    fn entry(&self, key: &str) -> Result<Option<Entry>, AppError>;
    fn indexed(&self, scope: &str, filter: &str, value: &str) -> Result<BTreeSet<String>, AppError>;
}

fn read_entry(keys: &impl ReadableTable<&'static str, &'static [u8]>, key: &str) -> Result<Option<Entry>, AppError> {
    match keys.get(key)? {
        Some(guard) => Ok(Some(codec::decode(guard.value())?)),
        None => Ok(None),
    }
}

fn read_index(
    index: &impl ReadableMultimapTable<(&'static str, &'static str, &'static str), &'static str>,
    scope: &str,
    filter: &str,
    value: &str,
) -> Result<BTreeSet<String>, AppError> {
    let mut pks = BTreeSet::new();
    for guard in index.get((scope, filter, value))? {
        pks.insert(guard?.value().to_string());
    }
    Ok(pks)
}

pub struct WriteCtx<'txn> {
    keys: Table<'txn, &'static str, &'static [u8]>,
    index: MultimapTable<'txn, (&'static str, &'static str, &'static str), &'static str>,
}

impl WriteCtx<'_> {
    /// Stores `entry` under `key`, removing the key when there is nothing left to store.
    pub fn put(&mut self, key: &str, entry: Option<&Entry>) -> Result<(), AppError> {
        match entry {
            Some(entry) => {
                let bytes = codec::encode(entry)?;
                self.keys.insert(key, bytes.as_slice())?;
            }
            None => {
                self.keys.remove(key)?;
            }
        }
        Ok(())
    }

    /// Reads, mutates and writes back one key.
    pub fn update<R>(&mut self, key: &str, f: impl FnOnce(&mut Option<Entry>) -> Result<R, AppError>) -> Result<R, AppError> {
        let mut entry = self.entry(key)?;
        let result = f(&mut entry)?;
        entry::prune(&mut entry);
        self.put(key, entry.as_ref())?;
        Ok(result)
    }

    pub fn index_add(&mut self, scope: &str, filter: &str, value: &str, pk: &str) -> Result<bool, AppError> {
        Ok(self.index.insert((scope, filter, value), pk)?)
    }

    pub fn index_remove(&mut self, scope: &str, filter: &str, value: &str, pk: &str) -> Result<bool, AppError> {
        Ok(self.index.remove((scope, filter, value), pk)?)
    }
}

impl KeyRead for WriteCtx<'_> {
    fn entry(&self, key: &str) -> Result<Option<Entry>, AppError> {
        read_entry(&self.keys, key)
    }

    fn indexed(&self, scope: &str, filter: &str, value: &str) -> Result<BTreeSet<String>, AppError> {
        read_index(&self.index, scope, filter, value)
    }
}

pub struct ReadCtx {
    keys: ReadOnlyTable<&'static str, &'static [u8]>,
    index: ReadOnlyMultimapTable<(&'static str, &'static str, &'static str), &'static str>,
}

impl KeyRead for ReadCtx {
    fn entry(&self, key: &str) -> Result<Option<Entry>, AppError> {
        read_entry(&self.keys, key)
    }

    fn indexed(&self, scope: &str, filter: &str, value: &str) -> Result<BTreeSet<String>, AppError> {
        read_index(&self.index, scope, filter, value)
    }
}
