//! LMDB-backed watermark store.

use std::path::Path;

use async_trait::async_trait;
use changeflow_core::error::BridgeError;
use changeflow_core::watermark::WatermarkStore;
use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions};
use tokio::task::spawn_blocking;

/// Name of the single logical namespace inside the environment.
const AGGREGATES_DB: &str = "aggregates";

/// Watermarks are a handful of tiny keys; 16 MiB of address space is plenty.
const MAP_SIZE: usize = 16 * 1024 * 1024;

/// Single-file LMDB watermark store.
///
/// Keys are aggregate names, values are base-10 ASCII encodings of the i64
/// watermark. Every update commits (and therefore syncs) before returning.
/// LMDB calls are blocking and run under `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct LmdbWatermarkStore {
    env: Env,
    db: Database<Str, Str>,
}

impl LmdbWatermarkStore {
    /// Opens the store file, creating it with owner-only permissions if it
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Store`] when the environment cannot be opened
    /// or the database cannot be created.
    pub fn open(path: &Path) -> Result<Self, BridgeError> {
        // NO_SUB_DIR makes `path` the data file itself rather than a
        // directory, matching the single-file layout of the store.
        // SAFETY: the file is only opened once per process and is not opened
        // concurrently by other processes with incompatible flags.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(1)
                .flags(EnvFlags::NO_SUB_DIR)
                .open(path)
                .map_err(store_err)?
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| BridgeError::Store(format!("failed to restrict store file: {e}")))?;
        }

        let mut wtxn = env.write_txn().map_err(store_err)?;
        let db = env
            .create_database(&mut wtxn, Some(AGGREGATES_DB))
            .map_err(store_err)?;
        wtxn.commit().map_err(store_err)?;

        Ok(Self { env, db })
    }
}

#[async_trait]
impl WatermarkStore for LmdbWatermarkStore {
    async fn register_aggregates(&self, names: &[String]) -> Result<(), BridgeError> {
        let env = self.env.clone();
        let db = self.db;
        let names = names.to_vec();
        spawn_blocking(move || {
            let mut wtxn = env.write_txn().map_err(store_err)?;
            for name in &names {
                match db.get(&wtxn, name).map_err(store_err)? {
                    Some(existing) => {
                        tracing::info!(name = %name, version = %existing, "aggregate registered");
                    }
                    None => {
                        db.put(&mut wtxn, name, "0").map_err(store_err)?;
                        tracing::info!(name = %name, version = "0", "aggregate registered");
                    }
                }
            }
            wtxn.commit().map_err(store_err)
        })
        .await
        .map_err(join_err)?
    }

    async fn get_change_version(&self, name: &str) -> Result<i64, BridgeError> {
        let env = self.env.clone();
        let db = self.db;
        let name = name.to_owned();
        spawn_blocking(move || {
            let rtxn = env.read_txn().map_err(store_err)?;
            let raw = db
                .get(&rtxn, &name)
                .map_err(store_err)?
                .ok_or_else(|| BridgeError::UnknownAggregate(name.clone()))?;
            raw.parse::<i64>().map_err(|e| {
                BridgeError::Store(format!("corrupt watermark for aggregate '{name}': {e}"))
            })
        })
        .await
        .map_err(join_err)?
    }

    async fn update_change_version(&self, name: &str, version: i64) -> Result<(), BridgeError> {
        let env = self.env.clone();
        let db = self.db;
        let name = name.to_owned();
        spawn_blocking(move || {
            let mut wtxn = env.write_txn().map_err(store_err)?;
            if db.get(&wtxn, &name).map_err(store_err)?.is_none() {
                return Err(BridgeError::UnknownAggregate(name));
            }
            db.put(&mut wtxn, &name, &version.to_string())
                .map_err(store_err)?;
            wtxn.commit().map_err(store_err)
        })
        .await
        .map_err(join_err)?
    }

    async fn close(&self) -> Result<(), BridgeError> {
        let env = self.env.clone();
        spawn_blocking(move || env.force_sync().map_err(store_err))
            .await
            .map_err(join_err)?
    }
}

fn store_err(err: heed::Error) -> BridgeError {
    BridgeError::Store(err.to_string())
}

fn join_err(err: tokio::task::JoinError) -> BridgeError {
    BridgeError::Store(format!("watermark task failed: {err}"))
}
