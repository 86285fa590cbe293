//! State Cache (spec.md §4.3): a thin async `redis` wrapper storing every
//! value as a JSON string, mirroring `db_client.py`'s
//! `store_json_data`/`retrieve_json_data` pair.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, ScaleWaveError};

/// Everything the Observer and Optimizer need from the State Cache. A trait
/// so tests can substitute an in-memory fake instead of a live Redis.
#[async_trait]
pub trait StateCache: Send + Sync {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;
    async fn set_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// `redis`-backed implementation; one connection manager shared and cloned
/// across tasks, reconnecting transparently on transient failures.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateCache for RedisCache {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| ScaleWaveError::Cache(e.to_string()))?;

        match raw {
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| ScaleWaveError::Cache(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(value).map_err(|e| ScaleWaveError::Cache(e.to_string()))?;
        conn.set::<_, _, ()>(key, raw)
            .await
            .map_err(|e| ScaleWaveError::Cache(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| ScaleWaveError::Cache(e.to_string()))
    }
}

/// Cache key helpers (spec.md §4.3), kept in one place so a key never gets
/// typo'd across the Observer and Optimizer.
pub mod keys {
    pub const MAX_RESOURCE_BENCHMARKS: &str = "max_resource_benchmarks";
    pub const AVAILABLE_CLUSTER_RESOURCES: &str = "available_cluster_resources";

    pub fn service(name: &str) -> String {
        name.to_string()
    }

    pub fn requests(service: &str) -> String {
        format!("{service}_requests")
    }

    pub fn throughput_prev(service: &str) -> String {
        format!("{service}_throughput_prev")
    }

    pub fn optimizer_process(service: &str) -> String {
        format!("{service}_optimizer_process")
    }
}
