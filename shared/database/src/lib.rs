//! Persistence layer for Covenant.
//!
//! Services depend only on the `RecordStore`, `BlobStore` and `Cache` traits.
//! `initialize_store` and `initialize_cache` pick the concrete backend from
//! configuration.

pub mod blob;
pub mod cache;
pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod redis;
pub mod repositories;
pub mod store;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use cache::{Cache, MemoryCache};
pub use memory::MemoryStore;
pub use postgres::{create_postgres_pool, PgStore, PostgresPool};
pub use self::redis::{create_redis_pool, health_check as redis_health_check, RedisCache, RedisPool};
pub use store::{PartyFilter, RecordStore};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use covenant_utils::{CacheBackend, CacheConfig, DatabaseConfig, StoreBackend};

pub async fn initialize_store(config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = create_postgres_pool(
                &config.postgres_url,
                config.max_connections,
                Duration::from_secs(config.connection_timeout_seconds),
            )
            .await
            .context("Failed to connect to PostgreSQL")?;

            migrations::run_postgres_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

pub async fn initialize_cache(config: &CacheConfig, redis_url: &str) -> Result<Arc<dyn Cache>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new(Duration::from_secs(config.ttl_seconds)))),
        CacheBackend::Redis => {
            let mut manager = create_redis_pool(redis_url)
                .await
                .context("Failed to connect to Redis")?;
            redis_health_check(&mut manager).await?;
            Ok(Arc::new(RedisCache::new(manager, config.key_prefix.clone(), config.ttl_seconds)))
        }
    }
}
