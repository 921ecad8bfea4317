use anyhow::Result;
use async_trait::async_trait;
use ::redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde_json::Value;

use covenant_utils::CovenantResult;

use crate::cache::Cache;

pub type RedisPool = ConnectionManager;

pub async fn create_redis_pool(redis_url: &str) -> Result<RedisPool> {
    let client = Client::open(redis_url)?;
    let connection_manager = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis cache");
    Ok(connection_manager)
}

pub async fn health_check(pool: &mut RedisPool) -> Result<()> {
    let _: String = ::redis::cmd("PING")
        .query_async(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))?;
    Ok(())
}

/// Cache backed by Redis `SET .. EX`; keys are prefixed with `prefix:`.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
    prefix: String,
    ttl_seconds: u64,
}

impl RedisCache {
    pub fn new(manager: ConnectionManager, prefix: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            manager,
            prefix: prefix.into(),
            ttl_seconds: ttl_seconds.max(1),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CovenantResult<Option<Value>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(self.key(key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> CovenantResult<()> {
        let mut conn = self.manager.clone();
        let raw = serde_json::to_string(&value)?;
        ::redis::cmd("SET")
            .arg(self.key(key))
            .arg(raw)
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CovenantResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(self.key(key)).await?;
        Ok(())
    }
}
