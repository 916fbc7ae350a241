//! 偏好存储接口与实现

use crate::chat::db::create_sqlite_pool_with_migration;
use crate::chat::preference::dao::PreferenceDao;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// 键值偏好存储
///
/// 只在单个进程内使用，写入是最后写入者获胜，不加锁。
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// 基于 SQLite 的偏好存储
pub struct SqlitePreferenceStore {
    dao: PreferenceDao,
}

impl SqlitePreferenceStore {
    /// 打开（必要时创建）数据库并执行迁移
    pub async fn open(db_url: &str) -> Result<Self> {
        info!("[PrefStore] 打开偏好存储: {}", db_url);
        let pool = create_sqlite_pool_with_migration(db_url).await?;
        Ok(Self::with_pool(pool))
    }

    /// 使用共享连接池
    pub fn with_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            dao: PreferenceDao::new(pool),
        }
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.dao.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.dao.set(key, value).await
    }
}

/// 内存偏好存储（不跨进程保留，用于测试和临时会话）
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置若干偏好值
    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
