//! 偏好数据访问层（DAO）
//!
//! 负责 `local_preferences` 表的读写，表结构由 sqlx migration 管理。

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;

/// 偏好 DAO（基于 sqlx）
#[derive(Clone)]
pub struct PreferenceDao {
    db: Pool<Sqlite>,
}

impl PreferenceDao {
    /// 创建新的偏好 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 读取一个偏好值
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT pref_value FROM local_preferences WHERE pref_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("查询偏好失败: {}", key))?;

        let value = row.map(|m| m.get::<String, _>("pref_value"));
        debug!("[PrefDAO] 读取偏好 {} = {:?}", key, value);
        Ok(value)
    }

    /// 写入一个偏好值（存在则覆盖）
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let sql = r#"
            INSERT INTO local_preferences (
                pref_key, pref_value, update_time
            ) VALUES (?, ?, ?)
            ON CONFLICT(pref_key) DO UPDATE SET
                pref_value = excluded.pref_value,
                update_time = excluded.update_time
        "#;

        sqlx::query(sql)
            .bind(key)
            .bind(value)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.db)
            .await
            .with_context(|| format!("保存偏好失败: {}", key))?;
        debug!("[PrefDAO] 保存偏好 {} = {}", key, value);
        Ok(())
    }
}
