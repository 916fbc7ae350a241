//! 偏好服务层：把键值存储适配成会话相关的两个字段
//!
//! 写入失败只记录日志，不会中断会话操作。

use crate::chat::preference::models::{PersistedPreference, ACTIVE_SESSION_KEY, PERSONA_KEY};
use crate::chat::preference::store::PreferenceStore;
use std::sync::Arc;
use tracing::{debug, error};

/// 会话偏好适配器
#[derive(Clone)]
pub struct SessionPreferences {
    store: Arc<dyn PreferenceStore>,
}

impl SessionPreferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// 启动时读取一次；读取失败按"没有偏好"处理
    pub async fn load(&self) -> PersistedPreference {
        let last_session_id = self.read(ACTIVE_SESSION_KEY).await;
        let last_persona = self.read(PERSONA_KEY).await;
        debug!(
            "[PrefStore] 读取偏好，会话ID: {:?}, 人设: {:?}",
            last_session_id, last_persona
        );
        PersistedPreference {
            last_session_id,
            last_persona,
        }
    }

    /// 保存活跃会话及其人设
    pub async fn save_active_session(&self, session_id: &str, persona: &str) {
        self.write(ACTIVE_SESSION_KEY, session_id).await;
        self.write(PERSONA_KEY, persona).await;
    }

    /// 只保存人设
    pub async fn save_persona(&self, persona: &str) {
        self.write(PERSONA_KEY, persona).await;
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                error!("[PrefStore] 读取偏好 {} 失败: {:?}", key, e);
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value).await {
            error!("[PrefStore] 保存偏好 {} 失败: {:?}", key, e);
        }
    }
}
