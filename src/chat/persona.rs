//! 人设（persona）的展示推导
//!
//! 人设列表来自后端；这里只放本地兜底：默认人设、图标查找和输入提示。

use crate::chat::types::PersonaInfo;

/// 默认人设
pub const DEFAULT_PERSONA: &str = "travel";

/// 未知人设使用的图标
pub const FALLBACK_PERSONA_ICON: &str = "🤖";

/// 人设列表里找不到时的展示名
pub const FALLBACK_PERSONA_NAME: &str = "Chatbot";

/// 侧边栏使用的人设图标，未知人设回退到默认图标
pub fn persona_icon(persona: &str) -> &'static str {
    match persona {
        "travel" => "✈️",
        "career" => "💼",
        "fitness" => "💪",
        "movie" => "🎬",
        _ => FALLBACK_PERSONA_ICON,
    }
}

/// 输入框提示语
pub fn input_placeholder(persona: &str) -> &'static str {
    match persona {
        "travel" => "Ask about a destination...",
        "career" => "Ask about your career...",
        "fitness" => "Ask about fitness...",
        _ => "Ask about movies...",
    }
}

/// 聊天头部展示：`emoji name`，人设列表里没有时回退到 `🤖 Chatbot`
pub fn header_label(personas: &[PersonaInfo], persona: &str) -> String {
    match personas.iter().find(|p| p.id == persona) {
        Some(info) => {
            let emoji = if info.emoji.is_empty() {
                FALLBACK_PERSONA_ICON
            } else {
                info.emoji.as_str()
            };
            format!("{} {}", emoji, info.name)
        }
        None => format!("{} {}", FALLBACK_PERSONA_ICON, FALLBACK_PERSONA_NAME),
    }
}
