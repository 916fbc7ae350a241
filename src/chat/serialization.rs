use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// 时间戳反序列化函数（支持 null 值和不带时区的 ISO-8601）
///
/// 后端可能返回 RFC 3339，也可能返回 `2025-01-01T10:00:00.123456` 这种
/// 不带时区的格式，后者按 UTC 处理。无法解析的值记录日志后按 None 处理，
/// 不影响同一响应里的其他行。
pub fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt_s: Option<String> = Deserialize::deserialize(deserializer)?;
    match opt_s {
        Some(s) if !s.trim().is_empty() => {
            let parsed = parse_timestamp(&s);
            if parsed.is_none() {
                warn!("[Serialization] 无法解析时间戳，按空值处理: {}", s);
            }
            Ok(parsed)
        }
        _ => Ok(None),
    }
}

/// 解析后端时间戳
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_naive_and_rfc3339() {
        let naive = parse_timestamp("2025-03-01T10:15:30.123456").unwrap();
        assert_eq!(naive.hour(), 10);

        let zoned = parse_timestamp("2025-03-01T10:15:30+05:30").unwrap();
        assert_eq!(zoned.hour(), 4);
        assert_eq!(zoned.minute(), 45);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn null_and_empty_are_none() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
            ts: Option<DateTime<Utc>>,
        }

        let row: Row = serde_json::from_str(r#"{"ts": null}"#).unwrap();
        assert!(row.ts.is_none());
        let row: Row = serde_json::from_str(r#"{}"#).unwrap();
        assert!(row.ts.is_none());
        let row: Row = serde_json::from_str(r#"{"ts": "2025-03-01T10:15:30"}"#).unwrap();
        assert!(row.ts.is_some());
    }

    #[test]
    fn malformed_timestamp_does_not_reject_history() {
        use crate::chat::types::HistoryMessage;

        let rows: Vec<HistoryMessage> = serde_json::from_str(
            r#"[
                {"role":"user","content":"hi","timestamp":"not-a-date"},
                {"role":"bot","content":"hello","timestamp":"2025-03-01T10:15:31"}
            ]"#,
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].timestamp.is_none());
        assert!(rows[1].timestamp.is_some());
    }
}
