use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// One of the three fields of the user settings record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    BinanceApiKey,
    BinanceSecretKey,
    OpenaiApiKey,
}

impl SettingsField {
    pub const ALL: [SettingsField; 3] = [
        SettingsField::BinanceApiKey,
        SettingsField::BinanceSecretKey,
        SettingsField::OpenaiApiKey,
    ];

    /// Wire name of the field
    pub fn key(&self) -> &'static str {
        match self {
            SettingsField::BinanceApiKey => "binance_api_key",
            SettingsField::BinanceSecretKey => "binance_secret_key",
            SettingsField::OpenaiApiKey => "openai_api_key",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SettingsField::BinanceApiKey => "Binance API Key",
            SettingsField::BinanceSecretKey => "Binance Secret Key",
            SettingsField::OpenaiApiKey => "OpenAI API Key",
        }
    }

    /// Secret fields are masked when displayed
    pub fn is_secret(&self) -> bool {
        !matches!(self, SettingsField::BinanceApiKey)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

/// The user's API key settings as stored by the backend.
/// Missing or null values decode as empty strings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub binance_api_key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub binance_secret_key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub openai_api_key: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl SettingsRecord {
    pub fn get(&self, field: SettingsField) -> &str {
        match field {
            SettingsField::BinanceApiKey => &self.binance_api_key,
            SettingsField::BinanceSecretKey => &self.binance_secret_key,
            SettingsField::OpenaiApiKey => &self.openai_api_key,
        }
    }

    pub fn set(&mut self, field: SettingsField, value: impl Into<String>) {
        let slot = match field {
            SettingsField::BinanceApiKey => &mut self.binance_api_key,
            SettingsField::BinanceSecretKey => &mut self.binance_secret_key,
            SettingsField::OpenaiApiKey => &mut self.openai_api_key,
        };
        *slot = value.into();
    }

    /// The backend runs analyses in live mode only with both an exchange key
    /// and an AI key; otherwise it falls back to simulated mode.
    pub fn is_live_capable(&self) -> bool {
        !self.binance_api_key.is_empty() && !self.openai_api_key.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        SettingsField::ALL.iter().all(|f| self.get(*f).is_empty())
    }

    /// Value suitable for display, with secrets masked
    pub fn display_value(&self, field: SettingsField) -> String {
        let value = self.get(field);
        if value.is_empty() {
            "(not set)".to_string()
        } else if field.is_secret() {
            mask(value)
        } else {
            value.to_string()
        }
    }
}

/// Mask all but the last four characters
fn mask(value: &str) -> String {
    let count = value.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = value.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

impl fmt::Debug for SettingsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &str| if v.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("SettingsRecord")
            .field("binance_api_key", &redact(&self.binance_api_key))
            .field("binance_secret_key", &redact(&self.binance_secret_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_missing_fields_are_empty() {
        let record: SettingsRecord =
            serde_json::from_str(r#"{"binance_api_key": null, "openai_api_key": "sk-1"}"#)
                .expect("Failed to parse settings");
        assert_eq!(record.binance_api_key, "");
        assert_eq!(record.binance_secret_key, "");
        assert_eq!(record.openai_api_key, "sk-1");
    }

    #[test]
    fn test_serializes_all_fields() {
        let value = serde_json::to_value(SettingsRecord::default()).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({"binance_api_key": "", "binance_secret_key": "", "openai_api_key": ""})
        );
    }

    #[test]
    fn test_set_and_get() {
        let mut record = SettingsRecord::default();
        assert!(record.is_empty());
        record.set(SettingsField::BinanceSecretKey, "secret");
        assert_eq!(record.get(SettingsField::BinanceSecretKey), "secret");
        assert!(!record.is_empty());
    }

    #[test]
    fn test_live_capable() {
        let mut record = SettingsRecord::default();
        record.set(SettingsField::BinanceApiKey, "A");
        assert!(!record.is_live_capable());
        record.set(SettingsField::OpenaiApiKey, "C");
        assert!(record.is_live_capable());
    }

    #[test]
    fn test_display_masks_secrets() {
        let mut record = SettingsRecord::default();
        record.set(SettingsField::BinanceApiKey, "public-key");
        record.set(SettingsField::OpenaiApiKey, "sk-abcdef1234");
        assert_eq!(record.display_value(SettingsField::BinanceApiKey), "public-key");
        assert_eq!(record.display_value(SettingsField::OpenaiApiKey), "*********1234");
        assert_eq!(record.display_value(SettingsField::BinanceSecretKey), "(not set)");
        assert_eq!(mask("abc"), "***");
    }

    #[test]
    fn test_debug_never_prints_values() {
        let mut record = SettingsRecord::default();
        record.set(SettingsField::OpenaiApiKey, "sk-live-secret");
        let debug = format!("{:?}", record);
        assert!(!debug.contains("sk-live-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_field_keys() {
        for field in SettingsField::ALL {
            assert_eq!(SettingsField::from_key(field.key()), Some(field));
        }
        assert_eq!(SettingsField::from_key("unknown"), None);
    }
}
