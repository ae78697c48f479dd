//! Service-account key parsing.
//!
//! Hosting dashboards mangle multi-line JSON secrets, so the key is accepted as
//! plain JSON, as a JSON string literal wrapping the JSON, or as base64.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::engine::GeneralPurpose;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// 存放服务账号密钥的环境变量名。
pub const SERVICE_ACCOUNT_KEY_ENV: &str = "GCP_SERVICE_ACCOUNT_KEY";

const PREVIEW_CHARS: usize = 60;
const BASE64_ENGINES: [GeneralPurpose; 4] = [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD];

/// 已解析的服务账号密钥（JSON 对象）。
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAccountKey {
    fields: Map<String, Value>,
}

impl ServiceAccountKey {
    /// 依次尝试各种编码解析密钥。
    ///
    /// # Errors
    /// 输入为空或无法按任何编码解析时返回配置错误（附带输入预览）。
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::config(format!("Missing {SERVICE_ACCOUNT_KEY_ENV}")));
        }

        KeyEncoding::ALL
            .iter()
            .find_map(|encoding| encoding.decode(raw))
            .map(|fields| Self { fields })
            .ok_or_else(|| {
                Error::config(format!(
                    "{SERVICE_ACCOUNT_KEY_ENV} must be valid JSON (minified, one line). Check for extra quotes, newlines, or truncation. Starts with: {}...",
                    preview(raw)
                ))
            })
    }

    /// 密钥中的 `project_id`。
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.fields
            .get("project_id")
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// 密钥中的 `client_email`。
    #[must_use]
    pub fn client_email(&self) -> Option<&str> {
        self.fields.get("client_email").and_then(Value::as_str)
    }

    /// 转换为 JSON 值（交给认证库）。
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// 密钥的一种线上编码，按 `ALL` 的顺序尝试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyEncoding {
    PlainJson,
    QuotedJson,
    Base64Json,
}

impl KeyEncoding {
    const ALL: [Self; 3] = [Self::PlainJson, Self::QuotedJson, Self::Base64Json];

    fn decode(self, raw: &str) -> Option<Map<String, Value>> {
        match self {
            Self::PlainJson => parse_object(raw),
            Self::QuotedJson => {
                if raw.len() < 2 || !raw.starts_with('"') || !raw.ends_with('"') {
                    return None;
                }
                let unwrapped = serde_json::from_str::<String>(raw)
                    .unwrap_or_else(|_| raw[1..raw.len() - 1].replace("\\\"", "\""));
                parse_object(&unwrapped)
            }
            Self::Base64Json => BASE64_ENGINES.iter().find_map(|engine| {
                let decoded = engine.decode(raw.as_bytes()).ok()?;
                let text = String::from_utf8(decoded).ok()?;
                parse_object(&text)
            }),
        }
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn preview(raw: &str) -> String {
    raw.chars()
        .take(PREVIEW_CHARS)
        .map(|ch| if ch.is_whitespace() { ' ' } else { ch })
        .collect()
}
