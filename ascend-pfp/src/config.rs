//! Environment configuration.
//!
//! Values are trimmed; blank values count as unset. Provider and blob-store
//! settings are only checked when a request needs them.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use tracing::{debug, info};

use crate::client::{Backend, Client, Credentials};
use crate::credentials::{ServiceAccountKey, SERVICE_ACCOUNT_KEY_ENV};
use crate::error::{Error, Result};
use crate::storage::Storage;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";

/// 服务配置。
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub provider: ProviderConfig,
    pub store: StoreConfig,
}

/// 生成式图像服务配置。
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub service_account_key: Option<String>,
    pub project_id: Option<String>,
    pub location: String,
    pub gemini_api_key: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub timeout_secs: Option<u64>,
    /// 访问提供方时使用的 HTTP 代理。
    pub proxy: Option<String>,
    pub model: String,
}

/// Blob store 配置。
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub supabase_url: Option<String>,
    pub service_role_key: Option<String>,
    pub base_image_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            service_account_key: None,
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            gemini_api_key: None,
            base_url: None,
            api_version: None,
            timeout_secs: None,
            proxy: None,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            provider: ProviderConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// 从进程环境读取。
    ///
    /// # Errors
    /// 数值变量无法解析时返回配置错误。
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取（测试用）。
    ///
    /// # Errors
    /// 数值变量无法解析时返回配置错误。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let config = Self {
            host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: try_load(var("PORT"), "PORT", DEFAULT_PORT)?,
            max_body_bytes: try_load(
                var("MAX_BODY_BYTES"),
                "MAX_BODY_BYTES",
                DEFAULT_MAX_BODY_BYTES,
            )?,
            provider: ProviderConfig {
                service_account_key: var(SERVICE_ACCOUNT_KEY_ENV),
                project_id: var("GCP_PROJECT_ID"),
                location: var("GCP_LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
                gemini_api_key: var("GEMINI_API_KEY"),
                base_url: var("GENAI_BASE_URL"),
                api_version: var("GENAI_API_VERSION"),
                timeout_secs: var("GENAI_TIMEOUT_SECS")
                    .map(|raw| parse("GENAI_TIMEOUT_SECS", &raw))
                    .transpose()?,
                proxy: var("GENAI_PROXY"),
                model: var("PFP_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
            store: StoreConfig {
                supabase_url: var("SUPABASE_URL"),
                service_role_key: var("SUPABASE_SERVICE_ROLE_KEY"),
                base_image_url: var("BASE_IMAGE_URL"),
            },
        };
        debug!(
            host = %config.host,
            port = config.port,
            model = %config.provider.model,
            backend = ?config.provider.backend(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// 监听地址。
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ProviderConfig {
    /// 设置了 `GEMINI_API_KEY` 时使用 Gemini API，否则使用 Vertex AI。
    #[must_use]
    pub const fn backend(&self) -> Backend {
        if self.gemini_api_key.is_some() {
            Backend::GeminiApi
        } else {
            Backend::VertexAi
        }
    }

    /// 构建客户端。
    ///
    /// # Errors
    /// 密钥缺失或无效、项目 ID 缺失或客户端构建失败时返回错误。
    pub fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(api_key) = &self.gemini_api_key {
            builder = builder.backend(Backend::GeminiApi).api_key(api_key);
        } else {
            let raw_key = self.service_account_key.as_deref().unwrap_or_default();
            let key = ServiceAccountKey::parse(raw_key)?;
            let project = self
                .project_id
                .clone()
                .or_else(|| key.project_id().map(str::to_string))
                .ok_or_else(|| Error::config("Missing env: GCP_PROJECT_ID"))?;
            debug!(
                %project,
                location = %self.location,
                client_email = ?key.client_email(),
                "using service account credentials"
            );
            builder = builder
                .backend(Backend::VertexAi)
                .vertex_project(project)
                .vertex_location(&self.location)
                .credentials(Credentials::ServiceAccount(key));
        }
        if let Some(base_url) = &self.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(api_version) = &self.api_version {
            builder = builder.api_version(api_version);
        }
        if let Some(timeout) = self.timeout_secs {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy);
        }
        builder.build()
    }
}

impl StoreConfig {
    /// blob store 客户端（需要 URL 与 service-role key）。
    ///
    /// # Errors
    /// 任一变量缺失时返回 `Missing env: <NAME>`。
    pub fn storage(&self) -> Result<Storage> {
        let url = self
            .supabase_url
            .as_deref()
            .ok_or_else(|| Error::config("Missing env: SUPABASE_URL"))?;
        let key = self
            .service_role_key
            .as_deref()
            .ok_or_else(|| Error::config("Missing env: SUPABASE_SERVICE_ROLE_KEY"))?;
        Storage::new(url, key)
    }
}

fn try_load<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: Display,
    T::Err: Display,
{
    match raw {
        Some(raw) => parse(key, &raw),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: Display,
{
    raw.parse()
        .map_err(|err| Error::config(format!("Invalid {key} value: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.max_body_bytes, 32 * 1024 * 1024);
        assert_eq!(config.provider.location, "us-central1");
        assert_eq!(config.provider.model, "gemini-3-pro-image-preview");
        assert_eq!(config.provider.backend(), Backend::VertexAi);
        assert!(config.store.supabase_url.is_none());
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = config_from(&[("GCP_LOCATION", "   "), ("SUPABASE_URL", "")]).unwrap();
        assert_eq!(config.provider.location, "us-central1");
        assert!(config.store.supabase_url.is_none());
    }

    #[test]
    fn test_values_are_trimmed() {
        let config = config_from(&[
            ("PORT", " 8080 "),
            ("GCP_PROJECT_ID", " proj\n"),
            ("GENAI_TIMEOUT_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider.project_id.as_deref(), Some("proj"));
        assert_eq!(config.provider.timeout_secs, Some(30));
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = config_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("Invalid PORT value"));
        assert!(config_from(&[("GENAI_TIMEOUT_SECS", "-1")]).is_err());
    }

    #[test]
    fn test_missing_service_account_key() {
        let config = config_from(&[]).unwrap();
        let err = config.provider.build_client().err().unwrap();
        assert_eq!(err.detail(), "Missing GCP_SERVICE_ACCOUNT_KEY");
    }

    #[test]
    fn test_missing_project_id() {
        let config = config_from(&[(SERVICE_ACCOUNT_KEY_ENV, r#"{"type":"service_account"}"#)])
            .unwrap();
        let err = config.provider.build_client().err().unwrap();
        assert_eq!(err.detail(), "Missing env: GCP_PROJECT_ID");
    }

    #[test]
    fn test_gemini_api_key_selects_gemini_backend() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "key"),
            ("GENAI_BASE_URL", "http://127.0.0.1:9"),
        ])
        .unwrap();
        let client = config.provider.build_client().unwrap();
        assert_eq!(client.backend(), Backend::GeminiApi);
    }

    #[test]
    fn test_proxy_is_applied_to_client() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "key"),
            ("GENAI_PROXY", " http://127.0.0.1:3128 "),
        ])
        .unwrap();
        assert_eq!(
            config.provider.proxy.as_deref(),
            Some("http://127.0.0.1:3128")
        );
        assert!(config.provider.build_client().is_ok());

        let config = config_from(&[("GEMINI_API_KEY", "key"), ("GENAI_PROXY", "not a url")])
            .unwrap();
        let err = config.provider.build_client().err().unwrap();
        assert!(err.is_config());
        assert!(err.detail().starts_with("Invalid proxy"));
    }

    #[test]
    fn test_storage_requires_both_variables() {
        let store = StoreConfig {
            supabase_url: None,
            service_role_key: Some("key".into()),
            base_image_url: None,
        };
        assert_eq!(store.storage().err().unwrap().detail(), "Missing env: SUPABASE_URL");

        let store = StoreConfig {
            supabase_url: Some("https://abc.supabase.co".into()),
            service_role_key: None,
            base_image_url: None,
        };
        assert_eq!(
            store.storage().err().unwrap().detail(),
            "Missing env: SUPABASE_SERVICE_ROLE_KEY"
        );
    }
}
