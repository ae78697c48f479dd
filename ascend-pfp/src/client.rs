//! Client configuration and transport layer for the generative-image provider.

use std::sync::Arc;
use std::time::Duration;

use google_cloud_auth::credentials::service_account::{
    AccessSpecifier, Builder as ServiceAccountBuilder,
};
use google_cloud_auth::credentials::{CacheableResource, Credentials as GoogleCredentials};
use http::Extensions;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client as HttpClient, Proxy};

use crate::credentials::ServiceAccountKey;
use crate::error::{Error, Result};

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-goog-api-key");
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const GEMINI_API_HOST: &str = "https://generativelanguage.googleapis.com/";
const VERTEX_GLOBAL_HOST: &str = "https://aiplatform.googleapis.com/";

/// 生成式图像服务客户端。
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub http: HttpClient,
    pub config: ClientConfig,
    pub endpoint: Endpoint,
    pub(crate) auth: Option<Arc<GoogleCredentials>>,
}

/// 客户端配置。
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend: Backend,
    /// 仅 Vertex AI 后端存在。
    pub vertex_config: Option<VertexConfig>,
    pub http_options: HttpOptions,
}

/// 后端选择。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    GeminiApi,
    VertexAi,
}

/// 认证方式。
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Gemini API key，放在 `x-goog-api-key` 头中。
    ApiKey(String),
    /// 服务账号密钥，换取 OAuth bearer token（Vertex AI）。
    ServiceAccount(ServiceAccountKey),
}

/// Vertex AI 项目与区域。
#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub project: String,
    pub location: String,
}

/// HTTP 配置。
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    pub timeout: Option<u64>,
    pub proxy: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
}

impl Client {
    /// 创建 Builder。
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// 当前后端。
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.inner.config.backend
    }

    /// 访问 Models API。
    #[must_use]
    pub fn models(&self) -> crate::models::Models {
        crate::models::Models::new(self.inner.clone())
    }
}

/// 客户端 Builder。
#[derive(Default)]
pub struct ClientBuilder {
    api_key: Option<String>,
    credentials: Option<Credentials>,
    backend: Option<Backend>,
    vertex_project: Option<String>,
    vertex_location: Option<String>,
    http_options: HttpOptions,
}

impl ClientBuilder {
    /// 设置 API Key（Gemini API）。
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub const fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn vertex_project(mut self, project: impl Into<String>) -> Self {
        self.vertex_project = Some(project.into());
        self
    }

    #[must_use]
    pub fn vertex_location(mut self, location: impl Into<String>) -> Self {
        self.vertex_location = Some(location.into());
        self
    }

    /// 设置请求超时（秒）。
    #[must_use]
    pub const fn timeout(mut self, secs: u64) -> Self {
        self.http_options.timeout = Some(secs);
        self
    }

    /// 所有请求经由该代理发出。
    #[must_use]
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.http_options.proxy = Some(url.into());
        self
    }

    /// 覆盖服务地址（测试或私有网关）。
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http_options.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.http_options.api_version = Some(api_version.into());
        self
    }

    /// 构建客户端。
    ///
    /// # Errors
    /// 后端与凭据不匹配、Vertex 缺少项目或区域、代理/密钥无效时返回配置错误；
    /// 服务账号密钥无法换取凭据时返回认证错误。
    pub fn build(self) -> Result<Client> {
        let backend = self.backend.unwrap_or(
            if self.vertex_project.is_some() || self.vertex_location.is_some() {
                Backend::VertexAi
            } else {
                Backend::GeminiApi
            },
        );
        let credentials = resolve_credentials(backend, self.api_key, self.credentials)?;
        let vertex_config = match backend {
            Backend::GeminiApi => None,
            Backend::VertexAi => match (self.vertex_project, self.vertex_location) {
                (Some(project), Some(location)) => Some(VertexConfig { project, location }),
                _ => return Err(Error::config("Project and location required for Vertex AI")),
            },
        };

        let (headers, auth) = match credentials {
            Credentials::ApiKey(api_key) => (api_key_headers(&api_key)?, None),
            Credentials::ServiceAccount(key) => {
                (HeaderMap::new(), Some(service_account_auth(&key)?))
            }
        };
        let http = build_http_client(&self.http_options, headers)?;

        let config = ClientConfig {
            backend,
            vertex_config,
            http_options: self.http_options,
        };
        let endpoint = Endpoint::new(&config);

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                config,
                endpoint,
                auth,
            }),
        })
    }
}

/// Gemini API 只接受 API key；Vertex AI 只接受服务账号。
fn resolve_credentials(
    backend: Backend,
    api_key: Option<String>,
    credentials: Option<Credentials>,
) -> Result<Credentials> {
    let credentials = match (api_key, credentials) {
        (Some(_), Some(Credentials::ServiceAccount(_))) => {
            return Err(Error::config(
                "API key cannot be combined with service account credentials",
            ))
        }
        (_, Some(credentials)) => credentials,
        (Some(api_key), None) => Credentials::ApiKey(api_key),
        (None, None) => {
            return Err(Error::config(match backend {
                Backend::GeminiApi => "API key required for Gemini API",
                Backend::VertexAi => "Service account credentials required for Vertex AI",
            }))
        }
    };

    match (backend, &credentials) {
        (Backend::VertexAi, Credentials::ApiKey(_)) => Err(Error::config(
            "Vertex AI does not support API key authentication",
        )),
        (Backend::GeminiApi, Credentials::ServiceAccount(_)) => Err(Error::config(
            "Service account credentials require the Vertex AI backend",
        )),
        _ => Ok(credentials),
    }
}

fn api_key_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if !api_key.is_empty() {
        let mut value =
            HeaderValue::from_str(api_key).map_err(|_| Error::config("Invalid API key value"))?;
        value.set_sensitive(true);
        headers.insert(API_KEY_HEADER, value);
    }
    Ok(headers)
}

fn service_account_auth(key: &ServiceAccountKey) -> Result<Arc<GoogleCredentials>> {
    ServiceAccountBuilder::new(key.to_value())
        .with_access_specifier(AccessSpecifier::from_scopes([CLOUD_PLATFORM_SCOPE]))
        .build()
        .map(Arc::new)
        .map_err(|err| Error::Auth {
            message: format!("Service account credentials invalid: {err}"),
        })
}

fn build_http_client(http_options: &HttpOptions, headers: HeaderMap) -> Result<HttpClient> {
    let mut builder = HttpClient::builder().default_headers(headers);
    if let Some(timeout) = http_options.timeout {
        builder = builder.timeout(Duration::from_secs(timeout));
    }
    if let Some(proxy_url) = &http_options.proxy {
        let proxy =
            Proxy::all(proxy_url).map_err(|e| Error::config(format!("Invalid proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }
    Ok(builder.build()?)
}

impl ClientInner {
    /// 发送请求，服务账号模式下注入 bearer token。
    ///
    /// # Errors
    /// 当请求构建、鉴权头获取或网络请求失败时返回错误。
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut request = request.build()?;
        if let Some(credentials) = &self.auth {
            for (name, value) in &auth_headers(credentials).await? {
                if request.headers().contains_key(name) {
                    continue;
                }
                let mut value = value.clone();
                if name == AUTHORIZATION {
                    value.set_sensitive(true);
                }
                request.headers_mut().insert(name.clone(), value);
            }
        }
        Ok(self.http.execute(request).await?)
    }
}

async fn auth_headers(credentials: &GoogleCredentials) -> Result<HeaderMap> {
    let headers = credentials
        .headers(Extensions::new())
        .await
        .map_err(|err| Error::Auth {
            message: format!("Credential header fetch failed: {err}"),
        })?;
    match headers {
        CacheableResource::New { data, .. } => Ok(data),
        CacheableResource::NotModified => Err(Error::Auth {
            message: "Credential header fetch returned NotModified without cached headers".into(),
        }),
    }
}

/// 服务根地址（以 `/` 结尾）与 API 版本。
pub(crate) struct Endpoint {
    pub base_url: String,
    pub api_version: String,
}

impl Endpoint {
    pub fn new(config: &ClientConfig) -> Self {
        let base_url = match (&config.http_options.base_url, &config.vertex_config) {
            (Some(base_url), _) => normalize_base_url(base_url),
            (None, Some(vertex)) if !vertex.location.is_empty() && vertex.location != "global" => {
                format!("https://{}-aiplatform.googleapis.com/", vertex.location)
            }
            (None, _) if config.backend == Backend::VertexAi => VERTEX_GLOBAL_HOST.to_string(),
            (None, _) => GEMINI_API_HOST.to_string(),
        };
        let api_version = config.http_options.api_version.clone().unwrap_or_else(|| {
            match config.backend {
                Backend::VertexAi => "v1beta1",
                Backend::GeminiApi => "v1beta",
            }
            .to_string()
        });
        Self {
            base_url,
            api_version,
        }
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let mut value = base_url.trim().to_string();
    if !value.ends_with('/') {
        value.push('/');
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini(api_key: &str) -> ClientBuilder {
        Client::builder().api_key(api_key)
    }

    #[test]
    fn test_api_key_selects_gemini_api() {
        let client = gemini("test-api-key").timeout(30).build().unwrap();
        assert_eq!(client.backend(), Backend::GeminiApi);
        assert!(client.inner.auth.is_none());
        assert_eq!(client.inner.config.http_options.timeout, Some(30));
        assert_eq!(
            client.inner.endpoint.base_url,
            "https://generativelanguage.googleapis.com/"
        );
        assert_eq!(client.inner.endpoint.api_version, "v1beta");
    }

    #[test]
    fn test_vertex_endpoint_follows_location() {
        let config = ClientConfig {
            backend: Backend::VertexAi,
            vertex_config: Some(VertexConfig {
                project: "my-project".into(),
                location: "us-central1".into(),
            }),
            http_options: HttpOptions::default(),
        };
        let endpoint = Endpoint::new(&config);
        assert_eq!(
            endpoint.base_url,
            "https://us-central1-aiplatform.googleapis.com/"
        );
        assert_eq!(endpoint.api_version, "v1beta1");

        let global = ClientConfig {
            vertex_config: Some(VertexConfig {
                project: "my-project".into(),
                location: "global".into(),
            }),
            ..config
        };
        assert_eq!(
            Endpoint::new(&global).base_url,
            "https://aiplatform.googleapis.com/"
        );
    }

    #[test]
    fn test_base_url_override_is_normalized() {
        let client = gemini("test-key")
            .base_url(" https://example.com")
            .api_version("v1")
            .build()
            .unwrap();
        assert_eq!(client.inner.endpoint.base_url, "https://example.com/");
        assert_eq!(client.inner.endpoint.api_version, "v1");
    }

    #[test]
    fn test_vertex_requires_project_and_location() {
        let err = Client::builder()
            .backend(Backend::VertexAi)
            .vertex_project("proj")
            .build()
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_vertex_requires_service_account() {
        let err = Client::builder()
            .vertex_project("proj")
            .vertex_location("loc")
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err.detail(),
            "Service account credentials required for Vertex AI"
        );
    }

    #[test]
    fn test_missing_api_key_for_gemini_errors() {
        let err = Client::builder()
            .backend(Backend::GeminiApi)
            .build()
            .err()
            .unwrap();
        assert_eq!(err.detail(), "API key required for Gemini API");
    }

    #[test]
    fn test_vertex_api_key_is_rejected() {
        let result = Client::builder()
            .backend(Backend::VertexAi)
            .vertex_project("proj")
            .vertex_location("loc")
            .credentials(Credentials::ApiKey("key".into()))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_invalid_api_key_value_is_rejected() {
        let err = gemini("bad\nkey").build().err().unwrap();
        assert!(
            matches!(err, Error::InvalidConfig { message } if message.contains("Invalid API key value"))
        );
    }

    #[test]
    fn test_proxy_is_validated() {
        assert!(gemini("test-key")
            .proxy("http://127.0.0.1:8080")
            .build()
            .is_ok());
        let err = gemini("test-key").proxy("not a url").build().err().unwrap();
        assert!(err.detail().starts_with("Invalid proxy"));
    }
}
