//! Supabase Storage REST client.

use std::sync::Arc;

use ascend_pfp_types::storage::{BucketInfo, CreateBucketRequest, StorageErrorBody};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as HttpClient, Url};

use crate::error::{Error, Result};

const UPSERT_HEADER: HeaderName = HeaderName::from_static("x-upsert");
const APIKEY_HEADER: HeaderName = HeaderName::from_static("apikey");

/// Blob store 客户端（Supabase Storage）。
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    http: HttpClient,
    base_url: Url,
}

impl Storage {
    /// 使用项目 URL 与 service-role key 创建客户端。
    ///
    /// # Errors
    /// URL 无效或 key 含非法字符时返回配置错误。
    pub fn new(url: &str, service_role_key: &str) -> Result<Self> {
        let base_url = Url::parse(url.trim())
            .map_err(|err| Error::config(format!("Invalid SUPABASE_URL: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("Invalid SUPABASE_URL: {url}")));
        }

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {service_role_key}"))
            .map_err(|_| Error::config("Invalid SUPABASE_SERVICE_ROLE_KEY value"))?;
        bearer.set_sensitive(true);
        let mut apikey = HeaderValue::from_str(service_role_key)
            .map_err(|_| Error::config("Invalid SUPABASE_SERVICE_ROLE_KEY value"))?;
        apikey.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(APIKEY_HEADER, apikey);

        let http = HttpClient::builder().default_headers(headers).build()?;
        Ok(Self {
            inner: Arc::new(StorageInner { http, base_url }),
        })
    }

    /// 访问指定 bucket。
    #[must_use]
    pub fn bucket(&self, name: impl Into<String>) -> Bucket {
        Bucket {
            storage: self.clone(),
            name: name.into(),
        }
    }

    /// 列出所有 bucket。
    ///
    /// # Errors
    /// 请求失败或存储服务返回错误时返回错误。
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let url = self.endpoint(&["bucket"], None);
        let response = self.inner.http.get(url).send().await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    /// 创建 bucket。
    ///
    /// # Errors
    /// 请求失败或存储服务返回错误（例如已存在）时返回错误。
    pub async fn create_bucket(&self, request: &CreateBucketRequest) -> Result<()> {
        let url = self.endpoint(&["bucket"], None);
        let response = self.inner.http.post(url).json(request).send().await?;
        check_response(response).await?;
        Ok(())
    }

    /// `{base}/storage/v1/{segments..}/{key..}`，对象 key 按 `/` 拆分后逐段编码。
    fn endpoint(&self, segments: &[&str], key: Option<&str>) -> Url {
        let mut url = self.inner.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["storage", "v1"]).extend(segments);
            if let Some(key) = key {
                path.extend(key.split('/').filter(|segment| !segment.is_empty()));
            }
        }
        url
    }
}

/// 单个 bucket 的对象操作。
#[derive(Clone)]
pub struct Bucket {
    storage: Storage,
    name: String,
}

/// 上传选项。
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub content_type: String,
    pub upsert: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            content_type: "application/octet-stream".into(),
            upsert: false,
        }
    }
}

impl UploadOptions {
    #[must_use]
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..Self::default()
        }
    }

    /// 覆盖同名对象。
    #[must_use]
    pub const fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

impl Bucket {
    /// 下载对象内容。
    ///
    /// # Errors
    /// 请求失败或对象不存在时返回错误。
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let url = self.storage.endpoint(&["object", &self.name], Some(key));
        let response = self.storage.inner.http.get(url).send().await?;
        let response = check_response(response).await?;
        Ok(response.bytes().await?)
    }

    /// 上传对象。
    ///
    /// # Errors
    /// 请求失败或存储服务拒绝时返回错误。
    pub async fn upload(
        &self,
        key: &str,
        data: impl Into<Bytes>,
        options: &UploadOptions,
    ) -> Result<()> {
        let url = self.storage.endpoint(&["object", &self.name], Some(key));
        let content_type = HeaderValue::from_str(&options.content_type).map_err(|_| {
            Error::config(format!("Invalid content type: {}", options.content_type))
        })?;
        let response = self
            .storage
            .inner
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .header(UPSERT_HEADER, if options.upsert { "true" } else { "false" })
            .body(data.into())
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    /// 对象的公开 URL（不发请求）。
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        self.storage
            .endpoint(&["object", "public", &self.name], Some(key))
            .to_string()
    }
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<StorageErrorBody>(&body)
        .ok()
        .and_then(StorageErrorBody::into_message)
        .unwrap_or(body);
    Err(Error::ApiError {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_bytes, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_public_url_layout() {
        let storage = Storage::new("https://abc.supabase.co", "key").unwrap();
        assert_eq!(
            storage.bucket("generated-pfp").public_url("1234.png"),
            "https://abc.supabase.co/storage/v1/object/public/generated-pfp/1234.png"
        );
        let storage = Storage::new("https://abc.supabase.co/", "key").unwrap();
        assert_eq!(
            storage.bucket("images").public_url("folder/a b.png"),
            "https://abc.supabase.co/storage/v1/object/public/images/folder/a%20b.png"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let err = Storage::new("not a url", "key").err().unwrap();
        assert!(err.is_config());
        let err = Storage::new("mailto:someone@example.com", "key").err().unwrap();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_download_sends_service_role_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/images/duvall.png"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("apikey", "service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Storage::new(&server.uri(), "service-key").unwrap();
        let data = storage.bucket("images").download("duvall.png").await.unwrap();
        assert_eq!(data.as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_upload_sets_upsert_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/generated-pfp/out.png"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "image/png"))
            .and(body_bytes(vec![9u8, 8, 7]))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Key": "generated-pfp/out.png"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let storage = Storage::new(&server.uri(), "service-key").unwrap();
        storage
            .bucket("generated-pfp")
            .upload("out.png", vec![9u8, 8, 7], &UploadOptions::new("image/png").upsert(true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_message_prefers_json_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "statusCode": "403",
                "error": "Unauthorized",
                "message": "new row violates row-level security policy"
            })))
            .mount(&server)
            .await;

        let storage = Storage::new(&server.uri(), "service-key").unwrap();
        let err = storage
            .bucket("generated-pfp")
            .upload("x.png", Vec::<u8>::new(), &UploadOptions::default())
            .await
            .unwrap_err();
        let Error::ApiError { status, message } = err else {
            panic!("expected api error");
        };
        assert_eq!(status, 400);
        assert_eq!(message, "new row violates row-level security policy");
    }

    #[tokio::test]
    async fn test_error_message_falls_back_to_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let storage = Storage::new(&server.uri(), "service-key").unwrap();
        let err = storage.bucket("images").download("a.png").await.unwrap_err();
        assert!(matches!(err, Error::ApiError { status: 502, ref message } if message == "bad gateway"));
    }

    #[tokio::test]
    async fn test_transport_error_omits_object_url() {
        // 端口 1 上无服务，连接被拒绝。
        let storage = Storage::new("http://127.0.0.1:1", "service-key").unwrap();
        let err = storage
            .bucket("generated-pfp")
            .upload("a429b.png", vec![1u8], &UploadOptions::new("image/png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HttpClient { .. }));
        let message = err.to_string();
        assert!(!message.contains("a429b"), "{message}");
        assert!(!message.contains("127.0.0.1:1"), "{message}");
    }

    #[tokio::test]
    async fn test_bucket_listing_and_creation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/bucket"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "generated-pfp", "name": "generated-pfp", "public": true}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/bucket"))
            .and(body_json(json!({
                "id": "images",
                "name": "images",
                "public": true,
                "file_size_limit": 52_428_800
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "images"})))
            .expect(1)
            .mount(&server)
            .await;

        let storage = Storage::new(&server.uri(), "service-key").unwrap();
        let buckets = storage.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert!(buckets[0].public);
        storage
            .create_bucket(&CreateBucketRequest {
                id: "images".into(),
                name: "images".into(),
                public: true,
                file_size_limit: Some(52_428_800),
            })
            .await
            .unwrap();
    }
}
