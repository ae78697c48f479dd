//! Base style image resolution: blob store first, public URL second.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::Storage;

pub const BASE_IMAGE_BUCKET: &str = "images";
pub const BASE_IMAGE_KEY: &str = "duvall.png";
pub const BASE_IMAGE_MIME_TYPE: &str = "image/png";

const NOT_CONFIGURED: &str = "Configure Supabase (SUPABASE_URL + SUPABASE_SERVICE_ROLE_KEY) with base image at images/duvall.png, or set BASE_IMAGE_URL to a public URL of the base style image.";

/// 解析得到的底图。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseImage {
    pub data: Bytes,
    pub mime_type: String,
}

/// 底图来源。
#[derive(Clone, Default)]
pub struct BaseImageSource {
    storage: Option<Storage>,
    fallback_url: Option<String>,
    http: reqwest::Client,
}

impl BaseImageSource {
    #[must_use]
    pub fn new(storage: Option<Storage>, fallback_url: Option<String>) -> Self {
        Self {
            storage,
            fallback_url,
            http: reqwest::Client::new(),
        }
    }

    /// 依次尝试 blob store 与 `BASE_IMAGE_URL`。
    ///
    /// # Errors
    /// 两者都不可用时返回配置错误；URL 返回非 2xx 时返回 [`Error::ApiError`]。
    pub async fn resolve(&self) -> Result<BaseImage> {
        if let Some(storage) = &self.storage {
            match storage.bucket(BASE_IMAGE_BUCKET).download(BASE_IMAGE_KEY).await {
                Ok(data) => {
                    debug!(bytes = data.len(), "base image loaded from blob store");
                    return Ok(BaseImage {
                        data,
                        mime_type: BASE_IMAGE_MIME_TYPE.to_string(),
                    });
                }
                Err(err) => warn!(error = %err, "base image download failed, trying BASE_IMAGE_URL"),
            }
        }

        let Some(url) = &self.fallback_url else {
            return Err(Error::config(NOT_CONFIGURED));
        };
        self.fetch(url).await
    }

    async fn fetch(&self, url: &str) -> Result<BaseImage> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ApiError {
                status: status.as_u16(),
                message: format!("Failed to fetch base image: {}", status.as_u16()),
            });
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(media_type)
            .filter(|value| !value.is_empty())
            .unwrap_or(BASE_IMAGE_MIME_TYPE)
            .to_string();
        let data = response.bytes().await?;
        debug!(bytes = data.len(), %mime_type, "base image fetched from url");
        Ok(BaseImage { data, mime_type })
    }
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}
