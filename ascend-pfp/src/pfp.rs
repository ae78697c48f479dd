//! Profile-picture pipeline: validate, resolve inputs, generate, store.

use std::sync::Arc;

use ascend_pfp_types::config::{GenerationConfig, ImageConfig};
use ascend_pfp_types::content::{Content, Part, Role};
use ascend_pfp_types::enums::Modality;
use ascend_pfp_types::models::GenerateContentConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::base_image::BaseImageSource;
use crate::client::Client;
use crate::config::Config;
use crate::error::Error;
use crate::storage::{Storage, UploadOptions};

pub const PFP_PROMPT: &str = "Generate a 1:1 aspect ratio profile picture.
Subject: Use the person from the [Second Image] as the character. Keep their facial features and identity recognizable.
Style & Pose: Copy the art style, coloring, and exact body pose (floating, arms out) from the [First Image].
Background: Replace the original background with a random, epic space scenery (nebula, stars) that matches the lighting of the character.
Output: High fidelity, 1:1 aspect ratio.";

/// 用户图片上限（按 base64 长度估算的解码字节数）。
pub const MAX_IMAGE_BYTES: usize = 7 * 1024 * 1024;
pub const OUTPUT_BUCKET: &str = "generated-pfp";
pub const OUTPUT_MIME_TYPE: &str = "image/png";
pub const DEFAULT_USER_MIME_TYPE: &str = "image/jpeg";
pub const ASPECT_RATIO: &str = "1:1";

const DETAIL_CHARS: usize = 500;

/// 请求层错误，每个变体对应一个 HTTP 状态。
#[derive(Debug, Error)]
pub enum PfpError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Image too large (max 7 MB)")]
    PayloadTooLarge,

    #[error("{0}")]
    Configuration(String),

    #[error("Quota limit reached. Please try again in 5 minutes.")]
    UpstreamQuotaExceeded,

    #[error("No image in response")]
    UpstreamEmptyResponse { detail: String },

    #[error("Upload failed: {0}")]
    UpstreamUploadFailure(String),

    #[error("{0}")]
    Unknown(String),
}

impl PfpError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::PayloadTooLarge => StatusCode::BAD_REQUEST,
            Self::UpstreamQuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamEmptyResponse { .. } => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::UpstreamUploadFailure(_) | Self::Unknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub(crate) fn missing_image() -> Self {
        Self::InvalidRequest("Missing imageBase64 in body".into())
    }

    /// 配置类错误保留原始消息，其余按未知错误处理。
    fn from_client(err: Error) -> Self {
        if err.is_config() {
            Self::Configuration(err.detail())
        } else {
            Self::Unknown(err.to_string())
        }
    }

    /// 校验之后的失败，消息像是配额耗尽时统一改为 429。
    #[must_use]
    pub fn escalate(self) -> Self {
        match self {
            Self::Configuration(ref message)
            | Self::UpstreamUploadFailure(ref message)
            | Self::Unknown(ref message)
                if is_quota_exhausted(message) =>
            {
                Self::UpstreamQuotaExceeded
            }
            other => other,
        }
    }
}

/// 已校验的用户图片。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfpRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
}

impl PfpRequest {
    /// 宽松解析原始请求体；空体或非 JSON 视为缺少图片。
    ///
    /// # Errors
    /// 见 [`PfpRequest::from_json`]。
    pub fn from_slice(body: &[u8]) -> Result<Self, PfpError> {
        let value = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
        Self::from_json(&value)
    }

    /// 从 JSON 请求体校验并解码图片。
    ///
    /// # Errors
    /// 缺少 `imageBase64`、超过大小上限或不是合法 base64 时返回错误。
    pub fn from_json(body: &Value) -> Result<Self, PfpError> {
        let encoded = body
            .get("imageBase64")
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(PfpError::missing_image)?;

        if exceeds_limit(encoded.len()) {
            return Err(PfpError::PayloadTooLarge);
        }

        let compact: String = encoded
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        let image = STANDARD
            .decode(compact.as_bytes())
            .map_err(|_| PfpError::InvalidRequest("imageBase64 is not valid base64".into()))?;

        Ok(Self {
            image,
            mime_type: normalize_mime_type(body.get("mimeType")),
        })
    }
}

/// `len * 3/4 > MAX`，整数运算不丢精度。
fn exceeds_limit(encoded_len: usize) -> bool {
    encoded_len.saturating_mul(3) > MAX_IMAGE_BYTES * 4
}

/// 非 `image/*` 的类型一律视为 JPEG。
#[must_use]
pub fn normalize_mime_type(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(DEFAULT_USER_MIME_TYPE)
        .to_string()
}

/// 前 500 个字符。
#[must_use]
pub fn truncate_detail(text: &str) -> String {
    text.chars().take(DETAIL_CHARS).collect()
}

#[must_use]
pub fn is_quota_exhausted(message: &str) -> bool {
    ["429", "RESOURCE_EXHAUSTED", "Resource exhausted"]
        .iter()
        .any(|needle| message.contains(needle))
}

#[must_use]
pub fn generated_filename() -> String {
    format!("{}.png", Uuid::new_v4())
}

/// 存储拒绝时取其消息；传输错误的文本不含对象 URL。
fn upload_failure(err: Error) -> PfpError {
    match err {
        Error::ApiError { message, .. } => PfpError::UpstreamUploadFailure(message),
        other if other.is_config() => PfpError::Configuration(other.detail()),
        other => PfpError::UpstreamUploadFailure(other.to_string()),
    }
}

/// 头像生成服务；客户端首次成功构建后缓存。
pub struct ProfilePictureService {
    config: Arc<Config>,
    client: OnceCell<Client>,
    storage: Result<Storage, String>,
    base_image: BaseImageSource,
}

impl ProfilePictureService {
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        let storage = config.store.storage().map_err(|err| err.detail());
        if let Err(message) = &storage {
            debug!(%message, "blob store not configured");
        }
        let base_image = BaseImageSource::new(
            storage.as_ref().ok().cloned(),
            config.store.base_image_url.clone(),
        );
        Self {
            config,
            client: OnceCell::new(),
            storage,
            base_image,
        }
    }

    /// 生成头像并返回公开 URL。
    ///
    /// # Errors
    /// 任一阶段失败即返回；不重试，失败时不写入存储。
    pub async fn generate(&self, request: PfpRequest) -> Result<String, PfpError> {
        self.run(request).await.map_err(PfpError::escalate)
    }

    async fn run(&self, request: PfpRequest) -> Result<String, PfpError> {
        let client = self.client().await?;

        let base = self.base_image.resolve().await.map_err(|err| match err {
            Error::ApiError { message, .. } => PfpError::Unknown(message),
            other => PfpError::from_client(other),
        })?;
        debug!(
            base_bytes = base.data.len(),
            user_bytes = request.image.len(),
            user_mime = %request.mime_type,
            "inputs resolved"
        );

        let contents = vec![Content::from_parts(
            vec![
                Part::inline_data(base.data.to_vec(), base.mime_type),
                Part::inline_data(request.image, request.mime_type),
                Part::text(PFP_PROMPT),
            ],
            Role::User,
        )];
        let config = GenerateContentConfig {
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec![Modality::Text, Modality::Image]),
                image_config: Some(ImageConfig::with_aspect_ratio(ASPECT_RATIO)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let response = client
            .models()
            .generate_content_with_config(&self.config.provider.model, contents, config)
            .await
            .map_err(PfpError::from_client)?;

        let Some(image) = response.first_inline_image() else {
            let detail = truncate_detail(&response.text().unwrap_or_default());
            warn!(%detail, "provider returned no image");
            return Err(PfpError::UpstreamEmptyResponse { detail });
        };
        debug!(bytes = image.len(), "image generated");

        let storage = self.storage.clone().map_err(PfpError::Configuration)?;
        let bucket = storage.bucket(OUTPUT_BUCKET);
        let filename = generated_filename();
        bucket
            .upload(
                &filename,
                image.to_vec(),
                &UploadOptions::new(OUTPUT_MIME_TYPE).upsert(true),
            )
            .await
            .map_err(upload_failure)?;

        let url = bucket.public_url(&filename);
        info!(%url, "profile picture stored");
        Ok(url)
    }

    async fn client(&self) -> Result<&Client, PfpError> {
        self.client
            .get_or_try_init(|| async { self.config.provider.build_client() })
            .await
            .map_err(PfpError::from_client)
    }
}
