//! Blob store (Supabase Storage) REST bodies.

use serde::{Deserialize, Serialize};

/// Bucket 信息。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_limit: Option<u64>,
}

/// 创建 bucket 请求体。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBucketRequest {
    pub id: String,
    pub name: String,
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_limit: Option<u64>,
}

/// 存储服务返回的错误体。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageErrorBody {
    #[serde(default)]
    pub status_code: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StorageErrorBody {
    /// 优先使用 `message`，其次 `error`。
    #[must_use]
    pub fn into_message(self) -> Option<String> {
        self.message
            .filter(|value| !value.is_empty())
            .or_else(|| self.error.filter(|value| !value.is_empty()))
    }
}
