//! Static asset upload: ensures the bucket exists, then uploads files concurrently.

use std::path::Path;

use ascend_pfp_types::storage::CreateBucketRequest;
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::{Bucket, Storage, UploadOptions};

/// 站点角色图（含底图 `duvall.png`）。
pub const DEFAULT_ASSETS: [&str; 11] = [
    "alon.png",
    "Bandit.png",
    "cented.png",
    "clukz.png",
    "cupsey.png",
    "daumen.png",
    "duvall.png",
    "gake.png",
    "jijo2.png",
    "joji.png",
    "mitch.png",
];

pub const ASSET_BUCKET_FILE_SIZE_LIMIT: u64 = 50 * 1024 * 1024;

/// 单个文件的上传结果：公开 URL 或错误消息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpload {
    pub name: String,
    pub outcome: std::result::Result<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub uploads: Vec<AssetUpload>,
}

impl UploadSummary {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.uploads
            .iter()
            .filter(|upload| upload.outcome.is_ok())
            .count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.uploads.len()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }
}

/// bucket 不存在时以公开方式创建；返回是否新建。
///
/// # Errors
/// 列出或创建 bucket 失败时返回错误。
pub async fn ensure_bucket(storage: &Storage, name: &str) -> Result<bool> {
    let buckets = storage.list_buckets().await?;
    if buckets.iter().any(|bucket| bucket.name == name) {
        info!(bucket = name, "bucket already exists");
        return Ok(false);
    }
    storage
        .create_bucket(&CreateBucketRequest {
            id: name.to_string(),
            name: name.to_string(),
            public: true,
            file_size_limit: Some(ASSET_BUCKET_FILE_SIZE_LIMIT),
        })
        .await?;
    info!(bucket = name, "bucket created");
    Ok(true)
}

/// 上传 `dir` 下的文件；单个文件失败不影响其余文件。
///
/// # Errors
/// 仅当 bucket 无法确认或创建时返回错误。
pub async fn upload_assets(
    storage: &Storage,
    dir: &Path,
    bucket: &str,
    files: &[String],
) -> Result<UploadSummary> {
    ensure_bucket(storage, bucket).await?;
    let bucket = storage.bucket(bucket);
    let uploads = join_all(files.iter().map(|name| upload_one(&bucket, dir, name))).await;
    Ok(UploadSummary { uploads })
}

async fn upload_one(bucket: &Bucket, dir: &Path, name: &str) -> AssetUpload {
    let outcome = async {
        let data = tokio::fs::read(dir.join(name))
            .await
            .map_err(|err| format!("read failed: {err}"))?;
        let content_type = mime_guess::from_path(name).first_or_octet_stream();
        bucket
            .upload(
                name,
                data,
                &UploadOptions::new(content_type.essence_str()).upsert(true),
            )
            .await
            .map_err(|err| err.detail())?;
        Ok::<_, String>(bucket.public_url(name))
    }
    .await;

    match &outcome {
        Ok(url) => info!(file = name, %url, "uploaded"),
        Err(message) => warn!(file = name, %message, "upload failed"),
    }
    AssetUpload {
        name: name.to_string(),
        outcome,
    }
}
