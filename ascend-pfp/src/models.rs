//! Models API surface (`generateContent`).

use std::sync::Arc;

use ascend_pfp_types::content::Content;
use ascend_pfp_types::models::{GenerateContentConfig, GenerateContentRequest};
use ascend_pfp_types::response::GenerateContentResponse;

use crate::client::{Backend, ClientInner};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct Models {
    pub(crate) inner: Arc<ClientInner>,
}

impl Models {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// 生成内容（自定义配置）。
    ///
    /// # Errors
    /// 非 2xx 响应返回 [`Error::ApiError`]，消息为原始响应体。
    pub async fn generate_content_with_config(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        config: GenerateContentConfig,
    ) -> Result<GenerateContentResponse> {
        let model = model.into();
        if contents.is_empty() {
            return Err(Error::config("contents must not be empty"));
        }

        let request = GenerateContentRequest::new(contents, config);
        let url = build_model_method_url(&self.inner, &model, "generateContent")?;

        let request = self.inner.http.post(url).json(&request);
        let response = self.inner.send(request).await?;
        if !response.status().is_success() {
            return Err(Error::ApiError {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| Error::Parse {
            message: format!("Invalid generateContent response: {err}"),
        })
    }
}

pub(crate) fn transform_model_name(backend: Backend, model: &str) -> String {
    match backend {
        Backend::GeminiApi => {
            if model.starts_with("models/") {
                model.to_string()
            } else {
                format!("models/{model}")
            }
        }
        Backend::VertexAi => {
            if model.starts_with("projects/") || model.starts_with("publishers/") {
                model.to_string()
            } else {
                format!("publishers/google/models/{model}")
            }
        }
    }
}

pub(crate) fn build_model_method_url(
    inner: &ClientInner,
    model: &str,
    method: &str,
) -> Result<String> {
    let model = transform_model_name(inner.config.backend, model);
    let base = &inner.endpoint.base_url;
    let version = &inner.endpoint.api_version;
    let url = match inner.config.backend {
        Backend::GeminiApi => format!("{base}{version}/{model}:{method}"),
        Backend::VertexAi => {
            let vertex = inner
                .config
                .vertex_config
                .as_ref()
                .ok_or_else(|| Error::config("Vertex config missing"))?;
            if model.starts_with("projects/") {
                format!("{base}{version}/{model}:{method}")
            } else {
                format!(
                    "{base}{version}/projects/{}/locations/{}/{}:{method}",
                    vertex.project, vertex.location, model
                )
            }
        }
    };
    Ok(url)
}
