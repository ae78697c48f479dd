use serde::{Deserialize, Serialize};

use crate::enums::Modality;

/// 生成配置。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<Modality>>,
}

/// 图像生成配置。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_mime_type: Option<String>,
}

impl ImageConfig {
    /// 仅指定宽高比。
    pub fn with_aspect_ratio(aspect_ratio: impl Into<String>) -> Self {
        Self {
            aspect_ratio: Some(aspect_ratio.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_config_serializes_image_settings() {
        let config = GenerationConfig {
            response_modalities: Some(vec![Modality::Text, Modality::Image]),
            image_config: Some(ImageConfig::with_aspect_ratio("1:1")),
            ..Default::default()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["responseModalities"][0], "TEXT");
        assert_eq!(value["responseModalities"][1], "IMAGE");
        assert_eq!(value["imageConfig"]["aspectRatio"], "1:1");
        assert!(value.get("temperature").is_none());
        assert!(value["imageConfig"].get("imageSize").is_none());
    }
}
