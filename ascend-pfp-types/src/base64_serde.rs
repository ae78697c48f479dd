use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serializer};

/// 内联数据的两种线上表示：base64 文本或原始字节数组。
#[derive(Deserialize)]
#[serde(untagged)]
enum EncodedBytes {
    Text(String),
    Raw(Vec<u8>),
}

impl EncodedBytes {
    fn into_bytes<E: serde::de::Error>(self) -> Result<Vec<u8>, E> {
        match self {
            Self::Text(encoded) => STANDARD.decode(encoded.as_bytes()).map_err(E::custom),
            Self::Raw(bytes) => Ok(bytes),
        }
    }
}

/// 序列化字节为 base64 字符串。
pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let encoded = STANDARD.encode(bytes);
    serializer.serialize_str(&encoded)
}

/// 反序列化 base64 字符串（或字节数组）为字节。
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    EncodedBytes::deserialize(deserializer)?.into_bytes()
}

pub mod option {
    use super::*;

    /// 序列化 Option<Vec<u8>> 为 base64 字符串。
    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    /// 反序列化 base64 字符串为 Option<Vec<u8>>。
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<EncodedBytes>::deserialize(deserializer)? {
            Some(encoded) => encoded.into_bytes().map(Some),
            None => Ok(None),
        }
    }
}
