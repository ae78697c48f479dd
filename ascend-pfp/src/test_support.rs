use crate::client::{Backend, ClientConfig, ClientInner, Endpoint, HttpOptions, VertexConfig};

/// 不经 Builder 直接组装客户端内部状态，用于 URL 拼接测试。
pub fn test_client_inner(
    backend: Backend,
    vertex_config: Option<VertexConfig>,
    base_url: &str,
) -> ClientInner {
    let config = ClientConfig {
        backend,
        vertex_config,
        http_options: HttpOptions {
            base_url: Some(base_url.to_string()),
            api_version: Some("v1".to_string()),
            ..HttpOptions::default()
        },
    };
    ClientInner {
        http: reqwest::Client::new(),
        endpoint: Endpoint::new(&config),
        config,
        auth: None,
    }
}
