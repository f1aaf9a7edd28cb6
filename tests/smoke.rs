use chat_gw_lite::config::AppConfig;
use chat_gw_lite::cors::allowed_origin;

#[test]
fn dev_config_loads_with_defaults() {
    let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let path = manifest_dir.join("config").join("dev.yaml");
    let config = AppConfig::load_from_file(path).expect("dev config should load");

    assert_eq!(config.listen, "127.0.0.1:3000");
    assert_eq!(config.rate_limit.max_requests, 30);
    assert_eq!(config.upstream.request_timeout_ms, 30_000);
    assert_eq!(
        config.upstream.chat_url(),
        "https://api.perplexity.ai/chat/completions"
    );
}

#[test]
fn dev_config_restricts_cors_to_local_origins() {
    let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let path = manifest_dir.join("config").join("dev.yaml");
    let config = AppConfig::load_from_file(path).expect("dev config should load");

    assert_eq!(
        allowed_origin(&config.cors, Some("http://localhost:5500")).as_deref(),
        Some("http://localhost:5500")
    );
    assert!(allowed_origin(&config.cors, Some("https://elsewhere.example")).is_none());
}
