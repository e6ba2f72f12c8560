use mygpt::config::Config;

fn config(url: &str, scope: &str, timeout: u64) -> Config {
    Config {
        backend_url: url.to_string(),
        preference_scope: scope.to_string(),
        connect_timeout_secs: timeout,
        log_path: None,
    }
}

#[test]
fn test_default_config_is_valid() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_validation_accepts_remote_https_backend() {
    assert!(config("https://chat.example.com/api", "global", 10)
        .validate()
        .is_ok());
}

#[test]
fn test_validation_rejects_non_http_scheme() {
    let err = config("ftp://127.0.0.1:8000", "global", 10)
        .validate()
        .expect_err("ftp is not a backend");
    assert!(err.to_string().contains("MYGPT_BACKEND_URL"));
}

#[test]
fn test_validation_rejects_unparseable_url() {
    assert!(config("not a url", "global", 10).validate().is_err());
}

#[test]
fn test_validation_rejects_blank_or_spaced_scope() {
    assert!(config("http://localhost:8000", "", 10).validate().is_err());
    assert!(config("http://localhost:8000", "two words", 10)
        .validate()
        .is_err());
}

#[test]
fn test_validation_bounds_connect_timeout() {
    assert!(config("http://localhost:8000", "global", 0).validate().is_err());
    assert!(config("http://localhost:8000", "global", 301).validate().is_err());
    assert!(config("http://localhost:8000", "global", 300).validate().is_ok());
}
