// ==========================
// tests/unit/config_tests.rs
// ==========================
//! Unit tests for the configuration module
use figment::Jail;
use truenas_passwd_lib::config::{ClientKind, LogFormat, Settings};
use truenas_passwd_lib::error::AppError;

#[test]
fn test_settings_default() {
    let settings = Settings::default();

    assert_eq!(settings.bind_addr.to_string(), "127.0.0.1:5000");
    assert_eq!(settings.log_level, "info");
    assert_eq!(settings.log_format, LogFormat::Text);
    assert!(settings.secret_key.is_none());
    assert!(!settings.trust_proxy_headers);
    assert_eq!(settings.session.ttl_secs, 3600);
    assert_eq!(settings.truenas.port, 443);
    assert!(settings.truenas.use_ssl);
    assert_eq!(settings.truenas.client, ClientKind::Rest);
    assert_eq!(settings.truenas.timeout_secs, 10);
    assert!(settings.smb.enabled);
    assert_eq!(settings.smb.port, 445);
    assert_eq!(settings.rate_limit.max_attempts, 5);
    assert_eq!(settings.rate_limit.lockout_secs, 300);
}

#[test]
fn test_load_from_file_with_json_logging() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "portal.toml",
            r#"
            log_format = "json"
            secret_key = "0123456789abcdef0123"
            trust_proxy_headers = true

            [session]
            ttl_secs = 600
            cookie_secure = true

            [truenas]
            host = "truenas.example.com"
            api_key = "1-abcdef"
            client = "ws"

            [smb]
            enabled = false

            [rate_limit]
            max_attempts = 10
            "#,
        )?;

        let settings = Settings::load_from("portal.toml").map_err(|e| e.to_string())?;
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(settings.trust_proxy_headers);
        assert_eq!(settings.session.ttl_secs, 600);
        assert!(settings.session.cookie_secure);
        assert_eq!(settings.truenas.client, ClientKind::Websocket);
        assert_eq!(settings.truenas.ws_url(), "wss://truenas.example.com:443/websocket");
        assert!(!settings.smb.enabled);
        assert_eq!(settings.rate_limit.max_attempts, 10);
        assert_eq!(settings.rate_limit.lockout_secs, 300);
        Ok(())
    });
}

#[test]
fn test_missing_file_uses_environment_only() {
    Jail::expect_with(|jail| {
        jail.set_env("SECRET_KEY", "env-secret-env-secret");
        jail.set_env("TRUENAS_API_KEY", "1-env");
        jail.set_env("TRUENAS_PASSWD_BIND_ADDR", "0.0.0.0:8000");

        let settings = Settings::load_from("does-not-exist.toml").map_err(|e| e.to_string())?;
        assert_eq!(settings.bind_addr.to_string(), "0.0.0.0:8000");
        assert_eq!(settings.truenas.api_key(), "1-env");
        assert_eq!(settings.truenas.host, "localhost");
        Ok(())
    });
}

#[test]
fn test_legacy_env_is_merged_last() {
    Jail::expect_with(|jail| {
        jail.set_env("SECRET_KEY", "env-secret-env-secret");
        jail.set_env("TRUENAS_PASSWD_TRUENAS__API_KEY", "1-prefixed");
        jail.set_env("TRUENAS_PASSWD_TRUENAS__HOST", "prefixed-host");
        jail.set_env("TRUENAS_HOST", "legacy-host");

        // The flat legacy variables are merged last
        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.truenas.host, "legacy-host");
        assert_eq!(settings.truenas.api_key(), "1-prefixed");
        Ok(())
    });
}

#[test]
fn test_invalid_values_are_config_errors() {
    Jail::expect_with(|jail| {
        jail.set_env("SECRET_KEY", "env-secret-env-secret");
        jail.set_env("TRUENAS_API_KEY", "1-env");
        jail.set_env("TRUENAS_PASSWD_LOG_FORMAT", "xml");

        let result = Settings::load();
        assert!(matches!(result, Err(AppError::Config(_))));
        Ok(())
    });
}

#[test]
fn test_zero_timeout_is_rejected() {
    let mut settings = Settings::default();
    settings.secret_key = Some(truenas_passwd_lib::config::Secret::new("0123456789abcdef0123"));
    settings.truenas.api_key = Some(truenas_passwd_lib::config::Secret::new("1-abcdef"));
    assert!(settings.validate().is_ok());

    settings.truenas.timeout_secs = 0;
    assert!(matches!(settings.validate(), Err(AppError::Config(_))));
}
