//! Process-wide initialization. Kept in its own test binary because the
//! global subscriber can only be installed once per process.

use std::env;

use orderer_telemetry::{init_telemetry, TelemetryConfig, TelemetryError};

#[test]
fn test_init_telemetry_from_env() {
    env::set_var("OTEL_SERVICE_NAME", "orderer-test");
    env::set_var("ORDERER_LOG_LEVEL", "orderer_broadcast=debug");
    env::set_var("ORDERER_CONSOLE_OUTPUT", "0");
    env::set_var("ORDERER_JSON_LOGS", "TRUE");

    let config = TelemetryConfig::from_env();
    assert_eq!(config.service_name, "orderer-test");
    assert_eq!(config.log_level, "orderer_broadcast=debug");
    assert!(!config.console_output);
    assert!(config.json_logs);

    env::remove_var("ORDERER_LOG_LEVEL");
    env::set_var("RUST_LOG", "warn");
    assert_eq!(TelemetryConfig::from_env().log_level, "warn");

    let guard = init_telemetry(&config).unwrap();
    let text = guard.metrics().gather_text().unwrap();
    assert!(text.contains("orderer_broadcast_sessions_active"));

    assert!(matches!(
        init_telemetry(&config),
        Err(TelemetryError::LoggingInit(_))
    ));
}
