//! Tests for the tenant-refresh-cli library module.

use super::*;
use std::io::Write;
use tenant_refresh_core::SigningSecrets;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn send_options(url: String) -> SendOptions {
    SendOptions {
        url,
        secret: Zeroizing::new("shhh".to_string()),
        hostname: "shop.example.com".to_string(),
        webhook_id: "evt-42".to_string(),
        signature_header: "x-webhook-signature".to_string(),
        webhook_id_header: "x-webhook-id".to_string(),
    }
}

// ============================================================================
// Argument parsing
// ============================================================================

mod parsing_tests {
    use super::*;

    #[test]
    fn test_sign_parsing() {
        let cli = Cli::try_parse_from([
            "tenant-refresh",
            "sign",
            "--secret",
            "s3",
            "--timestamp",
            "1700000000",
            "--body",
            "{}",
        ])
        .unwrap();

        match cli.command {
            Commands::Sign {
                secret,
                timestamp,
                body,
                body_file,
            } => {
                assert_eq!(secret, "s3");
                assert_eq!(timestamp, Some(1_700_000_000));
                assert_eq!(body.as_deref(), Some("{}"));
                assert!(body_file.is_none());
            }
            _ => panic!("Expected Sign command"),
        }
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_sign_rejects_body_and_body_file_together() {
        let result = Cli::try_parse_from([
            "tenant-refresh",
            "sign",
            "--secret",
            "s3",
            "--body",
            "{}",
            "--body-file",
            "body.json",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_send_header_defaults() {
        let cli = Cli::try_parse_from([
            "tenant-refresh",
            "send",
            "--url",
            "http://localhost:8080/api/config/refresh",
            "--secret",
            "s3",
            "--hostname",
            "shop.example.com",
        ])
        .unwrap();

        match cli.command {
            Commands::Send {
                webhook_id,
                signature_header,
                webhook_id_header,
                ..
            } => {
                assert!(webhook_id.is_none());
                assert_eq!(signature_header, "x-webhook-signature");
                assert_eq!(webhook_id_header, "x-webhook-id");
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_config_parsing() {
        let cli =
            Cli::try_parse_from(["tenant-refresh", "config", "--file", "svc.yaml", "--show"])
                .unwrap();

        match cli.command {
            Commands::Config { file, show } => {
                assert_eq!(file, PathBuf::from("svc.yaml"));
                assert!(show);
            }
            _ => panic!("Expected Config command"),
        }
    }
}

// ============================================================================
// Signing
// ============================================================================

mod sign_tests {
    use super::*;

    #[test]
    fn test_signature_verifies_against_the_same_secret() {
        // Arrange
        let body = br#"{"hostname":"shop.example.com"}"#;

        // Act
        let header = sign_body("shhh", 1_700_000_000, body).unwrap();

        // Assert
        let envelope = SignatureVerifier::parse_header(&header).unwrap();
        assert_eq!(envelope.timestamp, 1_700_000_000);
        let payload = SignatureVerifier::signed_payload(envelope.timestamp, body);
        let secrets = SigningSecrets::new(vec!["shhh".to_string()]);
        assert!(SignatureVerifier::verify(&payload, &envelope.signature, &secrets));
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let result = sign_body("", 1_700_000_000, b"{}");

        assert!(matches!(result, Err(CliError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_sign_command_reads_body_file() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"hostname\":\"a.example.com\"}").unwrap();

        // Act
        let output = execute(Commands::Sign {
            secret: "shhh".to_string(),
            timestamp: Some(1_700_000_000),
            body: None,
            body_file: Some(file.path().to_path_buf()),
        })
        .await
        .unwrap();

        // Assert
        let expected =
            sign_body("shhh", 1_700_000_000, b"{\"hostname\":\"a.example.com\"}").unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_refresh_body_requires_hostname() {
        assert!(refresh_body("  ").is_err());

        let body: serde_json::Value =
            serde_json::from_str(&refresh_body("shop.example.com").unwrap()).unwrap();
        assert_eq!(body["hostname"], "shop.example.com");
    }
}

// ============================================================================
// Sending
// ============================================================================

mod send_tests {
    use super::*;

    #[tokio::test]
    async fn test_send_posts_signed_refresh() {
        // Arrange
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/config/refresh"))
            .and(header("x-webhook-id", "evt-42"))
            .and(header_exists("x-webhook-signature"))
            .and(body_json(serde_json::json!({ "hostname": "shop.example.com" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "invalidated": true })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        // Act
        let outcome = send_refresh(&send_options(format!(
            "{}/api/config/refresh",
            mock_server.uri()
        )))
        .await
        .unwrap();

        // Assert
        assert_eq!(outcome.status, 200);
        assert!(outcome.body.contains("invalidated"));
    }

    #[tokio::test]
    async fn test_signature_header_is_verifiable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        send_refresh(&send_options(mock_server.uri())).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let request = &requests[0];
        let header = request
            .headers
            .get("x-webhook-signature")
            .unwrap()
            .to_str()
            .unwrap();
        let envelope = SignatureVerifier::parse_header(header).unwrap();
        let payload = SignatureVerifier::signed_payload(envelope.timestamp, &request.body);
        let secrets = SigningSecrets::new(vec!["shhh".to_string()]);
        assert!(SignatureVerifier::verify(&payload, &envelope.signature, &secrets));
    }

    #[tokio::test]
    async fn test_rejection_is_reported_with_status() {
        // Arrange
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already processed"))
            .mount(&mock_server)
            .await;

        // Act
        let result = send_refresh(&send_options(mock_server.uri())).await;

        // Assert
        match result {
            Err(CliError::Rejected { status, body }) => {
                assert_eq!(status, 409);
                assert_eq!(body, "already processed");
            }
            other => panic!("Expected Rejected, got {:?}", other.map(|o| o.status)),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_request_error() {
        let result = send_refresh(&send_options("http://127.0.0.1:1/refresh".to_string())).await;

        let error = result.unwrap_err();
        assert!(matches!(error, CliError::Request(_)));
        assert_eq!(error.exit_code(), 4);
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod config_tests {
    use super::*;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_file_is_summarised() {
        let file = yaml_file("server:\n  port: 9090\n");

        let output = check_config(file.path(), false).unwrap();

        assert!(output.contains("9090"));
        assert!(output.contains("/api/config/refresh"));
    }

    #[test]
    fn test_show_renders_toml() {
        let file = yaml_file("webhook:\n  rate_limit:\n    limit: 3\n");

        let output = check_config(file.path(), true).unwrap();

        let parsed: toml::Value = toml::from_str(&output).unwrap();
        assert_eq!(parsed["webhook"]["rate_limit"]["limit"].as_integer(), Some(3));
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let file = yaml_file("server:\n  port: 0\n");

        let result = check_config(file.path(), false);

        let error = result.unwrap_err();
        assert!(matches!(error, CliError::Configuration(_)));
        assert_eq!(error.exit_code(), 1);
    }
}
