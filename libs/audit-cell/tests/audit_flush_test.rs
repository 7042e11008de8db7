use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use audit_cell::{AuditEntry, AuditEventType, AuditOutcome, AuditService, AuditSink};
use shared_config::AppConfig;

fn config_for(server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_flush_posts_batch_to_audit_table() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/audit_logs"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let audit = AuditService::new(&config_for(&mock_server));
    audit
        .record(
            AuditEntry::new(AuditEventType::EscalationStarted, "incident opened", AuditOutcome::Success)
                .with_patient("patient-1"),
        )
        .await;

    assert!(audit.flush_audit_buffer().await.is_ok());
}

#[tokio::test]
async fn test_failed_flush_keeps_entries_for_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/audit_logs"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let audit = AuditService::new(&config_for(&mock_server));
    audit
        .record(AuditEntry::new(AuditEventType::SchedulePaused, "pause", AuditOutcome::Info))
        .await;

    assert!(audit.flush_audit_buffer().await.is_err());
    // The batch was put back, so a second flush hits the store again.
    assert!(audit.flush_audit_buffer().await.is_err());
    assert_eq!(audit.pending_entries().await, 1);
}
