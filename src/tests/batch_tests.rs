//! tests/batch_tests.rs
//! Driver completo contra transporte y fuente en memoria.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::{tempdir, TempDir};

    use crate::error::OutreachError;
    use crate::handlers::browser_handler::delivered_identities;
    use crate::logger::init_test_logger;
    use crate::models::identity_model::IdentityKind;
    use crate::models::outcome_model::{FilterReason, RunSummary, TargetOutcome, ZeroSentReason};
    use crate::services::batch_service::BatchDriver;
    use crate::services::ledger_service::{DeliveryLedger, SharedLedger};
    use crate::tests::fakes::{configs, email_target, Behavior, MemorySource, ScriptedTransport};

    fn email_ledger() -> (TempDir, SharedLedger) {
        let dir = tempdir().unwrap();
        let ledger = DeliveryLedger::load(dir.path().join("emailed.csv"), IdentityKind::Email);
        (dir, SharedLedger::new(ledger))
    }

    #[tokio::test]
    async fn test_filter_examples() {
        init_test_logger();
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new();
        let source = MemorySource::new(vec![
            email_target(2, "Approved", false, "a@example.com"),
            email_target(3, "Approved", true, "b@example.com"),
            email_target(4, "Pending", false, "c@example.com"),
        ]);

        let driver = BatchDriver::new(&transport, ledger, configs(&["smtp.example"]), Duration::ZERO);
        let report = driver.run(&source).await.unwrap();

        assert!(report.outcomes_for("a@example.com")[0].is_sent());
        assert_eq!(
            report.outcomes_for("b@example.com")[0],
            &TargetOutcome::FilteredOut(vec![FilterReason::AlreadySent])
        );
        assert_eq!(
            report.outcomes_for("c@example.com")[0],
            &TargetOutcome::FilteredOut(vec![FilterReason::NotApproved])
        );

        let c = report.counters;
        assert_eq!(c.total, 3);
        assert_eq!(c.approved, 2);
        assert_eq!(c.not_approved, 1);
        assert_eq!(c.delivered, 1);
        assert_eq!(c.approved + c.not_approved, c.total);
        assert!(c.delivered <= c.approved);
        assert_eq!(source.marked().len(), 1);
        assert_eq!(source.marked()[0].row, 2);
    }

    #[tokio::test]
    async fn test_same_identity_is_sent_once() {
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new();
        let source = MemorySource::new(vec![
            email_target(2, "Approved", false, "Ana@Example.com"),
            email_target(3, "Approved", false, " ana@example.com "),
        ]);

        let driver = BatchDriver::new(&transport, ledger.clone(), configs(&["smtp.example"]), Duration::ZERO);
        let report = driver.run(&source).await.unwrap();

        assert_eq!(report.counters.delivered, 1);
        assert_eq!(
            report.records[1].outcome,
            TargetOutcome::FilteredOut(vec![FilterReason::AlreadyContacted])
        );
        assert_eq!(transport.delivered().len(), 1);
        assert_eq!(ledger.len(), 1);

        // Una segunda corrida no vuelve a enviar
        let again = driver.run(&source).await.unwrap();
        assert_eq!(again.counters.delivered, 0);
        assert_eq!(transport.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_and_invalid_identity() {
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new();
        let mut no_subject = email_target(2, "Approved", false, "a@example.com");
        no_subject.subject = Some(" ".to_string());
        let source = MemorySource::new(vec![
            no_subject,
            email_target(3, "Approved", false, "not-an-email"),
        ]);

        let driver = BatchDriver::new(&transport, ledger, configs(&["smtp.example"]), Duration::ZERO);
        let report = driver.run(&source).await.unwrap();

        assert_eq!(
            report.records[0].outcome,
            TargetOutcome::FilteredOut(vec![FilterReason::MissingFields(vec![
                "Subject".to_string()
            ])])
        );
        assert!(matches!(
            report.records[1].outcome,
            TargetOutcome::FailedPermanent {
                error: OutreachError::InvalidIdentity { .. }
            }
        ));
        assert_eq!(report.counters.missing_fields, 1);
        assert_eq!(report.counters.failed_permanent, 1);
        assert!(transport.attempted_endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_config_delivers_whole_batch() {
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new().with("primary.example", Behavior::FailConnect);
        let targets = (0..10)
            .map(|i| email_target(i + 2, "Approved", false, &format!("user{}@example.com", i)))
            .collect();
        let source = MemorySource::new(targets);

        let driver = BatchDriver::new(
            &transport,
            ledger.clone(),
            configs(&["primary.example", "backup.example", "last.example"]),
            Duration::ZERO,
        );
        let report = driver.run(&source).await.unwrap();

        assert_eq!(report.counters.delivered, 10);
        for record in &report.records {
            match &record.outcome {
                TargetOutcome::Sent { channel } => assert_eq!(channel.endpoint, "backup.example"),
                other => panic!("expected sent, got {:?}", other),
            }
        }
        assert!(transport
            .delivered()
            .iter()
            .all(|(endpoint, _)| endpoint == "backup.example"));
        assert_eq!(ledger.len(), 10);
        assert_eq!(source.marked().len(), 10);
        assert!(report.counters.zero_sent_reason().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_delivery_releases_identity() {
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new()
            .with("a.example", Behavior::FailAuth)
            .with("b.example", Behavior::FailSend);
        let source = MemorySource::new(vec![email_target(2, "Approved", false, "a@example.com")]);

        let driver = BatchDriver::new(
            &transport,
            ledger.clone(),
            configs(&["a.example", "b.example"]),
            Duration::ZERO,
        );
        let report = driver.run(&source).await.unwrap();

        assert!(matches!(
            report.records[0].outcome,
            TargetOutcome::FailedTransient { attempts: 2, .. }
        ));
        assert!(!ledger.contains("a@example.com"));
        assert!(source.marked().is_empty());
        assert_eq!(
            report.counters.zero_sent_reason(),
            Some(ZeroSentReason::AllFailed)
        );

        // La siguiente corrida lo vuelve a intentar
        driver.run(&source).await.unwrap();
        assert_eq!(transport.attempted_endpoints().len(), 4);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_not_retried_recorded_or_pruned() {
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new().unreachable("ghost@example.com");
        let source = MemorySource::new(vec![
            email_target(2, "Approved", false, "ghost@example.com"),
            email_target(3, "Approved", false, "ana@example.com"),
        ]);

        let driver = BatchDriver::new(
            &transport,
            ledger.clone(),
            configs(&["a.example", "b.example", "c.example"]),
            Duration::ZERO,
        );
        let report = driver.run(&source).await.unwrap();

        assert!(matches!(
            report.outcomes_for("ghost@example.com")[0],
            TargetOutcome::FailedPermanent {
                error: OutreachError::TargetUnreachable { .. }
            }
        ));
        // Un solo connect para el inalcanzable, otro para el siguiente destinatario
        assert_eq!(transport.attempted_endpoints(), vec!["a.example", "a.example"]);
        assert!(!ledger.contains("ghost@example.com"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(source.marked().len(), 1);
        assert_eq!(source.marked()[0].row, 3);
        assert_eq!(report.counters.failed_permanent, 1);

        assert_eq!(
            delivered_identities(&report, IdentityKind::Email),
            vec!["ana@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_permission_error_halts_the_source() {
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new();
        let source = MemorySource::new(vec![
            email_target(2, "Approved", false, "a@example.com"),
            email_target(3, "Approved", false, "b@example.com"),
            email_target(4, "Approved", false, "c@example.com"),
        ])
        .failing_marks(OutreachError::Permission {
            location: "Leads!E2".to_string(),
            message: "protected range".to_string(),
        });

        let driver = BatchDriver::new(&transport, ledger.clone(), configs(&["smtp.example"]), Duration::ZERO);
        let report = driver.run(&source).await.unwrap();

        assert!(matches!(report.halted, Some(OutreachError::Permission { .. })));
        assert_eq!(report.records.len(), 1);
        assert_eq!(transport.delivered().len(), 1);
        // El envío ya ocurrió: debe quedar en el ledger
        assert!(ledger.contains("a@example.com"));

        let mut summary = RunSummary::default();
        summary.add_report(&report);
        let lines = summary.render("Emails sent");
        assert!(lines.iter().any(|l| l.contains("HALTED memory")));
    }

    #[tokio::test]
    async fn test_non_permission_mark_errors_do_not_halt() {
        let (_dir, ledger) = email_ledger();
        let transport = ScriptedTransport::new();
        let source = MemorySource::new(vec![
            email_target(2, "Approved", false, "a@example.com"),
            email_target(3, "Approved", false, "b@example.com"),
        ])
        .failing_marks(OutreachError::Source("503 backend error".to_string()));

        let driver = BatchDriver::new(&transport, ledger, configs(&["smtp.example"]), Duration::ZERO);
        let report = driver.run(&source).await.unwrap();

        assert!(report.halted.is_none());
        assert_eq!(report.counters.delivered, 2);
    }

    #[tokio::test]
    async fn test_zero_sent_reasons() {
        let transport = ScriptedTransport::new();
        let mut no_subject = email_target(2, "Approved", false, "a@example.com");
        no_subject.subject = Some(" ".to_string());

        let cases = vec![
            (vec![], ZeroSentReason::NoData),
            (
                vec![email_target(2, "Pending", false, "a@example.com")],
                ZeroSentReason::NoApprovedRows,
            ),
            (
                vec![email_target(2, "Approved", true, "a@example.com")],
                ZeroSentReason::AlreadySent,
            ),
            (vec![no_subject.clone()], ZeroSentReason::MissingFields),
            (
                vec![no_subject, email_target(3, "Approved", true, "b@example.com")],
                ZeroSentReason::ApprovedButIneligible,
            ),
        ];

        for (targets, expected) in cases {
            let (_dir, ledger) = email_ledger();
            let driver = BatchDriver::new(&transport, ledger, configs(&["smtp.example"]), Duration::ZERO);
            let report = driver.run(&MemorySource::new(targets)).await.unwrap();
            assert_eq!(report.counters.zero_sent_reason(), Some(expected));
        }
    }

    #[test]
    fn test_summary_render() {
        let mut summary = RunSummary::default();
        summary.counters.total = 4;
        summary.counters.approved = 3;
        summary.counters.not_approved = 1;
        summary.counters.delivered = 2;
        summary.counters.failed_transient = 1;
        summary.add_error("Leads", "Missing required columns");

        let lines = summary.render("Emails sent");

        assert_eq!(lines[0], "Summary:");
        assert!(lines.contains(&"   Total rows processed: 4".to_string()));
        assert!(lines.contains(&"   Emails sent: 2".to_string()));
        assert!(lines.iter().any(|l| l.starts_with("   Failed: 1")));
        assert!(lines.iter().any(|l| l.contains("ERROR Leads")));
        assert!(!lines.iter().any(|l| l.contains("Nothing delivered")));
    }
}
