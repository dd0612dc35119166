//! tests/ledger_tests.rs
//! Pruebas del ledger persistente y de las reservas entre workers.

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::error::OutreachError;
    use crate::logger::init_test_logger;
    use crate::models::identity_model::IdentityKind;
    use crate::services::ledger_service::{ClaimResult, DeliveryLedger, SharedLedger};

    #[test]
    fn test_missing_file_is_created_with_header() {
        init_test_logger();
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("contacted.csv");

        let ledger = DeliveryLedger::load(&path, IdentityKind::Phone);

        assert!(ledger.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "identity,timestamp\n");
    }

    #[test]
    fn test_empty_and_header_only_files() {
        let dir = tempdir().unwrap();

        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "").unwrap();
        assert!(DeliveryLedger::load(&empty, IdentityKind::Email).is_empty());
        assert!(fs::read_to_string(&empty).unwrap().starts_with("identity"));

        let header_only = dir.path().join("header.csv");
        fs::write(&header_only, "identity,timestamp\n").unwrap();
        assert!(DeliveryLedger::load(&header_only, IdentityKind::Email).is_empty());
    }

    #[test]
    fn test_record_round_trip_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contacted.csv");

        let mut ledger = DeliveryLedger::load(&path, IdentityKind::Phone);
        ledger.record("+1 (555) 123-4567").unwrap();

        assert!(ledger.contains("15551234567"));
        assert!(ledger.contains("+1-555-123-4567"));
        assert!(!ledger.contains("15550000000"));

        let reloaded = DeliveryLedger::load(&path, IdentityKind::Phone);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("1 555 123 4567"));
    }

    #[test]
    fn test_record_rejects_invalid_identity() {
        let dir = tempdir().unwrap();
        let mut ledger = DeliveryLedger::load(dir.path().join("l.csv"), IdentityKind::Email);

        let err = ledger.record("not an email").unwrap_err();
        assert!(matches!(err, OutreachError::InvalidIdentity { .. }));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_existing_files_with_other_headers() {
        let dir = tempdir().unwrap();

        let phones = dir.path().join("phones.csv");
        fs::write(&phones, "phone number\n+52 55 1234 5678\n5512345678\nbad\n").unwrap();
        let ledger = DeliveryLedger::load(&phones, IdentityKind::Phone);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("525512345678"));

        // "username" también es un handle válido; no debe quedar como entrada
        let users = dir.path().join("messaged.csv");
        fs::write(&users, "username,timestamp\nAna.Dev,2024-01-01T00:00:00Z\n").unwrap();
        let ledger = DeliveryLedger::load(&users, IdentityKind::Handle);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains("@ana.dev"));
        assert!(!ledger.contains("username"));
    }

    #[test]
    fn test_append_after_last_line_without_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contacted.csv");
        fs::write(&path, "phone number\n5512345678").unwrap();

        let mut ledger = DeliveryLedger::load(&path, IdentityKind::Phone);
        assert_eq!(ledger.len(), 1);
        ledger.record("15551234567").unwrap();

        let reloaded = DeliveryLedger::load(&path, IdentityKind::Phone);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("5512345678"));
        assert!(reloaded.contains("15551234567"));
        assert!(fs::read_to_string(&path)
            .unwrap()
            .starts_with("phone number\n5512345678\n15551234567,"));
    }

    #[test]
    fn test_unreadable_file_loads_empty_and_still_records() {
        init_test_logger();
        let dir = tempdir().unwrap();
        let path = dir.path().join("emailed.csv");
        fs::write(&path, [0xff, 0xfe, 0x00, b'a']).unwrap();

        let mut ledger = DeliveryLedger::load(&path, IdentityKind::Email);
        assert_eq!(ledger.len(), 0);

        ledger.record("ana@example.com").unwrap();
        assert!(ledger.contains("ana@example.com"));
        let raw = fs::read(&path).unwrap();
        assert!(raw.ends_with(b"\n"));
        assert!(String::from_utf8_lossy(&raw).contains("\nana@example.com,"));
    }

    #[test]
    fn test_claim_is_released_when_not_committed() {
        let dir = tempdir().unwrap();
        let shared = SharedLedger::new(DeliveryLedger::load(
            dir.path().join("emailed.csv"),
            IdentityKind::Email,
        ));

        let claim = match shared.try_claim("ana@example.com") {
            ClaimResult::Claimed(claim) => claim,
            other => panic!("expected claim, got {:?}", other),
        };
        assert!(matches!(
            shared.try_claim("ana@example.com"),
            ClaimResult::InFlight
        ));

        drop(claim);
        let claim = match shared.try_claim("ana@example.com") {
            ClaimResult::Claimed(claim) => claim,
            other => panic!("expected claim after release, got {:?}", other),
        };
        claim.commit().unwrap();

        assert!(matches!(
            shared.try_claim("ana@example.com"),
            ClaimResult::AlreadyContacted
        ));
        assert!(shared.contains("ANA@example.com"));
        assert_eq!(shared.len(), 1);

        let raw = fs::read_to_string(dir.path().join("emailed.csv")).unwrap();
        assert!(raw.lines().any(|l| l.starts_with("ana@example.com,")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_only_one_worker_claims_an_identity() {
        let dir = tempdir().unwrap();
        let shared = SharedLedger::new(DeliveryLedger::load(
            dir.path().join("contacted.csv"),
            IdentityKind::Phone,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                match shared.try_claim("15551234567") {
                    ClaimResult::Claimed(claim) => {
                        tokio::task::yield_now().await;
                        claim.commit().unwrap();
                        1
                    }
                    _ => 0,
                }
            }));
        }

        let mut winners = 0;
        for handle in handles {
            winners += handle.await.unwrap();
        }
        assert_eq!(winners, 1);
        assert_eq!(shared.len(), 1);
    }
}
