//! tests/delivery_tests.rs

#[cfg(test)]
mod tests {
    use crate::error::OutreachError;
    use crate::services::delivery_service::{attempt_delivery, DeliveryOutcome};
    use crate::tests::fakes::{configs, message, Behavior, ScriptedTransport};

    #[tokio::test]
    async fn test_fallback_tries_configs_in_order() {
        let transport = ScriptedTransport::new()
            .with("a.example", Behavior::FailConnect)
            .with("b.example", Behavior::FailAuth)
            .with("c.example", Behavior::Succeed);
        let configs = configs(&["a.example", "b.example", "c.example"]);

        let outcome = attempt_delivery(&transport, &message("ana@example.com"), &configs).await;

        match outcome {
            DeliveryOutcome::Delivered { channel, attempts } => {
                assert_eq!(channel.endpoint, "c.example");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(
            transport.attempted_endpoints(),
            vec!["a.example", "b.example", "c.example"]
        );
        // Sólo se cierran las sesiones que llegaron a conectar
        assert_eq!(*transport.closed.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let transport = ScriptedTransport::new();
        let configs = configs(&["a.example", "b.example"]);

        let outcome = attempt_delivery(&transport, &message("ana@example.com"), &configs).await;

        assert!(matches!(outcome, DeliveryOutcome::Delivered { attempts: 1, .. }));
        assert_eq!(transport.attempted_endpoints(), vec!["a.example"]);
    }

    #[tokio::test]
    async fn test_exhausted_keeps_last_error() {
        let transport = ScriptedTransport::new()
            .with("a.example", Behavior::FailConnect)
            .with("b.example", Behavior::FailSend);
        let configs = configs(&["a.example", "b.example"]);

        let outcome = attempt_delivery(&transport, &message("ana@example.com"), &configs).await;

        match outcome {
            DeliveryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                assert_eq!(attempts, 2);
                assert!(matches!(last_error, OutreachError::Send { .. }));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert!(transport.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_target_is_not_retried() {
        let transport = ScriptedTransport::new().unreachable("15550001111");
        let configs = configs(&["a.example", "b.example", "c.example"]);

        let outcome = attempt_delivery(&transport, &message("15550001111"), &configs).await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Unreachable {
                error: OutreachError::TargetUnreachable { .. }
            }
        ));
        assert_eq!(transport.attempted_endpoints(), vec!["a.example"]);
    }

    #[tokio::test]
    async fn test_no_configs_is_a_config_failure() {
        let transport = ScriptedTransport::new();

        let outcome = attempt_delivery(&transport, &message("ana@example.com"), &[]).await;

        assert!(matches!(
            outcome,
            DeliveryOutcome::Exhausted {
                last_error: OutreachError::Config(_),
                attempts: 0
            }
        ));
    }
}
