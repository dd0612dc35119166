//! tests/generation_tests.rs
//! Pruebas de las partes puras de `GenerationService`.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use serde_json::json;
    use tempfile::tempdir;

    use crate::config::app_config::GenerationSettings;
    use crate::error::OutreachError;
    use crate::models::target_model::SheetLayout;
    use crate::services::generation_service::{
        build_user_prompt, extract_domain, load_prompt, parse_email_content, response_text,
        GenerationService, LeadDetails, REQUIRED_GENERATION_COLUMNS,
    };

    fn settings(api_key: &str, prompt_paths: Vec<PathBuf>) -> GenerationSettings {
        GenerationSettings {
            api_key: api_key.to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.0,
            max_retries: 0,
            prompt_paths,
            api_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_parse_subject_on_same_line() {
        let content = "Subject: Quick idea for Acme\n\nHi Ana,\n\nI noticed a few things.\n";
        let (subject, body) = parse_email_content(content);
        assert_eq!(subject, "Quick idea for Acme");
        assert_eq!(body, "Hi Ana,\n\nI noticed a few things.");
    }

    #[test]
    fn test_parse_subject_on_next_line_and_body_label() {
        let content = "SUBJECT:\n\n  Faster pages for Acme \nEmail Body:\nHi,\nShort note.";
        let (subject, body) = parse_email_content(content);
        assert_eq!(subject, "Faster pages for Acme");
        assert_eq!(body, "Hi,\nShort note.");

        let (_, body) = parse_email_content("Subject: S\nEmail  Body: Hi there\nBye");
        assert_eq!(body, "Hi there\nBye");
    }

    #[test]
    fn test_parse_without_subject() {
        let (subject, body) = parse_email_content("  Hi,\nJust the body.  ");
        assert_eq!(subject, "");
        assert_eq!(body, "Hi,\nJust the body.");
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.acme.com/about?x=1"), "acme.com");
        assert_eq!(extract_domain("http://shop.acme.co.uk"), "shop.acme.co.uk");
        assert_eq!(extract_domain("acme.io/contact"), "acme.io");
        assert_eq!(extract_domain("https://"), "https://");
    }

    #[test]
    fn test_lead_details_from_row() {
        let headers: Vec<String> = [
            "Read For Body?",
            "Name",
            "Company",
            "Website",
            "Body",
            "Subject",
            "SENT?",
            "Title",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect();
        let layout =
            SheetLayout::from_headers("Leads", &headers, &REQUIRED_GENERATION_COLUMNS).unwrap();
        let cells: Vec<String> = ["Approved", "", "Acme", "https://www.acme.com", "", "", "", "CEO"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let lead = LeadDetails::from_row(&layout.row(&cells));

        assert_eq!(lead.domain, "acme.com");
        assert_eq!(lead.title, "CEO");
        assert!(lead.is_complete());
        assert!(!LeadDetails::default().is_complete());

        let prompt = build_user_prompt(&lead);
        assert!(prompt.contains("Recipient Name: Hi,\n"));
        assert!(prompt.contains("Company: Acme\n"));
        assert!(prompt.contains("Domain: acme.com\n"));
    }

    #[test]
    fn test_response_text() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Subject: A\n" }, { "text": "Body" }] }
            }]
        });
        assert_eq!(response_text(&body).as_deref(), Some("Subject: A\nBody"));
        assert_eq!(response_text(&json!({ "candidates": [] })), None);
        assert_eq!(
            response_text(&json!({ "candidates": [{ "content": { "parts": [{ "text": " " }] } }] })),
            None
        );
    }

    #[test]
    fn test_load_prompt_uses_first_existing_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("prompt.txt");
        let fallback = dir.path().join("email-body").join("prompt.txt");
        fs::create_dir_all(fallback.parent().unwrap()).unwrap();
        fs::write(&fallback, "You write short outreach emails.").unwrap();

        let (path, prompt) = load_prompt(&[missing.clone(), fallback.clone()]).unwrap();
        assert_eq!(path, fallback);
        assert_eq!(prompt, "You write short outreach emails.");

        let err = load_prompt(&[missing]).unwrap_err();
        assert!(matches!(err, OutreachError::Config(_)));
    }

    #[test]
    fn test_service_requires_api_key_and_prompt() {
        let dir = tempdir().unwrap();
        let prompt = dir.path().join("prompt.txt");
        fs::write(&prompt, "system prompt").unwrap();

        assert!(matches!(
            GenerationService::new(settings(" ", vec![prompt.clone()])),
            Err(OutreachError::Config(_))
        ));
        assert!(GenerationService::new(settings("key", vec![dir.path().join("none.txt")])).is_err());

        let service = GenerationService::new(settings("key", vec![prompt.clone()])).unwrap();
        assert_eq!(service.prompt_path(), &prompt);
        assert_eq!(service.api_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_generate_rejects_incomplete_leads() {
        let dir = tempdir().unwrap();
        let prompt = dir.path().join("prompt.txt");
        fs::write(&prompt, "system prompt").unwrap();
        let service = GenerationService::new(settings("key", vec![prompt])).unwrap();

        let lead = LeadDetails {
            company: "Acme".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            service.generate(&lead).await,
            Err(OutreachError::Generation(_))
        ));
    }
}
