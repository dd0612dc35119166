//! tests/layout_tests.rs

#[cfg(test)]
mod tests {
    use crate::error::OutreachError;
    use crate::models::identity_model::IdentityKind;
    use crate::models::target_model::{
        column_letter, ApprovalStatus, Column, RowRef, SheetLayout, Target,
    };
    use crate::services::sheets_service::REQUIRED_SEND_COLUMNS;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_header_synonyms() {
        let layout = SheetLayout::from_headers(
            "Leads",
            &headers(&["Approved?", "Email Address", "SUBJECT", " Body ", "isSent?"]),
            &REQUIRED_SEND_COLUMNS,
        )
        .unwrap();

        assert_eq!(layout.index(Column::Status), Some(0));
        assert_eq!(layout.index(Column::Email), Some(1));
        assert_eq!(layout.index(Column::Body), Some(3));
        assert_eq!(layout.letter(Column::Sent).as_deref(), Some("E"));
        assert!(!layout.has(Column::Name));
    }

    #[test]
    fn test_duplicate_headers_are_rejected() {
        let err = SheetLayout::from_headers("Leads", &headers(&["Email", "Name", "email"]), &[])
            .unwrap_err();
        assert!(matches!(err, OutreachError::DuplicateHeader { .. }));

        // Las columnas sin encabezado no cuentan como duplicadas
        assert!(SheetLayout::from_headers("Leads", &headers(&["", "Email", ""]), &[]).is_ok());
    }

    #[test]
    fn test_missing_columns_are_all_reported() {
        let err = SheetLayout::from_headers("Leads", &headers(&["Email", "Notes"]), &REQUIRED_SEND_COLUMNS)
            .unwrap_err();

        match err {
            OutreachError::MissingColumn { sheet, columns } => {
                assert_eq!(sheet, "Leads");
                assert_eq!(columns, vec!["Status", "Subject", "Body", "SENT?"]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(703), "AAA");
    }

    #[test]
    fn test_row_view_reads_short_rows_as_empty() {
        let layout = SheetLayout::from_headers(
            "Leads",
            &headers(&["Status", "Email", "Subject", "Body", "SENT?"]),
            &[],
        )
        .unwrap();
        let row = cells(&["approved ", "ana@example.com"]);
        let view = layout.row(&row);

        assert_eq!(view.approval(), ApprovalStatus::Approved);
        assert_eq!(view.get(Column::Body), "");
        assert!(!view.sent_flag());
        assert!(!view.is_blank());

        let sent = cells(&["Approved", "a@example.com", "s", "b", " YES "]);
        assert!(layout.row(&sent).sent_flag());
        let not_sent = cells(&["Approved", "a@example.com", "s", "b", "no"]);
        assert!(!layout.row(&not_sent).sent_flag());

        let blank = cells(&["", "  "]);
        assert!(layout.row(&blank).is_blank());
    }

    #[test]
    fn test_without_status_column_every_row_is_approved() {
        let layout =
            SheetLayout::from_headers("contacts.csv", &headers(&["name", "phone number"]), &[])
                .unwrap();
        let row = cells(&["Ana", "+1 555 123 4567"]);
        assert_eq!(layout.row(&row).approval(), ApprovalStatus::Approved);
    }

    #[test]
    fn test_approval_status_parse() {
        assert_eq!(ApprovalStatus::parse(""), ApprovalStatus::Unset);
        assert_eq!(ApprovalStatus::parse(" APPROVED "), ApprovalStatus::Approved);
        assert_eq!(ApprovalStatus::parse("rejected"), ApprovalStatus::Rejected);
        assert_eq!(ApprovalStatus::parse("maybe"), ApprovalStatus::Pending);
        assert!(!ApprovalStatus::parse("Pending").is_approved());
    }

    #[test]
    fn test_target_from_row() {
        let layout = SheetLayout::from_headers(
            "contacts.csv",
            &headers(&["Name", "phone number", "Body"]),
            &[],
        )
        .unwrap();
        let row = cells(&["Ana", "+1 555 123 4567"]);
        let row_ref = RowRef {
            sheet: "contacts.csv".to_string(),
            row: 2,
        };

        let target = Target::from_row(
            &layout.row(&row),
            row_ref,
            IdentityKind::Phone,
            Some(" Hello there \n"),
        );

        assert_eq!(target.identity, "+1 555 123 4567");
        assert_eq!(target.name, "Ana");
        assert_eq!(target.subject, None);
        assert_eq!(target.body, "Hello there");
        assert!(target.approval.is_approved());
        assert!(target.missing_fields().is_empty());

        let empty = cells(&["Bob"]);
        let target = Target::from_row(
            &layout.row(&empty),
            RowRef {
                sheet: "contacts.csv".to_string(),
                row: 3,
            },
            IdentityKind::Phone,
            None,
        );
        assert_eq!(target.missing_fields().len(), 2);
    }
}
