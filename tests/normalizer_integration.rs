//! End-to-end normalizer tests: one raw export record in, one import
//! record out, with the transport mocked.

use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::tempdir;

use etd_convert::audit::{AuditLog, LogChannel};
use etd_convert::categories::{CategoryNode, CategoryTable};
use etd_convert::languages::LanguageTable;
use etd_convert::normalize::{Normalizer, RawRecord};
use etd_convert::transport::MockTransport;

fn category(id: &str, parent: &str, title: &str) -> CategoryNode {
    CategoryNode {
        identifier: id.to_string(),
        model: "Collection".to_string(),
        raw_parents: parent.to_string(),
        title: title.to_string(),
        description: String::new(),
        parents: Vec::new(),
        breadcrumb: String::new(),
    }
}

fn resolved_categories() -> CategoryTable {
    let mut table = CategoryTable::from_nodes([
        category("sci", "divisions", "Sciences"),
        category("phys", "sci", "Physics"),
        category("astro", "phys", "Astrophysics"),
    ]);
    table.resolve();
    table
}

fn languages() -> LanguageTable {
    LanguageTable::from_pairs([("en", "English"), ("de", "German")])
}

fn raw_record(json: Value) -> RawRecord {
    match json {
        Value::Object(map) => map,
        other => panic!("test record must be an object, got {other}"),
    }
}

fn test_now() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

#[tokio::test]
async fn full_record_normalizes_without_errors() {
    let dir = tempdir().unwrap();
    let audit = AuditLog::new(dir.path().join("logs")).unwrap();
    let categories = resolved_categories();
    let languages = languages();

    let mut transport = MockTransport::new();
    transport.expect_fetch().times(1).returning(|_, _| Ok(()));

    let normalizer = Normalizer::new(
        &categories,
        &languages,
        &audit,
        &transport,
        dir.path().join("files"),
        test_now(),
    );

    let raw = raw_record(json!({
        "source_identifier": ["http://d-scholarship.pitt.edu/id/eprint/10172"],
        "title": ["A Study of Variable Stars"],
        "creator": ["Doe, Jane"],
        "parents": ["astro"],
        "discipline": ["astro"],
        "keyword": ["stars", "variability"],
        "rights": ["unrestricted"],
        "degree": ["PhD"],
        "level": ["doctoral"],
        "language": ["en"],
        "committee_member": [
            "Smith, Ann - Committee Member",
            "Jones, Bob - Committee Chair"
        ],
        "documents/document/files/file/url":
            ["https://d-scholarship.pitt.edu/10172/1/thesis.pdf"]
    }));

    let (record, with_errors) = normalizer.normalize(raw).await.unwrap();
    assert!(!with_errors);

    // The canonical identifier is the https form without the eprint segment.
    assert_eq!(
        record.get_str("source_identifier"),
        Some("http://d-scholarship.pitt.edu/id/eprint/10172")
    );
    assert_eq!(
        record.get_str("identifier"),
        Some("https://d-scholarship.pitt.edu/10172")
    );
    assert_eq!(record.get_str("model"), Some("Etd"));

    // The category closure includes every ancestor, sorted and deduplicated,
    // then folded into a pipe-delimited string.
    assert_eq!(record.get_str("parents"), Some("astro|phys|sci"));
    assert_eq!(
        record.get_str("discipline"),
        Some("Sciences > Physics > Astrophysics")
    );

    assert_eq!(record.get_str("item"), Some("10172_thesis.pdf"));
    assert_eq!(record.get_str("keyword"), Some("stars|variability"));
    assert_eq!(record.get_str("degree_name"), Some("PhD"));
    assert_eq!(record.get_str("degree_level"), Some("doctoral"));
    assert_eq!(record.get_str("language"), Some("English"));
    // Chairs come first, then members, each group sorted.
    assert_eq!(
        record.get_str("committee_member"),
        Some("Jones, Bob - Committee Chair|Smith, Ann - Committee Member")
    );
    // No embargo inputs means no embargo output fields.
    assert!(!record.contains("embargo_release_date"));
    assert!(!record.contains("visibility"));
}

#[tokio::test]
async fn missing_required_fields_default_and_flag_the_record() {
    let dir = tempdir().unwrap();
    let audit = AuditLog::new(dir.path().join("logs")).unwrap();
    let categories = resolved_categories();
    let languages = languages();
    let transport = MockTransport::new();

    let normalizer = Normalizer::new(
        &categories,
        &languages,
        &audit,
        &transport,
        dir.path().join("files"),
        test_now(),
    );

    let raw = raw_record(json!({
        "source_identifier": ["https://d-scholarship.pitt.edu/55"],
        "title": ["Untitled"],
        "keyword": [],
        "rights": ["unrestricted"]
    }));

    let (record, with_errors) = normalizer.normalize(raw).await.unwrap();
    assert!(with_errors);

    // Empty and absent required fields both default to the sentinel.
    assert_eq!(record.get_str("keyword"), Some("Not Specified"));
    assert_eq!(record.get_str("degree_name"), Some("Not Specified"));
    assert_eq!(record.get_str("degree_level"), Some("Not Specified"));
    // No file urls still yields the empty item placeholder.
    assert_eq!(record.get_str("item"), Some(""));

    // Each defaulted field lands in its dedicated channel and the shared ones.
    let keyword_log = audit.read(LogChannel::MissingKeywords).unwrap();
    assert!(keyword_log.contains("missing required field: keyword"));
    let degree_log = audit.read(LogChannel::MissingDegreeName).unwrap();
    assert!(degree_log.contains("missing required field: degree_name"));
    let error_log = audit.read(LogChannel::Error).unwrap();
    assert!(error_log.contains("keyword"));
    assert!(error_log.contains("degree_level"));
    // rights was present, so its channel stays empty.
    assert!(audit.read(LogChannel::MissingRights).unwrap().is_empty());
}

#[tokio::test]
async fn unknown_category_keeps_the_id_and_flags_the_record() {
    let dir = tempdir().unwrap();
    let audit = AuditLog::new(dir.path().join("logs")).unwrap();
    let categories = resolved_categories();
    let languages = languages();
    let transport = MockTransport::new();

    let normalizer = Normalizer::new(
        &categories,
        &languages,
        &audit,
        &transport,
        dir.path().join("files"),
        test_now(),
    );

    let raw = raw_record(json!({
        "source_identifier": ["https://d-scholarship.pitt.edu/56"],
        "parents": ["astro", "no-such-category"],
        "keyword": ["k"],
        "rights": ["r"],
        "degree": ["MS"],
        "level": ["masters"]
    }));

    let (record, with_errors) = normalizer.normalize(raw).await.unwrap();
    assert!(with_errors);

    // The unknown id is retained alongside the resolved closure.
    assert_eq!(
        record.get_str("parents"),
        Some("astro|no-such-category|phys|sci")
    );
    let error_log = audit.read(LogChannel::Error).unwrap();
    assert!(error_log.contains("no-such-category"));
}

#[tokio::test]
async fn future_embargo_emits_visibility_fields_and_audit_line() {
    let dir = tempdir().unwrap();
    let audit = AuditLog::new(dir.path().join("logs")).unwrap();
    let categories = resolved_categories();
    let languages = languages();
    let transport = MockTransport::new();

    let normalizer = Normalizer::new(
        &categories,
        &languages,
        &audit,
        &transport,
        dir.path().join("files"),
        test_now(),
    );

    let raw = raw_record(json!({
        "source_identifier": ["https://d-scholarship.pitt.edu/77"],
        "keyword": ["k"],
        "rights": ["r"],
        "degree": ["PhD"],
        "level": ["doctoral"],
        "documents/document/date_embargo": ["2027-06-01"],
        "full_text_status": ["restricted"],
        "documents/document/security": ["validuser"]
    }));

    let (record, with_errors) = normalizer.normalize(raw).await.unwrap();
    assert!(!with_errors);

    assert_eq!(record.get_str("embargo_release_date"), Some("2027-06-01"));
    assert_eq!(record.get_str("visibility"), Some("embargo"));
    assert_eq!(
        record.get_str("visibility_during_embargo"),
        Some("authenticated")
    );
    assert_eq!(record.get_str("visibility_after_embargo"), Some("open"));

    let embargo_log = audit.read(LogChannel::Embargo).unwrap();
    assert!(embargo_log.contains("2027-06-01"));
    assert!(embargo_log.contains("validuser"));
}

#[tokio::test]
async fn unresolvable_language_is_kept_and_flagged() {
    let dir = tempdir().unwrap();
    let audit = AuditLog::new(dir.path().join("logs")).unwrap();
    let categories = resolved_categories();
    let languages = languages();
    let transport = MockTransport::new();

    let normalizer = Normalizer::new(
        &categories,
        &languages,
        &audit,
        &transport,
        dir.path().join("files"),
        test_now(),
    );

    let raw = raw_record(json!({
        "source_identifier": ["https://d-scholarship.pitt.edu/88"],
        "keyword": ["k"],
        "rights": ["r"],
        "degree": ["PhD"],
        "level": ["doctoral"],
        "language": ["xx"]
    }));

    let (record, with_errors) = normalizer.normalize(raw).await.unwrap();
    assert!(with_errors);
    assert_eq!(record.get_str("language"), Some("xx"));
    assert!(audit
        .read(LogChannel::Error)
        .unwrap()
        .contains("unresolvable language code: xx"));
}

#[tokio::test]
async fn mangled_encoding_is_repaired_in_the_final_fold() {
    let dir = tempdir().unwrap();
    let audit = AuditLog::new(dir.path().join("logs")).unwrap();
    let categories = resolved_categories();
    let languages = languages();
    let transport = MockTransport::new();

    let normalizer = Normalizer::new(
        &categories,
        &languages,
        &audit,
        &transport,
        dir.path().join("files"),
        test_now(),
    );

    let raw = raw_record(json!({
        "source_identifier": ["https://d-scholarship.pitt.edu/99"],
        "title": ["The author\u{00e2}\u{20ac}\u{2122}s view"],
        "keyword": ["k"],
        "rights": ["r"],
        "degree": ["PhD"],
        "level": ["doctoral"]
    }));

    let (record, _) = normalizer.normalize(raw).await.unwrap();
    assert_eq!(record.get_str("title"), Some("The author\u{2019}s view"));
    assert!(audit
        .read(LogChannel::Default)
        .unwrap()
        .contains("Fix encoding"));
}
