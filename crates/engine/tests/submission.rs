//! End-to-end submission scenarios against the in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use formflow_engine::delivery::{LogMailSender, MemoryNotificationWriter, UreqWebhookClient};
use formflow_engine::directory::{DirectoryUser, MemoryUserDirectory};
use formflow_engine::translation::{MapTranslations, TranslationKey};
use formflow_engine::{
    Collaborators, EngineSettings, FsBlobStore, Identity, SubmissionError,
    SubmissionOrchestrator, SubmittedValue, Upload,
};
use formflow_interchange::{from_interchange, Id, VersionStatus};
use formflow_storage::{
    EntryProgress, FormStorage, MemoryStorage, NewFormVersion, StorageError,
};
use serde_json::{json, Value};

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

const REQUEST_FORM: Id = 1;
const REVIEW_FORM: Id = 2;
const STAFF_FORM: Id = 3;

fn request_form() -> Value {
    json!({
        "id": REQUEST_FORM, "form_id": 10, "form_name": "Feedback",
        "stages": [{"id": 1, "name": "Write", "is_initial": true, "sections": [
            {"id": 1, "name": "Main", "fields": [
                {"id": 11, "label": "Reason", "field_type": "Text Input",
                 "rules": [{"rule_name": "required"}]}
            ]}
        ]}],
        "transitions": [
            {"id": 100, "from_stage_id": 1, "to_complete": true, "label": "Send"}
        ]
    })
}

fn review_form() -> Value {
    json!({
        "id": REVIEW_FORM, "form_id": 20, "form_name": "Expense claim",
        "stages": [
            {"id": 21, "name": "Claim", "is_initial": true, "order": 1, "sections": [
                {"id": 1, "name": "Claimant", "fields": [
                    {"id": 201, "label": "Email", "field_type": "Email Input"},
                    {"id": 202, "label": "Amount", "field_type": "Number Input",
                     "rules": [{"rule_name": "min", "rule_props": {"value": 5}}]},
                    {"id": 204, "label": "Receipt", "field_type": "File Upload",
                     "rules": [{"rule_name": "mimes", "rule_props": {"types": ["pdf"]}}]}
                ]}
            ]},
            {"id": 22, "name": "Review", "order": 2,
             "access_policy": {"allow_authenticated_users": true},
             "sections": [
                {"id": 2, "name": "Decision", "fields": [
                    {"id": 203, "label": "Decision", "field_type": "Text Input",
                     "rules": [{"rule_name": "required"}]}
                ]}
            ]}
        ],
        "transitions": [
            {"id": 300, "from_stage_id": 21, "to_stage_id": 22, "label": "Submit claim",
             "actions": [
                {"action_type": "Call Webhook", "action_props": {
                    "webhook_url": "http://127.0.0.1:1/claims",
                    "webhook_payload": {"entry": "{{public_identifier}}"},
                    "webhook_timeout": 2
                }}
             ]},
            {"id": 303, "from_stage_id": 21, "label": "Save"},
            {"id": 301, "from_stage_id": 22, "to_complete": true, "label": "Approve",
             "actions": [
                {"action_type": "Send Email", "action_props": {
                    "email_subject": "{{form_name}}: {{field_decision}}",
                    "email_content": "Reviewed by {{user_name}}. {{entry_link}}",
                    "receivers_emails": ["finance@x.io", " "],
                    "receivers_users": [5]
                }}
             ]}
        ]
    })
}

fn staff_form() -> Value {
    json!({
        "id": STAFF_FORM, "form_id": 30, "form_name": "Staff only",
        "stages": [{"id": 31, "name": "Start", "is_initial": true,
                    "access_policy": {"allowed_roles": [9]}}]
    })
}

struct Harness {
    storage: Arc<MemoryStorage>,
    mail: Arc<LogMailSender>,
    engine: SubmissionOrchestrator<MemoryStorage>,
    blob_dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    for doc in [request_form(), review_form(), staff_form()] {
        seed(&storage, doc).await;
    }

    let blobs = tempfile::tempdir().unwrap();
    let mail = Arc::new(LogMailSender::new());
    let mut translations = MapTranslations::new();
    translations.insert(TranslationKey::FieldLabel(202), 2, "Montant");
    translations.insert(TranslationKey::FormName(REVIEW_FORM), 2, "Note de frais");

    let collaborators = Collaborators {
        blobs: Arc::new(FsBlobStore::new(blobs.path())),
        mail: mail.clone(),
        notifications: Arc::new(MemoryNotificationWriter::new()),
        webhooks: Arc::new(UreqWebhookClient::new()),
        users: Arc::new(MemoryUserDirectory::new([DirectoryUser {
            id: 5,
            name: "Rita".into(),
            email: "rita@x.io".into(),
            roles: vec![],
            permissions: vec![],
        }])),
        translations: Arc::new(translations),
    };
    let settings = EngineSettings {
        public_base_url: "https://forms.example".into(),
        default_language_id: None,
        webhook_timeout: Duration::from_secs(2),
    };
    Harness {
        engine: SubmissionOrchestrator::new(storage.clone(), collaborators, settings),
        storage,
        mail,
        blob_dir: blobs,
    }
}

async fn seed(storage: &MemoryStorage, doc: Value) {
    let doc = from_interchange(&doc).unwrap();
    let mut snap = storage.begin_snapshot().await.unwrap();
    storage
        .insert_form_version(
            &mut snap,
            NewFormVersion {
                id: Some(doc.id),
                form_id: doc.form_id,
                version_number: 1,
                status: VersionStatus::Published,
                document: doc,
            },
        )
        .await
        .unwrap();
    storage.commit_snapshot(snap).await.unwrap();
}

fn values(pairs: &[(Id, Value)]) -> BTreeMap<Id, SubmittedValue> {
    pairs
        .iter()
        .map(|(id, v)| (*id, SubmittedValue::Json(v.clone())))
        .collect()
}

fn reviewer() -> Identity {
    Identity {
        name: "Rita".into(),
        ..Identity::new(5, "rita@x.io")
    }
}

async fn stored(h: &Harness, entry_id: Id) -> BTreeMap<Id, String> {
    h.storage
        .list_entry_values(entry_id)
        .await
        .unwrap()
        .into_iter()
        .map(|v| (v.field_id, v.value))
        .collect()
}

/// A claim that has reached the review stage.
async fn claim_at_review(h: &Harness) -> String {
    let outcome = h
        .engine
        .submit_initial(
            REVIEW_FORM,
            values(&[(201, json!(" Claimant@X.io ")), (202, json!("7"))]),
            Some(300),
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome.current_stage_id, 22);
    outcome.public_identifier
}

// ──────────────────────────────────────────────
// Initial submissions
// ──────────────────────────────────────────────

#[tokio::test]
async fn required_field_blocks_entry_creation() {
    let h = harness().await;
    let err = h
        .engine
        .submit_initial(REQUEST_FORM, values(&[(11, json!(""))]), Some(100), None)
        .await
        .unwrap_err();
    match err {
        SubmissionError::Validation(errors) => {
            assert_eq!(errors[&11], vec!["This field is required."]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert!(matches!(
        h.storage.get_entry(1).await,
        Err(StorageError::EntryNotFound { .. })
    ));
}

#[tokio::test]
async fn omitted_required_field_is_rejected() {
    let h = harness().await;
    let err = h
        .engine
        .submit_initial(REQUEST_FORM, BTreeMap::new(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::Validation(ref e) if e.contains_key(&11)));
}

#[tokio::test]
async fn completing_transition_keeps_the_stage() {
    let h = harness().await;
    let outcome = h
        .engine
        .submit_initial(REQUEST_FORM, values(&[(11, json!("hello"))]), Some(100), None)
        .await
        .unwrap();
    assert!(outcome.is_complete);
    assert_eq!(outcome.current_stage_id, 1);
    assert_eq!(outcome.message, "Form submitted successfully");
    assert!(uuid::Uuid::parse_str(&outcome.public_identifier).is_ok());

    let entry = h.storage.get_entry(outcome.entry_id).await.unwrap();
    assert!(entry.is_complete);
    assert_eq!(stored(&h, entry.id).await[&11], "hello");
}

#[tokio::test]
async fn min_rule_on_number_input() {
    let h = harness().await;
    let err = h
        .engine
        .submit_initial(REVIEW_FORM, values(&[(202, json!("3"))]), None, None)
        .await
        .unwrap_err();
    match err {
        SubmissionError::Validation(errors) => {
            assert_eq!(errors[&202], vec!["Value must be at least 5."]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    let outcome = h
        .engine
        .submit_initial(REVIEW_FORM, values(&[(202, json!("7"))]), None, None)
        .await
        .unwrap();
    assert_eq!(outcome.current_stage_id, 21);
    assert!(!outcome.is_complete);
    assert!(outcome.action_results.is_empty());
}

#[tokio::test]
async fn restricted_initial_stage_denies_guests() {
    let h = harness().await;
    let err = h
        .engine
        .submit_initial(STAFF_FORM, BTreeMap::new(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::AccessDenied(_)));

    let staff = Identity::new(8, "s@x.io").with_roles([9]);
    h.engine
        .submit_initial(STAFF_FORM, BTreeMap::new(), None, Some(&staff))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_form_version_is_not_found() {
    let h = harness().await;
    let err = h
        .engine
        .submit_initial(99, BTreeMap::new(), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::NotFound(_)));
}

#[tokio::test]
async fn uploads_are_stored_as_descriptors() {
    let h = harness().await;
    let upload = Upload {
        bytes: b"%PDF-1.4".to_vec(),
        original_name: "receipt.PDF".into(),
        mime_type: "application/pdf".into(),
    };
    let mut submitted = values(&[(202, json!("12"))]);
    submitted.insert(204, upload.into());
    let outcome = h
        .engine
        .submit_initial(REVIEW_FORM, submitted, None, None)
        .await
        .unwrap();

    let descriptor: Value =
        serde_json::from_str(&stored(&h, outcome.entry_id).await[&204]).unwrap();
    assert_eq!(descriptor["original_name"], "receipt.PDF");
    assert_eq!(descriptor["extension"], "pdf");
    assert_eq!(descriptor["size"], 8);
    assert!(descriptor["path"].as_str().unwrap().starts_with("files/"));
}

#[tokio::test]
async fn transition_is_resolved_before_validation() {
    let h = harness().await;
    // 301 leaves the review stage, and 202 is below its minimum.
    let err = h
        .engine
        .submit_initial(REVIEW_FORM, values(&[(202, json!("1"))]), Some(301), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidTransition(_)), "{err:?}");
}

#[tokio::test]
async fn rejected_submissions_store_no_blobs() {
    let h = harness().await;
    let receipt = || {
        SubmittedValue::from(Upload {
            bytes: b"%PDF-1.4".to_vec(),
            original_name: "receipt.pdf".into(),
            mime_type: "application/pdf".into(),
        })
    };

    let mut invalid = values(&[(202, json!("1"))]);
    invalid.insert(204, receipt());
    let err = h
        .engine
        .submit_initial(REVIEW_FORM, invalid, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::Validation(_)));

    let mut wrong_edge = values(&[(202, json!("12"))]);
    wrong_edge.insert(204, receipt());
    let err = h
        .engine
        .submit_initial(REVIEW_FORM, wrong_edge, Some(301), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidTransition(_)));

    assert!(!h.blob_dir.path().join("files").exists());
}

// ──────────────────────────────────────────────
// Actions
// ──────────────────────────────────────────────

#[tokio::test]
async fn unreachable_webhook_still_commits_the_stage_change() {
    let h = harness().await;
    let outcome = h
        .engine
        .submit_initial(REVIEW_FORM, values(&[(202, json!("9"))]), Some(300), None)
        .await
        .unwrap();

    assert_eq!(outcome.action_results.len(), 1);
    let result = &outcome.action_results[0];
    assert_eq!(result.action_name, "Call Webhook");
    assert!(!result.success);
    assert!(result.message.contains("Webhook error"), "{}", result.message);

    let entry = h.storage.get_entry(outcome.entry_id).await.unwrap();
    assert_eq!(entry.current_stage_id, 22);
}

#[tokio::test]
async fn email_action_sees_the_values_just_written() {
    let h = harness().await;
    let pid = claim_at_review(&h).await;
    let outcome = h
        .engine
        .submit_later_stage(
            &pid,
            values(&[(203, json!("approved"))]),
            301,
            Some(&reviewer()),
        )
        .await
        .unwrap();
    assert!(outcome.is_complete);
    assert_eq!(outcome.message, "Entry completed successfully");
    assert_eq!(outcome.action_results[0].message, "Email sent to 2 recipient(s)");

    let sent = h.mail.sent();
    let to: Vec<_> = sent.iter().map(|m| m.to.as_str()).collect();
    assert_eq!(to, vec!["finance@x.io", "rita@x.io"]);
    assert_eq!(sent[0].subject, "Expense claim: approved");
    assert_eq!(
        sent[0].html,
        format!("Reviewed by Rita. https://forms.example/enduser/entries/{pid}")
    );
}

// ──────────────────────────────────────────────
// Later stages
// ──────────────────────────────────────────────

#[tokio::test]
async fn guest_cannot_act_on_authenticated_stage() {
    let h = harness().await;
    let pid = claim_at_review(&h).await;
    let err = h
        .engine
        .submit_later_stage(&pid, values(&[(203, json!("ok"))]), 301, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::AccessDenied(_)));

    let entry = h.storage.get_entry_by_public_identifier(&pid).await.unwrap();
    assert!(!entry.is_complete);
    assert!(!stored(&h, entry.id).await.contains_key(&203));
}

#[tokio::test]
async fn transition_from_another_stage_is_rejected_without_writes() {
    let h = harness().await;
    let pid = claim_at_review(&h).await;
    let before = h.storage.get_entry_by_public_identifier(&pid).await.unwrap();

    let err = h
        .engine
        .submit_later_stage(&pid, values(&[(203, json!("x"))]), 300, Some(&reviewer()))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::InvalidTransition(_)));

    let err = h
        .engine
        .submit_later_stage(&pid, values(&[(203, json!("x"))]), 999, Some(&reviewer()))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::NotFound(_)));

    let after = h.storage.get_entry_by_public_identifier(&pid).await.unwrap();
    assert_eq!(after, before);
    assert!(!stored(&h, after.id).await.contains_key(&203));
}

#[tokio::test]
async fn completion_is_terminal() {
    let h = harness().await;
    let pid = claim_at_review(&h).await;
    h.engine
        .submit_later_stage(&pid, values(&[(203, json!("yes"))]), 301, Some(&reviewer()))
        .await
        .unwrap();

    let err = h
        .engine
        .submit_later_stage(&pid, values(&[(203, json!("no"))]), 301, Some(&reviewer()))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::AlreadyComplete));
    let entry = h.storage.get_entry_by_public_identifier(&pid).await.unwrap();
    assert_eq!(stored(&h, entry.id).await[&203], "yes");
}

#[tokio::test]
async fn later_validation_sees_stored_values() {
    let h = harness().await;
    let pid = claim_at_review(&h).await;
    let err = h
        .engine
        .submit_later_stage(&pid, BTreeMap::new(), 301, Some(&reviewer()))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::Validation(ref e) if e.contains_key(&203)));
}

#[tokio::test]
async fn unknown_public_identifier_is_not_found() {
    let h = harness().await;
    let err = h
        .engine
        .submit_later_stage("nope", BTreeMap::new(), 301, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::NotFound(_)));
}

#[tokio::test]
async fn lost_race_is_a_conflict() {
    let h = harness().await;
    let pid = claim_at_review(&h).await;

    // A slower writer reads the entry first...
    let mut slow = h.storage.begin_snapshot().await.unwrap();
    let seen = h.storage.get_entry_for_update(&mut slow, &pid).await.unwrap();

    // ...the engine moves it on...
    h.engine
        .submit_later_stage(&pid, values(&[(203, json!("ok"))]), 301, Some(&reviewer()))
        .await
        .unwrap();

    // ...and the slower writer loses.
    let result = h
        .storage
        .update_entry_progress(
            &mut slow,
            seen.id,
            seen.version,
            EntryProgress {
                current_stage_id: 21,
                is_complete: false,
                updated_at: "2026-01-01T00:00:00Z".into(),
            },
        )
        .await;
    let err = match result {
        Ok(_) => h.storage.commit_snapshot(slow).await.unwrap_err(),
        Err(e) => e,
    };
    assert!(matches!(
        SubmissionError::from(err),
        SubmissionError::Conflict | SubmissionError::AlreadyComplete
    ));
    let entry = h.storage.get_entry_by_public_identifier(&pid).await.unwrap();
    assert!(entry.is_complete);
}

// ──────────────────────────────────────────────
// Read paths
// ──────────────────────────────────────────────

#[tokio::test]
async fn form_structure_of_the_initial_stage() {
    let h = harness().await;
    let structure = h
        .engine
        .get_form_structure(REVIEW_FORM, None, Some(2))
        .await
        .unwrap();
    assert_eq!(structure.form_name, "Note de frais");
    assert_eq!(structure.stage.stage_id, 21);
    let labels: Vec<_> = structure.stage.sections[0]
        .fields
        .iter()
        .map(|f| f.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Email", "Montant", "Receipt"]);
    let transitions: Vec<_> = structure
        .available_transitions
        .iter()
        .map(|t| (t.transition_id, t.to_stage_name.clone()))
        .collect();
    assert_eq!(
        transitions,
        vec![(300, Some("Review".to_string())), (303, None)]
    );
    assert_eq!(structure.available_transitions[0].actions[0].action_name, "Call Webhook");

    let err = h
        .engine
        .get_form_structure(STAFF_FORM, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::AccessDenied(_)));
}

#[tokio::test]
async fn entry_structure_marks_earlier_stages_readonly() {
    let h = harness().await;
    let pid = claim_at_review(&h).await;

    let err = h
        .engine
        .get_entry_by_public_identifier(&pid, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmissionError::AccessDenied(_)));

    let entry = h
        .engine
        .get_entry_by_public_identifier(&pid, Some(&reviewer()), None)
        .await
        .unwrap();
    assert_eq!(entry.current_stage_id, 22);
    let stages: Vec<_> = entry
        .stages
        .iter()
        .map(|s| (s.stage_id, s.is_current, s.is_readonly))
        .collect();
    assert_eq!(stages, vec![(21, false, true), (22, true, false)]);

    let claim = &entry.stages[0].structure.sections[0].fields;
    assert_eq!(claim[0].current_value.as_deref(), Some("claimant@x.io"));
    assert_eq!(claim[1].current_value.as_deref(), Some("7"));
    assert_eq!(entry.available_transitions[0].transition_id, 301);
}

#[tokio::test]
async fn accessible_forms_follow_initial_stage_access() {
    let h = harness().await;
    let ids = |forms: Vec<formflow_engine::AccessibleForm>| -> Vec<Id> {
        forms.into_iter().map(|f| f.form_id).collect()
    };
    let guest = h.engine.accessible_forms(None, None).await.unwrap();
    assert_eq!(ids(guest), vec![10, 20]);

    let staff = Identity::new(8, "s@x.io").with_roles([9]);
    let all = h.engine.accessible_forms(Some(&staff), None).await.unwrap();
    assert_eq!(ids(all), vec![10, 20, 30]);
}
