//! Form-version lifecycle helpers built on top of [`FormStorage`].

use formflow_interchange::{FormVersionDoc, Id, SectionDoc, StageDoc, VersionStatus};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{FormVersionRecord, NewFormVersion};
use crate::traits::FormStorage;

/// Current UTC time as an RFC 3339 string, the timestamp format of every record.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::UNIX_EPOCH.to_string())
}

/// Create the next draft version of a form.
///
/// With `copy_from_latest` the structure of the highest-numbered version is
/// copied, ids included, so stored values keep pointing at the same fields.
/// Otherwise the new version starts with one initial stage holding one empty
/// section.
pub async fn create_next_version<S: FormStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    form_id: Id,
    copy_from_latest: bool,
) -> Result<FormVersionRecord, StorageError> {
    let versions = storage.list_form_versions(Some(form_id), None).await?;
    let latest = versions
        .into_iter()
        .max_by_key(|v| v.version_number)
        .ok_or(StorageError::FormNotFound { form_id })?;

    let document = if copy_from_latest {
        latest.document.clone()
    } else {
        blank_document(&latest.document.form_name)
    };

    let record = storage
        .insert_form_version(
            snapshot,
            NewFormVersion {
                id: None,
                form_id,
                version_number: latest.version_number + 1,
                status: VersionStatus::Draft,
                document,
            },
        )
        .await?;
    tracing::info!(
        form_id,
        version_id = record.id,
        version_number = record.version_number,
        copied = copy_from_latest,
        "created form version"
    );
    Ok(record)
}

fn blank_document(form_name: &str) -> FormVersionDoc {
    FormVersionDoc {
        id: 0,
        form_id: 0,
        form_name: form_name.to_string(),
        version_number: 0,
        status: VersionStatus::Draft,
        stages: vec![StageDoc {
            id: 1,
            name: "Initial Stage".to_string(),
            is_initial: true,
            order: 1,
            visibility_condition: None,
            access_policy: None,
            sections: vec![SectionDoc {
                id: 1,
                name: "Section 1".to_string(),
                order: 1,
                visibility_condition: None,
                fields: vec![],
            }],
        }],
        transitions: vec![],
    }
}
