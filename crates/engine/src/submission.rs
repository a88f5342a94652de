//! SubmissionOrchestrator: the two write paths of the engine.
//!
//! Every check (access, transition legality, validation) runs before the
//! first write. Writes happen in one storage snapshot that is either
//! committed whole or aborted. Transition actions run after the commit,
//! against the values and stage just written, and never fail a submission.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use formflow_interchange::Id;
use formflow_storage::{
    now_rfc3339, EntryProgress, EntryRecord, EntryValueRecord, FormStorage, NewEntry,
    StorageError,
};
use serde::Serialize;

use crate::access::{can_access, EntryView};
use crate::action::{ActionExecutor, ActionResult};
use crate::blob::{BlobError, BlobStore, SubmittedValue};
use crate::coerce::coerce_submitted;
use crate::delivery::{
    LogMailSender, MailSender, MemoryNotificationWriter, NotificationWriter, WebhookClient,
};
use crate::directory::{MemoryUserDirectory, UserDirectory};
use crate::identity::Identity;
use crate::interpolate::{Submitter, Variables};
use crate::transition::{resolve_transition, TransitionEffect, TransitionError};
use crate::translation::{NoTranslations, Translations};
use crate::types::{FormError, FormVersion, Transition, ValueMap};
use crate::validation::{
    merge_values, validate_submission_values, values_to_validate, ValidationErrors,
};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Why a submission or read was refused. Nothing is written in any case.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("validation failed for {} field(s)", .0.len())]
    Validation(ValidationErrors),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("this entry is already complete")]
    AlreadyComplete,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Another submission changed the entry first.
    #[error("the entry was modified concurrently; reload and try again")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for SubmissionError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ConcurrentConflict { .. } => SubmissionError::Conflict,
            StorageError::EntryFrozen { .. } => SubmissionError::AlreadyComplete,
            StorageError::EntryNotFound { .. }
            | StorageError::FormVersionNotFound { .. }
            | StorageError::FormNotFound { .. } => SubmissionError::NotFound(e.to_string()),
            other => SubmissionError::Internal(other.to_string()),
        }
    }
}

impl From<FormError> for SubmissionError {
    fn from(e: FormError) -> Self {
        SubmissionError::Internal(e.to_string())
    }
}

impl From<BlobError> for SubmissionError {
    fn from(e: BlobError) -> Self {
        SubmissionError::Internal(e.to_string())
    }
}

impl From<TransitionError> for SubmissionError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::AlreadyComplete => SubmissionError::AlreadyComplete,
            TransitionError::NotFound { .. } => SubmissionError::NotFound(e.to_string()),
            TransitionError::WrongOrigin { .. } | TransitionError::GuardFailed { .. } => {
                SubmissionError::InvalidTransition(e.to_string())
            }
        }
    }
}

// ──────────────────────────────────────────────
// Outcome, settings, collaborators
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    pub entry_id: Id,
    pub public_identifier: String,
    pub is_complete: bool,
    pub current_stage_id: Id,
    pub message: String,
    /// One result per action of the applied transition, in binding order.
    pub action_results: Vec<ActionResult>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Base of `{{entry_link}}`.
    pub public_base_url: String,
    /// Read-path language when neither caller nor identity picks one.
    pub default_language_id: Option<Id>,
    /// Webhook timeout for actions that do not set one.
    pub webhook_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            public_base_url: "http://localhost:8080".to_string(),
            default_language_id: None,
            webhook_timeout: Duration::from_secs(30),
        }
    }
}

/// External services the engine calls.
#[derive(Clone)]
pub struct Collaborators {
    pub blobs: Arc<dyn BlobStore>,
    pub mail: Arc<dyn MailSender>,
    pub notifications: Arc<dyn NotificationWriter>,
    pub webhooks: Arc<dyn WebhookClient>,
    pub users: Arc<dyn UserDirectory>,
    pub translations: Arc<dyn Translations>,
}

impl Collaborators {
    /// Logging mail, in-memory notifications, an empty user directory and
    /// no translations.
    pub fn in_memory(blobs: Arc<dyn BlobStore>, webhooks: Arc<dyn WebhookClient>) -> Self {
        Collaborators {
            blobs,
            mail: Arc::new(LogMailSender::new()),
            notifications: Arc::new(MemoryNotificationWriter::new()),
            webhooks,
            users: Arc::new(MemoryUserDirectory::default()),
            translations: Arc::new(NoTranslations),
        }
    }
}

// ──────────────────────────────────────────────
// Orchestrator
// ──────────────────────────────────────────────

pub struct SubmissionOrchestrator<S: FormStorage> {
    pub(crate) storage: Arc<S>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) translations: Arc<dyn Translations>,
    pub(crate) actions: ActionExecutor,
    pub(crate) settings: EngineSettings,
}

/// The entry state a transition produced, ready for actions.
struct Written {
    entry: EntryRecord,
    stored: BTreeMap<Id, String>,
}

impl<S: FormStorage> SubmissionOrchestrator<S> {
    pub fn new(storage: Arc<S>, collaborators: Collaborators, settings: EngineSettings) -> Self {
        let actions = ActionExecutor::new(
            collaborators.mail,
            collaborators.notifications,
            collaborators.webhooks,
            collaborators.users.clone(),
            settings.webhook_timeout,
        );
        SubmissionOrchestrator {
            storage,
            blobs: collaborators.blobs,
            users: collaborators.users,
            translations: collaborators.translations,
            actions,
            settings,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) async fn load_form(&self, form_version_id: Id) -> Result<FormVersion, SubmissionError> {
        let record = self.storage.get_form_version(form_version_id).await?;
        Ok(FormVersion::from_doc(&record.document)?)
    }

    pub(crate) async fn stored_values(
        &self,
        entry_id: Id,
    ) -> Result<BTreeMap<Id, String>, SubmissionError> {
        Ok(self
            .storage
            .list_entry_values(entry_id)
            .await?
            .into_iter()
            .map(|v| (v.field_id, v.value))
            .collect())
    }

    // ── Initial stage ────────────────────────────────────────────────────────

    /// Create an entry at the form version's initial stage, optionally
    /// applying a transition leaving that stage.
    pub async fn submit_initial(
        &self,
        form_version_id: Id,
        values: BTreeMap<Id, SubmittedValue>,
        transition_id: Option<Id>,
        identity: Option<&Identity>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let result = self
            .submit_initial_inner(form_version_id, &values, transition_id, identity)
            .await;
        match &result {
            Ok(outcome) => tracing::info!(
                form_version_id,
                entry_id = outcome.entry_id,
                stage_id = outcome.current_stage_id,
                is_complete = outcome.is_complete,
                "initial submission accepted"
            ),
            Err(e) => tracing::info!(form_version_id, error = %e, "initial submission rejected"),
        }
        result
    }

    async fn submit_initial_inner(
        &self,
        form_version_id: Id,
        values: &BTreeMap<Id, SubmittedValue>,
        transition_id: Option<Id>,
        identity: Option<&Identity>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let form = self.load_form(form_version_id).await?;
        let stage = form.initial_stage().ok_or_else(|| {
            SubmissionError::NotFound(format!(
                "form version {} has no initial stage",
                form_version_id
            ))
        })?;
        if !can_access(stage, identity, None) {
            return Err(SubmissionError::AccessDenied(
                "You do not have access to submit this form.".to_string(),
            ));
        }

        let submitted = json_view(values);
        let transition = match transition_id {
            Some(id) => Some(resolve_transition(&form, stage.id, false, id, &submitted)?),
            None => None,
        };

        let no_values = BTreeMap::new();
        let to_validate = values_to_validate(stage, &submitted, &no_values);
        let errors =
            validate_submission_values(self.storage.as_ref(), &form, &to_validate, &submitted, None)
                .await?;
        if !errors.is_empty() {
            return Err(SubmissionError::Validation(errors));
        }

        // Blobs are written only once every check has passed.
        let coerced = self.coerce_values(&form, values).await?;
        let now = now_rfc3339();

        let mut snapshot = self.storage.begin_snapshot().await?;
        let written = self
            .write_initial(
                &mut snapshot,
                &form,
                stage.id,
                &coerced,
                transition.map(|(_, effect)| effect),
                identity,
                &now,
            )
            .await;
        let written = match written {
            Ok(w) => w,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e);
            }
        };
        self.storage.commit_snapshot(snapshot).await?;

        let action_results = match transition {
            Some((t, _)) => self.run_actions(&form, t, &written, identity).await,
            None => vec![],
        };
        Ok(SubmissionOutcome {
            entry_id: written.entry.id,
            public_identifier: written.entry.public_identifier,
            is_complete: written.entry.is_complete,
            current_stage_id: written.entry.current_stage_id,
            message: "Form submitted successfully".to_string(),
            action_results,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_initial(
        &self,
        snapshot: &mut S::Snapshot,
        form: &FormVersion,
        initial_stage_id: Id,
        coerced: &BTreeMap<Id, String>,
        effect: Option<TransitionEffect>,
        identity: Option<&Identity>,
        now: &str,
    ) -> Result<Written, SubmissionError> {
        let mut entry = self
            .storage
            .insert_entry(
                snapshot,
                NewEntry {
                    form_version_id: form.id,
                    current_stage_id: initial_stage_id,
                    public_identifier: uuid::Uuid::new_v4().to_string(),
                    created_by: identity.map(|i| i.id),
                    created_at: now.to_string(),
                },
            )
            .await?;
        self.upsert_values(snapshot, entry.id, coerced).await?;
        if let Some(effect) = effect {
            self.apply_effect(snapshot, &mut entry, effect, now).await?;
        }
        Ok(Written {
            entry,
            stored: coerced.clone(),
        })
    }

    // ── Later stages ─────────────────────────────────────────────────────────

    /// Save values for the entry's current stage and take `transition_id`.
    pub async fn submit_later_stage(
        &self,
        public_identifier: &str,
        values: BTreeMap<Id, SubmittedValue>,
        transition_id: Id,
        identity: Option<&Identity>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let result = self
            .submit_later_inner(public_identifier, &values, transition_id, identity)
            .await;
        match &result {
            Ok(outcome) => tracing::info!(
                entry_id = outcome.entry_id,
                transition_id,
                stage_id = outcome.current_stage_id,
                is_complete = outcome.is_complete,
                "stage submission accepted"
            ),
            Err(e) => tracing::info!(
                public_identifier,
                transition_id,
                error = %e,
                "stage submission rejected"
            ),
        }
        result
    }

    async fn submit_later_inner(
        &self,
        public_identifier: &str,
        values: &BTreeMap<Id, SubmittedValue>,
        transition_id: Id,
        identity: Option<&Identity>,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let written = self
            .write_later(&mut snapshot, public_identifier, values, transition_id, identity)
            .await;
        let (form, written, transition_id, message) = match written {
            Ok(w) => w,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e);
            }
        };
        self.storage.commit_snapshot(snapshot).await?;

        let action_results = match form.get_transition(transition_id) {
            Some(t) => self.run_actions(&form, t, &written, identity).await,
            None => vec![],
        };
        Ok(SubmissionOutcome {
            entry_id: written.entry.id,
            public_identifier: written.entry.public_identifier,
            is_complete: written.entry.is_complete,
            current_stage_id: written.entry.current_stage_id,
            message,
            action_results,
        })
    }

    /// Checks, then writes, inside the caller's snapshot.
    async fn write_later(
        &self,
        snapshot: &mut S::Snapshot,
        public_identifier: &str,
        values: &BTreeMap<Id, SubmittedValue>,
        transition_id: Id,
        identity: Option<&Identity>,
    ) -> Result<(FormVersion, Written, Id, String), SubmissionError> {
        let mut entry = self
            .storage
            .get_entry_for_update(snapshot, public_identifier)
            .await?;
        if entry.is_complete {
            return Err(SubmissionError::AlreadyComplete);
        }

        let form = self.load_form(entry.form_version_id).await?;
        let stage = form.get_stage(entry.current_stage_id).ok_or_else(|| {
            SubmissionError::Internal(format!(
                "entry {} points at unknown stage {}",
                entry.id, entry.current_stage_id
            ))
        })?;
        let stored = self.stored_values(entry.id).await?;
        let view = EntryView {
            form: &form,
            values: &stored,
        };
        if !can_access(stage, identity, Some(view)) {
            return Err(SubmissionError::AccessDenied(
                "You do not have access to submit this stage.".to_string(),
            ));
        }

        let submitted = json_view(values);
        let merged = merge_values(&stored, &submitted);
        let (_, effect) =
            resolve_transition(&form, entry.current_stage_id, false, transition_id, &merged)?;

        let to_validate = values_to_validate(stage, &submitted, &stored);
        let errors = validate_submission_values(
            self.storage.as_ref(),
            &form,
            &to_validate,
            &merged,
            Some(entry.id),
        )
        .await?;
        if !errors.is_empty() {
            return Err(SubmissionError::Validation(errors));
        }

        let coerced = self.coerce_values(&form, values).await?;
        let now = now_rfc3339();
        self.upsert_values(snapshot, entry.id, &coerced).await?;
        self.apply_effect(snapshot, &mut entry, effect, &now).await?;

        let message = match effect {
            TransitionEffect::Complete => "Entry completed successfully".to_string(),
            TransitionEffect::MoveTo(to) => format!(
                "Entry moved to next stage: {}",
                form.get_stage(to).map(|s| s.name.as_str()).unwrap_or_default()
            ),
            TransitionEffect::Stay => "Entry updated successfully".to_string(),
        };
        let mut all = stored;
        all.extend(coerced);
        Ok((
            form,
            Written { entry, stored: all },
            transition_id,
            message,
        ))
    }

    // ── Shared steps ─────────────────────────────────────────────────────────

    /// Canonical text per submitted field. Fields unknown to the form were
    /// already rejected by validation and are skipped.
    async fn coerce_values(
        &self,
        form: &FormVersion,
        values: &BTreeMap<Id, SubmittedValue>,
    ) -> Result<BTreeMap<Id, String>, SubmissionError> {
        let mut out = BTreeMap::new();
        for (&field_id, raw) in values {
            let Some(field_type) = form.get_field(field_id).and_then(|f| f.field_type) else {
                continue;
            };
            let text = coerce_submitted(raw, field_type, self.blobs.as_ref()).await?;
            out.insert(field_id, text);
        }
        Ok(out)
    }

    async fn upsert_values(
        &self,
        snapshot: &mut S::Snapshot,
        entry_id: Id,
        coerced: &BTreeMap<Id, String>,
    ) -> Result<(), SubmissionError> {
        for (&field_id, value) in coerced {
            self.storage
                .upsert_entry_value(
                    snapshot,
                    EntryValueRecord {
                        entry_id,
                        field_id,
                        value: value.clone(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    async fn apply_effect(
        &self,
        snapshot: &mut S::Snapshot,
        entry: &mut EntryRecord,
        effect: TransitionEffect,
        now: &str,
    ) -> Result<(), SubmissionError> {
        let (current_stage_id, is_complete) = effect.apply(entry.current_stage_id);
        let version = self
            .storage
            .update_entry_progress(
                snapshot,
                entry.id,
                entry.version,
                EntryProgress {
                    current_stage_id,
                    is_complete,
                    updated_at: now.to_string(),
                },
            )
            .await?;
        tracing::debug!(
            entry_id = entry.id,
            from_stage = entry.current_stage_id,
            to_stage = current_stage_id,
            is_complete,
            "transition applied"
        );
        entry.current_stage_id = current_stage_id;
        entry.is_complete = is_complete;
        entry.updated_at = now.to_string();
        entry.version = version;
        Ok(())
    }

    async fn run_actions(
        &self,
        form: &FormVersion,
        transition: &Transition,
        written: &Written,
        identity: Option<&Identity>,
    ) -> Vec<ActionResult> {
        if transition.actions.is_empty() {
            return vec![];
        }
        let submitter = self.submitter(&written.entry, identity).await;
        let vars = Variables::for_entry(
            &self.settings.public_base_url,
            form,
            &written.entry,
            &written.stored,
            submitter.as_ref(),
        );
        self.actions
            .execute_transition_actions(transition, &vars, written.entry.id)
            .await
    }

    /// The entry's creator, or the acting identity when it has none.
    async fn submitter(&self, entry: &EntryRecord, identity: Option<&Identity>) -> Option<Submitter> {
        if let Some(creator_id) = entry.created_by {
            match self.users.find_by_id(creator_id).await {
                Ok(Some(user)) => {
                    return Some(Submitter {
                        name: user.name,
                        email: user.email,
                    })
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(user_id = creator_id, error = %e, "creator lookup failed"),
            }
        }
        identity.map(|i| Submitter {
            name: i.name.clone(),
            email: i.email.clone(),
        })
    }
}

/// JSON view of the submitted values, for conditions and rules.
fn json_view(values: &BTreeMap<Id, SubmittedValue>) -> ValueMap {
    values
        .iter()
        .map(|(&id, v)| (id, v.as_json()))
        .collect()
}
