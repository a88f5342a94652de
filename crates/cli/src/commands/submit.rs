use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use formflow_engine::delivery::UreqWebhookClient;
use formflow_engine::{
    Collaborators, EngineSettings, FsBlobStore, Identity, SubmissionError, SubmissionOrchestrator,
    SubmissionOutcome,
};
use formflow_interchange::Id;
use formflow_storage::MemoryStorage;

use crate::forms::{read_form, seed};
use crate::input::FieldValues;
use crate::{report_error, OutputFormat};

pub(crate) struct SubmitOptions<'a> {
    pub form: &'a Path,
    pub values: Option<&'a Path>,
    pub transition: Option<Id>,
    pub identity: Option<Identity>,
    pub blob_root: PathBuf,
    pub output: OutputFormat,
    pub quiet: bool,
}

fn exit_with(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

/// Run an initial-stage submission against a throwaway in-memory store and
/// print the outcome, including the results of any actions that ran.
pub(crate) fn cmd_submit(opts: SubmitOptions<'_>) {
    let (output, quiet) = (opts.output, opts.quiet);
    let (doc, form) =
        read_form(opts.form).unwrap_or_else(|e| exit_with(&e.to_string(), output, quiet));
    let values = match opts.values {
        None => FieldValues::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                let msg = format!("error reading file '{}': {}", path.display(), e);
                exit_with(&msg, output, quiet)
            });
            serde_json::from_str(&text).unwrap_or_else(|e| {
                let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
                exit_with(&msg, output, quiet)
            })
        }
    };
    let values = values.into_submitted().unwrap_or_else(|e| exit_with(&e, output, quiet));

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        let msg = format!("failed to create tokio runtime: {}", e);
        exit_with(&msg, output, quiet)
    });
    let result: Result<SubmissionOutcome, SubmissionError> = rt.block_on(async {
        let storage = Arc::new(MemoryStorage::new());
        seed(storage.as_ref(), vec![doc])
            .await
            .map_err(|e| SubmissionError::Internal(e.to_string()))?;
        let collaborators = Collaborators::in_memory(
            Arc::new(FsBlobStore::new(opts.blob_root.clone())),
            Arc::new(UreqWebhookClient::new()),
        );
        let engine =
            SubmissionOrchestrator::new(storage, collaborators, EngineSettings::default());
        engine
            .submit_initial(form.id, values, opts.transition, opts.identity.as_ref())
            .await
    });

    match result {
        Ok(outcome) => {
            if quiet {
                return;
            }
            match output {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&outcome)
                        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
                    println!("{}", json);
                }
                OutputFormat::Text => {
                    println!("{}", outcome.message);
                    println!("  entry: {}", outcome.public_identifier);
                    println!(
                        "  stage: {}{}",
                        outcome.current_stage_id,
                        if outcome.is_complete { " (complete)" } else { "" }
                    );
                    for result in &outcome.action_results {
                        println!(
                            "  {} {}: {}",
                            if result.success { "ok  " } else { "FAIL" },
                            result.action_name,
                            result.message
                        );
                    }
                }
            }
        }
        Err(SubmissionError::Validation(errors)) => {
            if !quiet {
                match output {
                    OutputFormat::Json => {
                        let body = serde_json::json!({
                            "error": "validation failed",
                            "errors": errors,
                        });
                        eprintln!(
                            "{}",
                            serde_json::to_string_pretty(&body).unwrap_or_default()
                        );
                    }
                    OutputFormat::Text => {
                        eprintln!("validation failed");
                        for (field_id, messages) in &errors {
                            for message in messages {
                                eprintln!("  field {}: {}", field_id, message);
                            }
                        }
                    }
                }
            }
            process::exit(1);
        }
        Err(e) => exit_with(&e.to_string(), output, quiet),
    }
}
