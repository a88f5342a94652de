use std::path::Path;
use std::process;

use formflow_engine::{ActionKind, FormVersion, RuleKind};
use serde::Serialize;

use crate::forms::read_form;
use crate::{report_error, OutputFormat};

#[derive(Debug, Serialize)]
pub(crate) struct CheckReport {
    pub form_version_id: i64,
    pub form_name: String,
    pub status: String,
    pub stages: usize,
    pub sections: usize,
    pub fields: usize,
    pub transitions: usize,
    pub warnings: Vec<String>,
}

/// Configuration problems that do not stop the form from loading but will
/// surface as validation messages or failed actions at submission time.
pub(crate) fn configuration_warnings(form: &FormVersion) -> Vec<String> {
    let mut warnings = Vec::new();
    if form.initial_stage().is_none() {
        warnings.push("no initial stage: the form cannot be submitted".to_string());
    }
    for field in form.fields() {
        if field.field_type.is_none() {
            warnings.push(format!(
                "field {} ('{}') has unknown type '{}'",
                field.id, field.label, field.type_name
            ));
        }
        for rule in &field.rules {
            if let RuleKind::Unknown(name) = &rule.kind {
                warnings.push(format!("field {} has unknown rule '{}'", field.id, name));
            }
        }
    }
    for transition in &form.transitions {
        for action in &transition.actions {
            if let ActionKind::Unknown(name) = &action.kind {
                warnings.push(format!(
                    "transition {} has unknown action '{}'",
                    transition.id, name
                ));
            }
        }
    }
    warnings
}

pub(crate) fn build_report(form: &FormVersion) -> CheckReport {
    CheckReport {
        form_version_id: form.id,
        form_name: form.form_name.clone(),
        status: form.status.to_string(),
        stages: form.stages.len(),
        sections: form.stages.iter().map(|s| s.sections.len()).sum(),
        fields: form.fields().count(),
        transitions: form.transitions.len(),
        warnings: configuration_warnings(form),
    }
}

pub(crate) fn cmd_check(file: &Path, strict: bool, output: OutputFormat, quiet: bool) {
    let form = match read_form(file) {
        Ok((_, form)) => form,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };
    let report = build_report(&form);

    if !quiet {
        match output {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
                println!("{}", json);
            }
            OutputFormat::Text => {
                println!(
                    "Form version {} '{}' ({})",
                    report.form_version_id, report.form_name, report.status
                );
                println!(
                    "  {} stage(s), {} section(s), {} field(s), {} transition(s)",
                    report.stages, report.sections, report.fields, report.transitions
                );
                for warning in &report.warnings {
                    println!("  warning: {}", warning);
                }
                if report.warnings.is_empty() {
                    println!("  ok");
                }
            }
        }
    }

    if strict && !report.warnings.is_empty() {
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reports_unknown_configuration() {
        let form = FormVersion::from_interchange(&json!({
            "id": 1, "form_name": "Odd",
            "stages": [{"id": 1, "name": "Only", "sections": [
                {"id": 1, "fields": [
                    {"id": 5, "label": "Aura", "field_type": "Hologram Input",
                     "rules": [{"rule_name": "palindrome"}]}
                ]}
            ]}],
            "transitions": [{"id": 9, "from_stage_id": 1, "to_complete": true,
                             "actions": [{"action_type": "Send Fax"}]}]
        }))
        .unwrap();
        let report = build_report(&form);
        assert_eq!(report.fields, 1);
        assert_eq!(
            report.warnings,
            vec![
                "no initial stage: the form cannot be submitted",
                "field 5 ('Aura') has unknown type 'Hologram Input'",
                "field 5 has unknown rule 'palindrome'",
                "transition 9 has unknown action 'Send Fax'",
            ]
        );
    }
}
