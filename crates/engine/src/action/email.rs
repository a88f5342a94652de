use serde_json::{Map, Value};

use super::{props, ActionExecutor, Reported};
use crate::delivery::{DeliveryError, OutgoingMail};
use crate::interpolate::Variables;

/// One message per resolved recipient, same subject and body for all.
pub(super) async fn send_email(
    executor: &ActionExecutor,
    action_props: &Map<String, Value>,
    vars: &Variables,
) -> Result<Reported, DeliveryError> {
    let subject = vars.apply(
        &props::string(action_props, "email_subject").unwrap_or_else(|| "Form Submission".into()),
    );
    let html = vars.apply(&props::string(action_props, "email_content").unwrap_or_default());
    let attachments = props::string_list(action_props, "email_attachments");
    let cc = props::string_list(action_props, "cc_emails");
    let bcc = props::string_list(action_props, "bcc_emails");

    let recipients = executor.collect_recipients(action_props).await?;
    if recipients.is_empty() {
        return Ok(Reported::failed("No recipients specified or found"));
    }

    for to in &recipients {
        executor
            .mail
            .send(OutgoingMail {
                to: to.clone(),
                subject: subject.clone(),
                html: html.clone(),
                attachments: attachments.clone(),
                cc: cc.clone(),
                bcc: bcc.clone(),
            })
            .await?;
    }
    Ok(Reported::ok(format!(
        "Email sent to {} recipient(s)",
        recipients.len()
    )))
}
