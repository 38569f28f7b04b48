//! The button that posts the form.

use super::{SubmissionElement, TagAttributes};
use crate::constants::{MSG_ENTER_FORM_BUTTON, MSG_SAVE_CHANGES_BUTTON};
use crate::context::{FormEntryContext, Mode};
use crate::error::SubmissionError;
use crate::record::PendingRecord;
use crate::submission::Submission;
use crate::widget::{escape, escape_attr};
use crate::FormResult;

/// The form's submit button. Hidden in VIEW mode; contributes nothing to the record.
#[derive(Debug)]
pub struct SubmitButtonElement {
    label: Option<String>,
    class: Option<String>,
}

impl SubmitButtonElement {
    /// Reads `submitLabel` and `submitClass` (or `class`).
    pub fn new(attrs: &TagAttributes) -> Self {
        Self {
            label: attrs.get("submitLabel").map(str::to_owned),
            class: attrs
                .get("submitClass")
                .or_else(|| attrs.get("class"))
                .map(str::to_owned),
        }
    }
}

impl SubmissionElement for SubmitButtonElement {
    fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        let label = match (&self.label, ctx.mode()) {
            (_, Mode::View) => return Ok(String::new()),
            (Some(label), _) => label.clone(),
            (None, Mode::Enter) => ctx.message(MSG_ENTER_FORM_BUTTON),
            (None, Mode::Edit) => ctx.message(MSG_SAVE_CHANGES_BUTTON),
        };
        let class = match &self.class {
            Some(extra) => format!("submitButton {}", escape_attr(extra)),
            None => "submitButton".to_owned(),
        };
        Ok(format!(
            "<button type=\"button\" class=\"{class}\" onclick=\"submitHtmlForm()\">{}</button>",
            escape(&label)
        ))
    }

    fn validate_submission(
        &self,
        _ctx: &FormEntryContext,
        _submission: &Submission,
    ) -> FormResult<Vec<SubmissionError>> {
        Ok(Vec::new())
    }

    fn handle_submission(
        &self,
        _ctx: &FormEntryContext,
        _record: &mut PendingRecord,
        _submission: &Submission,
    ) -> FormResult<()> {
        Ok(())
    }
}
