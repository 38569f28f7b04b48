//! Observation with a carried-forward reference value.
//!
//! When an earlier encounter on the same day already recorded the concept and this form has no
//! value yet, the earlier value is shown read-only with an override button that reveals the
//! live input. The reference is display-only: validation and apply see the live widget alone.

use super::observation::widget_value_of;
use super::{ObservationElement, SubmissionElement, TagAttributes};
use crate::context::{FormEntryContext, Mode};
use crate::error::SubmissionError;
use crate::record::{ObsValue, PendingRecord};
use crate::services::{DateWindow, FormServices};
use crate::submission::Submission;
use crate::widget::escape;
use crate::FormResult;
use chrono::{DateTime, NaiveTime, Utc};
use vpr_types::ConceptId;

/// A prior value offered in place of an empty live widget.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceValue {
    pub value: ObsValue,
    pub encounter_type: String,
    pub encounter_datetime: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ObservationReferenceElement {
    base: ObservationElement,
    reference: Option<ReferenceValue>,
    message_template: String,
    show_message: bool,
    override_label: String,
}

impl ObservationReferenceElement {
    /// Accepts the [`ObservationElement`] attributes plus `referenceMessage`,
    /// `showReferenceMessage` and `overrideLabel`.
    ///
    /// # Errors
    ///
    /// Returns the configuration errors of the base element. A failing record lookup is logged
    /// and treated as "no reference".
    pub fn new(
        ctx: &mut FormEntryContext,
        services: &FormServices,
        attrs: &TagAttributes,
    ) -> FormResult<Self> {
        let base = ObservationElement::new(ctx, services, attrs)?;
        let message_template = attrs
            .get("referenceMessage")
            .unwrap_or(ctx.config().reference_message())
            .to_owned();
        let show_message = attrs.flag("showReferenceMessage", true)?;
        let override_label = attrs
            .get("overrideLabel")
            .unwrap_or(ctx.config().override_label())
            .to_owned();

        let reference = if base.has_value() {
            None
        } else {
            Self::find_reference(ctx, services, base.concept().id)
        };

        Ok(Self {
            base,
            reference,
            message_template,
            show_message,
            override_label,
        })
    }

    /// Latest prior value recorded on the same local day as this form's encounter (or today).
    fn find_reference(
        ctx: &FormEntryContext,
        services: &FormServices,
        concept: ConceptId,
    ) -> Option<ReferenceValue> {
        let anchor = ctx
            .existing()
            .and_then(|e| e.datetime())
            .unwrap_or_else(|| ctx.now());
        let local = ctx.to_local(anchor);
        let offset = *local.offset();
        let day = local.date_naive();
        let window = DateWindow {
            start: FormEntryContext::instant_from_local(day.and_time(NaiveTime::MIN), offset)?,
            end: FormEntryContext::instant_from_local(day.and_hms_milli_opt(23, 59, 59, 999)?, offset)?,
        };

        match services
            .records
            .prior_observations(ctx.patient(), concept, &window)
        {
            Ok(found) => found.into_iter().next().map(|prior| {
                tracing::debug!(%concept, encounter_type = %prior.encounter_type, "found reference value");
                ReferenceValue {
                    value: prior.observation.value,
                    encounter_type: prior.encounter_type,
                    encounter_datetime: prior.encounter_datetime,
                }
            }),
            Err(err) => {
                tracing::warn!(%concept, error = %err, "prior observation lookup failed");
                None
            }
        }
    }

    pub fn reference(&self) -> Option<&ReferenceValue> {
        self.reference.as_ref()
    }

    fn message(&self, ctx: &FormEntryContext, reference: &ReferenceValue) -> String {
        let date = ctx
            .to_local(reference.encounter_datetime)
            .format(ctx.config().date_format())
            .to_string();
        self.message_template
            .replace("{{value}}", &self.base.describe(ctx, &reference.value))
            .replace("{{encounterType}}", &reference.encounter_type)
            .replace("{{encounterDate}}", &date)
    }

    /// True when a rejected submission is being echoed and the user had typed a live value.
    fn live_value_resubmitted(&self, ctx: &FormEntryContext) -> bool {
        let field = self.base.widget().field();
        ctx.resubmission()
            .is_some_and(|s| s.text(field.as_str()).is_some())
    }
}

impl SubmissionElement for ObservationReferenceElement {
    fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        let reference = match &self.reference {
            Some(reference) if !self.base.has_value() && !self.live_value_resubmitted(ctx) => reference,
            _ => return self.base.render(ctx),
        };

        let mut shown = self.base.widget().detached_copy();
        shown.set_initial_value(Some(widget_value_of(&reference.value)));
        if ctx.mode() == Mode::View {
            return self.base.render_with(ctx, shown.render_view(ctx));
        }

        let field = self.base.widget().field();
        let message = if self.show_message {
            format!(" <span>{}</span>", escape(&self.message(ctx, reference)))
        } else {
            String::new()
        };
        let view = format!(
            "<span id=\"{field}-reference-view\">{}{message}</span>",
            shown.render_view(ctx)
        );
        let edit = format!(
            "<span id=\"{field}-reference-edit\" style=\"display:none\">{}</span>",
            self.base.render(ctx)?
        );
        let toggle = format!(
            "<button id=\"{field}-toggle-button\" type=\"button\" onclick=\"\
             jQuery('#{field}-reference-view').hide();\
             jQuery('#{field}-reference-edit').show();\
             jQuery('#{field}-toggle-button').hide();\">{}</button>",
            escape(&self.override_label)
        );
        Ok([view, edit, toggle].join(" "))
    }

    fn validate_submission(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
    ) -> FormResult<Vec<SubmissionError>> {
        self.base.validate_submission(ctx, submission)
    }

    fn handle_submission(
        &self,
        ctx: &FormEntryContext,
        record: &mut PendingRecord,
        submission: &Submission,
    ) -> FormResult<()> {
        self.base.handle_submission(ctx, record, submission)
    }
}
