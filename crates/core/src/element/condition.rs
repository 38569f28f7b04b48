//! Repeatable condition entry.
//!
//! Each occurrence of the tag in a form captures one condition. On edit, once the whole form is
//! built, occurrences are matched to the persisted conditions they produced before: control
//! identifiers first, then preset concepts, then the remaining occurrences take the remaining
//! conditions in persisted order.

use super::{join_parts, read_widget, ClaimPass, Parsed, SubmissionElement, TagAttributes};
use crate::constants::{MSG_END_BEFORE_ONSET, MSG_INVALID_CONCEPT, MSG_REQUIRED};
use crate::context::FormEntryContext;
use crate::error::SubmissionError;
use crate::record::{ClinicalStatus, CodedOrFreeText, Condition, PendingRecord};
use crate::services::{Concept, EntityResolver, FormServices};
use crate::submission::Submission;
use crate::widget::{
    view_value, ConceptSearchWidget, DateWidget, ErrorWidget, OptionStyle, RegisteredWidget,
    SingleOptionWidget, TextWidget, WidgetValue,
};
use crate::{FormError, FormResult};
use chrono::NaiveDate;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use vpr_types::ControlId;

/// Values read from one occurrence, after parsing.
struct Entered {
    concept: Option<CodedOrFreeText>,
    status: Option<ClinicalStatus>,
    onset: Option<NaiveDate>,
    end: Option<NaiveDate>,
    detail: Option<String>,
}

pub struct ConditionElement {
    required: bool,
    control_id: Option<ControlId>,
    preset: Option<Concept>,
    concept: RegisteredWidget,
    concept_error: ErrorWidget,
    status: RegisteredWidget,
    status_error: ErrorWidget,
    onset: RegisteredWidget,
    end: RegisteredWidget,
    dates_error: ErrorWidget,
    detail: Option<RegisteredWidget>,
    existing: Option<Condition>,
    entities: Arc<dyn EntityResolver>,
}

impl ConditionElement {
    /// Build one occurrence from `required`, `controlId`, `conceptId` and
    /// `showAdditionalDetail`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a blank or malformed `controlId`, an unknown preset
    /// concept or a non-boolean flag.
    pub fn new(
        ctx: &mut FormEntryContext,
        services: &FormServices,
        attrs: &TagAttributes,
    ) -> FormResult<Self> {
        let required = attrs.flag("required", false)?;
        let control_id = attrs
            .raw("controlId")
            .map(|raw| ControlId::new(raw).map_err(|_| FormError::invalid_attribute("controlId", raw)))
            .transpose()?;
        let preset = attrs
            .get("conceptId")
            .map(|key| {
                services
                    .entities
                    .concept(key)
                    .ok_or_else(|| FormError::unresolved("concept", key))
            })
            .transpose()?;
        let show_detail = attrs.flag("showAdditionalDetail", false)?;

        let search = ConceptSearchWidget::new(true);
        let status = SingleOptionWidget::new(
            ClinicalStatus::ALL
                .iter()
                .map(|s| (s.as_str().to_owned(), s.label().to_owned()))
                .collect(),
            OptionStyle::Radio,
        );
        let onset = DateWidget::new();
        let end = DateWidget::new();
        let detail = TextWidget::new().textarea(2, 40);

        let concept = ctx.register_widget(Box::new(search));
        let concept_error = ctx.register_error_widget(&concept)?;
        let status = ctx.register_widget(Box::new(status));
        let status_error = ctx.register_error_widget(&status)?;
        let onset = ctx.register_widget(Box::new(onset));
        let end = ctx.register_widget(Box::new(end));
        let dates_error = ctx.register_error_widget(&onset)?;
        let detail = if show_detail {
            Some(ctx.register_widget(Box::new(detail)))
        } else {
            None
        };

        Ok(Self {
            required,
            control_id,
            preset,
            concept,
            concept_error,
            status,
            status_error,
            onset,
            end,
            dates_error,
            detail,
            existing: None,
            entities: services.entities.clone(),
        })
    }

    /// The persisted condition this occurrence was matched to, if any.
    pub fn matched(&self) -> Option<&Condition> {
        self.existing.as_ref()
    }

    fn prefill(&mut self, found: &Condition) {
        self.concept
            .set_initial_value(Some(WidgetValue::Concept(found.condition.clone())));
        self.status.set_initial_value(Some(WidgetValue::Choice(
            found.clinical_status.as_str().to_owned(),
        )));
        self.onset.set_initial_value(found.onset_date.map(WidgetValue::Date));
        self.end.set_initial_value(found.end_date.map(WidgetValue::Date));
        if let Some(detail) = &mut self.detail {
            detail.set_initial_value(found.additional_detail.clone().map(WidgetValue::Text));
        }
    }

    fn read_concept(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
        errors: &mut Vec<SubmissionError>,
    ) -> FormResult<Parsed> {
        if let Some(preset) = &self.preset {
            return Ok(Parsed::Value(WidgetValue::Concept(CodedOrFreeText::Coded {
                concept: preset.id,
                display: preset.name.clone(),
            })));
        }
        let parsed = read_widget(ctx, &self.concept, &self.concept_error, submission, errors)?;
        let concept = match &parsed {
            Parsed::Value(WidgetValue::Concept(CodedOrFreeText::Coded { concept, .. })) => *concept,
            _ => return Ok(parsed),
        };
        Ok(match self.entities.concept(&concept.to_string()) {
            Some(found) => Parsed::Value(WidgetValue::Concept(CodedOrFreeText::Coded {
                concept: found.id,
                display: found.name,
            })),
            None => {
                errors.push(SubmissionError::new(self.concept_error.field(), MSG_INVALID_CONCEPT));
                Parsed::Invalid
            }
        })
    }

    /// Read every widget, collecting parse and cross-field errors.
    fn read(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
        errors: &mut Vec<SubmissionError>,
    ) -> FormResult<Entered> {
        let concept = self.read_concept(ctx, submission, errors)?;
        let status = read_widget(ctx, &self.status, &self.status_error, submission, errors)?;
        let onset = read_widget(ctx, &self.onset, &self.dates_error, submission, errors)?;
        let end = read_widget(ctx, &self.end, &self.dates_error, submission, errors)?;

        // A status left checked without a concept records nothing.
        match (&concept, &status) {
            (Parsed::Empty, _) if self.required => {
                errors.push(SubmissionError::new(self.concept_error.field(), MSG_REQUIRED));
            }
            (Parsed::Value(_), Parsed::Empty) if self.preset.is_none() || self.required => {
                errors.push(SubmissionError::new(self.status_error.field(), MSG_REQUIRED));
            }
            _ => {}
        }

        let onset = onset.value().and_then(|v| v.as_date());
        let end = end.value().and_then(|v| v.as_date());
        if let (Some(onset), Some(end)) = (onset, end) {
            if end < onset {
                errors.push(SubmissionError::new(self.dates_error.field(), MSG_END_BEFORE_ONSET));
            }
        }

        let detail = match &self.detail {
            Some(widget) => widget
                .value(ctx, submission)?
                .and_then(|v| v.as_text().map(str::to_owned)),
            None => None,
        };

        Ok(Entered {
            concept: concept.value().and_then(|v| v.as_concept().cloned()),
            status: status
                .value()
                .and_then(|v| v.as_choice().and_then(|s| s.parse().ok())),
            onset,
            end,
            detail,
        })
    }
}

impl SubmissionElement for ConditionElement {
    fn claim_existing(&mut self, ctx: &mut FormEntryContext, pass: ClaimPass) {
        if self.existing.is_some() {
            return;
        }
        let found = match (pass, &self.control_id, &self.preset) {
            (ClaimPass::ControlId, Some(id), _) => ctx.claim_condition_by_control_id(id),
            (ClaimPass::Concept, None, Some(preset)) => {
                let concept = preset.id;
                ctx.claim_condition(|c| c.condition.coded() == Some(concept))
            }
            (ClaimPass::Position, None, None) => ctx.claim_condition(|_| true),
            _ => None,
        };
        if let Some(found) = found {
            self.prefill(&found);
            self.existing = Some(found);
        }
    }

    fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        let concept = match &self.preset {
            Some(preset) => view_value(Some(preset.name.as_str())),
            None => self.concept.render(ctx)?,
        };
        let mut parts = vec![
            format!(
                "<span class=\"condition-concept\">{}</span>",
                join_parts([concept, self.concept_error.render(ctx)?])
            ),
            format!(
                "<span class=\"condition-status\">{}</span>",
                join_parts([self.status.render(ctx)?, self.status_error.render(ctx)?])
            ),
            format!(
                "<span class=\"condition-dates\">{}</span>",
                join_parts([
                    self.onset.render(ctx)?,
                    self.end.render(ctx)?,
                    self.dates_error.render(ctx)?,
                ])
            ),
        ];
        if let Some(detail) = &self.detail {
            parts.push(format!(
                "<span class=\"condition-detail\">{}</span>",
                detail.render(ctx)?
            ));
        }
        Ok(format!("<div class=\"condition\">{}</div>", join_parts(parts)))
    }

    fn validate_submission(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
    ) -> FormResult<Vec<SubmissionError>> {
        let mut errors = Vec::new();
        self.read(ctx, submission, &mut errors)?;
        Ok(errors)
    }

    fn handle_submission(
        &self,
        ctx: &FormEntryContext,
        record: &mut PendingRecord,
        submission: &Submission,
    ) -> FormResult<()> {
        let mut ignored = Vec::new();
        let entered = self.read(ctx, submission, &mut ignored)?;
        let matched = self.existing.as_ref().map(|found| found.id);

        let (Some(concept), Some(status)) = (entered.concept, entered.status) else {
            if let Some(condition) = matched.and_then(|id| record.condition_mut(id)) {
                tracing::debug!(condition = %condition.id, "voiding condition removed from the form");
                condition.voided = true;
            }
            return Ok(());
        };

        if let Some(condition) = matched.and_then(|id| record.condition_mut(id)) {
            tracing::debug!(condition = %condition.id, "updating condition");
            condition.condition = concept;
            condition.clinical_status = status;
            condition.onset_date = entered.onset;
            condition.end_date = entered.end;
            if self.detail.is_some() {
                condition.additional_detail = entered.detail;
            }
            return Ok(());
        }

        let condition = Condition {
            id: Uuid::new_v4(),
            control_id: self.control_id.clone(),
            condition: concept,
            clinical_status: status,
            onset_date: entered.onset,
            end_date: entered.end,
            additional_detail: entered.detail,
            voided: false,
        };
        tracing::debug!(condition = %condition.id, "recording condition");
        record.encounter_mut().conditions.push(condition);
        Ok(())
    }
}

impl fmt::Debug for ConditionElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionElement")
            .field("required", &self.required)
            .field("control_id", &self.control_id)
            .field("preset", &self.preset.as_ref().map(|c| c.id))
            .field("concept", self.concept.field())
            .field("existing", &self.existing.as_ref().map(|c| c.id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormEntryConfig;
    use crate::context::Mode;
    use crate::record::Encounter;
    use crate::session::{FormEntrySession, SubmissionOutcome};
    use crate::test_support::{context, enter_context, fixed_now, services, submitted_from_html, PATIENT};
    use vpr_types::ConceptId;

    fn build(ctx: &mut FormEntryContext, pairs: &[(&str, &str)]) -> ConditionElement {
        ConditionElement::new(
            ctx,
            &services(fixed_now()),
            &TagAttributes::from_pairs(pairs.iter().copied()),
        )
        .expect("builds")
    }

    fn claim_all(ctx: &mut FormEntryContext, elements: &mut [&mut ConditionElement]) {
        for pass in ClaimPass::ALL {
            for element in elements.iter_mut() {
                element.claim_existing(ctx, pass);
            }
        }
    }

    /// A form made only of condition occurrences, one attribute list each.
    fn conditions_form(
        mode: Mode,
        existing: Option<Encounter>,
        occurrences: &[&[(&'static str, &'static str)]],
    ) -> FormEntrySession {
        let mut builder = FormEntrySession::builder(
            mode,
            Arc::new(FormEntryConfig::default()),
            services(fixed_now()),
            PATIENT,
        )
        .existing_encounter(existing);
        for pairs in occurrences {
            let attrs = TagAttributes::from_pairs(pairs.iter().copied());
            builder = builder.element(move |ctx, svc| ConditionElement::new(ctx, svc, &attrs));
        }
        builder.build().expect("builds")
    }

    fn applied(session: &mut FormEntrySession, submission: Submission) -> Encounter {
        match session.submit(submission).expect("submits") {
            SubmissionOutcome::Applied(encounter) => encounter,
            SubmissionOutcome::Rejected { errors, .. } => panic!("rejected: {errors:?}"),
        }
    }

    fn apply_all(
        ctx: &FormEntryContext,
        elements: &[&ConditionElement],
        record: &mut PendingRecord,
        submission: &Submission,
    ) {
        for element in elements {
            assert!(element
                .validate_submission(ctx, submission)
                .expect("validates")
                .is_empty());
        }
        for element in elements {
            element
                .handle_submission(ctx, record, submission)
                .expect("applies");
        }
    }

    fn diabetes(status: ClinicalStatus) -> Condition {
        Condition {
            id: Uuid::new_v4(),
            control_id: None,
            condition: CodedOrFreeText::Coded {
                concept: ConceptId(119481),
                display: "Diabetes mellitus".into(),
            },
            clinical_status: status,
            onset_date: None,
            end_date: None,
            additional_detail: None,
            voided: false,
        }
    }

    #[test]
    fn widgets_are_allocated_in_a_fixed_order() {
        let mut ctx = enter_context();
        let element = build(&mut ctx, &[("showAdditionalDetail", "true")]);
        assert_eq!(element.concept.field().as_str(), "w1");
        assert_eq!(element.concept_error.field().as_str(), "w2");
        assert_eq!(element.status.field().as_str(), "w3");
        assert_eq!(element.status_error.field().as_str(), "w4");
        assert_eq!(element.onset.field().as_str(), "w5");
        assert_eq!(element.end.field().as_str(), "w6");
        assert_eq!(element.dates_error.field().as_str(), "w7");
        assert_eq!(element.detail.as_ref().map(|d| d.field().as_str()), Some("w8"));
    }

    #[test]
    fn required_preset_with_only_status_yields_exactly_one_condition() {
        let mut ctx = enter_context();
        let element = build(&mut ctx, &[("required", "true"), ("conceptId", "117399")]);
        let submission = Submission::from_pairs([("w3", "active")]);

        let mut record = PendingRecord::new(Encounter::new(PATIENT, "Clinic"));
        apply_all(&ctx, &[&element], &mut record, &submission);
        let conditions = &record.encounter().conditions;
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].condition.coded(), Some(ConceptId(117399)));
        assert_eq!(conditions[0].clinical_status, ClinicalStatus::Active);
        assert_eq!(conditions[0].onset_date, None);
    }

    #[test]
    fn validation_pairs_concept_and_status() {
        let mut ctx = enter_context();
        let required = build(&mut ctx, &[("required", "true")]);
        let errors = required
            .validate_submission(&ctx, &Submission::new())
            .expect("validates");
        assert_eq!(errors, vec![SubmissionError {
            field: "w2".into(),
            message_key: MSG_REQUIRED.into(),
        }]);

        let mut ctx = enter_context();
        let optional = build(&mut ctx, &[]);
        let concept_only = Submission::from_pairs([("w1", "Epilepsy"), ("w1_hid", "3476")]);
        let errors = optional.validate_submission(&ctx, &concept_only).expect("validates");
        assert_eq!(errors, vec![SubmissionError {
            field: "w4".into(),
            message_key: MSG_REQUIRED.into(),
        }]);

        let status_only = Submission::from_pairs([("w3", "inactive")]);
        assert!(optional
            .validate_submission(&ctx, &status_only)
            .expect("validates")
            .is_empty());
        let mut ctx = enter_context();
        let required = build(&mut ctx, &[("required", "true")]);
        let errors = required.validate_submission(&ctx, &status_only).expect("validates");
        assert_eq!(errors, vec![SubmissionError {
            field: "w2".into(),
            message_key: MSG_REQUIRED.into(),
        }]);

        assert!(optional
            .validate_submission(&ctx, &Submission::new())
            .expect("validates")
            .is_empty());
    }

    #[test]
    fn end_date_before_onset_is_rejected() {
        let mut ctx = enter_context();
        let element = build(&mut ctx, &[]);
        let submission = Submission::from_pairs([
            ("w1", "Epilepsy"),
            ("w1_hid", "3476"),
            ("w3", "history-of"),
            ("w5", "2020-05-01"),
            ("w6", "2019-01-01"),
        ]);
        let errors = element.validate_submission(&ctx, &submission).expect("validates");
        assert_eq!(errors, vec![SubmissionError {
            field: "w7".into(),
            message_key: MSG_END_BEFORE_ONSET.into(),
        }]);
    }

    #[test]
    fn unknown_coded_concept_is_invalid() {
        let mut ctx = enter_context();
        let element = build(&mut ctx, &[]);
        let submission = Submission::from_pairs([("w1", "Mystery"), ("w1_hid", "424242"), ("w3", "active")]);
        let errors = element.validate_submission(&ctx, &submission).expect("validates");
        assert_eq!(errors, vec![SubmissionError {
            field: "w2".into(),
            message_key: MSG_INVALID_CONCEPT.into(),
        }]);
    }

    #[test]
    fn blank_control_id_is_a_configuration_error() {
        let mut ctx = enter_context();
        let err = ConditionElement::new(
            &mut ctx,
            &services(fixed_now()),
            &TagAttributes::from_pairs([("controlId", "  ")]),
        )
        .expect_err("blank control id");
        assert!(matches!(err, FormError::InvalidAttribute { attribute, .. } if attribute == "controlId"));
    }

    #[test]
    fn two_occurrences_create_two_conditions_and_edit_voids_the_removed_one() {
        let mut ctx = enter_context();
        let first = build(&mut ctx, &[]);
        let second = build(&mut ctx, &[]);
        // First occurrence uses w1..w7, the second w8..w14.
        let submission = Submission::from_pairs([
            ("w1", "Epilepsy"),
            ("w1_hid", "3476"),
            ("w3", "active"),
            ("w8", "Back pain after lifting"),
            ("w10", "inactive"),
        ]);
        let mut record = PendingRecord::new(Encounter::new(PATIENT, "Clinic"));
        apply_all(&ctx, &[&first, &second], &mut record, &submission);
        let saved = record.finish();
        assert_eq!(saved.conditions.len(), 2);

        let mut ctx = context(Mode::Edit, Some(saved.clone()));
        let mut first = build(&mut ctx, &[]);
        let mut second = build(&mut ctx, &[]);
        claim_all(&mut ctx, &mut [&mut first, &mut second]);
        assert_eq!(first.matched().map(|c| c.id), Some(saved.conditions[0].id));
        assert_eq!(second.matched().map(|c| c.id), Some(saved.conditions[1].id));

        let removal = Submission::from_pairs([
            ("w1", "Epilepsy"),
            ("w1_hid", "3476"),
            ("w3", "active"),
            ("w8", ""),
            ("w8_hid", ""),
            ("w10", "inactive"),
        ]);
        let mut record = PendingRecord::new(saved.clone());
        apply_all(&ctx, &[&first, &second], &mut record, &removal);
        let edited = record.finish();

        assert_eq!(edited.conditions.len(), 2);
        let active: Vec<_> = edited.active_conditions().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, saved.conditions[0].id);
        assert!(edited.conditions[1].voided);
    }

    #[test]
    fn duplicate_concepts_reconcile_in_persisted_order() {
        let mut encounter = Encounter::new(PATIENT, "Clinic");
        encounter.conditions.push(diabetes(ClinicalStatus::Active));
        encounter.conditions.push(diabetes(ClinicalStatus::Inactive));
        let (first_id, second_id) = (encounter.conditions[0].id, encounter.conditions[1].id);

        let mut ctx = context(Mode::Edit, Some(encounter.clone()));
        let mut first = build(&mut ctx, &[("conceptId", "119481")]);
        let mut second = build(&mut ctx, &[("conceptId", "119481")]);
        claim_all(&mut ctx, &mut [&mut first, &mut second]);
        assert_eq!(first.matched().map(|c| c.id), Some(first_id));
        assert_eq!(second.matched().map(|c| c.id), Some(second_id));

        // Only the second occurrence keeps a status; the first is cleared.
        let submission = Submission::from_pairs([("w10", "history-of")]);
        let mut record = PendingRecord::new(encounter);
        apply_all(&ctx, &[&first, &second], &mut record, &submission);
        let edited = record.finish();

        assert!(edited.conditions[0].voided);
        assert!(!edited.conditions[1].voided);
        assert_eq!(edited.conditions[1].clinical_status, ClinicalStatus::HistoryOf);
    }

    #[test]
    fn control_id_matches_regardless_of_position() {
        let mut encounter = Encounter::new(PATIENT, "Clinic");
        encounter.conditions.push(diabetes(ClinicalStatus::Active));
        let mut tagged = diabetes(ClinicalStatus::Inactive);
        tagged.control_id = Some(ControlId::new("dm_followup").expect("valid control id"));
        encounter.conditions.push(tagged);
        let tagged_id = encounter.conditions[1].id;

        let mut ctx = context(Mode::Edit, Some(encounter));
        let mut untagged = build(&mut ctx, &[]);
        let mut element = build(&mut ctx, &[("controlId", "dm_followup")]);
        claim_all(&mut ctx, &mut [&mut untagged, &mut element]);
        assert_eq!(element.matched().map(|c| c.id), Some(tagged_id));
        assert_ne!(untagged.matched().map(|c| c.id), Some(tagged_id));
    }

    #[test]
    fn view_mode_renders_values_without_error_markup() {
        let mut encounter = Encounter::new(PATIENT, "Clinic");
        encounter.conditions.push(diabetes(ClinicalStatus::Active));
        let mut ctx = context(Mode::View, Some(encounter));
        let mut element = build(&mut ctx, &[]);
        claim_all(&mut ctx, &mut [&mut element]);
        let html = element.render(&ctx).expect("renders");
        assert!(html.contains("<span class=\"value\">Diabetes mellitus</span>"));
        assert!(html.contains("<span class=\"value\">Active</span>"));
        assert!(!html.contains("field-error"));
    }

    #[test]
    fn free_occurrence_never_takes_a_later_preset_record() {
        let form: &[&[(&str, &str)]] = &[&[], &[("conceptId", "117399"), ("required", "true")]];
        // Free occurrence uses w1..w7, the preset w8..w14.
        let mut entry = conditions_form(Mode::Enter, None, form);
        let saved = applied(&mut entry, Submission::from_pairs([("w10", "active")]));
        assert_eq!(saved.conditions.len(), 1);

        let mut edit = conditions_form(Mode::Edit, Some(saved.clone()), form);
        let html = edit.render().expect("renders");
        let resubmitted = submitted_from_html(&html);
        assert_eq!(resubmitted.get("w1"), Some(""));
        assert_eq!(resubmitted.get("w3"), None);
        assert_eq!(resubmitted.get("w10"), Some("active"));

        let edited = applied(&mut edit, resubmitted);
        assert_eq!(edited.conditions, saved.conditions);
    }

    #[test]
    fn clearing_the_concept_alone_removes_the_condition() {
        let form: &[&[(&str, &str)]] = &[&[]];
        let mut entry = conditions_form(Mode::Enter, None, form);
        let saved = applied(
            &mut entry,
            Submission::from_pairs([("w1", "Epilepsy"), ("w1_hid", "3476"), ("w3", "active")]),
        );
        assert_eq!(saved.active_conditions().count(), 1);

        let mut edit = conditions_form(Mode::Edit, Some(saved.clone()), form);
        let mut submission = submitted_from_html(&edit.render().expect("renders"));
        submission.remove("w1");
        submission.remove("w1_hid");
        assert_eq!(submission.get("w3"), Some("active"));

        let edited = applied(&mut edit, submission);
        assert_eq!(edited.conditions.len(), 1);
        assert!(edited.conditions[0].voided);
        assert_eq!(edited.active_conditions().count(), 0);
    }
}
