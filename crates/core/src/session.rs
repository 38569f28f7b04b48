//! Form entry session: one form, built in one context, rendered and submitted.
//!
//! A session is assembled with [`FormEntrySession::builder`]. Element factories run in document
//! order during [`FormEntrySessionBuilder::build`], so field identifiers follow the order the
//! form declares its parts in.

use crate::config::FormEntryConfig;
use crate::context::{FormEntryContext, Mode};
use crate::controller::FormSubmissionController;
use crate::element::SubmissionElement;
use crate::error::SubmissionError;
use crate::record::{Encounter, PendingRecord};
use crate::services::FormServices;
use crate::submission::Submission;
use crate::{FormError, FormResult};
use std::fmt;
use std::sync::Arc;
use vpr_types::{LocationId, PatientId};

/// Encounter type given to new encounters when the form does not name one.
pub const DEFAULT_ENCOUNTER_TYPE: &str = "Encounter";

type ElementFactory = Box<
    dyn FnOnce(&mut FormEntryContext, &FormServices) -> FormResult<Box<dyn SubmissionElement>>
        + Send,
>;

enum Step {
    Html(String),
    Element(ElementFactory),
}

/// Result of [`FormEntrySession::submit`].
#[derive(Debug)]
pub enum SubmissionOutcome {
    /// Every element validated; the finished encounter is ready to persist.
    Applied(Encounter),
    /// Nothing was applied. `html` is the form re-rendered with the submitted values and
    /// error messages.
    Rejected {
        errors: Vec<SubmissionError>,
        html: String,
    },
}

pub struct FormEntrySessionBuilder {
    mode: Mode,
    config: Arc<FormEntryConfig>,
    services: FormServices,
    patient: PatientId,
    existing: Option<Encounter>,
    default_location: Option<LocationId>,
    encounter_type: String,
    steps: Vec<Step>,
}

impl FormEntrySessionBuilder {
    /// The encounter to view or edit. Required in VIEW and EDIT mode.
    pub fn existing_encounter(mut self, encounter: Option<Encounter>) -> Self {
        self.existing = encounter;
        self
    }

    /// Location pre-selected by encounter details when the form names none.
    pub fn default_location(mut self, location: Option<LocationId>) -> Self {
        self.default_location = location;
        self
    }

    pub fn encounter_type(mut self, encounter_type: impl Into<String>) -> Self {
        self.encounter_type = encounter_type.into();
        self
    }

    /// Append static markup.
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.steps.push(Step::Html(html.into()));
        self
    }

    /// Append an element, constructed against the session's context at build time.
    pub fn element<E, F>(mut self, factory: F) -> Self
    where
        E: SubmissionElement + 'static,
        F: FnOnce(&mut FormEntryContext, &FormServices) -> FormResult<E> + Send + 'static,
    {
        self.steps.push(Step::Element(Box::new(move |ctx, services| {
            factory(ctx, services).map(|element| Box::new(element) as Box<dyn SubmissionElement>)
        })));
        self
    }

    /// Create the context, construct every element in order, then let the elements claim the
    /// persisted entries they edit.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error raised by an element, or a mode mismatch between
    /// `mode` and the existing encounter.
    pub fn build(self) -> FormResult<FormEntrySession> {
        let mut ctx = FormEntryContext::new(
            self.mode,
            self.config,
            &self.services,
            self.patient,
            self.existing,
        )?;
        ctx.set_default_location(self.default_location);

        let mut controller = FormSubmissionController::new();
        for step in self.steps {
            match step {
                Step::Html(html) => controller.push_html(html),
                Step::Element(factory) => controller.push_element(factory(&mut ctx, &self.services)?),
            }
        }
        controller.claim_existing(&mut ctx);
        tracing::debug!(mode = %ctx.mode(), fields = ctx.fields().count(), "form entry session built");

        Ok(FormEntrySession {
            ctx,
            controller,
            encounter_type: self.encounter_type,
        })
    }
}

impl fmt::Debug for FormEntrySessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEntrySessionBuilder")
            .field("mode", &self.mode)
            .field("patient", &self.patient)
            .field("encounter_type", &self.encounter_type)
            .field("steps", &self.steps.len())
            .finish_non_exhaustive()
    }
}

pub struct FormEntrySession {
    ctx: FormEntryContext,
    controller: FormSubmissionController,
    encounter_type: String,
}

impl FormEntrySession {
    pub fn builder(
        mode: Mode,
        config: Arc<FormEntryConfig>,
        services: FormServices,
        patient: PatientId,
    ) -> FormEntrySessionBuilder {
        FormEntrySessionBuilder {
            mode,
            config,
            services,
            patient,
            existing: None,
            default_location: None,
            encounter_type: DEFAULT_ENCOUNTER_TYPE.to_owned(),
            steps: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.ctx.mode()
    }

    pub fn context(&self) -> &FormEntryContext {
        &self.ctx
    }

    /// # Errors
    ///
    /// Propagates element render failures.
    pub fn render(&self) -> FormResult<String> {
        self.controller.render(&self.ctx)
    }

    /// Validate without applying anything.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::ReadOnlyMode`] for a VIEW session.
    pub fn validate(&self, submission: &Submission) -> FormResult<Vec<SubmissionError>> {
        if self.ctx.mode() == Mode::View {
            return Err(FormError::ReadOnlyMode);
        }
        self.controller.validate(&self.ctx, submission)
    }

    /// Validate `submission` and, only when every element accepts it, apply it to a pending
    /// record built from the existing encounter (or a new one in ENTER mode).
    ///
    /// # Errors
    ///
    /// Returns [`FormError::ReadOnlyMode`] for a VIEW session. Validation failures are not
    /// errors; they produce [`SubmissionOutcome::Rejected`].
    pub fn submit(&mut self, submission: Submission) -> FormResult<SubmissionOutcome> {
        let errors = self.validate(&submission)?;
        if !errors.is_empty() {
            tracing::info!(
                mode = %self.ctx.mode(),
                patient = %self.ctx.patient(),
                errors = errors.len(),
                "form submission rejected"
            );
            self.ctx.show_submission(submission, &errors);
            let html = self.controller.render(&self.ctx)?;
            return Ok(SubmissionOutcome::Rejected { errors, html });
        }

        let encounter = match self.ctx.existing_encounter() {
            Some(existing) => existing.clone(),
            None => Encounter::new(self.ctx.patient(), self.encounter_type.as_str()),
        };
        let mut record = PendingRecord::new(encounter);
        self.controller.apply(&self.ctx, &mut record, &submission)?;
        let encounter = record.finish();
        tracing::info!(
            mode = %self.ctx.mode(),
            patient = %self.ctx.patient(),
            encounter = %encounter.id,
            voided = encounter.voided,
            "form submission applied"
        );
        Ok(SubmissionOutcome::Applied(encounter))
    }
}

impl fmt::Debug for FormEntrySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEntrySession")
            .field("mode", &self.ctx.mode())
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MSG_REQUIRED;
    use crate::element::{ObservationElement, SubmitButtonElement, TagAttributes};
    use crate::record::{ObsValue, Observation};
    use crate::test_support::{fixed_now, services, submitted_from_html, PATIENT};
    use vpr_types::ConceptId;

    fn weight_session(mode: Mode, existing: Option<Encounter>) -> FormResult<FormEntrySession> {
        FormEntrySession::builder(
            mode,
            Arc::new(FormEntryConfig::default()),
            services(fixed_now()),
            PATIENT,
        )
        .existing_encounter(existing)
        .encounter_type("Vitals")
        .html("<h2>Vitals</h2>")
        .element(|ctx, services| {
            ObservationElement::new(
                ctx,
                services,
                &TagAttributes::from_pairs([("conceptId", "5089"), ("required", "true")]),
            )
        })
        .element(|_, _| Ok(SubmitButtonElement::new(&TagAttributes::new())))
        .build()
    }

    #[test]
    fn rejected_submission_echoes_values_and_errors() {
        let mut session = weight_session(Mode::Enter, None).expect("builds");
        let outcome = session
            .submit(Submission::from_pairs([("w1", "heavy")]))
            .expect("submits");

        let SubmissionOutcome::Rejected { errors, html } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(errors, vec![SubmissionError {
            field: "w2".into(),
            message_key: "notANumber".into(),
        }]);
        assert!(html.contains("value=\"heavy\""));
        assert!(html.contains("<span class=\"error field-error\" id=\"w2\">notANumber</span>"));
    }

    #[test]
    fn valid_submission_produces_a_new_encounter() {
        let mut session = weight_session(Mode::Enter, None).expect("builds");
        let html = session.render().expect("renders");
        assert!(html.starts_with("<h2>Vitals</h2><label for=\"w1\">"));

        let mut submission = submitted_from_html(&html);
        submission.set("w1", "72");
        let SubmissionOutcome::Applied(encounter) = session.submit(submission).expect("submits") else {
            panic!("expected the submission to apply");
        };
        assert_eq!(encounter.patient, PATIENT);
        assert_eq!(encounter.encounter_type, "Vitals");
        assert_eq!(encounter.observations.len(), 1);
        assert_eq!(encounter.observations[0].value, ObsValue::Numeric(72.0));
    }

    #[test]
    fn required_value_missing_applies_nothing() {
        let mut existing = Encounter::new(PATIENT, "Vitals");
        existing
            .observations
            .push(Observation::new(ConceptId(5089), ObsValue::Numeric(70.0)));
        let mut session = weight_session(Mode::Edit, Some(existing)).expect("builds");

        let outcome = session
            .submit(Submission::from_pairs([("w1", "")]))
            .expect("submits");
        assert!(matches!(
            outcome,
            SubmissionOutcome::Rejected { ref errors, .. } if errors[0].message_key == MSG_REQUIRED
        ));
    }

    #[test]
    fn view_sessions_refuse_submissions() {
        let existing = Encounter::new(PATIENT, "Vitals");
        let mut session = weight_session(Mode::View, Some(existing)).expect("builds");
        assert!(matches!(
            session.submit(Submission::new()),
            Err(FormError::ReadOnlyMode)
        ));
        assert!(!session.render().expect("renders").contains("<button"));
    }

    #[test]
    fn configuration_errors_abort_the_build() {
        let result = FormEntrySession::builder(
            Mode::Enter,
            Arc::new(FormEntryConfig::default()),
            services(fixed_now()),
            PATIENT,
        )
        .element(|ctx, services| ObservationElement::new(ctx, services, &TagAttributes::new()))
        .build();
        assert!(matches!(result, Err(FormError::MissingAttribute(_))));
    }
}
