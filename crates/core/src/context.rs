//! Form entry context: the mode, widget registry and error pairing for one render or submit.
//!
//! A context is built once per request. Elements register their widgets with it while they are
//! constructed, and the identifiers handed out during that construction are the only ones the
//! later submission can be parsed against.

use crate::config::FormEntryConfig;
use crate::error::SubmissionError;
use crate::field_id::{ContextId, FieldIdentifier, FieldIdentifierAllocator};
use crate::record::{Condition, Encounter, Observation};
use crate::services::{Clock, FormServices, PreferenceService};
use crate::submission::Submission;
use crate::widget::{ErrorWidget, RegisteredWidget, Widget, WidgetKind};
use crate::{FormError, FormResult};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use vpr_types::{ConceptId, ControlId, LocationId, PatientId};

/// Rendering mode, fixed for the lifetime of a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    View,
    Enter,
    Edit,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::View => "VIEW",
            Mode::Enter => "ENTER",
            Mode::Edit => "EDIT",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VIEW" => Ok(Mode::View),
            "ENTER" => Ok(Mode::Enter),
            "EDIT" => Ok(Mode::Edit),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// What the registry knows about one allocated field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Registration {
    Widget {
        kind: WidgetKind,
        error_field: Option<FieldIdentifier>,
    },
    Error {
        widget_field: FieldIdentifier,
    },
}

/// Read-only view of the record being edited or viewed.
#[derive(Clone, Copy, Debug)]
pub struct ExistingRecord<'a> {
    encounter: &'a Encounter,
}

impl<'a> ExistingRecord<'a> {
    pub fn encounter_type(&self) -> &'a str {
        &self.encounter.encounter_type
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.encounter.datetime
    }

    pub fn provider(&self) -> Option<vpr_types::PersonId> {
        self.encounter.provider
    }

    pub fn location(&self) -> Option<LocationId> {
        self.encounter.location
    }

    pub fn voided(&self) -> bool {
        self.encounter.voided
    }

    /// First active observation recorded for `concept`, if any.
    pub fn observation(&self, concept: ConceptId) -> Option<&'a Observation> {
        self.encounter
            .active_observations()
            .find(|o| o.concept == concept)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &'a Condition> {
        self.encounter.active_conditions()
    }
}

pub struct FormEntryContext {
    id: ContextId,
    mode: Mode,
    config: Arc<FormEntryConfig>,
    preferences: Arc<dyn PreferenceService>,
    clock: Arc<dyn Clock>,
    patient: PatientId,
    existing: Option<Encounter>,
    default_location: Option<LocationId>,
    allocator: FieldIdentifierAllocator,
    registry: IndexMap<String, Registration>,
    claimed_conditions: HashSet<Uuid>,
    resubmission: Option<Submission>,
    error_messages: HashMap<String, String>,
}

impl FormEntryContext {
    /// Create a context for one render or submit cycle.
    ///
    /// # Arguments
    ///
    /// * `mode` - Rendering mode, fixed for the context's lifetime.
    /// * `existing` - The encounter being viewed or edited. Required in VIEW and EDIT, rejected
    ///   in ENTER.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::ModeMismatch`] when `existing` does not agree with `mode`.
    pub fn new(
        mode: Mode,
        config: Arc<FormEntryConfig>,
        services: &FormServices,
        patient: PatientId,
        existing: Option<Encounter>,
    ) -> FormResult<Self> {
        match (mode, existing.is_some()) {
            (Mode::Enter, true) => {
                return Err(FormError::ModeMismatch {
                    mode: mode.to_string(),
                    reason: "cannot start from an existing encounter",
                })
            }
            (Mode::View | Mode::Edit, false) => {
                return Err(FormError::ModeMismatch {
                    mode: mode.to_string(),
                    reason: "requires an existing encounter",
                })
            }
            _ => {}
        }

        let id = ContextId::next();
        tracing::debug!(%mode, ?id, "created form entry context");
        Ok(Self {
            id,
            mode,
            config,
            preferences: services.preferences.clone(),
            clock: services.clock.clone(),
            patient,
            existing,
            default_location: None,
            allocator: FieldIdentifierAllocator::new(id),
            registry: IndexMap::new(),
            claimed_conditions: HashSet::new(),
            resubmission: None,
            error_messages: HashMap::new(),
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &FormEntryConfig {
        &self.config
    }

    pub fn patient(&self) -> PatientId {
        self.patient
    }

    pub fn existing(&self) -> Option<ExistingRecord<'_>> {
        self.existing
            .as_ref()
            .map(|encounter| ExistingRecord { encounter })
    }

    pub(crate) fn existing_encounter(&self) -> Option<&Encounter> {
        self.existing.as_ref()
    }

    pub fn set_default_location(&mut self, location: Option<LocationId>) {
        self.default_location = location;
    }

    pub fn default_location(&self) -> Option<LocationId> {
        self.default_location
    }

    /// Localised text for a message key.
    pub fn message(&self, key: &str) -> String {
        self.preferences.message(key)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Register a widget, assigning it the next field identifier.
    pub fn register_widget(&mut self, widget: Box<dyn Widget>) -> RegisteredWidget {
        let field = self.allocator.allocate();
        self.registry.insert(
            field.as_str().to_owned(),
            Registration::Widget {
                kind: widget.kind(),
                error_field: None,
            },
        );
        RegisteredWidget::new(field, widget)
    }

    /// Allocate an error widget and pair it with `widget`.
    ///
    /// # Errors
    ///
    /// Returns a programming error if `widget` was not registered here or already has an error
    /// widget.
    pub fn register_error_widget(&mut self, widget: &RegisteredWidget) -> FormResult<ErrorWidget> {
        match self.lookup(widget.field())? {
            Registration::Widget {
                error_field: Some(_),
                ..
            } => return Err(FormError::DuplicateErrorWidget(widget.field().to_string())),
            Registration::Error { .. } => {
                return Err(FormError::UnregisteredWidget(widget.field().to_string()))
            }
            Registration::Widget {
                error_field: None, ..
            } => {}
        }

        let field = self.allocator.allocate();
        self.registry.insert(
            field.as_str().to_owned(),
            Registration::Error {
                widget_field: widget.field().clone(),
            },
        );
        if let Some(Registration::Widget { error_field, .. }) =
            self.registry.get_mut(widget.field().as_str())
        {
            *error_field = Some(field.clone());
        }
        Ok(ErrorWidget::new(field, widget.field().clone()))
    }

    /// Find the registration for a field issued by this context.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::ForeignField`] for identifiers issued by another context and
    /// [`FormError::UnregisteredWidget`] for unknown ones.
    pub fn lookup(&self, field: &FieldIdentifier) -> FormResult<&Registration> {
        if field.context() != self.id {
            return Err(FormError::ForeignField(field.to_string()));
        }
        self.registry
            .get(field.as_str())
            .ok_or_else(|| FormError::UnregisteredWidget(field.to_string()))
    }

    /// Error widget paired with `field`, if one was registered.
    pub fn error_field_for(&self, field: &FieldIdentifier) -> FormResult<Option<&FieldIdentifier>> {
        match self.lookup(field)? {
            Registration::Widget { error_field, .. } => Ok(error_field.as_ref()),
            Registration::Error { .. } => Ok(None),
        }
    }

    /// Registered field names in allocation order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.registry.keys().map(String::as_str)
    }

    /// Claim the persisted condition carrying `control_id`.
    pub fn claim_condition_by_control_id(&mut self, control_id: &ControlId) -> Option<Condition> {
        let found = self
            .existing
            .as_ref()?
            .active_conditions()
            .find(|c| {
                c.control_id.as_ref() == Some(control_id) && !self.claimed_conditions.contains(&c.id)
            })
            .cloned()?;
        self.claimed_conditions.insert(found.id);
        Some(found)
    }

    /// Claim the first unclaimed persisted condition without a control identifier that matches
    /// `predicate`, in persisted order.
    pub fn claim_condition<F>(&mut self, predicate: F) -> Option<Condition>
    where
        F: Fn(&Condition) -> bool,
    {
        let found = self
            .existing
            .as_ref()?
            .active_conditions()
            .find(|c| {
                c.control_id.is_none() && !self.claimed_conditions.contains(&c.id) && predicate(c)
            })
            .cloned()?;
        tracing::debug!(condition = %found.id, "claimed persisted condition");
        self.claimed_conditions.insert(found.id);
        Some(found)
    }

    /// Offset instants are displayed and entered in at `at`.
    pub fn display_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        if self.config.timezone_conversions() {
            self.preferences
                .user_timezone(at)
                .unwrap_or_else(|| self.config.default_offset())
        } else {
            self.config.default_offset()
        }
    }

    pub fn to_local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.display_offset(instant))
    }

    /// Today's date in the display timezone.
    pub fn today(&self) -> NaiveDate {
        self.to_local(self.now()).date_naive()
    }

    /// Interpret a wall-clock time in `offset` as an instant.
    pub fn instant_from_local(
        local: NaiveDateTime,
        offset: FixedOffset,
    ) -> Option<DateTime<Utc>> {
        offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Interpret a wall-clock time in the display timezone as an instant.
    pub fn local_to_instant(&self, local: NaiveDateTime) -> Option<DateTime<Utc>> {
        let offset = self.display_offset(self.now());
        Self::instant_from_local(local, offset)
    }

    /// Switch rendering to echo a rejected submission and show its errors.
    pub fn show_submission(&mut self, submission: Submission, errors: &[SubmissionError]) {
        self.error_messages.clear();
        for error in errors {
            self.error_messages
                .entry(error.field.clone())
                .or_insert_with(|| self.preferences.message(&error.message_key));
        }
        self.resubmission = Some(submission);
    }

    /// The submission being echoed back, after a failed validation.
    pub fn resubmission(&self) -> Option<&Submission> {
        self.resubmission.as_ref()
    }

    pub fn error_message(&self, field: &FieldIdentifier) -> Option<&str> {
        self.error_messages.get(field.as_str()).map(String::as_str)
    }
}

impl fmt::Debug for FormEntryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEntryContext")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("patient", &self.patient)
            .field("fields", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ClinicalStatus, CodedOrFreeText};
    use crate::test_support::{fixed_now, services};
    use crate::widget::TextWidget;

    fn context(mode: Mode, existing: Option<Encounter>) -> FormEntryContext {
        FormEntryContext::new(
            mode,
            Arc::new(FormEntryConfig::default()),
            &services(fixed_now()),
            PatientId(1),
            existing,
        )
        .expect("valid mode")
    }

    #[test]
    fn mode_must_agree_with_existing_encounter() {
        let cfg = Arc::new(FormEntryConfig::default());
        let svc = services(fixed_now());
        let err = FormEntryContext::new(Mode::Edit, cfg.clone(), &svc, PatientId(1), None)
            .expect_err("edit needs a record");
        assert!(matches!(err, FormError::ModeMismatch { .. }));

        let encounter = Encounter::new(PatientId(1), "Vitals");
        let err = FormEntryContext::new(Mode::Enter, cfg, &svc, PatientId(1), Some(encounter))
            .expect_err("enter starts empty");
        assert!(matches!(err, FormError::ModeMismatch { .. }));
    }

    #[test]
    fn lookup_finds_every_registered_widget() {
        let mut ctx = context(Mode::Enter, None);
        let widgets: Vec<_> = (0..5)
            .map(|_| ctx.register_widget(Box::new(TextWidget::new())))
            .collect();

        for widget in &widgets {
            let registration = ctx.lookup(widget.field()).expect("registered");
            assert!(matches!(
                registration,
                Registration::Widget {
                    kind: WidgetKind::Text,
                    ..
                }
            ));
        }
        let fields: Vec<_> = ctx.fields().collect();
        assert_eq!(fields, vec!["w1", "w2", "w3", "w4", "w5"]);
    }

    #[test]
    fn lookup_rejects_fields_from_another_context() {
        let mut first = context(Mode::Enter, None);
        let second = context(Mode::Enter, None);
        let widget = first.register_widget(Box::new(TextWidget::new()));

        let err = second.lookup(widget.field()).expect_err("foreign field");
        assert!(matches!(err, FormError::ForeignField(name) if name == "w1"));
    }

    #[test]
    fn error_widget_pairs_once() {
        let mut ctx = context(Mode::Enter, None);
        let widget = ctx.register_widget(Box::new(TextWidget::new()));
        let error = ctx.register_error_widget(&widget).expect("pairs");

        assert_eq!(error.field().as_str(), "w2");
        assert_eq!(
            ctx.error_field_for(widget.field()).expect("registered"),
            Some(error.field())
        );
        let err = ctx
            .register_error_widget(&widget)
            .expect_err("second pairing");
        assert!(matches!(err, FormError::DuplicateErrorWidget(_)));
    }

    #[test]
    fn claims_conditions_in_persisted_order_once() {
        let mut encounter = Encounter::new(PatientId(1), "Clinic");
        for name in ["Asthma", "Asthma"] {
            encounter.conditions.push(Condition {
                id: Uuid::new_v4(),
                control_id: None,
                condition: CodedOrFreeText::NonCoded(name.into()),
                clinical_status: ClinicalStatus::Active,
                onset_date: None,
                end_date: None,
                additional_detail: None,
                voided: false,
            });
        }
        let first_id = encounter.conditions[0].id;
        let second_id = encounter.conditions[1].id;
        let mut ctx = context(Mode::Edit, Some(encounter));

        assert_eq!(ctx.claim_condition(|_| true).map(|c| c.id), Some(first_id));
        assert_eq!(ctx.claim_condition(|_| true).map(|c| c.id), Some(second_id));
        assert!(ctx.claim_condition(|_| true).is_none());
    }

    #[test]
    fn display_offset_ignores_preference_when_conversions_disabled() {
        let cfg = FormEntryConfig::new(
            "%d/%m/%Y".into(),
            "%d/%m/%Y %H:%M".into(),
            "%H:%M".into(),
            FixedOffset::east_opt(3600).expect("valid offset"),
            false,
        )
        .expect("valid config");
        let svc = crate::test_support::services_with_timezone(
            fixed_now(),
            FixedOffset::east_opt(5 * 3600),
        );
        let ctx = FormEntryContext::new(Mode::Enter, Arc::new(cfg), &svc, PatientId(1), None)
            .expect("valid mode");
        assert_eq!(
            ctx.display_offset(fixed_now()),
            FixedOffset::east_opt(3600).expect("valid offset")
        );
    }
}
