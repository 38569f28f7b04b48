//! Encounter details: date (and time), provider, location and the void control.

use super::{join_parts, read_widget, Parsed, SubmissionElement, TagAttributes};
use crate::constants::{DEFAULT_PROVIDER_ROLE, MSG_CANNOT_BE_IN_FUTURE, MSG_REQUIRED, MSG_VOIDED};
use crate::context::{FormEntryContext, Mode};
use crate::error::SubmissionError;
use crate::record::PendingRecord;
use crate::services::{EntityResolver, FormServices, Person};
use crate::submission::Submission;
use crate::widget::{
    CheckboxWidget, DateWidget, EntityOption, EntityWidget, ErrorWidget, RegisteredWidget,
    TimeWidget, Widget, WidgetValue, ZonedDateTimeWidget,
};
use crate::{FormError, FormResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use vpr_types::{LocationId, PersonId};

#[derive(Debug)]
enum DateFields {
    /// Date and time entered in the user's timezone, carrying the offset used.
    Zoned {
        widget: RegisteredWidget,
        error: ErrorWidget,
    },
    DateOnly {
        widget: RegisteredWidget,
        error: ErrorWidget,
    },
    DateAndTime {
        date: RegisteredWidget,
        date_error: ErrorWidget,
        time: RegisteredWidget,
        time_error: ErrorWidget,
    },
}

/// Submitted encounter instant, before the future check.
struct SubmittedDate {
    instant: DateTime<Utc>,
    local_date: NaiveDate,
    has_time: bool,
}

#[derive(Debug)]
pub struct EncounterDetailElement {
    date: Option<DateFields>,
    provider: Option<(RegisteredWidget, ErrorWidget)>,
    location: Option<(RegisteredWidget, ErrorWidget)>,
    void: Option<RegisteredWidget>,
}

impl EncounterDetailElement {
    /// Build the element from its tag attributes, registering only the enabled widgets.
    ///
    /// # Arguments
    ///
    /// * `attrs` - `date`, `showTime`, `defaultDate`, `provider`, `persons`, `role`,
    ///   `defaultProvider`, `location`, `order`, `defaultLocation`, `default` and
    ///   `showVoidEncounter`. `default` stands for `defaultProvider` when the provider is
    ///   enabled and for `defaultLocation` otherwise.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed attributes or unresolvable persons, roles
    /// and locations.
    pub fn new(
        ctx: &mut FormEntryContext,
        services: &FormServices,
        attrs: &TagAttributes,
    ) -> FormResult<Self> {
        let provider_enabled = attrs.flag("provider", false)?;
        let location_enabled = attrs.flag("location", false)?;

        let date = if attrs.flag("date", false)? {
            Some(Self::date_fields(ctx, attrs)?)
        } else {
            None
        };

        let provider = if provider_enabled {
            let default = attrs.get("defaultProvider").or_else(|| attrs.get("default"));
            let widget = Self::provider_widget(ctx, services, attrs, default)?;
            let mut widget = ctx.register_widget(Box::new(widget));
            let error = ctx.register_error_widget(&widget)?;
            if let Some(id) = ctx.existing().and_then(|e| e.provider()) {
                widget.set_initial_value(Some(WidgetValue::Entity(id.get())));
            }
            Some((widget, error))
        } else {
            None
        };

        let location = if location_enabled {
            let default = attrs.get("defaultLocation").or_else(|| {
                if provider_enabled {
                    None
                } else {
                    attrs.get("default")
                }
            });
            let widget = Self::location_widget(ctx, services.entities.as_ref(), attrs, default)?;
            let widget = ctx.register_widget(Box::new(widget));
            let error = ctx.register_error_widget(&widget)?;
            Some((widget, error))
        } else {
            None
        };

        let void = if attrs.flag("showVoidEncounter", false)? && ctx.mode() == Mode::Edit {
            let mut checkbox = CheckboxWidget::new(Some(ctx.message(MSG_VOIDED)));
            let voided = ctx.existing().is_some_and(|e| e.voided());
            checkbox.set_initial_value(Some(WidgetValue::Flag(voided)));
            Some(ctx.register_widget(Box::new(checkbox)))
        } else {
            None
        };

        Ok(Self {
            date,
            provider,
            location,
            void,
        })
    }

    fn date_fields(ctx: &mut FormEntryContext, attrs: &TagAttributes) -> FormResult<DateFields> {
        let initial = match ctx.existing() {
            Some(existing) => existing.datetime(),
            None => Self::default_date(ctx, attrs)?,
        };
        let show_time = attrs.flag("showTime", false)?;

        if show_time && ctx.config().timezone_conversions() {
            let mut zoned = ZonedDateTimeWidget::new(false);
            zoned.set_initial_value(initial.map(WidgetValue::Instant));
            let widget = ctx.register_widget(Box::new(zoned));
            let error = ctx.register_error_widget(&widget)?;
            return Ok(DateFields::Zoned { widget, error });
        }

        let local = initial.map(|instant| ctx.to_local(instant).naive_local());
        let mut date_widget = DateWidget::new();
        date_widget.set_initial_value(local.map(|dt| WidgetValue::Date(dt.date())));
        let date = ctx.register_widget(Box::new(date_widget));
        let date_error = ctx.register_error_widget(&date)?;
        if !show_time {
            return Ok(DateFields::DateOnly {
                widget: date,
                error: date_error,
            });
        }

        let mut time_widget = TimeWidget::new(false);
        time_widget.set_initial_value(local.map(|dt| WidgetValue::Time(dt.time())));
        let time = ctx.register_widget(Box::new(time_widget));
        let time_error = ctx.register_error_widget(&time)?;
        Ok(DateFields::DateAndTime {
            date,
            date_error,
            time,
            time_error,
        })
    }

    fn default_date(
        ctx: &FormEntryContext,
        attrs: &TagAttributes,
    ) -> FormResult<Option<DateTime<Utc>>> {
        let Some(raw) = attrs.get("defaultDate") else {
            return Ok(None);
        };
        if raw.eq_ignore_ascii_case("today") || raw.eq_ignore_ascii_case("now") {
            return Ok(Some(ctx.now()));
        }
        let date = NaiveDate::parse_from_str(raw, crate::constants::ISO_DATE_FORMAT)
            .map_err(|_| FormError::invalid_attribute("defaultDate", raw))?;
        Ok(ctx.local_to_instant(date.and_time(NaiveTime::MIN)))
    }

    fn provider_widget(
        ctx: &FormEntryContext,
        services: &FormServices,
        attrs: &TagAttributes,
        default: Option<&str>,
    ) -> FormResult<EntityWidget> {
        let entities = services.entities.as_ref();
        let options = provider_options(services, attrs)?
            .into_iter()
            .map(person_option)
            .collect();
        let mut widget = EntityWidget::new(options);

        if let Some(existing) = ctx.existing().and_then(|e| e.provider()) {
            let label = entities
                .person(&existing.to_string())
                .map(|p| p.name)
                .unwrap_or_else(|| existing.to_string());
            widget.ensure_option(EntityOption {
                id: existing.get(),
                label,
            });
        } else if let (Mode::Enter, Some(key)) = (ctx.mode(), default) {
            let person = if key.eq_ignore_ascii_case("currentuser") {
                entities
                    .current_user()
                    .ok_or_else(|| FormError::unresolved("current user", key))?
            } else {
                entities
                    .person(key)
                    .ok_or_else(|| FormError::unresolved("person", key))?
            };
            widget.set_initial_value(Some(WidgetValue::Entity(person.id.get())));
            widget.ensure_option(person_option(person));
        }
        Ok(widget)
    }

    fn location_widget(
        ctx: &FormEntryContext,
        entities: &dyn EntityResolver,
        attrs: &TagAttributes,
        default: Option<&str>,
    ) -> FormResult<EntityWidget> {
        let order = attrs.list("order");
        let locations = if order.is_empty() {
            entities.locations()
        } else {
            order
                .into_iter()
                .map(|key| {
                    entities
                        .location(key)
                        .ok_or_else(|| FormError::unresolved("location", key))
                })
                .collect::<FormResult<Vec<_>>>()?
        };
        let mut widget = EntityWidget::new(
            locations
                .into_iter()
                .map(|l| EntityOption {
                    id: l.id.get(),
                    label: l.name,
                })
                .collect(),
        );

        let initial: Option<LocationId> = match ctx.existing() {
            Some(existing) => existing.location(),
            None => match default {
                Some(key) => Some(
                    entities
                        .location(key)
                        .ok_or_else(|| FormError::unresolved("location", key))?
                        .id,
                ),
                None => ctx.default_location(),
            },
        };
        if let Some(id) = initial {
            if let Some(location) = entities.location(&id.to_string()) {
                widget.ensure_option(EntityOption {
                    id: id.get(),
                    label: location.name,
                });
            }
            widget.set_initial_value(Some(WidgetValue::Entity(id.get())));
        }
        Ok(widget)
    }

    fn read_date(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
        errors: &mut Vec<SubmissionError>,
    ) -> FormResult<Option<(SubmittedDate, &ErrorWidget)>> {
        let Some(fields) = &self.date else {
            return Ok(None);
        };
        match fields {
            DateFields::Zoned { widget, error } => {
                match read_widget(ctx, widget, error, submission, errors)? {
                    Parsed::Value(WidgetValue::Instant(instant)) => Ok(Some((
                        SubmittedDate {
                            instant,
                            local_date: ctx.to_local(instant).date_naive(),
                            has_time: true,
                        },
                        error,
                    ))),
                    Parsed::Empty => {
                        errors.push(SubmissionError::new(error.field(), MSG_REQUIRED));
                        Ok(None)
                    }
                    _ => Ok(None),
                }
            }
            DateFields::DateOnly { widget, error } => {
                let parsed = read_widget(ctx, widget, error, submission, errors)?;
                Ok(Self::combine(ctx, parsed, None, error, errors).map(|d| (d, error)))
            }
            DateFields::DateAndTime {
                date,
                date_error,
                time,
                time_error,
            } => {
                let parsed = read_widget(ctx, date, date_error, submission, errors)?;
                let time = match read_widget(ctx, time, time_error, submission, errors)? {
                    Parsed::Value(value) => value.as_time(),
                    Parsed::Empty => None,
                    Parsed::Invalid => return Ok(None),
                };
                Ok(Self::combine(ctx, parsed, time, date_error, errors).map(|d| (d, date_error)))
            }
        }
    }

    fn combine(
        ctx: &FormEntryContext,
        date: Parsed,
        time: Option<NaiveTime>,
        error: &ErrorWidget,
        errors: &mut Vec<SubmissionError>,
    ) -> Option<SubmittedDate> {
        let local_date = match date {
            Parsed::Value(value) => value.as_date()?,
            Parsed::Empty => {
                errors.push(SubmissionError::new(error.field(), MSG_REQUIRED));
                return None;
            }
            Parsed::Invalid => return None,
        };
        let instant = ctx.local_to_instant(local_date.and_time(time.unwrap_or(NaiveTime::MIN)))?;
        Some(SubmittedDate {
            instant,
            local_date,
            has_time: time.is_some(),
        })
    }

    fn is_future(ctx: &FormEntryContext, date: &SubmittedDate) -> bool {
        if date.has_time {
            date.instant > ctx.now()
        } else {
            date.local_date > ctx.today()
        }
    }

    fn require(
        ctx: &FormEntryContext,
        field: &Option<(RegisteredWidget, ErrorWidget)>,
        submission: &Submission,
        errors: &mut Vec<SubmissionError>,
    ) -> FormResult<Option<u32>> {
        let Some((widget, error)) = field else {
            return Ok(None);
        };
        Ok(match read_widget(ctx, widget, error, submission, errors)? {
            Parsed::Value(value) => value.as_entity(),
            Parsed::Empty => {
                errors.push(SubmissionError::new(error.field(), MSG_REQUIRED));
                None
            }
            Parsed::Invalid => None,
        })
    }
}

impl SubmissionElement for EncounterDetailElement {
    fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        let mut parts = Vec::new();
        match &self.date {
            Some(DateFields::Zoned { widget, error } | DateFields::DateOnly { widget, error }) => {
                parts.push(widget.render(ctx)?);
                parts.push(error.render(ctx)?);
            }
            Some(DateFields::DateAndTime {
                date,
                date_error,
                time,
                time_error,
            }) => {
                parts.push(date.render(ctx)?);
                parts.push(date_error.render(ctx)?);
                parts.push(time.render(ctx)?);
                parts.push(time_error.render(ctx)?);
            }
            None => {}
        }
        for (widget, error) in self.provider.iter().chain(self.location.iter()) {
            parts.push(widget.render(ctx)?);
            parts.push(error.render(ctx)?);
        }
        if let Some(void) = &self.void {
            parts.push(void.render(ctx)?);
        }
        Ok(join_parts(parts))
    }

    fn validate_submission(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
    ) -> FormResult<Vec<SubmissionError>> {
        let mut errors = Vec::new();
        if let Some((date, error)) = self.read_date(ctx, submission, &mut errors)? {
            if Self::is_future(ctx, &date) {
                errors.push(SubmissionError::new(error.field(), MSG_CANNOT_BE_IN_FUTURE));
            }
        }
        Self::require(ctx, &self.provider, submission, &mut errors)?;
        Self::require(ctx, &self.location, submission, &mut errors)?;
        Ok(errors)
    }

    fn handle_submission(
        &self,
        ctx: &FormEntryContext,
        record: &mut PendingRecord,
        submission: &Submission,
    ) -> FormResult<()> {
        let mut ignored = Vec::new();
        if let Some((date, _)) = self.read_date(ctx, submission, &mut ignored)? {
            let encounter = record.encounter_mut();
            let unchanged_day = !date.has_time
                && encounter
                    .datetime
                    .is_some_and(|at| ctx.to_local(at).date_naive() == date.local_date);
            if !unchanged_day {
                encounter.datetime = Some(date.instant);
            }
        }
        if let Some(id) = Self::require(ctx, &self.provider, submission, &mut ignored)? {
            record.encounter_mut().provider = Some(PersonId(id));
        }
        if let Some(id) = Self::require(ctx, &self.location, submission, &mut ignored)? {
            record.encounter_mut().location = Some(LocationId(id));
        }
        if let Some(void) = &self.void {
            if void.value(ctx, submission)?.and_then(|v| v.as_flag()) == Some(true) {
                tracing::info!(encounter = %record.encounter().id, "void requested for encounter");
                record.request_void();
            }
        }
        Ok(())
    }
}

fn person_option(person: Person) -> EntityOption {
    EntityOption {
        id: person.id.get(),
        label: person.name,
    }
}

/// Persons offered in the provider drop-down.
///
/// Explicit `persons` come first (restricted to registered providers when the host has a
/// provider registry), then users holding `role`, then registered providers, then users with
/// the default provider role, then every user.
fn provider_options(services: &FormServices, attrs: &TagAttributes) -> FormResult<Vec<Person>> {
    let entities = services.entities.as_ref();
    let providers_supported = services.capabilities.providers_supported;

    let keys = attrs.list("persons");
    if !keys.is_empty() {
        let mut persons = keys
            .into_iter()
            .map(|key| {
                entities
                    .person(key)
                    .ok_or_else(|| FormError::unresolved("person", key))
            })
            .collect::<FormResult<Vec<_>>>()?;
        if providers_supported {
            let providers = entities.providers();
            persons.retain(|p| providers.iter().any(|q| q.id == p.id));
        }
        return Ok(persons);
    }

    let mut persons = if let Some(role) = attrs.get("role") {
        if !entities.role_exists(role) {
            return Err(FormError::unresolved("role", role));
        }
        entities.users_with_role(Some(role))
    } else if providers_supported {
        entities.providers()
    } else if entities.role_exists(DEFAULT_PROVIDER_ROLE) {
        entities.users_with_role(Some(DEFAULT_PROVIDER_ROLE))
    } else {
        entities.users_with_role(None)
    };
    persons.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(persons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormEntryConfig;
    use crate::record::Encounter;
    use crate::services::HostCapabilities;
    use crate::test_support::{context, enter_context, fixed_now, services, services_with_timezone, PATIENT};
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Arc;

    fn full_attrs() -> TagAttributes {
        TagAttributes::from_pairs([
            ("date", "true"),
            ("showTime", "true"),
            ("provider", "true"),
            ("location", "true"),
        ])
    }

    #[test]
    fn tomorrow_is_rejected_on_the_date_error_widget() {
        let mut ctx = enter_context();
        let element =
            EncounterDetailElement::new(&mut ctx, &services(fixed_now()), &full_attrs()).expect("builds");
        // w1 zoned date, w2 its error, w3 provider, w4 error, w5 location, w6 error.
        let submission = Submission::from_pairs([
            ("w1", "2024-03-02"),
            ("w1hours", "09"),
            ("w1minutes", "00"),
            ("w1timezone", "+00:00"),
            ("w3", "502"),
            ("w5", "1"),
        ]);
        let errors = element.validate_submission(&ctx, &submission).expect("validates");
        assert_eq!(errors, vec![SubmissionError {
            field: "w2".into(),
            message_key: MSG_CANNOT_BE_IN_FUTURE.into(),
        }]);
    }

    #[test]
    fn missing_provider_is_required_on_the_provider_error_widget() {
        let mut ctx = enter_context();
        let element =
            EncounterDetailElement::new(&mut ctx, &services(fixed_now()), &full_attrs()).expect("builds");
        let submission = Submission::from_pairs([
            ("w1", "2024-03-01"),
            ("w1hours", "08"),
            ("w1minutes", "15"),
            ("w1timezone", "+00:00"),
            ("w3", ""),
            ("w5", "1"),
        ]);
        let errors = element.validate_submission(&ctx, &submission).expect("validates");
        assert_eq!(errors, vec![SubmissionError {
            field: "w4".into(),
            message_key: MSG_REQUIRED.into(),
        }]);
    }

    #[test]
    fn date_and_time_combine_in_display_timezone() {
        let cfg = FormEntryConfig::new(
            "%d/%m/%Y".into(),
            "%d/%m/%Y %H:%M".into(),
            "%H:%M".into(),
            FixedOffset::east_opt(2 * 3600).expect("valid offset"),
            false,
        )
        .expect("valid config");
        let svc = services(fixed_now());
        let mut ctx = FormEntryContext::new(Mode::Enter, Arc::new(cfg), &svc, PATIENT, None)
            .expect("valid context");
        let attrs = TagAttributes::from_pairs([("date", "true"), ("showTime", "true")]);
        let element = EncounterDetailElement::new(&mut ctx, &svc, &attrs).expect("builds");
        // w1 date, w2 error, w3 time, w4 error.
        let submission = Submission::from_pairs([("w1", "2024-03-01"), ("w3hours", "09"), ("w3minutes", "30")]);

        assert!(element.validate_submission(&ctx, &submission).expect("validates").is_empty());
        let mut record = PendingRecord::new(Encounter::new(PATIENT, "Clinic"));
        element
            .handle_submission(&ctx, &mut record, &submission)
            .expect("applies");
        assert_eq!(
            record.encounter().datetime,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap())
        );
    }

    #[test]
    fn void_control_only_ever_voids() {
        let mut existing = Encounter::new(PATIENT, "Clinic");
        existing.datetime = Some(fixed_now());
        existing.voided = true;
        let mut ctx = context(Mode::Edit, Some(existing.clone()));
        let attrs = TagAttributes::from_pairs([("showVoidEncounter", "true")]);
        let element = EncounterDetailElement::new(&mut ctx, &services(fixed_now()), &attrs).expect("builds");
        assert!(element.render(&ctx).expect("renders").contains("checked=\"true\""));

        let mut record = PendingRecord::new(existing);
        element
            .handle_submission(&ctx, &mut record, &Submission::new())
            .expect("applies");
        assert!(!record.void_requested());
        assert!(record.finish().voided);

        let mut fresh = Encounter::new(PATIENT, "Clinic");
        fresh.datetime = Some(fixed_now());
        let mut ctx = context(Mode::Edit, Some(fresh.clone()));
        let element = EncounterDetailElement::new(&mut ctx, &services(fixed_now()), &attrs).expect("builds");
        let mut record = PendingRecord::new(fresh);
        element
            .handle_submission(&ctx, &mut record, &Submission::from_pairs([("w1", "true")]))
            .expect("applies");
        assert!(record.finish().voided);
    }

    #[test]
    fn provider_options_follow_the_cascade() {
        let svc = services(fixed_now());
        let only_providers = provider_options(
            &svc,
            &TagAttributes::from_pairs([("persons", "502,503")]),
        )
        .expect("resolves");
        assert_eq!(only_providers.iter().map(|p| p.id.get()).collect::<Vec<_>>(), vec![502]);

        let nurses = provider_options(&svc, &TagAttributes::from_pairs([("role", "Nurse")]))
            .expect("resolves");
        assert_eq!(nurses.iter().map(|p| p.id.get()).collect::<Vec<_>>(), vec![503]);

        let registry = provider_options(&svc, &TagAttributes::new()).expect("resolves");
        assert_eq!(registry.iter().map(|p| p.id.get()).collect::<Vec<_>>(), vec![502, 505]);

        let no_registry = svc.clone().with_capabilities(HostCapabilities {
            providers_supported: false,
        });
        let by_role = provider_options(&no_registry, &TagAttributes::new()).expect("resolves");
        assert_eq!(by_role.iter().map(|p| p.id.get()).collect::<Vec<_>>(), vec![502, 504]);
    }

    #[test]
    fn unknown_entities_are_configuration_errors() {
        let mut ctx = enter_context();
        let svc = services(fixed_now());
        let err = EncounterDetailElement::new(
            &mut ctx,
            &svc,
            &TagAttributes::from_pairs([("provider", "true"), ("role", "Astronaut")]),
        )
        .expect_err("unknown role");
        assert!(matches!(err, FormError::UnresolvedEntity { kind: "role", .. }));

        let err = EncounterDetailElement::new(
            &mut ctx,
            &svc,
            &TagAttributes::from_pairs([("location", "true"), ("default", "Mars Base")]),
        )
        .expect_err("unknown location");
        assert!(matches!(err, FormError::UnresolvedEntity { kind: "location", .. }));
    }

    #[test]
    fn enter_mode_defaults_to_current_user_and_today() {
        let svc = services_with_timezone(fixed_now(), FixedOffset::east_opt(0));
        let mut ctx = enter_context();
        let attrs = TagAttributes::from_pairs([
            ("date", "true"),
            ("defaultDate", "today"),
            ("provider", "true"),
            ("default", "currentuser"),
        ]);
        let element = EncounterDetailElement::new(&mut ctx, &svc, &attrs).expect("builds");
        let html = element.render(&ctx).expect("renders");
        assert!(html.contains("value=\"2024-03-01\""));
        assert!(html.contains("<option value=\"1\" selected=\"true\">Super User</option>"));
    }
}
