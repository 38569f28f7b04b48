//! Observation entry for one concept, with the widget chosen by the concept datatype.

use super::{join_parts, read_widget, Parsed, SubmissionElement, TagAttributes};
use crate::constants::MSG_REQUIRED;
use crate::context::FormEntryContext;
use crate::error::SubmissionError;
use crate::record::{ObsValue, Observation, PendingRecord};
use crate::services::{Concept, ConceptDatatype, FormServices};
use crate::submission::Submission;
use crate::widget::{
    escape, format_number, DateWidget, ErrorWidget, NumberWidget, OptionStyle, RegisteredWidget,
    SingleOptionWidget, TextWidget, Widget, WidgetValue, ZonedDateTimeWidget,
};
use crate::{FormError, FormResult};
use vpr_types::ConceptId;

/// A single observation question, captured with the widget its concept's datatype calls for.
#[derive(Debug)]
pub struct ObservationElement {
    concept: Concept,
    label: String,
    required: bool,
    units: Option<String>,
    widget: RegisteredWidget,
    error: ErrorWidget,
    existing: Option<Observation>,
}

impl ObservationElement {
    /// # Errors
    ///
    /// Returns a configuration error when `conceptId` is missing or unknown, or `style` is not
    /// `radio` or `dropdown`.
    pub fn new(
        ctx: &mut FormEntryContext,
        services: &FormServices,
        attrs: &TagAttributes,
    ) -> FormResult<Self> {
        let key = attrs.required("conceptId")?;
        let concept = services
            .entities
            .concept(key)
            .ok_or_else(|| FormError::unresolved("concept", key))?;
        let style: OptionStyle = attrs.parse("style")?.unwrap_or_default();
        let required = attrs.flag("required", false)?;
        let units = match &concept.datatype {
            ConceptDatatype::Numeric { units, .. } if attrs.flag("showUnits", false)? => units.clone(),
            _ => None,
        };
        let label = attrs
            .get("labelText")
            .map(str::to_owned)
            .unwrap_or_else(|| concept.name.clone());

        let existing = ctx
            .existing()
            .and_then(|e| e.observation(concept.id))
            .cloned();
        let mut widget = widget_for(&concept.datatype, style);
        widget.set_initial_value(existing.as_ref().map(|o| widget_value_of(&o.value)));
        let widget = ctx.register_widget(widget);
        let error = ctx.register_error_widget(&widget)?;

        Ok(Self {
            concept,
            label,
            required,
            units,
            widget,
            error,
            existing,
        })
    }

    pub fn concept(&self) -> &Concept {
        &self.concept
    }

    pub fn widget(&self) -> &RegisteredWidget {
        &self.widget
    }

    /// Whether the live widget already holds a value.
    pub fn has_value(&self) -> bool {
        self.widget.initial_value().is_some()
    }

    /// Wrap `widget_markup` in this element's label, units and error markup.
    pub(crate) fn render_with(
        &self,
        ctx: &FormEntryContext,
        widget_markup: String,
    ) -> FormResult<String> {
        let label = format!(
            "<label for=\"{}\">{}</label>",
            self.widget.field(),
            escape(&self.label)
        );
        let units = self
            .units
            .as_deref()
            .map(|u| format!("<span class=\"units\">{}</span>", escape(u)))
            .unwrap_or_default();
        Ok(join_parts([label, widget_markup, units, self.error.render(ctx)?]))
    }

    /// Human readable rendering of an observation value of this concept.
    pub(crate) fn describe(&self, ctx: &FormEntryContext, value: &ObsValue) -> String {
        match value {
            ObsValue::Numeric(n) => match &self.units {
                Some(units) => format!("{} {units}", format_number(*n)),
                None => format_number(*n),
            },
            ObsValue::Coded(id) => match &self.concept.datatype {
                ConceptDatatype::Coded { answers } => answers
                    .iter()
                    .find(|a| a.concept == *id)
                    .map(|a| a.label.clone())
                    .unwrap_or_else(|| id.to_string()),
                _ => id.to_string(),
            },
            ObsValue::Text(text) => text.clone(),
            ObsValue::Date(date) => date.format(ctx.config().date_format()).to_string(),
            ObsValue::Datetime(instant) => ctx
                .to_local(*instant)
                .format(ctx.config().datetime_format())
                .to_string(),
        }
    }
}

impl SubmissionElement for ObservationElement {
    fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        self.render_with(ctx, self.widget.render(ctx)?)
    }

    fn validate_submission(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
    ) -> FormResult<Vec<SubmissionError>> {
        let mut errors = Vec::new();
        let parsed = read_widget(ctx, &self.widget, &self.error, submission, &mut errors)?;
        if parsed == Parsed::Empty && self.required {
            errors.push(SubmissionError::new(self.error.field(), MSG_REQUIRED));
        }
        Ok(errors)
    }

    fn handle_submission(
        &self,
        ctx: &FormEntryContext,
        record: &mut PendingRecord,
        submission: &Submission,
    ) -> FormResult<()> {
        let value = self
            .widget
            .value(ctx, submission)?
            .and_then(obs_value_of);

        if let Some(old) = &self.existing {
            if value.as_ref() == Some(&old.value) {
                return Ok(());
            }
            if let Some(obs) = record.observation_mut(old.id) {
                tracing::debug!(observation = %old.id, concept = %self.concept.id, "voiding replaced observation");
                obs.voided = true;
            }
        }
        if let Some(value) = value {
            let observation = Observation::new(self.concept.id, value);
            tracing::debug!(observation = %observation.id, concept = %self.concept.id, "recording observation");
            record.encounter_mut().observations.push(observation);
        }
        Ok(())
    }
}

fn widget_for(datatype: &ConceptDatatype, style: OptionStyle) -> Box<dyn Widget> {
    match datatype {
        ConceptDatatype::Numeric {
            min,
            max,
            allow_decimal,
            ..
        } => Box::new(NumberWidget::new(*allow_decimal).with_bounds(*min, *max)),
        ConceptDatatype::Coded { answers } => Box::new(SingleOptionWidget::new(
            answers
                .iter()
                .map(|a| (a.concept.to_string(), a.label.clone()))
                .collect(),
            style,
        )),
        ConceptDatatype::Text => Box::new(TextWidget::new()),
        ConceptDatatype::Date => Box::new(DateWidget::new()),
        ConceptDatatype::Datetime => Box::new(ZonedDateTimeWidget::new(false)),
    }
}

pub(crate) fn widget_value_of(value: &ObsValue) -> WidgetValue {
    match value {
        ObsValue::Numeric(n) => WidgetValue::Number(*n),
        ObsValue::Coded(id) => WidgetValue::Choice(id.to_string()),
        ObsValue::Text(text) => WidgetValue::Text(text.clone()),
        ObsValue::Date(date) => WidgetValue::Date(*date),
        ObsValue::Datetime(instant) => WidgetValue::Instant(*instant),
    }
}

fn obs_value_of(value: WidgetValue) -> Option<ObsValue> {
    match value {
        WidgetValue::Number(n) => Some(ObsValue::Numeric(n)),
        WidgetValue::Choice(raw) => raw.parse::<ConceptId>().ok().map(ObsValue::Coded),
        WidgetValue::Text(text) => Some(ObsValue::Text(text)),
        WidgetValue::Date(date) => Some(ObsValue::Date(date)),
        WidgetValue::Instant(instant) => Some(ObsValue::Datetime(instant)),
        _ => None,
    }
}
