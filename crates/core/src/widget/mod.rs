//! Widgets: the leaf inputs of a form.
//!
//! Each widget variant renders itself, extracts its typed value from a submission and produces
//! an independent copy of itself. Widgets never know their own field identifier; the context
//! hands it to them through a [`RegisteredWidget`] so the same widget can be copied into a
//! read-only reference display without aliasing the live one.

mod choice;
mod composite;
mod concept;
mod datetime;
mod text;

pub use choice::{CheckboxWidget, EntityOption, EntityWidget, OptionStyle, SingleOptionWidget};
pub use composite::CompositeWidget;
pub use concept::ConceptSearchWidget;
pub use datetime::{DateWidget, TimeWidget, ZonedDateTimeWidget};
pub use text::{NumberWidget, TextWidget};

use crate::context::{FormEntryContext, Mode};
use crate::error::ParseError;
use crate::field_id::FieldIdentifier;
use crate::record::CodedOrFreeText;
use crate::submission::Submission;
use crate::{FormError, FormResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use indexmap::IndexMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WidgetKind {
    Text,
    Number,
    SingleOption,
    Date,
    Time,
    ZonedDateTime,
    Entity,
    Checkbox,
    ConceptSearch,
    Composite,
}

/// Typed value held by, or extracted from, a widget.
#[derive(Clone, Debug, PartialEq)]
pub enum WidgetValue {
    Text(String),
    Number(f64),
    /// Value attribute of the selected option.
    Choice(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Instant(DateTime<Utc>),
    Entity(u32),
    Concept(CodedOrFreeText),
    Flag(bool),
    Composite(IndexMap<String, WidgetValue>),
}

impl WidgetValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WidgetValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            WidgetValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&str> {
        match self {
            WidgetValue::Choice(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            WidgetValue::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            WidgetValue::Time(time) => Some(*time),
            _ => None,
        }
    }

    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            WidgetValue::Instant(instant) => Some(*instant),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<u32> {
        match self {
            WidgetValue::Entity(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_concept(&self) -> Option<&CodedOrFreeText> {
        match self {
            WidgetValue::Concept(concept) => Some(concept),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            WidgetValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}

/// Behaviour shared by every widget variant.
pub trait Widget: fmt::Debug + Send + Sync {
    fn kind(&self) -> WidgetKind;

    /// Read-only markup for VIEW mode.
    fn render_view(&self, ctx: &FormEntryContext) -> String;

    /// Editable markup for ENTER and EDIT mode, using `name` as the wire key.
    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String;

    /// Typed value submitted under `name`. `Ok(None)` means nothing was entered.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the submitted text cannot be converted.
    fn value(
        &self,
        ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError>;

    fn initial_value(&self) -> Option<&WidgetValue>;

    fn set_initial_value(&mut self, value: Option<WidgetValue>);

    /// Independent copy; mutating the copy's initial value never affects `self`.
    fn clone_widget(&self) -> Box<dyn Widget>;
}

impl Clone for Box<dyn Widget> {
    fn clone(&self) -> Self {
        self.clone_widget()
    }
}

/// A widget bound to the field identifier its context assigned.
#[derive(Debug)]
pub struct RegisteredWidget {
    field: FieldIdentifier,
    widget: Box<dyn Widget>,
}

impl RegisteredWidget {
    pub(crate) fn new(field: FieldIdentifier, widget: Box<dyn Widget>) -> Self {
        Self { field, widget }
    }

    pub fn field(&self) -> &FieldIdentifier {
        &self.field
    }

    pub fn widget(&self) -> &dyn Widget {
        self.widget.as_ref()
    }

    pub fn initial_value(&self) -> Option<&WidgetValue> {
        self.widget.initial_value()
    }

    pub fn set_initial_value(&mut self, value: Option<WidgetValue>) {
        self.widget.set_initial_value(value);
    }

    /// Copy of the underlying widget, detached from this registration.
    pub fn detached_copy(&self) -> Box<dyn Widget> {
        self.widget.clone_widget()
    }

    /// # Errors
    ///
    /// Returns a programming error if the widget is not registered in `ctx`.
    pub fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        ctx.lookup(&self.field)?;
        Ok(match ctx.mode() {
            Mode::View => self.widget.render_view(ctx),
            Mode::Enter | Mode::Edit => self.widget.render_input(ctx, self.field.as_str()),
        })
    }

    /// # Errors
    ///
    /// Returns [`FormError::Parse`] for unconvertible input and a programming error if the
    /// widget is not registered in `ctx`.
    pub fn value(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
    ) -> FormResult<Option<WidgetValue>> {
        ctx.lookup(&self.field)?;
        self.widget
            .value(ctx, self.field.as_str(), submission)
            .map_err(FormError::from)
    }
}

/// Companion that displays the validation message of one widget.
#[derive(Clone, Debug)]
pub struct ErrorWidget {
    field: FieldIdentifier,
    widget_field: FieldIdentifier,
}

impl ErrorWidget {
    pub(crate) fn new(field: FieldIdentifier, widget_field: FieldIdentifier) -> Self {
        Self {
            field,
            widget_field,
        }
    }

    pub fn field(&self) -> &FieldIdentifier {
        &self.field
    }

    pub fn widget_field(&self) -> &FieldIdentifier {
        &self.widget_field
    }

    pub fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        ctx.lookup(&self.field)?;
        if ctx.mode() == Mode::View {
            return Ok(String::new());
        }
        let id = self.field.as_str();
        Ok(match ctx.error_message(&self.field) {
            Some(message) => format!(
                "<span class=\"error field-error\" id=\"{id}\">{}</span>",
                escape(message)
            ),
            None => format!("<span class=\"error field-error\" style=\"display: none\" id=\"{id}\"></span>"),
        })
    }
}

pub(crate) fn escape(text: &str) -> std::borrow::Cow<'_, str> {
    html_escape::encode_text(text)
}

pub(crate) fn escape_attr(text: &str) -> std::borrow::Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(text)
}

/// VIEW markup for an optional display string.
pub(crate) fn view_value(text: Option<&str>) -> String {
    match text {
        Some(text) if !text.is_empty() => format!("<span class=\"value\">{}</span>", escape(text)),
        _ => crate::constants::EMPTY_VALUE_MARKUP.to_owned(),
    }
}

/// Raw text to show in an input: the echoed submission when re-rendering, else `initial`.
pub(crate) fn shown_text(ctx: &FormEntryContext, key: &str, initial: Option<String>) -> String {
    match ctx.resubmission() {
        Some(submission) => submission.get(key).unwrap_or_default().to_owned(),
        None => initial.unwrap_or_default(),
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::enter_context;

    #[test]
    fn error_widget_is_hidden_until_a_message_is_set() {
        let mut ctx = enter_context();
        let widget = ctx.register_widget(Box::new(TextWidget::new()));
        let error = ctx.register_error_widget(&widget).expect("pairs");

        assert_eq!(
            error.render(&ctx).expect("renders"),
            "<span class=\"error field-error\" style=\"display: none\" id=\"w2\"></span>"
        );

        ctx.show_submission(
            Submission::new(),
            &[crate::SubmissionError::new(error.field(), "required")],
        );
        assert_eq!(
            error.render(&ctx).expect("renders"),
            "<span class=\"error field-error\" id=\"w2\">required</span>"
        );
    }

    #[test]
    fn clone_widget_does_not_alias_initial_value() {
        let mut original: Box<dyn Widget> =
            Box::new(TextWidget::new().with_initial("first".into()));
        let mut copy = original.clone();
        copy.set_initial_value(Some(WidgetValue::Text("second".into())));

        assert_eq!(
            original.initial_value(),
            Some(&WidgetValue::Text("first".into()))
        );
        original.set_initial_value(None);
        assert_eq!(copy.initial_value(), Some(&WidgetValue::Text("second".into())));
    }

    #[test]
    fn format_number_drops_trailing_zero_fraction() {
        assert_eq!(format_number(70.0), "70");
        assert_eq!(format_number(70.5), "70.5");
    }
}
