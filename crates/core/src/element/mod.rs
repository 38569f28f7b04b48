//! Submission elements: the render / validate / apply units a form is assembled from.
//!
//! Every element owns the widgets it registered at construction. Validation only reads the
//! submission; apply mutates the [`PendingRecord`] and runs only after every element of the form
//! validated cleanly.

mod attributes;
mod condition;
mod encounter;
mod observation;
mod reference;
mod submit;

pub use attributes::TagAttributes;
pub use condition::ConditionElement;
pub use encounter::EncounterDetailElement;
pub use observation::ObservationElement;
pub use reference::ObservationReferenceElement;
pub use submit::SubmitButtonElement;

use crate::context::FormEntryContext;
use crate::error::SubmissionError;
use crate::record::PendingRecord;
use crate::submission::Submission;
use crate::widget::{ErrorWidget, RegisteredWidget, WidgetValue};
use crate::{FormError, FormResult};
use std::fmt;

/// Rounds in which elements match the persisted entries they edit, once the whole form is
/// built. Every element sees every pass, in form order, before the next pass starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimPass {
    /// Entries tagged with an author-assigned control identifier.
    ControlId,
    /// Entries matching an element's fixed concept.
    Concept,
    /// Whatever is left, by position.
    Position,
}

impl ClaimPass {
    pub const ALL: [ClaimPass; 3] = [ClaimPass::ControlId, ClaimPass::Concept, ClaimPass::Position];
}

pub trait SubmissionElement: fmt::Debug + Send + Sync {
    /// Claim the persisted entries this element edits during `pass`.
    fn claim_existing(&mut self, _ctx: &mut FormEntryContext, _pass: ClaimPass) {}

    /// Markup for the element in the context's mode. Never mutates state.
    fn render(&self, ctx: &FormEntryContext) -> FormResult<String>;

    /// Field-keyed validation errors for `submission`; empty means valid.
    ///
    /// # Errors
    ///
    /// Only programming or collaborator errors are returned as `Err`. Unparsable input is
    /// reported in the list.
    fn validate_submission(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
    ) -> FormResult<Vec<SubmissionError>>;

    /// Apply an already validated submission to the pending record.
    fn handle_submission(
        &self,
        ctx: &FormEntryContext,
        record: &mut PendingRecord,
        submission: &Submission,
    ) -> FormResult<()>;
}

/// Outcome of reading one widget during validation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Parsed {
    Value(WidgetValue),
    Empty,
    /// A parse error was recorded against the paired error widget.
    Invalid,
}

impl Parsed {
    pub(crate) fn value(self) -> Option<WidgetValue> {
        match self {
            Parsed::Value(value) => Some(value),
            Parsed::Empty | Parsed::Invalid => None,
        }
    }
}

/// Read `widget`, folding a parse error into `errors` against `error`.
pub(crate) fn read_widget(
    ctx: &FormEntryContext,
    widget: &RegisteredWidget,
    error: &ErrorWidget,
    submission: &Submission,
    errors: &mut Vec<SubmissionError>,
) -> FormResult<Parsed> {
    match widget.value(ctx, submission) {
        Ok(Some(value)) => Ok(Parsed::Value(value)),
        Ok(None) => Ok(Parsed::Empty),
        Err(FormError::Parse(parse)) => {
            tracing::debug!(field = %widget.field(), key = parse.message_key, "submitted value rejected");
            errors.push(SubmissionError::new(error.field(), parse.message_key));
            Ok(Parsed::Invalid)
        }
        Err(other) => Err(other),
    }
}

/// Join rendered parts with single spaces, skipping empty ones.
pub(crate) fn join_parts<I>(parts: I) -> String
where
    I: IntoIterator<Item = String>,
{
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
