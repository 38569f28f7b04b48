//! Ordered list of form parts and the two submission phases over it.

use crate::context::FormEntryContext;
use crate::element::{ClaimPass, SubmissionElement};
use crate::error::SubmissionError;
use crate::record::PendingRecord;
use crate::submission::Submission;
use crate::FormResult;

/// One piece of a form, in document order.
#[derive(Debug)]
pub enum FormPart {
    /// Static markup emitted verbatim.
    Html(String),
    Element(Box<dyn SubmissionElement>),
}

#[derive(Debug, Default)]
pub struct FormSubmissionController {
    parts: Vec<FormPart>,
}

impl FormSubmissionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_html(&mut self, html: impl Into<String>) {
        self.parts.push(FormPart::Html(html.into()));
    }

    pub fn push_element(&mut self, element: Box<dyn SubmissionElement>) {
        self.parts.push(FormPart::Element(element));
    }

    pub fn elements(&self) -> impl Iterator<Item = &dyn SubmissionElement> {
        self.parts.iter().filter_map(|part| match part {
            FormPart::Element(element) => Some(element.as_ref()),
            FormPart::Html(_) => None,
        })
    }

    /// Let every element claim the persisted entries it edits, pass by pass in form order.
    pub fn claim_existing(&mut self, ctx: &mut FormEntryContext) {
        for pass in ClaimPass::ALL {
            for part in &mut self.parts {
                if let FormPart::Element(element) = part {
                    element.claim_existing(ctx, pass);
                }
            }
        }
    }

    /// Concatenated markup of every part.
    ///
    /// # Errors
    ///
    /// Propagates the first element render failure.
    pub fn render(&self, ctx: &FormEntryContext) -> FormResult<String> {
        let mut html = String::new();
        for part in &self.parts {
            match part {
                FormPart::Html(markup) => html.push_str(markup),
                FormPart::Element(element) => html.push_str(&element.render(ctx)?),
            }
        }
        Ok(html)
    }

    /// Validation errors of every element, in form order. Every element is consulted even after
    /// one reports errors.
    pub fn validate(
        &self,
        ctx: &FormEntryContext,
        submission: &Submission,
    ) -> FormResult<Vec<SubmissionError>> {
        let mut errors = Vec::new();
        for element in self.elements() {
            errors.extend(element.validate_submission(ctx, submission)?);
        }
        Ok(errors)
    }

    /// Apply a validated submission, element by element in form order.
    pub fn apply(
        &self,
        ctx: &FormEntryContext,
        record: &mut PendingRecord,
        submission: &Submission,
    ) -> FormResult<()> {
        for element in self.elements() {
            element.handle_submission(ctx, record, submission)?;
        }
        Ok(())
    }
}
