use super::{escape_attr, view_value, Widget, WidgetKind, WidgetValue};
use crate::constants::{HIDDEN_CODED_SUFFIX, MSG_INVALID_CONCEPT};
use crate::context::FormEntryContext;
use crate::error::ParseError;
use crate::record::CodedOrFreeText;
use crate::submission::Submission;
use vpr_types::ConceptId;

/// Autocomplete concept search.
///
/// The visible text input carries what the user typed; a hidden `_hid` companion carries the id
/// of the concept picked from the suggestions. Typed text without a picked concept is accepted
/// as a non-coded value when free text is allowed.
#[derive(Clone, Debug)]
pub struct ConceptSearchWidget {
    initial: Option<WidgetValue>,
    allow_free_text: bool,
}

impl ConceptSearchWidget {
    pub fn new(allow_free_text: bool) -> Self {
        Self {
            initial: None,
            allow_free_text,
        }
    }

    fn initial_concept(&self) -> Option<&CodedOrFreeText> {
        self.initial.as_ref().and_then(WidgetValue::as_concept)
    }
}

impl Widget for ConceptSearchWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::ConceptSearch
    }

    fn render_view(&self, _ctx: &FormEntryContext) -> String {
        view_value(self.initial_concept().map(CodedOrFreeText::display))
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let hidden_key = format!("{name}{HIDDEN_CODED_SUFFIX}");
        let (text, coded) = match ctx.resubmission() {
            Some(submission) => (
                submission.get(name).unwrap_or_default().to_owned(),
                submission.get(&hidden_key).unwrap_or_default().to_owned(),
            ),
            None => match self.initial_concept() {
                Some(concept) => (
                    concept.display().to_owned(),
                    concept.coded().map(|c| c.to_string()).unwrap_or_default(),
                ),
                None => (String::new(), String::new()),
            },
        };
        format!(
            "<input type=\"text\" class=\"concept-search\" autocomplete=\"off\" name=\"{name}\" id=\"{name}\" value=\"{}\"/>\
             <input type=\"hidden\" name=\"{hidden_key}\" id=\"{hidden_key}\" value=\"{}\"/>",
            escape_attr(&text),
            escape_attr(&coded)
        )
    }

    fn value(
        &self,
        _ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        let text = submission.text(name);
        let coded = submission.text(&format!("{name}{HIDDEN_CODED_SUFFIX}"));
        let value = match (coded, text) {
            (Some(raw), text) => {
                let concept: ConceptId = raw
                    .parse()
                    .map_err(|_| ParseError::new(MSG_INVALID_CONCEPT, raw))?;
                CodedOrFreeText::Coded {
                    concept,
                    display: text.unwrap_or(raw).to_owned(),
                }
            }
            (None, Some(text)) if self.allow_free_text => CodedOrFreeText::NonCoded(text.to_owned()),
            (None, Some(text)) => return Err(ParseError::new(MSG_INVALID_CONCEPT, text)),
            (None, None) => return Ok(None),
        };
        Ok(Some(WidgetValue::Concept(value)))
    }

    fn initial_value(&self) -> Option<&WidgetValue> {
        self.initial.as_ref()
    }

    fn set_initial_value(&mut self, value: Option<WidgetValue>) {
        self.initial = value;
    }

    fn clone_widget(&self) -> Box<dyn Widget> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::enter_context;

    #[test]
    fn hidden_companion_wins_over_typed_text() {
        let ctx = enter_context();
        let widget = ConceptSearchWidget::new(true);
        let submission = Submission::from_pairs([("w1", "Epilepsy"), ("w1_hid", "3476")]);
        assert_eq!(
            widget.value(&ctx, "w1", &submission),
            Ok(Some(WidgetValue::Concept(CodedOrFreeText::Coded {
                concept: ConceptId(3476),
                display: "Epilepsy".into(),
            })))
        );
    }

    #[test]
    fn typed_text_alone_is_non_coded_only_when_allowed() {
        let ctx = enter_context();
        let submission = Submission::from_pairs([("w1", "Headache after fall"), ("w1_hid", "")]);
        assert_eq!(
            ConceptSearchWidget::new(true).value(&ctx, "w1", &submission),
            Ok(Some(WidgetValue::Concept(CodedOrFreeText::NonCoded(
                "Headache after fall".into()
            ))))
        );
        let err = ConceptSearchWidget::new(false)
            .value(&ctx, "w1", &submission)
            .expect_err("coded only");
        assert_eq!(err.message_key, MSG_INVALID_CONCEPT);
    }

    #[test]
    fn renders_both_inputs_from_initial_concept() {
        let ctx = enter_context();
        let mut widget = ConceptSearchWidget::new(true);
        widget.set_initial_value(Some(WidgetValue::Concept(CodedOrFreeText::Coded {
            concept: ConceptId(3476),
            display: "Epilepsy".into(),
        })));
        let html = widget.render_input(&ctx, "w7");
        assert!(html.contains("name=\"w7\" id=\"w7\" value=\"Epilepsy\""));
        assert!(html.contains("<input type=\"hidden\" name=\"w7_hid\" id=\"w7_hid\" value=\"3476\"/>"));
    }
}
