use super::{escape, escape_attr, format_number, shown_text, view_value, Widget, WidgetKind, WidgetValue};
use crate::constants::{MSG_NOT_AN_INTEGER, MSG_NOT_A_NUMBER, MSG_OUT_OF_RANGE};
use crate::context::FormEntryContext;
use crate::error::ParseError;
use crate::submission::Submission;

/// Free-text input, single line or multi-line.
#[derive(Clone, Debug, Default)]
pub struct TextWidget {
    initial: Option<WidgetValue>,
    textarea: Option<(u16, u16)>,
}

impl TextWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render as a `<textarea>` with the given rows and columns.
    pub fn textarea(mut self, rows: u16, cols: u16) -> Self {
        self.textarea = Some((rows, cols));
        self
    }

    pub fn with_initial(mut self, text: String) -> Self {
        self.initial = Some(WidgetValue::Text(text));
        self
    }

    fn initial_text(&self) -> Option<&str> {
        self.initial.as_ref().and_then(WidgetValue::as_text)
    }
}

impl Widget for TextWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Text
    }

    fn render_view(&self, _ctx: &FormEntryContext) -> String {
        view_value(self.initial_text())
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let text = shown_text(ctx, name, self.initial_text().map(str::to_owned));
        match self.textarea {
            Some((rows, cols)) => format!(
                "<textarea name=\"{name}\" id=\"{name}\" rows=\"{rows}\" cols=\"{cols}\">{}</textarea>",
                escape(&text)
            ),
            None => format!(
                "<input type=\"text\" name=\"{name}\" id=\"{name}\" value=\"{}\"/>",
                escape_attr(&text)
            ),
        }
    }

    fn value(
        &self,
        _ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        Ok(submission
            .text(name)
            .map(|text| WidgetValue::Text(text.to_owned())))
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

/// Numeric input with optional bounds.
#[derive(Clone, Debug)]
pub struct NumberWidget {
    initial: Option<WidgetValue>,
    allow_decimal: bool,
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberWidget {
    pub fn new(allow_decimal: bool) -> Self {
        Self {
            initial: None,
            allow_decimal,
            min: None,
            max: None,
        }
    }

    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    fn initial_number(&self) -> Option<f64> {
        self.initial.as_ref().and_then(WidgetValue::as_number)
    }
}

impl Widget for NumberWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Number
    }

    fn render_view(&self, _ctx: &FormEntryContext) -> String {
        view_value(self.initial_number().map(format_number).as_deref())
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let text = shown_text(ctx, name, self.initial_number().map(format_number));
        format!(
            "<input type=\"text\" size=\"5\" name=\"{name}\" id=\"{name}\" value=\"{}\"/>",
            escape_attr(&text)
        )
    }

    fn value(
        &self,
        _ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        let Some(raw) = submission.text(name) else {
            return Ok(None);
        };
        let number: f64 = raw
            .parse()
            .ok()
            .filter(|n: &f64| n.is_finite())
            .ok_or_else(|| ParseError::new(MSG_NOT_A_NUMBER, raw))?;
        if !self.allow_decimal && number.fract() != 0.0 {
            return Err(ParseError::new(MSG_NOT_AN_INTEGER, raw));
        }
        let below = self.min.is_some_and(|min| number < min);
        let above = self.max.is_some_and(|max| number > max);
        if below || above {
            return Err(ParseError::new(MSG_OUT_OF_RANGE, raw));
        }
        Ok(Some(WidgetValue::Number(number)))
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
