use super::{escape, escape_attr, view_value, Widget, WidgetKind, WidgetValue};
use crate::constants::MSG_INVALID_OPTION;
use crate::context::FormEntryContext;
use crate::error::ParseError;
use crate::submission::Submission;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptionStyle {
    #[default]
    Dropdown,
    Radio,
}

impl std::str::FromStr for OptionStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dropdown" => Ok(OptionStyle::Dropdown),
            "radio" => Ok(OptionStyle::Radio),
            other => Err(format!("unknown option style '{other}'")),
        }
    }
}

/// Pick exactly one value from a fixed list.
#[derive(Clone, Debug)]
pub struct SingleOptionWidget {
    options: Vec<(String, String)>,
    style: OptionStyle,
    initial: Option<WidgetValue>,
}

impl SingleOptionWidget {
    /// Options are `(value, label)` pairs rendered in the order given.
    pub fn new(options: Vec<(String, String)>, style: OptionStyle) -> Self {
        Self {
            options,
            style,
            initial: None,
        }
    }

    fn label_of(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, label)| label.as_str())
    }

    fn selected(&self, ctx: &FormEntryContext, name: &str) -> Option<String> {
        match ctx.resubmission() {
            Some(submission) => submission.get(name).map(str::to_owned),
            None => self
                .initial
                .as_ref()
                .and_then(WidgetValue::as_choice)
                .map(str::to_owned),
        }
    }
}

impl Widget for SingleOptionWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::SingleOption
    }

    fn render_view(&self, _ctx: &FormEntryContext) -> String {
        let selected = self.initial.as_ref().and_then(WidgetValue::as_choice);
        view_value(selected.and_then(|value| self.label_of(value)))
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let selected = self.selected(ctx, name);
        let is_selected = |value: &str| selected.as_deref() == Some(value);
        match self.style {
            OptionStyle::Dropdown => {
                let mut html = format!("<select name=\"{name}\" id=\"{name}\"><option value=\"\"></option>");
                for (value, label) in &self.options {
                    let mark = if is_selected(value) { " selected=\"true\"" } else { "" };
                    html.push_str(&format!(
                        "<option value=\"{}\"{mark}>{}</option>",
                        escape_attr(value),
                        escape(label)
                    ));
                }
                html.push_str("</select>");
                html
            }
            OptionStyle::Radio => self
                .options
                .iter()
                .enumerate()
                .map(|(i, (value, label))| {
                    let id = format!("{name}_{}", i + 1);
                    let mark = if is_selected(value) { " checked=\"true\"" } else { "" };
                    format!(
                        "<input type=\"radio\" id=\"{id}\" name=\"{name}\" value=\"{}\"{mark}/><label for=\"{id}\">{}</label>",
                        escape_attr(value),
                        escape(label)
                    )
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
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
        if self.label_of(raw).is_none() {
            return Err(ParseError::new(MSG_INVALID_OPTION, raw));
        }
        Ok(Some(WidgetValue::Choice(raw.to_owned())))
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

/// One selectable person or location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityOption {
    pub id: u32,
    pub label: String,
}

/// Drop-down over directory entities such as providers or locations.
#[derive(Clone, Debug)]
pub struct EntityWidget {
    options: Vec<EntityOption>,
    initial: Option<WidgetValue>,
}

impl EntityWidget {
    pub fn new(options: Vec<EntityOption>) -> Self {
        Self {
            options,
            initial: None,
        }
    }

    pub fn options(&self) -> &[EntityOption] {
        &self.options
    }

    /// Add `option` unless an option with the same id is already listed.
    pub fn ensure_option(&mut self, option: EntityOption) {
        if !self.options.iter().any(|o| o.id == option.id) {
            self.options.push(option);
        }
    }

    fn label_of(&self, id: u32) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.label.as_str())
    }
}

impl Widget for EntityWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Entity
    }

    fn render_view(&self, _ctx: &FormEntryContext) -> String {
        let id = self.initial.as_ref().and_then(WidgetValue::as_entity);
        view_value(id.and_then(|id| self.label_of(id)))
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let selected = match ctx.resubmission() {
            Some(submission) => submission.get(name).map(str::to_owned),
            None => self
                .initial
                .as_ref()
                .and_then(WidgetValue::as_entity)
                .map(|id| id.to_string()),
        };
        let mut html = format!("<select name=\"{name}\" id=\"{name}\"><option value=\"\"></option>");
        for option in &self.options {
            let value = option.id.to_string();
            let mark = if selected.as_deref() == Some(value.as_str()) {
                " selected=\"true\""
            } else {
                ""
            };
            html.push_str(&format!(
                "<option value=\"{value}\"{mark}>{}</option>",
                escape(&option.label)
            ));
        }
        html.push_str("</select>");
        html
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
        raw.parse::<u32>()
            .ok()
            .filter(|id| self.label_of(*id).is_some())
            .map(|id| Some(WidgetValue::Entity(id)))
            .ok_or_else(|| ParseError::new(MSG_INVALID_OPTION, raw))
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

/// A single checkbox. An absent key means unchecked.
#[derive(Clone, Debug)]
pub struct CheckboxWidget {
    label: Option<String>,
    initial: Option<WidgetValue>,
}

impl CheckboxWidget {
    pub fn new(label: Option<String>) -> Self {
        Self {
            label,
            initial: None,
        }
    }

    fn label_markup(&self, name: &str) -> String {
        match &self.label {
            Some(label) => format!("<label for=\"{name}\">{}</label>", escape(label)),
            None => String::new(),
        }
    }
}

impl Widget for CheckboxWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Checkbox
    }

    fn render_view(&self, _ctx: &FormEntryContext) -> String {
        let checked = self.initial.as_ref().and_then(WidgetValue::as_flag) == Some(true);
        let mark = if checked { "[X]" } else { "[&#160;&#160;]" };
        match &self.label {
            Some(label) => format!("<span class=\"value\">{mark}</span>&#160;{}", escape(label)),
            None => format!("<span class=\"value\">{mark}</span>"),
        }
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let checked = match ctx.resubmission() {
            Some(submission) => submission.contains(name),
            None => self.initial.as_ref().and_then(WidgetValue::as_flag) == Some(true),
        };
        let mark = if checked { " checked=\"true\"" } else { "" };
        format!(
            "<input type=\"checkbox\" id=\"{name}\" name=\"{name}\" value=\"true\"{mark}/>{}",
            self.label_markup(name)
        )
    }

    fn value(
        &self,
        _ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        Ok(submission
            .contains(name)
            .then_some(WidgetValue::Flag(true)))
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
