use super::{Widget, WidgetKind, WidgetValue};
use crate::context::FormEntryContext;
use crate::error::ParseError;
use crate::submission::Submission;
use indexmap::IndexMap;

/// A fixed group of named child widgets sharing one field identifier.
///
/// Child `c` of field `w5` is submitted under `w5_c`. The composite value holds the children
/// that produced a value; a composite with no child values is empty.
#[derive(Clone, Debug, Default)]
pub struct CompositeWidget {
    children: IndexMap<String, Box<dyn Widget>>,
    initial: Option<WidgetValue>,
}

impl CompositeWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_child(mut self, name: impl Into<String>, widget: Box<dyn Widget>) -> Self {
        self.children.insert(name.into(), widget);
        self
    }

    fn child_key(name: &str, child: &str) -> String {
        format!("{name}_{child}")
    }
}

impl Widget for CompositeWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Composite
    }

    fn render_view(&self, ctx: &FormEntryContext) -> String {
        self.children
            .values()
            .map(|child| child.render_view(ctx))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        self.children
            .iter()
            .map(|(child, widget)| {
                format!(
                    "<span class=\"composite-field\">{}</span>",
                    widget.render_input(ctx, &Self::child_key(name, child))
                )
            })
            .collect()
    }

    fn value(
        &self,
        ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        let mut values = IndexMap::new();
        for (child, widget) in &self.children {
            if let Some(value) = widget.value(ctx, &Self::child_key(name, child), submission)? {
                values.insert(child.clone(), value);
            }
        }
        Ok((!values.is_empty()).then_some(WidgetValue::Composite(values)))
    }

    fn initial_value(&self) -> Option<&WidgetValue> {
        self.initial.as_ref()
    }

    /// Distributes a composite value to the children by name; children not named are cleared.
    fn set_initial_value(&mut self, value: Option<WidgetValue>) {
        let parts = match &value {
            Some(WidgetValue::Composite(parts)) => Some(parts),
            _ => None,
        };
        for (child, widget) in self.children.iter_mut() {
            widget.set_initial_value(parts.and_then(|p| p.get(child)).cloned());
        }
        self.initial = value;
    }

    fn clone_widget(&self) -> Box<dyn Widget> {
        Box::new(self.clone())
    }
}
