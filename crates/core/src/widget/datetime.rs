//! Date, time and zoned date-time widgets.
//!
//! Dates travel over the wire as ISO `YYYY-MM-DD` in a hidden input fed by a client-side date
//! picker. Times are split into `hours`/`minutes`/`seconds` sub-fields. A zoned date-time also
//! carries the UTC offset it was rendered in, so parsing never depends on the user's timezone
//! preference at submit time.

use super::{view_value, Widget, WidgetKind, WidgetValue};
use crate::config::parse_utc_offset;
use crate::constants::{
    HOURS_SUFFIX, ISO_DATE_FORMAT, MINUTES_SUFFIX, MSG_INVALID_DATE, MSG_INVALID_TIME,
    MSG_INVALID_TIMEZONE, MSG_REQUIRED, SECONDS_SUFFIX, TIMEZONE_SUFFIX,
};
use crate::context::FormEntryContext;
use crate::error::ParseError;
use crate::submission::Submission;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};

fn date_markup(ctx: &FormEntryContext, name: &str, iso: &str) -> String {
    format!(
        "<input type=\"text\" size=\"10\" id=\"{name}-display\"/>\
         <input type=\"hidden\" name=\"{name}\" id=\"{name}\" value=\"{iso}\"/>\
         <script type=\"text/javascript\">setupDatePicker('{}', '#{name}-display', '#{name}');</script>",
        ctx.config().datepicker_format()
    )
}

fn parse_date(raw: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(raw, ISO_DATE_FORMAT).map_err(|_| ParseError::new(MSG_INVALID_DATE, raw))
}

fn select(key: &str, range: std::ops::RangeInclusive<u32>, selected: Option<&str>) -> String {
    let mut html = format!("<select name=\"{key}\" id=\"{key}\"><option value=\"\"></option>");
    for value in range {
        let value = format!("{value:02}");
        let mark = if selected == Some(value.as_str()) {
            " selected=\"true\""
        } else {
            ""
        };
        html.push_str(&format!("<option value=\"{value}\"{mark}>{value}</option>"));
    }
    html.push_str("</select>");
    html
}

/// Hour, minute and optionally second selects keyed `<base>hours`, `<base>minutes`,
/// `<base>seconds`. Without visible seconds the seconds travel in a hidden input.
fn time_markup(
    ctx: &FormEntryContext,
    base: &str,
    time: Option<NaiveTime>,
    show_seconds: bool,
) -> String {
    let part = |suffix: &str, from_time: fn(&NaiveTime) -> u32| -> Option<String> {
        match ctx.resubmission() {
            Some(submission) => submission
                .get(&format!("{base}{suffix}"))
                .map(str::to_owned),
            None => time.as_ref().map(|t| format!("{:02}", from_time(t))),
        }
    };
    let hours = part(HOURS_SUFFIX, |t| t.hour());
    let minutes = part(MINUTES_SUFFIX, |t| t.minute());
    let seconds = part(SECONDS_SUFFIX, |t| t.second());

    let mut html = format!(
        "{}:{}",
        select(&format!("{base}{HOURS_SUFFIX}"), 0..=23, hours.as_deref()),
        select(&format!("{base}{MINUTES_SUFFIX}"), 0..=59, minutes.as_deref())
    );
    let seconds_key = format!("{base}{SECONDS_SUFFIX}");
    if show_seconds {
        html.push(':');
        html.push_str(&select(&seconds_key, 0..=59, seconds.as_deref()));
    } else {
        html.push_str(&format!(
            "<input type=\"hidden\" name=\"{seconds_key}\" id=\"{seconds_key}\" value=\"{}\"/>",
            seconds.unwrap_or_default()
        ));
    }
    html
}

/// Recombine the time sub-fields under `base`. `Ok(None)` when none of them was sent.
fn parse_time(submission: &Submission, base: &str) -> Result<Option<NaiveTime>, ParseError> {
    let hours = submission.text(&format!("{base}{HOURS_SUFFIX}"));
    let minutes = submission.text(&format!("{base}{MINUTES_SUFFIX}"));
    let seconds = submission.text(&format!("{base}{SECONDS_SUFFIX}"));
    if hours.is_none() && minutes.is_none() {
        return Ok(None);
    }

    let part = |raw: Option<&str>, max: u32| -> Result<u32, ParseError> {
        match raw {
            None => Ok(0),
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|v| *v <= max)
                .ok_or_else(|| ParseError::new(MSG_INVALID_TIME, raw)),
        }
    };
    let (h, m, s) = (part(hours, 23)?, part(minutes, 59)?, part(seconds, 59)?);
    NaiveTime::from_hms_opt(h, m, s)
        .map(Some)
        .ok_or_else(|| ParseError::new(MSG_INVALID_TIME, format!("{h}:{m}:{s}")))
}

/// Calendar date picker.
#[derive(Clone, Debug, Default)]
pub struct DateWidget {
    initial: Option<WidgetValue>,
}

impl DateWidget {
    pub fn new() -> Self {
        Self::default()
    }

    fn initial_date(&self) -> Option<NaiveDate> {
        self.initial.as_ref().and_then(WidgetValue::as_date)
    }
}

impl Widget for DateWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Date
    }

    fn render_view(&self, ctx: &FormEntryContext) -> String {
        let text = self
            .initial_date()
            .map(|d| d.format(ctx.config().date_format()).to_string());
        view_value(text.as_deref())
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let iso = match ctx.resubmission() {
            Some(submission) => submission.get(name).unwrap_or_default().to_owned(),
            None => self
                .initial_date()
                .map(|d| d.format(ISO_DATE_FORMAT).to_string())
                .unwrap_or_default(),
        };
        date_markup(ctx, name, &super::escape_attr(&iso))
    }

    fn value(
        &self,
        _ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        submission
            .text(name)
            .map(|raw| parse_date(raw).map(WidgetValue::Date))
            .transpose()
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

/// Time of day, without a date.
#[derive(Clone, Debug, Default)]
pub struct TimeWidget {
    initial: Option<WidgetValue>,
    show_seconds: bool,
}

impl TimeWidget {
    pub fn new(show_seconds: bool) -> Self {
        Self {
            initial: None,
            show_seconds,
        }
    }
}

impl Widget for TimeWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::Time
    }

    fn render_view(&self, ctx: &FormEntryContext) -> String {
        let text = self
            .initial
            .as_ref()
            .and_then(WidgetValue::as_time)
            .map(|t| t.format(ctx.config().time_format()).to_string());
        view_value(text.as_deref())
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let time = self.initial.as_ref().and_then(WidgetValue::as_time);
        time_markup(ctx, name, time, self.show_seconds)
    }

    fn value(
        &self,
        _ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        Ok(parse_time(submission, name)?.map(WidgetValue::Time))
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

/// An absolute instant entered as a local date and time in the user's display timezone.
#[derive(Clone, Debug)]
pub struct ZonedDateTimeWidget {
    initial: Option<WidgetValue>,
    required: bool,
    show_seconds: bool,
}

impl ZonedDateTimeWidget {
    pub fn new(required: bool) -> Self {
        Self {
            initial: None,
            required,
            show_seconds: false,
        }
    }

    pub fn show_seconds(mut self, show: bool) -> Self {
        self.show_seconds = show;
        self
    }

    fn initial_instant(&self) -> Option<DateTime<Utc>> {
        self.initial.as_ref().and_then(WidgetValue::as_instant)
    }

    fn render_offset(&self, ctx: &FormEntryContext, name: &str) -> FixedOffset {
        let submitted = ctx
            .resubmission()
            .and_then(|s| s.text(&format!("{name}{TIMEZONE_SUFFIX}")))
            .and_then(parse_utc_offset);
        submitted.unwrap_or_else(|| {
            ctx.display_offset(self.initial_instant().unwrap_or_else(|| ctx.now()))
        })
    }
}

impl Widget for ZonedDateTimeWidget {
    fn kind(&self) -> WidgetKind {
        WidgetKind::ZonedDateTime
    }

    fn render_view(&self, ctx: &FormEntryContext) -> String {
        let text = self
            .initial_instant()
            .map(|instant| {
                ctx.to_local(instant)
                    .format(ctx.config().datetime_format())
                    .to_string()
            });
        view_value(text.as_deref())
    }

    fn render_input(&self, ctx: &FormEntryContext, name: &str) -> String {
        let offset = self.render_offset(ctx, name);
        let local = self
            .initial_instant()
            .map(|instant| instant.with_timezone(&offset).naive_local());
        let iso = match ctx.resubmission() {
            Some(submission) => submission.get(name).unwrap_or_default().to_owned(),
            None => local
                .map(|dt| dt.date().format(ISO_DATE_FORMAT).to_string())
                .unwrap_or_default(),
        };
        let timezone_key = format!("{name}{TIMEZONE_SUFFIX}");
        format!(
            "{} {}<input type=\"hidden\" name=\"{timezone_key}\" id=\"{timezone_key}\" value=\"{offset}\"/>",
            date_markup(ctx, name, &super::escape_attr(&iso)),
            time_markup(ctx, name, local.map(|dt| dt.time()), self.show_seconds),
        )
    }

    fn value(
        &self,
        ctx: &FormEntryContext,
        name: &str,
        submission: &Submission,
    ) -> Result<Option<WidgetValue>, ParseError> {
        let Some(raw_date) = submission.text(name) else {
            if self.required {
                return Err(ParseError::new(MSG_REQUIRED, ""));
            }
            return Ok(None);
        };
        let date = parse_date(raw_date)?;
        let time = parse_time(submission, name)?.unwrap_or(NaiveTime::MIN);
        let offset = match submission.text(&format!("{name}{TIMEZONE_SUFFIX}")) {
            Some(raw) => parse_utc_offset(raw).ok_or_else(|| ParseError::new(MSG_INVALID_TIMEZONE, raw))?,
            None => ctx.display_offset(ctx.now()),
        };
        FormEntryContext::instant_from_local(date.and_time(time), offset)
            .map(|instant| Some(WidgetValue::Instant(instant)))
            .ok_or_else(|| ParseError::new(MSG_INVALID_DATE, raw_date))
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
    use crate::test_support::{context_with_timezone, enter_context, submitted_from_html};
    use chrono::TimeZone;

    #[test]
    fn zoned_round_trip_recovers_instant_to_the_second() {
        let ctx = context_with_timezone(FixedOffset::east_opt(3 * 3600 + 1800));
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 22, 45, 17).unwrap();
        let mut widget = ZonedDateTimeWidget::new(false);
        widget.set_initial_value(Some(WidgetValue::Instant(instant)));

        let html = widget.render_input(&ctx, "w1");
        assert!(html.contains("value=\"2024-03-02\""));
        assert!(html.contains("name=\"w1timezone\" id=\"w1timezone\" value=\"+03:30\""));

        let submission = submitted_from_html(&html);
        assert_eq!(submission.get("w1hours"), Some("02"));
        assert_eq!(submission.get("w1minutes"), Some("15"));
        assert_eq!(submission.get("w1seconds"), Some("17"));
        let parsed = widget.value(&ctx, "w1", &submission).expect("parses");
        assert_eq!(parsed, Some(WidgetValue::Instant(instant)));
    }

    #[test]
    fn zoned_parse_uses_submitted_offset_not_current_preference() {
        let ctx = context_with_timezone(FixedOffset::east_opt(9 * 3600));
        let widget = ZonedDateTimeWidget::new(false);
        let submission = Submission::from_pairs([
            ("w1", "2024-03-01"),
            ("w1hours", "10"),
            ("w1minutes", "00"),
            ("w1timezone", "-05:00"),
        ]);
        let parsed = widget.value(&ctx, "w1", &submission).expect("parses");
        assert_eq!(
            parsed,
            Some(WidgetValue::Instant(
                Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap()
            ))
        );
    }

    #[test]
    fn zoned_blank_date_is_none_when_optional_and_error_when_required() {
        let ctx = enter_context();
        let submission = Submission::from_pairs([("w1", ""), ("w1hours", "10")]);
        assert_eq!(
            ZonedDateTimeWidget::new(false).value(&ctx, "w1", &submission),
            Ok(None)
        );
        let err = ZonedDateTimeWidget::new(true)
            .value(&ctx, "w1", &submission)
            .expect_err("required");
        assert_eq!(err.message_key, MSG_REQUIRED);
    }

    #[test]
    fn zoned_rejects_bad_sub_fields() {
        let ctx = enter_context();
        let widget = ZonedDateTimeWidget::new(false);
        let bad_hour = Submission::from_pairs([("w1", "2024-03-01"), ("w1hours", "25")]);
        assert_eq!(
            widget.value(&ctx, "w1", &bad_hour).expect_err("hour").message_key,
            MSG_INVALID_TIME
        );
        let bad_zone = Submission::from_pairs([("w1", "2024-03-01"), ("w1timezone", "Mars")]);
        assert_eq!(
            widget.value(&ctx, "w1", &bad_zone).expect_err("zone").message_key,
            MSG_INVALID_TIMEZONE
        );
        let bad_date = Submission::from_pairs([("w1", "01/03/2024")]);
        assert_eq!(
            widget.value(&ctx, "w1", &bad_date).expect_err("date").message_key,
            MSG_INVALID_DATE
        );
    }

    #[test]
    fn date_widget_renders_picker_with_hidden_iso_value() {
        let ctx = enter_context();
        let mut widget = DateWidget::new();
        widget.set_initial_value(Some(WidgetValue::Date(
            NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"),
        )));
        let html = widget.render_input(&ctx, "w1");
        assert!(html.starts_with("<input type=\"text\" size=\"10\" id=\"w1-display\"/>"));
        assert!(html.contains("<input type=\"hidden\" name=\"w1\" id=\"w1\" value=\"2024-03-01\"/>"));
        assert!(html.contains("setupDatePicker('dd/mm/yy'"));
    }

    #[test]
    fn time_widget_without_sub_fields_is_empty() {
        let ctx = enter_context();
        let widget = TimeWidget::new(false);
        assert_eq!(widget.value(&ctx, "w2", &Submission::new()), Ok(None));
        let submission = Submission::from_pairs([("w2hours", "09"), ("w2minutes", "30")]);
        assert_eq!(
            widget.value(&ctx, "w2", &submission),
            Ok(Some(WidgetValue::Time(
                NaiveTime::from_hms_opt(9, 30, 0).expect("valid time")
            )))
        );
    }
}
