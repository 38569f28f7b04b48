//! Form entry runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into every session. The
//! intent is to avoid reading process-wide environment variables while a form is rendered or a
//! submission is parsed, so that a render and the later submit always agree on formats and on the
//! server default timezone.

use crate::constants::{
    DEFAULT_DATEPICKER_FORMAT, DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT,
    DEFAULT_OVERRIDE_LABEL, DEFAULT_REFERENCE_MESSAGE, DEFAULT_TIME_FORMAT,
};
use crate::{FormError, FormResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{FixedOffset, Offset, Utc};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct FormEntryConfig {
    date_format: String,
    datetime_format: String,
    time_format: String,
    datepicker_format: String,
    default_offset: FixedOffset,
    timezone_conversions: bool,
    reference_message: String,
    override_label: String,
}

impl FormEntryConfig {
    /// Create a new `FormEntryConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::Configuration`] if any display format is not a valid strftime
    /// pattern.
    pub fn new(
        date_format: String,
        datetime_format: String,
        time_format: String,
        default_offset: FixedOffset,
        timezone_conversions: bool,
    ) -> FormResult<Self> {
        for (name, format) in [
            ("date format", &date_format),
            ("datetime format", &datetime_format),
            ("time format", &time_format),
        ] {
            validate_strftime(name, format)?;
        }

        Ok(Self {
            date_format,
            datetime_format,
            time_format,
            datepicker_format: DEFAULT_DATEPICKER_FORMAT.to_owned(),
            default_offset,
            timezone_conversions,
            reference_message: DEFAULT_REFERENCE_MESSAGE.to_owned(),
            override_label: DEFAULT_OVERRIDE_LABEL.to_owned(),
        })
    }

    pub fn with_datepicker_format(mut self, format: impl Into<String>) -> Self {
        self.datepicker_format = format.into();
        self
    }

    pub fn with_reference_message(mut self, template: impl Into<String>) -> Self {
        self.reference_message = template.into();
        self
    }

    pub fn with_override_label(mut self, label: impl Into<String>) -> Self {
        self.override_label = label.into();
        self
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    pub fn datetime_format(&self) -> &str {
        &self.datetime_format
    }

    pub fn time_format(&self) -> &str {
        &self.time_format
    }

    pub fn datepicker_format(&self) -> &str {
        &self.datepicker_format
    }

    /// Offset used when no per-user timezone preference applies.
    pub fn default_offset(&self) -> FixedOffset {
        self.default_offset
    }

    /// Whether per-user timezone preferences are honoured at all.
    pub fn timezone_conversions(&self) -> bool {
        self.timezone_conversions
    }

    pub fn reference_message(&self) -> &str {
        &self.reference_message
    }

    pub fn override_label(&self) -> &str {
        &self.override_label
    }
}

impl Default for FormEntryConfig {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_owned(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_owned(),
            time_format: DEFAULT_TIME_FORMAT.to_owned(),
            datepicker_format: DEFAULT_DATEPICKER_FORMAT.to_owned(),
            default_offset: utc(),
            timezone_conversions: true,
            reference_message: DEFAULT_REFERENCE_MESSAGE.to_owned(),
            override_label: DEFAULT_OVERRIDE_LABEL.to_owned(),
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn validate_strftime(name: &str, format: &str) -> FormResult<()> {
    if format.trim().is_empty() {
        return Err(FormError::Configuration(format!("{name} cannot be empty")));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(FormError::Configuration(format!(
            "{name} '{format}' is not a valid strftime pattern"
        )));
    }
    Ok(())
}

/// Parse a UTC offset such as `+03:00`, `-0530`, `Z` or `UTC`.
///
/// Returns `None` for anything that is not a recognisable offset.
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[0..2].parse().ok()?;
    let minutes: i32 = digits[2..4].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Build a [`FormEntryConfig`] from optional string values (typically environment variables).
///
/// Missing or blank values fall back to the defaults in [`crate::constants`].
///
/// # Errors
///
/// Returns [`FormError::Configuration`] for an unparsable offset or boolean, or an invalid
/// format pattern.
pub fn config_from_env_values(
    date_format: Option<String>,
    datetime_format: Option<String>,
    default_offset: Option<String>,
    timezone_conversions: Option<String>,
) -> FormResult<FormEntryConfig> {
    fn present(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    let offset = match present(default_offset) {
        Some(raw) => parse_utc_offset(&raw).ok_or_else(|| {
            FormError::Configuration(format!("'{raw}' is not a valid UTC offset"))
        })?,
        None => utc(),
    };

    let conversions = match present(timezone_conversions) {
        Some(raw) => raw.parse::<bool>().map_err(|_| {
            FormError::Configuration(format!("'{raw}' is not a valid boolean"))
        })?,
        None => true,
    };

    FormEntryConfig::new(
        present(date_format).unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_owned()),
        present(datetime_format).unwrap_or_else(|| DEFAULT_DATETIME_FORMAT.to_owned()),
        DEFAULT_TIME_FORMAT.to_owned(),
        offset,
        conversions,
    )
}
