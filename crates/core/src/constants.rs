//! Constants used throughout the forms core.
//!
//! Wire suffixes, message keys and rendering defaults live here so that the widgets that emit a
//! key and the code that parses it back agree on a single spelling.

/// Prefix of every allocated field identifier (`w1`, `w2`, ...).
pub const FIELD_PREFIX: &str = "w";

/// Suffix of the hidden companion carrying a coded concept id.
pub const HIDDEN_CODED_SUFFIX: &str = "_hid";

/// Sub-field suffixes used by time and zoned-datetime widgets.
pub const HOURS_SUFFIX: &str = "hours";
pub const MINUTES_SUFFIX: &str = "minutes";
pub const SECONDS_SUFFIX: &str = "seconds";
pub const TIMEZONE_SUFFIX: &str = "timezone";

/// Markup used by VIEW rendering when a widget holds no value.
pub const EMPTY_VALUE_MARKUP: &str = "<span class=\"emptyValue\">____</span>";

/// Wire format of submitted dates.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";
pub const DEFAULT_DATETIME_FORMAT: &str = "%d-%m-%Y, %H:%M:%S";
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M";
pub const DEFAULT_DATEPICKER_FORMAT: &str = "dd/mm/yy";
pub const DEFAULT_REFERENCE_MESSAGE: &str = "({{encounterType}} on {{encounterDate}})";
pub const DEFAULT_OVERRIDE_LABEL: &str = "Override";

/// Role used to find providers when the host has no provider registry.
pub const DEFAULT_PROVIDER_ROLE: &str = "Provider";

pub const MSG_REQUIRED: &str = "required";
pub const MSG_CANNOT_BE_IN_FUTURE: &str = "cannotBeInFuture";
pub const MSG_INVALID_DATE: &str = "invalidDate";
pub const MSG_INVALID_TIME: &str = "invalidTime";
pub const MSG_INVALID_TIMEZONE: &str = "invalidTimezone";
pub const MSG_NOT_A_NUMBER: &str = "notANumber";
pub const MSG_NOT_AN_INTEGER: &str = "notAnInteger";
pub const MSG_OUT_OF_RANGE: &str = "outOfRange";
pub const MSG_INVALID_OPTION: &str = "invalidOption";
pub const MSG_INVALID_CONCEPT: &str = "invalidConcept";
pub const MSG_END_BEFORE_ONSET: &str = "endDateBeforeOnsetDate";

pub const MSG_ENTER_FORM_BUTTON: &str = "htmlformentry.enterFormButton";
pub const MSG_SAVE_CHANGES_BUTTON: &str = "htmlformentry.saveChangesButton";
pub const MSG_VOIDED: &str = "general.voided";
