//! Collaborator interfaces consumed by the form engine.
//!
//! Storage, dictionary lookups, user preferences and the clock are all owned by the host. They
//! are passed into element constructors as a [`FormServices`] bundle instead of being reached
//! through global state, which keeps every element testable with in-memory fakes.

use crate::error::LookupError;
use crate::record::Observation;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use vpr_types::{ConceptId, LocationId, PatientId, PersonId};

/// Value shape of a concept, which decides the widget used to capture it.
#[derive(Clone, Debug, PartialEq)]
pub enum ConceptDatatype {
    Numeric {
        units: Option<String>,
        min: Option<f64>,
        max: Option<f64>,
        allow_decimal: bool,
    },
    Coded {
        answers: Vec<ConceptAnswer>,
    },
    Text,
    Date,
    Datetime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConceptAnswer {
    pub concept: ConceptId,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Concept {
    pub id: ConceptId,
    pub name: String,
    pub datatype: ConceptDatatype,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
}

/// Inclusive instant range used for record lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// An observation recorded in some earlier encounter, with enough context to describe it.
#[derive(Clone, Debug, PartialEq)]
pub struct PriorObservation {
    pub observation: Observation,
    pub encounter_type: String,
    pub encounter_datetime: DateTime<Utc>,
}

/// Read access to previously persisted clinical data.
pub trait RecordLookup: Send + Sync {
    /// Prior observations of `concept` for `patient` whose encounter falls inside `window`,
    /// most recent first. An empty list means nothing was found.
    fn prior_observations(
        &self,
        patient: PatientId,
        concept: ConceptId,
        window: &DateWindow,
    ) -> Result<Vec<PriorObservation>, LookupError>;
}

/// Resolution of dictionary and directory entities referenced by form attributes.
pub trait EntityResolver: Send + Sync {
    /// Concept by numeric id or by exact name.
    fn concept(&self, key: &str) -> Option<Concept>;
    /// Person by numeric id or by exact name.
    fn person(&self, key: &str) -> Option<Person>;
    /// Location by numeric id or by exact name.
    fn location(&self, key: &str) -> Option<Location>;
    fn locations(&self) -> Vec<Location>;
    fn role_exists(&self, role: &str) -> bool;
    /// Users holding `role`, or every user when `role` is `None`.
    fn users_with_role(&self, role: Option<&str>) -> Vec<Person>;
    /// Persons registered as providers. Only meaningful when the host supports providers.
    fn providers(&self) -> Vec<Person>;
    fn current_user(&self) -> Option<Person>;
}

/// Per-user locale and timezone preferences.
pub trait PreferenceService: Send + Sync {
    /// Offset the current user wants instants displayed in, at the given instant.
    fn user_timezone(&self, _at: DateTime<Utc>) -> Option<FixedOffset> {
        None
    }

    /// Localised text for a message key. Defaults to the key itself.
    fn message(&self, key: &str) -> String {
        key.to_owned()
    }
}

/// Preferences backed by a fixed offset and an in-memory message table.
#[derive(Clone, Debug, Default)]
pub struct StaticPreferences {
    timezone: Option<FixedOffset>,
    messages: HashMap<String, String>,
}

impl StaticPreferences {
    pub fn new(timezone: Option<FixedOffset>) -> Self {
        Self {
            timezone,
            messages: HashMap::new(),
        }
    }

    pub fn with_message(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.messages.insert(key.into(), text.into());
        self
    }
}

impl PreferenceService for StaticPreferences {
    fn user_timezone(&self, _at: DateTime<Utc>) -> Option<FixedOffset> {
        self.timezone
    }

    fn message(&self, key: &str) -> String {
        self.messages
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_owned())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Optional platform capabilities, declared by the host when the services are assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    /// The host keeps a provider registry separate from user roles.
    pub providers_supported: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            providers_supported: true,
        }
    }
}

/// Collaborators handed to every element constructor.
#[derive(Clone)]
pub struct FormServices {
    pub records: Arc<dyn RecordLookup>,
    pub entities: Arc<dyn EntityResolver>,
    pub preferences: Arc<dyn PreferenceService>,
    pub clock: Arc<dyn Clock>,
    pub capabilities: HostCapabilities,
}

impl FormServices {
    pub fn new(
        records: Arc<dyn RecordLookup>,
        entities: Arc<dyn EntityResolver>,
        preferences: Arc<dyn PreferenceService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records,
            entities,
            preferences,
            clock,
            capabilities: HostCapabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl fmt::Debug for FormServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormServices")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
