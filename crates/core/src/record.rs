//! Clinical record graph built or edited by a form.
//!
//! An [`Encounter`] is the root of the graph; observations and conditions hang off it. The form
//! engine never persists these types itself. It receives an existing encounter to edit (as a
//! snapshot), builds a [`PendingRecord`] from it and hands the finished encounter back to the
//! persistence collaborator.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use vpr_types::{ConceptId, ControlId, LocationId, PatientId, PersonId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: Uuid,
    pub patient: PatientId,
    pub encounter_type: String,
    pub datetime: Option<DateTime<Utc>>,
    pub provider: Option<PersonId>,
    pub location: Option<LocationId>,
    pub voided: bool,
    pub observations: Vec<Observation>,
    pub conditions: Vec<Condition>,
}

impl Encounter {
    pub fn new(patient: PatientId, encounter_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient,
            encounter_type: encounter_type.into(),
            datetime: None,
            provider: None,
            location: None,
            voided: false,
            observations: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Observations that have not been voided.
    pub fn active_observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter().filter(|o| !o.voided)
    }

    /// Conditions that have not been voided.
    pub fn active_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| !c.voided)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub concept: ConceptId,
    pub value: ObsValue,
    pub voided: bool,
}

impl Observation {
    pub fn new(concept: ConceptId, value: ObsValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            concept,
            value,
            voided: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ObsValue {
    Numeric(f64),
    Coded(ConceptId),
    Text(String),
    Date(NaiveDate),
    Datetime(DateTime<Utc>),
}

/// A coded concept or, when nothing in the dictionary fits, free text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodedOrFreeText {
    Coded { concept: ConceptId, display: String },
    NonCoded(String),
}

impl CodedOrFreeText {
    pub fn display(&self) -> &str {
        match self {
            CodedOrFreeText::Coded { display, .. } => display,
            CodedOrFreeText::NonCoded(text) => text,
        }
    }

    pub fn coded(&self) -> Option<ConceptId> {
        match self {
            CodedOrFreeText::Coded { concept, .. } => Some(*concept),
            CodedOrFreeText::NonCoded(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClinicalStatus {
    Active,
    Inactive,
    HistoryOf,
}

impl ClinicalStatus {
    pub const ALL: [ClinicalStatus; 3] = [
        ClinicalStatus::Active,
        ClinicalStatus::Inactive,
        ClinicalStatus::HistoryOf,
    ];

    /// Wire value used in rendered radio buttons.
    pub fn as_str(self) -> &'static str {
        match self {
            ClinicalStatus::Active => "active",
            ClinicalStatus::Inactive => "inactive",
            ClinicalStatus::HistoryOf => "history-of",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ClinicalStatus::Active => "Active",
            ClinicalStatus::Inactive => "Inactive",
            ClinicalStatus::HistoryOf => "History of",
        }
    }
}

impl fmt::Display for ClinicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClinicalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClinicalStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown clinical status '{s}'"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: Uuid,
    pub control_id: Option<ControlId>,
    pub condition: CodedOrFreeText,
    pub clinical_status: ClinicalStatus,
    pub onset_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub additional_detail: Option<String>,
    pub voided: bool,
}

/// The in-progress record owned by one form entry session.
///
/// Elements mutate it only while a validated submission is being applied.
#[derive(Clone, Debug)]
pub struct PendingRecord {
    encounter: Encounter,
    void_encounter: bool,
}

impl PendingRecord {
    pub fn new(encounter: Encounter) -> Self {
        Self {
            encounter,
            void_encounter: false,
        }
    }

    pub fn encounter(&self) -> &Encounter {
        &self.encounter
    }

    pub fn encounter_mut(&mut self) -> &mut Encounter {
        &mut self.encounter
    }

    /// Requests that the encounter be voided when the record is finished.
    ///
    /// A void request cannot be withdrawn.
    pub fn request_void(&mut self) {
        self.void_encounter = true;
    }

    pub fn void_requested(&self) -> bool {
        self.void_encounter
    }

    pub fn observation_mut(&mut self, id: Uuid) -> Option<&mut Observation> {
        self.encounter.observations.iter_mut().find(|o| o.id == id)
    }

    pub fn condition_mut(&mut self, id: Uuid) -> Option<&mut Condition> {
        self.encounter.conditions.iter_mut().find(|c| c.id == id)
    }

    /// Consumes the pending record, producing the encounter to hand to persistence.
    pub fn finish(mut self) -> Encounter {
        if self.void_encounter {
            self.encounter.voided = true;
        }
        self.encounter
    }
}
