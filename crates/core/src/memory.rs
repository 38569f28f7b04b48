//! In-memory collaborators.
//!
//! The demo server and CLI keep encounters and directory data in process memory. These types are
//! also the fakes the unit tests run against.

use crate::error::LookupError;
use crate::record::Encounter;
use crate::services::{Concept, DateWindow, EntityResolver, Location, Person, PriorObservation, RecordLookup};
use indexmap::IndexMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;
use vpr_types::{ConceptId, LocationId, PatientId, PersonId};

/// Encounter store keyed by encounter id, in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    encounters: RwLock<IndexMap<Uuid, Encounter>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an encounter.
    pub fn save(&self, encounter: Encounter) {
        let mut encounters = self
            .encounters
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(encounter = %encounter.id, "saving encounter");
        encounters.insert(encounter.id, encounter);
    }

    pub fn get(&self, id: Uuid) -> Option<Encounter> {
        self.encounters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// All encounters of `patient`, oldest first.
    pub fn list(&self, patient: PatientId) -> Vec<Encounter> {
        let mut found: Vec<Encounter> = self
            .encounters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.patient == patient)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.datetime);
        found
    }
}

impl RecordLookup for InMemoryRecordStore {
    fn prior_observations(
        &self,
        patient: PatientId,
        concept: ConceptId,
        window: &DateWindow,
    ) -> Result<Vec<PriorObservation>, LookupError> {
        let encounters = self
            .encounters
            .read()
            .map_err(|_| LookupError("encounter store lock poisoned".into()))?;

        let mut found: Vec<PriorObservation> = encounters
            .values()
            .filter(|e| e.patient == patient && !e.voided)
            .filter_map(|e| e.datetime.filter(|at| window.contains(*at)).map(|at| (e, at)))
            .flat_map(|(e, at)| {
                e.active_observations()
                    .filter(|o| o.concept == concept)
                    .map(move |o| PriorObservation {
                        observation: o.clone(),
                        encounter_type: e.encounter_type.clone(),
                        encounter_datetime: at,
                    })
            })
            .collect();
        found.sort_by(|a, b| b.encounter_datetime.cmp(&a.encounter_datetime));
        Ok(found)
    }
}

/// Directory data fixed at construction.
#[derive(Clone, Debug, Default)]
pub struct StaticEntities {
    concepts: Vec<Concept>,
    persons: Vec<Person>,
    locations: Vec<Location>,
    users: Vec<PersonId>,
    roles: IndexMap<String, Vec<PersonId>>,
    providers: Vec<PersonId>,
    current_user: Option<PersonId>,
}

impl StaticEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concept(mut self, concept: Concept) -> Self {
        self.concepts.push(concept);
        self
    }

    pub fn with_location(mut self, id: u32, name: &str) -> Self {
        self.locations.push(Location {
            id: LocationId(id),
            name: name.to_owned(),
        });
        self
    }

    /// A person with no login.
    pub fn with_person(mut self, id: u32, name: &str) -> Self {
        self.persons.push(Person {
            id: PersonId(id),
            name: name.to_owned(),
        });
        self
    }

    /// A person who is also a user holding `roles`.
    pub fn with_user(mut self, id: u32, name: &str, roles: &[&str]) -> Self {
        self = self.with_person(id, name);
        self.users.push(PersonId(id));
        for role in roles {
            self.roles
                .entry((*role).to_owned())
                .or_default()
                .push(PersonId(id));
        }
        self
    }

    pub fn with_provider(mut self, id: u32) -> Self {
        self.providers.push(PersonId(id));
        self
    }

    pub fn with_current_user(mut self, id: u32) -> Self {
        self.current_user = Some(PersonId(id));
        self
    }

    fn person_by_id(&self, id: PersonId) -> Option<Person> {
        self.persons.iter().find(|p| p.id == id).cloned()
    }

    fn persons_by_ids(&self, ids: &[PersonId]) -> Vec<Person> {
        ids.iter().filter_map(|id| self.person_by_id(*id)).collect()
    }
}

impl EntityResolver for StaticEntities {
    fn concept(&self, key: &str) -> Option<Concept> {
        let key = key.trim();
        let found = match key.parse::<ConceptId>() {
            Ok(id) => self.concepts.iter().find(|c| c.id == id),
            Err(_) => self.concepts.iter().find(|c| c.name == key),
        };
        found.cloned()
    }

    fn person(&self, key: &str) -> Option<Person> {
        let key = key.trim();
        match key.parse::<PersonId>() {
            Ok(id) => self.person_by_id(id),
            Err(_) => self.persons.iter().find(|p| p.name == key).cloned(),
        }
    }

    fn location(&self, key: &str) -> Option<Location> {
        let key = key.trim();
        let found = match key.parse::<LocationId>() {
            Ok(id) => self.locations.iter().find(|l| l.id == id),
            Err(_) => self.locations.iter().find(|l| l.name == key),
        };
        found.cloned()
    }

    fn locations(&self) -> Vec<Location> {
        self.locations.clone()
    }

    fn role_exists(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    fn users_with_role(&self, role: Option<&str>) -> Vec<Person> {
        match role {
            Some(role) => self
                .roles
                .get(role)
                .map(|ids| self.persons_by_ids(ids))
                .unwrap_or_default(),
            None => self.persons_by_ids(&self.users),
        }
    }

    fn providers(&self) -> Vec<Person> {
        self.persons_by_ids(&self.providers)
    }

    fn current_user(&self) -> Option<Person> {
        self.current_user.and_then(|id| self.person_by_id(id))
    }
}
