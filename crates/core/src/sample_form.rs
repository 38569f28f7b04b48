//! A small outpatient form and the dictionary it draws on.
//!
//! Used by the command line tool and the HTTP server, and as the shared fixture of the unit
//! tests.

use crate::config::FormEntryConfig;
use crate::context::Mode;
use crate::element::{
    ConditionElement, EncounterDetailElement, ObservationElement, ObservationReferenceElement,
    SubmitButtonElement, TagAttributes,
};
use crate::memory::StaticEntities;
use crate::record::Encounter;
use crate::services::{Concept, ConceptAnswer, ConceptDatatype, FormServices};
use crate::session::FormEntrySession;
use crate::FormResult;
use std::sync::Arc;
use vpr_types::{ConceptId, PatientId};

pub const SAMPLE_ENCOUNTER_TYPE: &str = "Outpatient Consultation";

fn coded(id: u32, name: &str, answers: &[(u32, &str)]) -> Concept {
    Concept {
        id: ConceptId(id),
        name: name.to_owned(),
        datatype: ConceptDatatype::Coded {
            answers: answers
                .iter()
                .map(|(id, label)| ConceptAnswer {
                    concept: ConceptId(*id),
                    label: (*label).to_owned(),
                })
                .collect(),
        },
    }
}

fn diagnosis(id: u32, name: &str) -> Concept {
    Concept {
        id: ConceptId(id),
        name: name.to_owned(),
        datatype: ConceptDatatype::Text,
    }
}

pub fn sample_entities() -> StaticEntities {
    StaticEntities::new()
        .with_concept(Concept {
            id: ConceptId(5089),
            name: "Weight (kg)".to_owned(),
            datatype: ConceptDatatype::Numeric {
                units: Some("kg".to_owned()),
                min: Some(0.0),
                max: Some(250.0),
                allow_decimal: true,
            },
        })
        .with_concept(coded(
            1284,
            "Smoking status",
            &[(1090, "Never smoked"), (1091, "Current smoker"), (1092, "Former smoker")],
        ))
        .with_concept(diagnosis(3476, "Epilepsy"))
        .with_concept(diagnosis(117399, "Hypertension"))
        .with_concept(diagnosis(119481, "Diabetes mellitus"))
        .with_user(1, "Super User", &["System Developer"])
        .with_user(502, "Dr Hippocrates", &["Provider"])
        .with_user(503, "Nurse Nightingale", &["Nurse"])
        .with_user(504, "Dr Watson", &["Provider"])
        .with_person(505, "Dr Jekyll")
        .with_provider(502)
        .with_provider(505)
        .with_current_user(1)
        .with_location(1, "Outpatient Clinic")
        .with_location(2, "Emergency")
        .with_location(3, "Community Ward")
}

fn attrs(pairs: &[(&str, &str)]) -> TagAttributes {
    TagAttributes::from_pairs(pairs.iter().copied())
}

/// The outpatient consultation form: encounter details, weight with a same-day reference,
/// smoking status, a preset hypertension entry and two free condition entries.
///
/// # Errors
///
/// Returns a configuration error if `services` cannot resolve the sample dictionary, or a mode
/// mismatch between `mode` and `existing`.
pub fn sample_session(
    mode: Mode,
    config: Arc<FormEntryConfig>,
    services: FormServices,
    patient: PatientId,
    existing: Option<Encounter>,
) -> FormResult<FormEntrySession> {
    let details = attrs(&[
        ("date", "true"),
        ("showTime", "true"),
        ("defaultDate", "now"),
        ("provider", "true"),
        ("defaultProvider", "currentuser"),
        ("location", "true"),
        ("showVoidEncounter", "true"),
    ]);
    let weight = attrs(&[("conceptId", "5089"), ("showUnits", "true")]);
    let smoking = attrs(&[("conceptId", "1284"), ("style", "radio")]);
    let hypertension = attrs(&[("conceptId", "117399"), ("controlId", "htn"), ("required", "true")]);
    let other = attrs(&[]);
    let detailed = attrs(&[("showAdditionalDetail", "true")]);
    let submit = attrs(&[]);

    FormEntrySession::builder(mode, config, services, patient)
        .existing_encounter(existing)
        .encounter_type(SAMPLE_ENCOUNTER_TYPE)
        .html("<div class=\"htmlform outpatient\">")
        .html("<fieldset class=\"encounter\"><legend>Encounter</legend>")
        .element(move |ctx, svc| EncounterDetailElement::new(ctx, svc, &details))
        .html("</fieldset><fieldset class=\"vitals\"><legend>Vitals</legend>")
        .element(move |ctx, svc| ObservationReferenceElement::new(ctx, svc, &weight))
        .element(move |ctx, svc| ObservationElement::new(ctx, svc, &smoking))
        .html("</fieldset><fieldset class=\"conditions\"><legend>Conditions</legend>")
        .element(move |ctx, svc| ConditionElement::new(ctx, svc, &hypertension))
        .element(move |ctx, svc| ConditionElement::new(ctx, svc, &other))
        .element(move |ctx, svc| ConditionElement::new(ctx, svc, &detailed))
        .html("</fieldset>")
        .element(move |_, _| Ok(SubmitButtonElement::new(&submit)))
        .html("</div>")
        .build()
}
