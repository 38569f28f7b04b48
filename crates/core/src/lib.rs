//! # VPR Forms Core
//!
//! HTML form entry engine for clinical encounters.
//!
//! A form is an ordered list of static markup and submission elements. Each element registers
//! the widgets it needs in a [`FormEntryContext`], which hands out stable field identifiers
//! (`w1`, `w2`, ...). The same form then renders in one of three modes:
//! - **VIEW**: read-only display of an existing encounter
//! - **ENTER**: blank (or defaulted) inputs producing a new encounter
//! - **EDIT**: inputs pre-filled from an existing encounter
//!
//! Submissions are processed in two phases. Every element validates first; only when no
//! element reports an error are the values applied to a [`PendingRecord`], which the host then
//! persists.
//!
//! **No persistence or HTTP concerns**: storage, the concept dictionary and user preferences are
//! reached through the collaborator traits in [`services`].

pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod element;
pub mod error;
pub mod field_id;
pub mod memory;
pub mod record;
pub mod sample_form;
pub mod services;
pub mod session;
pub mod submission;
pub mod widget;

#[cfg(test)]
mod test_support;

pub use config::FormEntryConfig;
pub use context::{FormEntryContext, Mode};
pub use controller::FormSubmissionController;
pub use error::{FormError, FormResult, LookupError, ParseError, SubmissionError};
pub use field_id::FieldIdentifier;
pub use record::{Encounter, PendingRecord};
pub use services::FormServices;
pub use session::{FormEntrySession, SubmissionOutcome};
pub use submission::Submission;
