//! Embargo state resolver.
//!
//! Derives the visibility state for one record from its raw access-control
//! fields. Two states: no embargo (the default, and the result for any
//! past or unparseable embargo date) and an active embargo, which carries a
//! release date and the three visibility fields the import format expects.
//! Computed once per record; never re-evaluated.

use chrono::{NaiveDate, NaiveDateTime};

use crate::value::FieldValue;

const EMBARGO_DATE_FORMAT: &str = "%Y-%m-%d";

/// The raw access-control fields, as they appear on the record.
#[derive(Debug, Default)]
pub struct EmbargoFields<'a> {
    pub embargo_date: Option<&'a FieldValue>,
    pub metadata_visibility: Option<&'a FieldValue>,
    pub full_text_status: Option<&'a FieldValue>,
    pub security: Option<&'a FieldValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Normal,
    Embargo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbargoAccess {
    Open,
    Authenticated,
    Restricted,
}

impl EmbargoAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbargoAccess::Open => "open",
            EmbargoAccess::Authenticated => "authenticated",
            EmbargoAccess::Restricted => "restricted",
        }
    }
}

/// The derived embargo state. Exists only transiently during normalization
/// of one record; the normalizer merges the set fields into the output.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EmbargoDecision {
    pub release_date: Option<NaiveDate>,
    pub visibility: Option<Visibility>,
    pub during: Option<EmbargoAccess>,
    pub after: Option<EmbargoAccess>,
}

impl EmbargoDecision {
    pub fn is_active(&self) -> bool {
        self.release_date.is_some()
    }
}

/// Derive the embargo state from the raw fields at the given processing
/// time.
///
/// The embargo is active only when the date field is present and parses to
/// a point strictly after `now`. While active:
/// - visibility becomes `embargo` when the metadata-visibility flag or the
///   full-text-status flag is present and not the literal `"show"` (an OR:
///   either flag alone suffices, and setting is idempotent);
/// - the security classification maps `public` → open, `validuser` →
///   authenticated, `restricted` → restricted, anything else unset;
/// - visibility-after-embargo is always open, unconditionally.
pub fn resolve(fields: &EmbargoFields<'_>, now: NaiveDateTime) -> EmbargoDecision {
    let Some(raw_date) = fields.embargo_date.and_then(FieldValue::first) else {
        return EmbargoDecision::default();
    };
    let Ok(release_date) = NaiveDate::parse_from_str(raw_date, EMBARGO_DATE_FORMAT) else {
        // Unparseable dates never gate access.
        return EmbargoDecision::default();
    };
    let release_midnight = release_date.and_hms_opt(0, 0, 0).unwrap_or_default();
    if release_midnight <= now {
        return EmbargoDecision::default();
    }

    let mut decision = EmbargoDecision {
        release_date: Some(release_date),
        visibility: None,
        during: None,
        after: Some(EmbargoAccess::Open),
    };

    let hides = |field: Option<&FieldValue>| {
        field
            .and_then(FieldValue::first)
            .map(|flag| flag != "show")
            .unwrap_or(false)
    };
    if hides(fields.metadata_visibility) || hides(fields.full_text_status) {
        decision.visibility = Some(Visibility::Embargo);
    }

    decision.during = match fields.security.and_then(FieldValue::first) {
        Some("public") => Some(EmbargoAccess::Open),
        Some("validuser") => Some(EmbargoAccess::Authenticated),
        Some("restricted") => Some(EmbargoAccess::Restricted),
        _ => None,
    };

    decision
}
