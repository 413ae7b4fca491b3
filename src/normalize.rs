//! Record normalizer: one raw export record in, one import record out.
//!
//! The rules here are fixed and enumerated, not declarative; this is a
//! one-shot migration, not a schema-mapping engine. Rule order matters
//! because later rules consume the outputs of earlier ones (the final fold
//! runs over everything the earlier rules produced).
//!
//! Nothing in this module raises past the record boundary: every failure
//! degrades to a defaulted or omitted value plus an audit entry, and the
//! record is always returned together with its aggregate error flag. The
//! only `Err` this module produces is a failed audit write, which is fatal
//! to the whole run.

use std::io;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::audit::{AuditLog, LogChannel};
use crate::categories::CategoryTable;
use crate::committee;
use crate::embargo::{self, EmbargoFields};
use crate::encoding::fix_encoding;
use crate::languages::{LanguageLookup, LanguageTable};
use crate::transport::{download_file, DownloadOutcome, Transport};
use crate::value::FieldValue;

/// Sentinel written into required fields that arrive missing or empty.
pub const NOT_SPECIFIED: &str = "Not Specified";

/// Constant output field: every record in this migration is an ETD.
const MODEL_LITERAL: &str = "Etd";

const FILE_URL_FIELD: &str = "documents/document/files/file/url";
const EMBARGO_DATE_FIELD: &str = "documents/document/date_embargo";
const SECURITY_FIELD: &str = "documents/document/security";

/// An unordered raw export record: field name to scalar or list.
pub type RawRecord = Map<String, Value>;

/// A normalized import record. Field insertion order is preserved; the
/// batch writer derives its CSV header from the union of these keys.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedRecord {
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl NormalizedRecord {
    pub fn set_scalar(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), Value::String(value.into()));
    }

    pub fn set_list(&mut self, key: &str, values: Vec<String>) {
        self.fields.insert(
            key.to_string(),
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Read a field as a tagged scalar-or-list value.
fn field(raw: &RawRecord, key: &str) -> Option<FieldValue> {
    raw.get(key).and_then(FieldValue::from_json)
}

/// Fields copied through unchanged when present, in export order.
const PASS_THROUGH_HEAD: [&str; 2] = ["title", "creator"];
const PASS_THROUGH_AFTER_RIGHTS: [&str; 2] = ["license", "type"];
const PASS_THROUGH_AFTER_DISCIPLINE: [&str; 2] = ["grantor", "advisor"];
const PASS_THROUGH_AFTER_COMMITTEE: [&str; 7] = [
    "department",
    "format",
    "date",
    "contributor",
    "description",
    "publisher",
    "subject",
];
const PASS_THROUGH_TAIL: [&str; 4] = ["relation", "source", "abstract", "admin_note"];

/// Normalizes raw records against the shared read-only tables.
///
/// One instance serves the whole run; per-record state lives on the stack.
pub struct Normalizer<'a, T: Transport + ?Sized> {
    categories: &'a CategoryTable,
    languages: &'a LanguageTable,
    audit: &'a AuditLog,
    transport: &'a T,
    working_files_dir: PathBuf,
    now: NaiveDateTime,
}

impl<'a, T: Transport + ?Sized> Normalizer<'a, T> {
    pub fn new(
        categories: &'a CategoryTable,
        languages: &'a LanguageTable,
        audit: &'a AuditLog,
        transport: &'a T,
        working_files_dir: impl Into<PathBuf>,
        now: NaiveDateTime,
    ) -> Self {
        Normalizer {
            categories,
            languages,
            audit,
            transport,
            working_files_dir: working_files_dir.into(),
            now,
        }
    }

    /// Produce the normalized record and whether any defaulting or lookup
    /// failure was flagged along the way.
    pub async fn normalize(&self, mut raw: RawRecord) -> io::Result<(NormalizedRecord, bool)> {
        let mut with_errors = false;
        let mut out = NormalizedRecord::default();

        // Pre-pass: the export wraps scalars in single-element lists.
        for value in raw.values_mut() {
            if let Value::Array(items) = value {
                if items.len() == 1 {
                    *value = items.remove(0);
                }
            }
        }

        let source_identifier = field(&raw, "source_identifier")
            .and_then(|v| v.first().map(str::to_string))
            .unwrap_or_default();
        info!(item = %source_identifier, "Parsing item");
        self.audit.write(
            LogChannel::Details,
            &format!("Parsing item: {}", source_identifier),
        )?;

        // source_identifier and the derived canonical identifier. The data
        // mixes http and https and sometimes carries the interstitial
        // id/eprint path; standardize on the https form without it.
        if !source_identifier.is_empty() {
            out.set_scalar("source_identifier", source_identifier.clone());
            let prefix = Regex::new(r"^https?://d-scholarship\.pitt\.edu/(id/eprint/)?")
                .expect("static pattern");
            let tail = prefix.replace(&source_identifier, "");
            out.set_scalar(
                "identifier",
                format!("https://d-scholarship.pitt.edu/{}", tail),
            );
        }

        out.set_scalar("model", MODEL_LITERAL);

        // Parents closure: each input category id plus every ancestor the
        // category tree resolved for it, deduplicated and sorted.
        let mut closure: Vec<String> = Vec::new();
        if let Some(parents) = field(&raw, "parents") {
            let ids = match parents {
                FieldValue::Scalar(s) => vec![s],
                FieldValue::List(items) => items,
            };
            for parent_id in ids {
                closure.push(parent_id.clone());
                match self.categories.get(&parent_id) {
                    Some(node) => closure.extend(node.parents.iter().cloned()),
                    None => {
                        error!(category = %parent_id, "Parent category not in table");
                        self.audit.write(
                            LogChannel::Error,
                            &format!(
                                "Object \"{}\" does not have a match in our categories",
                                parent_id
                            ),
                        )?;
                        with_errors = true;
                    }
                }
            }
        }
        closure.sort();
        closure.dedup();
        out.set_list("parents", closure);

        // File acquisition. Files that fail after the retry are simply
        // omitted; an empty result still emits the item field.
        let mut item_files: Vec<String> = Vec::new();
        if let Some(urls) = field(&raw, FILE_URL_FIELD) {
            let urls = match urls {
                FieldValue::Scalar(s) => vec![s],
                FieldValue::List(items) => items,
            };
            for url in urls {
                let outcome =
                    download_file(self.transport, &url, &self.working_files_dir, self.audit)
                        .await?;
                if let DownloadOutcome::Downloaded(name) = outcome {
                    item_files.push(name);
                }
            }
        }
        if item_files.is_empty() {
            out.set_scalar("item", "");
        } else {
            out.set_list("item", item_files);
        }

        self.pass_through(&raw, &mut out, &PASS_THROUGH_HEAD);

        if self.require_field(&raw, &mut out, "keyword", "keyword", LogChannel::MissingKeywords, &source_identifier)? {
            with_errors = true;
        }
        if self.require_field(&raw, &mut out, "rights", "rights", LogChannel::MissingRights, &source_identifier)? {
            with_errors = true;
        }

        self.pass_through(&raw, &mut out, &PASS_THROUGH_AFTER_RIGHTS);

        if self.require_field(&raw, &mut out, "degree", "degree_name", LogChannel::MissingDegreeName, &source_identifier)? {
            with_errors = true;
        }
        if self.require_field(&raw, &mut out, "level", "degree_level", LogChannel::MissingDegreeLevel, &source_identifier)? {
            with_errors = true;
        }

        // Discipline: the category id becomes its breadcrumb string.
        if let Some(discipline) = field(&raw, "discipline") {
            let id = discipline.first().unwrap_or_default();
            match self.categories.breadcrumb(id) {
                Some(breadcrumb) => out.set_scalar("discipline", breadcrumb),
                None => {
                    error!(discipline = %id, "Discipline has no resolvable breadcrumb");
                    self.audit.write(
                        LogChannel::Error,
                        &format!("Object \"{}\" does not have a match in our categories", id),
                    )?;
                    with_errors = true;
                }
            }
        }

        self.pass_through(&raw, &mut out, &PASS_THROUGH_AFTER_DISCIPLINE);

        // Committee ordering only applies to list input; a lone scalar has
        // no role information worth reordering and yields no output.
        if let Some(FieldValue::List(members)) = field(&raw, "committee_member") {
            out.set_list("committee_member", committee::order(&members));
        }

        self.pass_through(&raw, &mut out, &PASS_THROUGH_AFTER_COMMITTEE);

        // Language substitution: resolved codes become display names,
        // unresolved codes are retained as-is.
        if let Some(language) = field(&raw, "language") {
            let code = language.first().unwrap_or_default().to_string();
            match self.languages.by_code(&FieldValue::Scalar(code.clone())) {
                LanguageLookup::Resolved(name) => out.set_scalar("language", name),
                _ => {
                    error!(code = %code, "Language code not in table, keeping original");
                    self.audit.write(
                        LogChannel::Error,
                        &format!(
                            "Object \"{}\" has unresolvable language code: {}",
                            source_identifier, code
                        ),
                    )?;
                    with_errors = true;
                    out.set_scalar("language", code);
                }
            }
        }

        self.pass_through(&raw, &mut out, &PASS_THROUGH_TAIL);

        self.apply_embargo(&raw, &mut out, &source_identifier)?;

        // Final fold: remaining lists become pipe-delimited strings with
        // escaped literal pipes, and every non-empty scalar goes through
        // the encoding repair.
        self.fold_remaining(&mut out)?;

        if with_errors {
            self.audit.write(
                LogChannel::Details,
                &format!("Object \"{}\" was converted, with errors.", source_identifier),
            )?;
        } else {
            self.audit.write(
                LogChannel::Details,
                &format!("Object \"{}\" was converted.", source_identifier),
            )?;
        }

        Ok((out, with_errors))
    }

    fn pass_through(&self, raw: &RawRecord, out: &mut NormalizedRecord, keys: &[&str]) {
        for key in keys {
            if let Some(value) = field(raw, key) {
                out.fields.insert((*key).to_string(), value.into_json());
            }
        }
    }

    /// Default a required field to the sentinel when missing or empty,
    /// logging to the general, detailed, and field-specific channels.
    /// Returns whether the default fired.
    fn require_field(
        &self,
        raw: &RawRecord,
        out: &mut NormalizedRecord,
        source_key: &str,
        output_key: &str,
        channel: LogChannel,
        source_identifier: &str,
    ) -> io::Result<bool> {
        let value = field(raw, source_key);
        if let Some(value) = &value {
            if !value.is_empty() {
                out.fields
                    .insert(output_key.to_string(), value.clone().into_json());
                return Ok(false);
            }
        }

        out.set_scalar(output_key, NOT_SPECIFIED);
        let message = format!(
            "Object \"{}\" is missing required field: {}",
            source_identifier, output_key
        );
        error!(item = %source_identifier, field = output_key, "Missing required field");
        self.audit.write(LogChannel::Error, &message)?;
        self.audit.write(LogChannel::Details, &message)?;
        self.audit.write(channel, &message)?;
        Ok(true)
    }

    fn apply_embargo(
        &self,
        raw: &RawRecord,
        out: &mut NormalizedRecord,
        source_identifier: &str,
    ) -> io::Result<()> {
        let embargo_date = field(raw, EMBARGO_DATE_FIELD);
        let metadata_visibility = field(raw, "metadata_visibility");
        let full_text_status = field(raw, "full_text_status");
        let security = field(raw, SECURITY_FIELD);

        let fields = EmbargoFields {
            embargo_date: embargo_date.as_ref(),
            metadata_visibility: metadata_visibility.as_ref(),
            full_text_status: full_text_status.as_ref(),
            security: security.as_ref(),
        };
        let decision = embargo::resolve(&fields, self.now);
        if !decision.is_active() {
            return Ok(());
        }

        info!(item = %source_identifier, "Possible embargo");
        let release = decision
            .release_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        out.set_scalar("embargo_release_date", release.clone());
        if decision.visibility.is_some() {
            out.set_scalar("visibility", "embargo");
        }
        if let Some(during) = decision.during {
            out.set_scalar("visibility_during_embargo", during.as_str());
        }
        if let Some(after) = decision.after {
            out.set_scalar("visibility_after_embargo", after.as_str());
        }

        // The embargo channel records the raw inputs next to the derived
        // outputs for every embargoed record.
        let shown = |v: &Option<FieldValue>| {
            v.as_ref()
                .and_then(FieldValue::first)
                .unwrap_or("-")
                .to_string()
        };
        self.audit.write(
            LogChannel::Embargo,
            &format!(
                "{} - ORIGINAL: embargo_date {} / metadata_visibility {} / full_text_status {} / security {} || NEW EMBARGO INFO - embargo_release_date {} / visibility {} / visibility_during_embargo {} / visibility_after_embargo {}",
                source_identifier,
                shown(&embargo_date),
                shown(&metadata_visibility),
                shown(&full_text_status),
                shown(&security),
                release,
                out.get_str("visibility").unwrap_or("-"),
                out.get_str("visibility_during_embargo").unwrap_or("-"),
                out.get_str("visibility_after_embargo").unwrap_or("-"),
            ),
        )?;
        Ok(())
    }

    fn fold_remaining(&self, out: &mut NormalizedRecord) -> io::Result<()> {
        let keys: Vec<String> = out.keys().cloned().collect();
        for key in keys {
            let Some(value) = out.fields.get(&key) else {
                continue;
            };
            let replacement = match FieldValue::from_json(value) {
                Some(FieldValue::List(items)) if !items.is_empty() => {
                    match FieldValue::List(items).fold() {
                        FieldValue::Scalar(s) => Some(fix_encoding(&s)),
                        FieldValue::List(_) => None,
                    }
                }
                Some(FieldValue::Scalar(s)) if !s.is_empty() => {
                    let fixed = fix_encoding(&s);
                    if fixed != s {
                        self.audit.write(
                            LogChannel::Default,
                            &format!("Fix encoding: {} -> {}", s, fixed),
                        )?;
                        Some(fixed)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(new_value) = replacement {
                out.fields.insert(key, Value::String(new_value));
            }
        }
        Ok(())
    }
}
