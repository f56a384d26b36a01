//! Declarative schema validation for incoming property records
//!
//! Records are checked in their raw JSON shape so that a value of the wrong
//! type is reported instead of being coerced. Every failing field is
//! collected before returning, so callers can report all problems at once.
//!
//! The allowed boroughs, districts and room types come from the reference
//! data the service was started with ([`ReferenceDomains`]). Validation
//! outcomes therefore change when that reference data changes, even though
//! the schema itself does not.

use crate::error::{PricingError, Result};
use crate::features::FeatureColumn;
use crate::models::PropertyRequest;
use crate::vocabulary::VocabularyStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Date format accepted for `last_review`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Expected JSON shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    String,
    Date,
}

impl FieldKind {
    fn type_error(&self) -> &'static str {
        match self {
            FieldKind::Integer => "must be of integer type",
            FieldKind::Float => "must be of float type",
            FieldKind::String => "must be of string type",
            FieldKind::Date => "must be of date type",
        }
    }
}

/// Inclusive numeric bound, kept in the field's own type for error messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Int(i64),
    Float(f64),
}

impl Bound {
    fn as_f64(&self) -> f64 {
        match self {
            Bound::Int(v) => *v as f64,
            Bound::Float(v) => *v,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Int(v) => write!(f, "{}", v),
            Bound::Float(v) => write!(f, "{:?}", v),
        }
    }
}

/// Which reference set a string field must belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Borough,
    District,
    RoomType,
    Algorithm,
}

/// Constraint set for one field of the record
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub nullable: bool,
    pub allow_empty: bool,
    pub min: Option<Bound>,
    pub max: Option<Bound>,
    pub allowed: Option<Domain>,
}

impl FieldRule {
    fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            nullable: false,
            allow_empty: false,
            min: None,
            max: None,
            allowed: None,
        }
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    fn min(mut self, bound: Bound) -> Self {
        self.min = Some(bound);
        self
    }

    fn max(mut self, bound: Bound) -> Self {
        self.max = Some(bound);
        self
    }

    fn allowed(mut self, domain: Domain) -> Self {
        self.allowed = Some(domain);
        self
    }
}

/// The property record schema, in request field order
pub fn property_schema() -> Vec<FieldRule> {
    use FieldKind::*;
    vec![
        FieldRule::new("host_id", Integer).min(Bound::Int(0)),
        FieldRule::new("host_name", String),
        FieldRule::new("borough", String).allowed(Domain::Borough),
        FieldRule::new("district", String).allowed(Domain::District),
        FieldRule::new("latitude", Float)
            .min(Bound::Float(-90.0))
            .max(Bound::Float(90.0)),
        FieldRule::new("longitude", Float)
            .min(Bound::Float(-180.0))
            .max(Bound::Float(180.0)),
        FieldRule::new("room_type", String).allowed(Domain::RoomType),
        FieldRule::new("min_nights", Integer).min(Bound::Int(1)),
        FieldRule::new("reviews", Integer).optional().min(Bound::Int(0)),
        FieldRule::new("last_review", Date).optional().nullable(),
        FieldRule::new("monthly_reviews", Float).min(Bound::Float(0.0)),
        FieldRule::new("host_listings", Integer).min(Bound::Int(1)),
        FieldRule::new("availability", Integer)
            .min(Bound::Int(0))
            .max(Bound::Int(365)),
        FieldRule::new("algorithm", String).allowed(Domain::Algorithm),
    ]
}

/// Human-readable message for a failing field, suitable for form display
pub fn field_hint(field: &str) -> &'static str {
    match field {
        "host_id" => "Host ID must be a non-negative integer!",
        "host_name" => "Host name cannot be empty!",
        "borough" => "Borough is not present in the reference data!",
        "district" => "District is not present in the reference data!",
        "latitude" => "Latitude values must be between -90 and 90!",
        "longitude" => "Longitude values must be between -180 and 180!",
        "room_type" => "Room type is not present in the reference data!",
        "min_nights" => "Minimum nights must be greater than 0!",
        "reviews" => "Number of reviews must not be negative!",
        "last_review" => "Last review must be a date (YYYY-MM-DD) or empty!",
        "monthly_reviews" => "Monthly reviews rate must not be negative!",
        "host_listings" => "Number of listings per host must be greater than 0!",
        "availability" => "Days available per year must be between 0 and 365!",
        "algorithm" => "Algorithm must be one of the registered models!",
        _ => "Field is not part of the property schema!",
    }
}

/// Allowed categorical values taken from the reference dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDomains {
    pub boroughs: BTreeSet<String>,
    pub districts: BTreeSet<String>,
    pub room_types: BTreeSet<String>,
}

impl ReferenceDomains {
    /// Derive the allowed sets from the categories seen during training
    pub fn from_vocabulary(vocabulary: &VocabularyStore) -> Result<Self> {
        let keys = |column: FeatureColumn| -> Result<BTreeSet<String>> {
            vocabulary
                .vocabulary(column.name())
                .map(|v| v.categories().map(str::to_string).collect())
                .ok_or_else(|| {
                    PricingError::config(format!(
                        "No vocabulary for '{}' to derive allowed values from",
                        column.name()
                    ))
                })
        };
        Ok(Self {
            boroughs: keys(FeatureColumn::Borough)?,
            districts: keys(FeatureColumn::District)?,
            room_types: keys(FeatureColumn::RoomType)?,
        })
    }
}

/// Everything the validator needs besides the record itself
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub domains: ReferenceDomains,
    pub algorithms: BTreeSet<String>,
}

/// Field name -> messages for every field that failed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// One display hint per failing field
    pub fn hints(&self) -> BTreeMap<String, String> {
        self.0
            .keys()
            .map(|field| (field.clone(), field_hint(field).to_string()))
            .collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Result of validating one record
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub errors: ValidationErrors,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks raw records against the property schema
#[derive(Debug, Clone)]
pub struct Validator {
    schema: Vec<FieldRule>,
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            schema: property_schema(),
            config,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate a raw record without side effects
    pub fn validate(&self, record: &Map<String, Value>) -> ValidationReport {
        let mut errors = ValidationErrors::new();

        for key in record.keys() {
            if !self.schema.iter().any(|rule| rule.name == key) {
                errors.add(key.as_str(), "unknown field");
            }
        }

        for rule in &self.schema {
            if let Err(message) = self.check_field(rule, record.get(rule.name)) {
                errors.add(rule.name, message);
            }
        }

        ValidationReport { errors }
    }

    /// Validate and convert into a typed request
    pub fn parse(&self, record: &Map<String, Value>) -> Result<PropertyRequest> {
        let report = self.validate(record);
        if !report.is_ok() {
            return Err(PricingError::Validation(report.errors));
        }
        let mut request: PropertyRequest = serde_json::from_value(Value::Object(record.clone()))
            .map_err(|e| {
                let mut errors = ValidationErrors::new();
                errors.add("record", e.to_string());
                PricingError::Validation(errors)
            })?;
        // Free text; the vocabulary holds trimmed names
        request.host_name = request.host_name.trim().to_string();
        Ok(request)
    }

    fn check_field(&self, rule: &FieldRule, value: Option<&Value>) -> std::result::Result<(), String> {
        let value = match value {
            None if rule.required => return Err("required field".to_string()),
            None => return Ok(()),
            Some(Value::Null) if rule.nullable => return Ok(()),
            Some(Value::Null) => return Err("null value not allowed".to_string()),
            Some(v) => v,
        };

        match rule.kind {
            FieldKind::Integer => {
                let n = value.as_i64().ok_or_else(|| rule.kind.type_error().to_string())?;
                self.check_range(rule, n as f64)
            }
            FieldKind::Float => {
                let n = match value {
                    Value::Number(n) => n.as_f64(),
                    _ => None,
                }
                .ok_or_else(|| rule.kind.type_error().to_string())?;
                self.check_range(rule, n)
            }
            FieldKind::String => {
                let s = value.as_str().ok_or_else(|| rule.kind.type_error().to_string())?;
                if s.trim().is_empty() && !rule.allow_empty {
                    return Err("empty values not allowed".to_string());
                }
                match rule.allowed {
                    Some(domain) if !self.allowed_values(domain).contains(s) => {
                        Err(format!("unallowed value {}", s))
                    }
                    _ => Ok(()),
                }
            }
            FieldKind::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                .map(|_| ())
                .ok_or_else(|| rule.kind.type_error().to_string()),
        }
    }

    fn check_range(&self, rule: &FieldRule, n: f64) -> std::result::Result<(), String> {
        if let Some(min) = rule.min {
            if n < min.as_f64() {
                return Err(format!("min value is {}", min));
            }
        }
        if let Some(max) = rule.max {
            if n > max.as_f64() {
                return Err(format!("max value is {}", max));
            }
        }
        Ok(())
    }

    fn allowed_values(&self, domain: Domain) -> &BTreeSet<String> {
        match domain {
            Domain::Borough => &self.config.domains.boroughs,
            Domain::District => &self.config.domains.districts,
            Domain::RoomType => &self.config.domains.room_types,
            Domain::Algorithm => &self.config.algorithms,
        }
    }
}
