//! The validation gate.
//!
//! A controller may declare a [`Schema`] per request [`Section`]. Before the
//! handler runs, [`validate_request`] checks each declared section, replaces
//! it with the coerced value on success, and fails the request with a `400`
//! naming the section otherwise.

mod schema;

pub use schema::Schema;

use keel_core::{AppError, Request, Section};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// The validation capability installed by the `validator` module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Validator {
    /// Key separator used by flattened objects.
    pub delimiter: String,
    /// Nesting depth at which flattening stops.
    pub depth_limit: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            delimiter: ".".to_string(),
            depth_limit: 10,
        }
    }
}

impl Validator {
    /// Validates one value against `schema`.
    pub fn validate(&self, schema: &Schema, value: Value) -> Result<Value, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        let out = schema.check(Some(value), "", self, &mut issues);
        if issues.is_empty() {
            Ok(out.unwrap_or(Value::Null))
        } else {
            Err(issues)
        }
    }
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted path inside the section; empty for the section itself.
    pub path: String,
    pub message: String,
    /// Rule identifier such as `number.base`.
    pub rule: &'static str,
}

/// Schemas keyed by request section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionSchemas {
    entries: Vec<(Section, Schema)>,
}

impl SectionSchemas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema of `section`, replacing an earlier one.
    pub fn section(mut self, section: Section, schema: Schema) -> Self {
        self.entries.retain(|(s, _)| *s != section);
        self.entries.push((section, schema));
        self.entries.sort_by_key(|(s, _)| {
            Section::ALL.iter().position(|x| x == s).unwrap_or_default()
        });
        self
    }

    pub fn body(self, schema: Schema) -> Self {
        self.section(Section::Body, schema)
    }

    pub fn query(self, schema: Schema) -> Self {
        self.section(Section::Query, schema)
    }

    pub fn headers(self, schema: Schema) -> Self {
        self.section(Section::Headers, schema)
    }

    pub fn params(self, schema: Schema) -> Self {
        self.section(Section::Params, schema)
    }

    pub fn get(&self, section: Section) -> Option<&Schema> {
        self.entries.iter().find(|(s, _)| *s == section).map(|(_, schema)| schema)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared sections in gate order.
    pub fn iter(&self) -> impl Iterator<Item = (Section, &Schema)> {
        self.entries.iter().map(|(s, schema)| (*s, schema))
    }
}

/// Validates and coerces every declared section of `req`.
///
/// Sections are visited in body, query, headers, params order; the first
/// failing section fails the request. A null section checked against an
/// object schema is treated as an empty object.
pub fn validate_request(
    req: &mut Request,
    schemas: &SectionSchemas,
    validator: &Validator,
) -> Result<(), AppError> {
    for (section, schema) in schemas.iter() {
        let slot = req.section_mut(section);
        let mut value = std::mem::take(slot);
        if value.is_null() && schema.is_object() {
            value = Value::Object(Map::new());
        }

        let mut issues = Vec::new();
        let checked = schema.check(Some(value.clone()), "", validator, &mut issues);

        if let Some(first) = issues.first() {
            *req.section_mut(section) = value;
            return Err(AppError::new(400u16, format!("Wrong values in {section}")).with_details(
                json!({
                    "section": section.as_str(),
                    "message": first.message,
                    "errors": issues,
                }),
            ));
        }
        *req.section_mut(section) = checked.unwrap_or(Value::Null);
    }
    Ok(())
}
