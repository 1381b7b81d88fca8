//! Schema definitions and the validation walk.

use serde_json::{Map, Number, Value};

use super::{ValidationIssue, Validator};

#[derive(Debug, Clone, Default, PartialEq)]
struct StringRules {
    min_len: Option<usize>,
    max_len: Option<usize>,
    object_id: bool,
    password: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct NumberRules {
    integer: bool,
    positive: bool,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ObjectRules {
    keys: Vec<(String, Schema)>,
    allow_unknown: bool,
    flatten: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Any,
    String(StringRules),
    Number(NumberRules),
    Boolean,
    Array(Option<Box<Schema>>),
    Object(ObjectRules),
}

/// A value schema.
///
/// Built fluently from one of the type constructors. Rule methods that do not
/// apply to the schema's type are ignored.
///
/// ```rust
/// use keel_framework::Schema;
///
/// let item = Schema::object()
///     .key("title", Schema::string().min_len(1).required())
///     .key("price", Schema::integer().positive().required())
///     .key("tags", Schema::array(Schema::string()).default(serde_json::json!([])));
/// # let _ = item;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    kind: Kind,
    required: bool,
    default: Option<Value>,
}

impl Schema {
    fn of(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
        }
    }

    /// Accepts any value.
    pub fn any() -> Self {
        Self::of(Kind::Any)
    }

    pub fn string() -> Self {
        Self::of(Kind::String(StringRules::default()))
    }

    /// Accepts numbers and numeric strings.
    pub fn number() -> Self {
        Self::of(Kind::Number(NumberRules::default()))
    }

    /// Shorthand for `number().whole()`.
    pub fn integer() -> Self {
        Self::number().whole()
    }

    /// Accepts booleans and `"true"` / `"false"`.
    pub fn boolean() -> Self {
        Self::of(Kind::Boolean)
    }

    /// An array whose items all match `item`.
    pub fn array(item: Schema) -> Self {
        Self::of(Kind::Array(Some(Box::new(item))))
    }

    /// An array of arbitrary items.
    pub fn any_array() -> Self {
        Self::of(Kind::Array(None))
    }

    /// An object; keys are added with [`Schema::key`].
    pub fn object() -> Self {
        Self::of(Kind::Object(ObjectRules::default()))
    }

    // ─── Presence ────────────────────────────────────────────────────────────

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the field is absent.
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    // ─── String rules ────────────────────────────────────────────────────────

    pub fn min_len(mut self, n: usize) -> Self {
        if let Kind::String(rules) = &mut self.kind {
            rules.min_len = Some(n);
        }
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        if let Kind::String(rules) = &mut self.kind {
            rules.max_len = Some(n);
        }
        self
    }

    /// 24 hexadecimal characters.
    pub fn object_id(mut self) -> Self {
        if let Kind::String(rules) = &mut self.kind {
            rules.object_id = true;
        }
        self
    }

    /// At least 8 characters.
    pub fn password(mut self) -> Self {
        if let Kind::String(rules) = &mut self.kind {
            rules.password = true;
        }
        self
    }

    // ─── Number rules ────────────────────────────────────────────────────────

    /// Rejects numbers with a fractional part.
    pub fn whole(mut self) -> Self {
        if let Kind::Number(rules) = &mut self.kind {
            rules.integer = true;
        }
        self
    }

    pub fn positive(mut self) -> Self {
        if let Kind::Number(rules) = &mut self.kind {
            rules.positive = true;
        }
        self
    }

    pub fn min(mut self, n: f64) -> Self {
        if let Kind::Number(rules) = &mut self.kind {
            rules.min = Some(n);
        }
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        if let Kind::Number(rules) = &mut self.kind {
            rules.max = Some(n);
        }
        self
    }

    // ─── Object rules ────────────────────────────────────────────────────────

    /// Declares a key. Declaration order is validation order.
    pub fn key(mut self, name: impl Into<String>, schema: Schema) -> Self {
        if let Kind::Object(rules) = &mut self.kind {
            rules.keys.push((name.into(), schema));
        }
        self
    }

    /// Keeps undeclared keys instead of stripping them.
    pub fn allow_unknown(mut self) -> Self {
        if let Kind::Object(rules) = &mut self.kind {
            rules.allow_unknown = true;
        }
        self
    }

    /// Converts nested objects into a one-level map with joined keys.
    pub fn flatten(mut self) -> Self {
        if let Kind::Object(rules) = &mut self.kind {
            rules.flatten = true;
        }
        self
    }

    pub(crate) fn is_object(&self) -> bool {
        matches!(self.kind, Kind::Object(_))
    }

    // ─── Validation walk ─────────────────────────────────────────────────────

    /// Validates `value`, returning the coerced value (`None` if absent).
    pub(crate) fn check(
        &self,
        value: Option<Value>,
        path: &str,
        validator: &Validator,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<Value> {
        let value = match value {
            Some(value) => value,
            None => {
                if self.required {
                    issues.push(issue(path, "is required", "any.required"));
                }
                return self.default.clone();
            }
        };

        match &self.kind {
            Kind::Any => Some(value),
            Kind::String(rules) => check_string(rules, value, path, issues),
            Kind::Number(rules) => check_number(rules, value, path, issues),
            Kind::Boolean => check_boolean(value, path, issues),
            Kind::Array(item) => check_array(item.as_deref(), value, path, validator, issues),
            Kind::Object(rules) => check_object(rules, value, path, validator, issues),
        }
    }
}

fn issue(path: &str, message: &str, rule: &'static str) -> ValidationIssue {
    let label = if path.is_empty() { "value" } else { path };
    ValidationIssue {
        path: path.to_string(),
        message: format!("\"{label}\" {message}"),
        rule,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn check_string(
    rules: &StringRules,
    value: Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    let Value::String(s) = value else {
        issues.push(issue(path, "must be a string", "string.base"));
        return Some(value);
    };

    let len = s.chars().count();
    if let Some(min) = rules.min_len
        && len < min
    {
        issues.push(issue(
            path,
            &format!("length must be at least {min} characters long"),
            "string.min",
        ));
    }
    if let Some(max) = rules.max_len
        && len > max
    {
        issues.push(issue(
            path,
            &format!("length must be less than or equal to {max} characters long"),
            "string.max",
        ));
    }
    if rules.object_id && !(s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())) {
        issues.push(issue(
            path,
            "needs to be a valid objectId value",
            "string.objectId",
        ));
    }
    if rules.password && len < 8 {
        issues.push(issue(
            path,
            "needs to be a strong password (minimum 8 chars)",
            "string.password",
        ));
    }
    Some(Value::String(s))
}

/// Parses a numeric string into a JSON number, preferring integers.
fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

fn check_number(
    rules: &NumberRules,
    value: Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    let number = match &value {
        Value::Number(n) => n.clone(),
        Value::String(s) => match parse_number(s) {
            Some(n) => n,
            None => {
                issues.push(issue(path, "must be a number", "number.base"));
                return Some(value);
            }
        },
        _ => {
            issues.push(issue(path, "must be a number", "number.base"));
            return Some(value);
        }
    };

    let f = number.as_f64().unwrap_or_default();
    if rules.integer && f.fract() != 0.0 {
        issues.push(issue(path, "must be an integer", "number.integer"));
    }
    if rules.positive && f <= 0.0 {
        issues.push(issue(path, "must be a positive number", "number.positive"));
    }
    if let Some(min) = rules.min
        && f < min
    {
        issues.push(issue(
            path,
            &format!("must be greater than or equal to {min}"),
            "number.min",
        ));
    }
    if let Some(max) = rules.max
        && f > max
    {
        issues.push(issue(
            path,
            &format!("must be less than or equal to {max}"),
            "number.max",
        ));
    }
    Some(Value::Number(number))
}

fn check_boolean(value: Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Option<Value> {
    match &value {
        Value::Bool(_) => Some(value),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
        _ => {
            issues.push(issue(path, "must be a boolean", "boolean.base"));
            Some(value)
        }
    }
}

fn check_array(
    item: Option<&Schema>,
    value: Value,
    path: &str,
    validator: &Validator,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    let Value::Array(items) = value else {
        issues.push(issue(path, "must be an array", "array.base"));
        return Some(value);
    };
    let Some(item) = item else {
        return Some(Value::Array(items));
    };

    let checked = items
        .into_iter()
        .enumerate()
        .filter_map(|(i, v)| item.check(Some(v), &format!("{path}[{i}]"), validator, issues))
        .collect();
    Some(Value::Array(checked))
}

fn check_object(
    rules: &ObjectRules,
    value: Value,
    path: &str,
    validator: &Validator,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    let Value::Object(mut input) = value else {
        issues.push(issue(path, "must be of type object", "object.base"));
        return Some(value);
    };

    let mut output = Map::new();
    for (key, schema) in &rules.keys {
        if let Some(v) = schema.check(input.remove(key), &join(path, key), validator, issues) {
            output.insert(key.clone(), v);
        }
    }
    // An object without declared keys accepts any keys.
    if rules.allow_unknown || rules.keys.is_empty() {
        output.extend(input);
    }

    if rules.flatten {
        output = flatten(output, &validator.delimiter, validator.depth_limit);
    }
    Some(Value::Object(output))
}

/// Converts nested objects into one level, joining keys with `delimiter`.
///
/// Objects found at `depth_limit` levels are stringified instead of expanded.
pub(crate) fn flatten(
    input: Map<String, Value>,
    delimiter: &str,
    depth_limit: usize,
) -> Map<String, Value> {
    fn walk(
        map: Map<String, Value>,
        prefix: &mut Vec<String>,
        delimiter: &str,
        depth_limit: usize,
        out: &mut Map<String, Value>,
    ) {
        for (key, value) in map {
            prefix.push(key);
            match value {
                Value::Object(inner) if prefix.len() < depth_limit => {
                    walk(inner, prefix, delimiter, depth_limit, out);
                }
                Value::Object(inner) => {
                    out.insert(prefix.join(delimiter), Value::String(Value::Object(inner).to_string()));
                }
                other => {
                    out.insert(prefix.join(delimiter), other);
                }
            }
            prefix.pop();
        }
    }

    let mut out = Map::new();
    walk(input, &mut Vec::new(), delimiter, depth_limit, &mut out);
    out
}
