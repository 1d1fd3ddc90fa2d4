// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Form submission payloads and their validation.
//!
//! Implements the checks shared by the server and the client wrapper:
//! - `formType` allow-list with required fields per type
//! - Field value types (string or number) and field name shape
//! - Email, website and phone formats
//! - Length and field count limits

use crate::config::FormConfig;
use crate::sanitize::sanitize_text;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// A submission as posted by the browser: `{formType, ...fields, timestamp, recaptchaResponse}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormSubmission {
    #[serde(rename = "formType", default)]
    pub form_type: String,

    /// Client clock at submit time, usually milliseconds since the Unix epoch
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<ClientTimestamp>,

    #[serde(
        rename = "recaptchaResponse",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recaptcha_response: Option<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl FormSubmission {
    pub fn new(form_type: impl Into<String>) -> Self {
        Self {
            form_type: form_type.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Non-blank string or numeric value for `name`.
    fn has_value(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Number(_)) => true,
            _ => false,
        }
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    }
}

/// Client clock as the browser sent it, forwarded untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClientTimestamp {
    Millis(i64),
    Number(f64),
    Text(String),
}

const MAX_TIMESTAMP_TEXT: usize = 64;

/// Metadata only: any other JSON type is dropped instead of failing the body.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<ClientTimestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(ClientTimestamp::Millis)
            .or_else(|| n.as_f64().map(ClientTimestamp::Number)),
        Some(Value::String(s)) => {
            let text = sanitize_text(&s.chars().take(MAX_TIMESTAMP_TEXT).collect::<String>());
            (!text.is_empty()).then_some(ClientTimestamp::Text(text))
        }
        _ => None,
    })
}

/// Accepted form types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormType {
    Contact,
    Newsletter,
    Consultation,
    Quote,
    Audit,
}

impl FormType {
    pub const ALL: [FormType; 5] = [
        FormType::Contact,
        FormType::Newsletter,
        FormType::Consultation,
        FormType::Quote,
        FormType::Audit,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FormType::Contact => "contact",
            FormType::Newsletter => "newsletter",
            FormType::Consultation => "consultation",
            FormType::Quote => "quote",
            FormType::Audit => "audit",
        }
    }

    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            FormType::Contact => &["name", "email", "message"],
            FormType::Newsletter => &["email"],
            FormType::Consultation => &["name", "email", "company"],
            FormType::Quote => &["name", "email", "service"],
            FormType::Audit => &["name", "email", "website"],
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown form type: {0:?}")]
    UnknownFormType(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field name: {0:?}")]
    InvalidFieldName(String),

    #[error("Unsupported value for field {0}: expected string or number")]
    UnsupportedValue(String),

    #[error("Field {field} exceeds {max} characters")]
    FieldTooLong { field: String, max: usize },

    #[error("Too many fields: at most {0} allowed")]
    TooManyFields(usize),

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Invalid URL for {0}")]
    InvalidUrl(&'static str),

    #[error("Invalid phone number")]
    InvalidPhone,
}

impl ValidationError {
    /// The field the error is about, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::UnknownFormType(_) => Some("formType"),
            ValidationError::MissingField(f) | ValidationError::InvalidUrl(f) => Some(*f),
            ValidationError::InvalidFieldName(f)
            | ValidationError::UnsupportedValue(f)
            | ValidationError::FieldTooLong { field: f, .. } => Some(f.as_str()),
            ValidationError::InvalidEmail => Some("email"),
            ValidationError::InvalidPhone => Some("phone"),
            ValidationError::TooManyFields(_) => None,
        }
    }
}

/// Result of validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Submission is valid
    Valid(FormType),
    /// Submission is invalid; every problem found is listed
    Invalid(Vec<ValidationError>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ValidationResult::Valid(_) => &[],
            ValidationResult::Invalid(e) => e,
        }
    }
}

/// Form submission validator.
#[derive(Debug, Clone)]
pub struct FormValidator {
    config: FormConfig,
}

impl FormValidator {
    /// Create a new validator with the given configuration.
    pub fn new(config: FormConfig) -> Self {
        Self { config }
    }

    /// Validate a complete submission.
    pub fn validate(&self, submission: &FormSubmission) -> ValidationResult {
        let Some(form_type) = FormType::parse(submission.form_type.trim()) else {
            debug!(form_type = %submission.form_type, "Unknown form type");
            return ValidationResult::Invalid(vec![ValidationError::UnknownFormType(
                submission.form_type.clone(),
            )]);
        };

        if submission.fields.len() > self.config.max_fields {
            return ValidationResult::Invalid(vec![ValidationError::TooManyFields(
                self.config.max_fields,
            )]);
        }

        let mut errors = Vec::new();

        for (name, value) in &submission.fields {
            if !valid_field_name(name) {
                errors.push(ValidationError::InvalidFieldName(name.clone()));
                continue;
            }
            match value {
                Value::String(s) if s.chars().count() > self.config.max_field_length => {
                    errors.push(ValidationError::FieldTooLong {
                        field: name.clone(),
                        max: self.config.max_field_length,
                    });
                }
                Value::String(_) | Value::Number(_) | Value::Null => {}
                _ => errors.push(ValidationError::UnsupportedValue(name.clone())),
            }
        }

        for field in form_type.required_fields() {
            if !submission.has_value(field) {
                errors.push(ValidationError::MissingField(*field));
            }
        }

        if let Some(email) = submission.str_field("email") {
            if !valid_email(email) {
                errors.push(ValidationError::InvalidEmail);
            }
        }

        if let Some(website) = submission.str_field("website") {
            if !valid_web_url(website) {
                errors.push(ValidationError::InvalidUrl("website"));
            }
        }

        if let Some(phone) = submission.str_field("phone") {
            if !valid_phone(phone) {
                errors.push(ValidationError::InvalidPhone);
            }
        }

        if errors.is_empty() {
            debug!(%form_type, fields = submission.fields.len(), "Submission valid");
            ValidationResult::Valid(form_type)
        } else {
            debug!(%form_type, errors = errors.len(), "Submission invalid");
            ValidationResult::Invalid(errors)
        }
    }
}

fn valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| {
            !l.is_empty()
                && !l.starts_with('-')
                && !l.ends_with('-')
                && l.chars().all(|c| c.is_alphanumeric() || c == '-')
        })
}

fn valid_web_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

fn valid_phone(phone: &str) -> bool {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'));
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    allowed && (7..=20).contains(&digits)
}
