//! Field checks shared by the services. Each helper records messages on a
//! [`ValidationErrors`] and returns the normalized value.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::ValidationErrors;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

static BRAND_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#([0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").expect("colour pattern is valid")
});

static INVOICE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]+$").expect("prefix pattern is valid"));

/// Trimmed non-empty text of at most `max` characters
pub fn required(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, format!("The {} field is required.", field));
    } else if value.chars().count() > max {
        errors.add(field, format!("The {} field must not exceed {} characters.", field, max));
    }
    value.to_string()
}

/// Trimmed optional text; blank becomes `None`
pub fn optional(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    if value.chars().count() > max {
        errors.add(field, format!("The {} field must not exceed {} characters.", field, max));
    }
    Some(value.to_string())
}

/// Required email address, lower-cased
pub fn email(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) -> String {
    let value = required(errors, field, value, max).to_lowercase();
    if !value.is_empty() && !EMAIL.is_match(&value) {
        errors.add(field, format!("The {} field must be a valid email address.", field));
    }
    value
}

pub fn optional_email(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Option<String> {
    let value = optional(errors, field, value, max)?.to_lowercase();
    if !EMAIL.is_match(&value) {
        errors.add(field, format!("The {} field must be a valid email address.", field));
    }
    Some(value)
}

pub fn range(errors: &mut ValidationErrors, field: &str, value: i64, min: i64, max: i64) {
    if value < min || value > max {
        errors.add(field, format!("The {} field must be between {} and {}.", field, min, max));
    }
}

pub fn is_brand_color(value: &str) -> bool {
    BRAND_COLOR.is_match(value)
}

pub fn is_invoice_prefix(value: &str) -> bool {
    INVOICE_PREFIX.is_match(value)
}

/// Lower-cased extension of an uploaded file name
pub fn extension_of(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Checks an upload's size and extension, returning the extension
pub fn upload(
    errors: &mut ValidationErrors,
    field: &str,
    file_name: &str,
    size: usize,
    max_bytes: u64,
    allowed: &[String],
) -> Option<String> {
    if size == 0 {
        errors.add(field, format!("The {} must not be empty.", field));
    } else if size as u64 > max_bytes {
        errors.add(field, format!("The {} must not be greater than {} kilobytes.", field, max_bytes / 1024));
    }

    match extension_of(file_name) {
        Some(ext) if allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => Some(ext),
        _ => {
            errors.add(field, format!("The {} must be a file of type: {}.", field, allowed.join(", ")));
            None
        }
    }
}
