use crate::error::{CovenantError, CovenantResult};
use validator::{Validate, ValidationErrors};

/// Longest string accepted as a lookup key.
pub const MAX_IDENTIFIER_LEN: usize = 64;

const PLACEHOLDER_NAMES: &[&str] = &["unknown", "n/a", "na", "none", "null", "vendor", "tbd", "-"];

pub fn validate_model<T: Validate>(model: &T) -> CovenantResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let error_messages = format_validation_errors(&errors);
            Err(CovenantError::validation("model", error_messages))
        }
    }
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();

    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = match &error.code {
                std::borrow::Cow::Borrowed("length") => {
                    format!("Length validation failed for field '{}'", field)
                }
                std::borrow::Cow::Borrowed("range") => {
                    format!("Value out of range for field '{}'", field)
                }
                _ => format!("Validation failed for field '{}': {}", field, error.code),
            };
            messages.push(message);
        }
    }

    if messages.is_empty() {
        messages.push(errors.to_string());
    }

    messages.join(", ")
}

/// Lower-cased extension of `file_name`, if any.
pub fn file_extension(file_name: &str) -> Option<String> {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

pub fn validate_file_type<S: AsRef<str>>(file_name: &str, allowed_types: &[S]) -> CovenantResult<()> {
    let extension = file_extension(file_name).unwrap_or_default();

    if !allowed_types.iter().any(|allowed| allowed.as_ref().eq_ignore_ascii_case(&extension)) {
        let allowed: Vec<&str> = allowed_types.iter().map(|a| a.as_ref()).collect();
        return Err(CovenantError::UnsupportedMediaType {
            media_type: format!(
                "'{}' (allowed: {})",
                if extension.is_empty() { file_name } else { extension.as_str() },
                allowed.join(", ")
            ),
        });
    }

    Ok(())
}

pub fn validate_file_size(file_size: u64, max_size: u64) -> CovenantResult<()> {
    if file_size > max_size {
        return Err(CovenantError::PayloadTooLarge {
            size: file_size,
            limit: max_size,
        });
    }

    Ok(())
}

/// True when `value` looks like a reference number rather than prose:
/// a single line, at most four words, at most 64 characters, containing a
/// digit or an upper-case letter and only code-like punctuation.
pub fn is_identifier_shaped(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > MAX_IDENTIFIER_LEN || value.contains('\n') {
        return false;
    }
    if value.split_whitespace().count() > 4 {
        return false;
    }
    if !value.chars().any(|c| c.is_ascii_digit() || c.is_ascii_uppercase()) {
        return false;
    }

    value
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || "-_./#:".contains(c))
}

/// Reduce a messy candidate to something usable as a key: first line only,
/// whitespace collapsed, trailing punctuation stripped, capped at 64 chars.
pub fn clean_identifier(value: &str) -> Option<String> {
    let first_line = value.lines().find(|line| !line.trim().is_empty())?;
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_IDENTIFIER_LEN).collect();
    let cleaned = truncated
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Plausibility check for an extracted party name.
pub fn is_party_name_shaped(value: &str) -> bool {
    let value = value.trim();
    let length = value.chars().count();
    if !(2..=120).contains(&length) || value.contains('\n') {
        return false;
    }
    if PLACEHOLDER_NAMES.contains(&value.to_lowercase().as_str()) {
        return false;
    }
    if uuid::Uuid::parse_str(value).is_ok() {
        return false;
    }
    if value.split_whitespace().count() > 12 {
        return false;
    }

    value.chars().filter(|c| c.is_alphabetic()).count() >= 2
}
