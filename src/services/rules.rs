//! Field rules shared by the services. All failures are validation errors.

use jiff::civil::Date;

use crate::error::{CoreError, CoreResult};

pub fn text(field: &str, value: String, max: usize) -> CoreResult<String> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(format!("{field} is required")));
    }
    max_len(field, &value, max)?;
    Ok(value)
}

pub fn optional_text(field: &str, value: Option<String>, max: usize) -> CoreResult<Option<String>> {
    if let Some(value) = &value {
        max_len(field, value, max)?;
    }
    Ok(value)
}

fn max_len(field: &str, value: &str, max: usize) -> CoreResult<()> {
    if value.chars().count() > max {
        Err(CoreError::validation(format!(
            "{field} must be at most {max} characters"
        )))
    } else {
        Ok(())
    }
}

pub fn date_order(start: Option<Date>, due: Option<Date>) -> CoreResult<()> {
    match (start, due) {
        (Some(start), Some(due)) if due < start => Err(CoreError::validation(
            "due date must not be before start date",
        )),
        _ => Ok(()),
    }
}

/// 1 to 10 uppercase ASCII letters.
pub fn project_key(key: &str) -> CoreResult<()> {
    let valid = (1..=10).contains(&key.len()) && key.chars().all(|c| c.is_ascii_uppercase());
    if valid {
        Ok(())
    } else {
        Err(CoreError::validation(
            "project key must be 1 to 10 uppercase letters",
        ))
    }
}

/// 1 to 50 of `[a-z0-9-]`.
pub fn slug(slug: &str) -> CoreResult<()> {
    let valid = (1..=50).contains(&slug.len())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::validation(
            "slug must be 1 to 50 lowercase letters, digits or hyphens",
        ))
    }
}

/// `#rrggbb`
pub fn color(color: &str) -> CoreResult<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(CoreError::validation("color must look like #rrggbb"))
    }
}

pub fn email(email: &str) -> CoreResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(CoreError::validation("email is not valid")),
    }
}

pub fn points(points: Option<u8>) -> CoreResult<Option<u8>> {
    match points {
        Some(p) if p > 100 => Err(CoreError::validation("points must be between 0 and 100")),
        other => Ok(other),
    }
}
