//! Input validation rules shared by request handlers.

use std::ops::RangeInclusive;

pub const PASSWORD_LEN: RangeInclusive<usize> = 8..=128;
pub const DISPLAY_NAME_LEN: RangeInclusive<usize> = 2..=50;
pub const PRODUCT_TITLE_LEN: RangeInclusive<usize> = 3..=120;
pub const PRODUCT_DESCRIPTION_MAX: usize = 10_000;
pub const TOPIC_TITLE_LEN: RangeInclusive<usize> = 3..=200;
pub const POST_BODY_LEN: RangeInclusive<usize> = 1..=20_000;
pub const FILENAME_MAX: usize = 255;
pub const ALLOWED_EXTENSIONS: &[&str] = &["zip", "pdf", "png", "jpg", "jpeg", "txt", "tar", "gz"];

/// Collects field errors so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, message: impl Into<String>) -> &mut Self {
        if !ok {
            self.errors.push(message.into());
        }
        self
    }

    pub fn length(&mut self, field: &str, value: &str, range: RangeInclusive<usize>) -> &mut Self {
        let len = value.trim().chars().count();
        self.check(
            range.contains(&len),
            format!(
                "{field} must be between {} and {} characters",
                range.start(),
                range.end()
            ),
        )
    }

    pub fn finish(&mut self) -> Result<(), String> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.errors).join("; "))
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && email.len() <= 254
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

pub fn is_valid_currency(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// Plain file name (no path components) with an allowed extension.
pub fn is_allowed_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > FILENAME_MAX || name.starts_with('.') {
        return false;
    }
    if name.contains(['/', '\\', '"']) || name.contains("..") || name.chars().any(char::is_control) {
        return false;
    }
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}
