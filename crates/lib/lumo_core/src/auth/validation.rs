//! Request shape validation with per-field messages.

use std::fmt;

use serde::Serialize;
use url::Url;

use super::AuthError;

/// Field-level validation failures, accumulated so the caller sees every
/// problem at once.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errs = Self::new();
        errs.add(field, message);
        errs
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.errors
    }

    fn into_result(self) -> Result<(), AuthError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AuthError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
        }
        Ok(())
    }
}

pub fn validate_register(
    nickname: &str,
    email: &str,
    password: &str,
    return_url: &str,
) -> Result<(), AuthError> {
    let mut errs = ValidationErrors::new();

    if nickname.chars().count() < 2 {
        errs.add("nickname", "must contain at least 2 characters");
    }

    if !is_plausible_email(email) {
        errs.add("email", "must be a valid email address");
    }

    if password.chars().count() < 8 {
        errs.add("password", "must contain at least 8 characters");
    }

    match Url::parse(return_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errs.add("returnUrl", "must be an absolute http(s) URL"),
    }

    errs.into_result()
}

pub fn validate_login(email: &str, password: &str) -> Result<(), AuthError> {
    let mut errs = ValidationErrors::new();

    if email.chars().count() < 2 {
        errs.add("email", "must contain at least 2 characters");
    }

    if password.chars().count() < 8 {
        errs.add("password", "must contain at least 8 characters");
    }

    errs.into_result()
}

/// Cheap syntactic check: `local@domain` with a dotted domain and no
/// whitespace. Deliverability is the mailer's problem, not ours.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_of(err: AuthError) -> Vec<String> {
        match err {
            AuthError::Validation(errs) => {
                errs.fields().iter().map(|e| e.field.clone()).collect()
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_register_passes() {
        assert!(
            validate_register("alice", "a@x.com", "password123", "https://x/confirm").is_ok()
        );
    }

    #[test]
    fn register_collects_every_failing_field() {
        let err = validate_register("a", "not-an-email", "short", "not a url")
            .expect_err("must fail");
        assert_eq!(
            fields_of(err),
            vec!["nickname", "email", "password", "returnUrl"]
        );
    }

    #[test]
    fn return_url_must_be_http() {
        let err = validate_register("alice", "a@x.com", "password123", "ftp://x/confirm")
            .expect_err("must fail");
        assert_eq!(fields_of(err), vec!["returnUrl"]);
    }

    #[test]
    fn email_shapes() {
        assert!(is_plausible_email("a@x.com"));
        assert!(is_plausible_email("first.last@sub.example.org"));
        assert!(!is_plausible_email("a@x"));
        assert!(!is_plausible_email("@x.com"));
        assert!(!is_plausible_email("a@.com"));
        assert!(!is_plausible_email("a x@x.com"));
        assert!(!is_plausible_email("plain"));
    }

    #[test]
    fn login_requires_password_floor() {
        let err = validate_login("a@x.com", "short").expect_err("must fail");
        assert_eq!(fields_of(err), vec!["password"]);
    }

    #[test]
    fn display_joins_fields() {
        let mut errs = ValidationErrors::new();
        errs.add("email", "must be a valid email address");
        errs.add("password", "must contain at least 8 characters");
        assert_eq!(
            errs.to_string(),
            "email: must be a valid email address; password: must contain at least 8 characters"
        );
    }
}
