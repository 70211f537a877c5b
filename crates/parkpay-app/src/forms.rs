// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;
use std::path::PathBuf;

use crate::VerifyChannel;

pub const MIN_NAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const PHONE_DIGITS: usize = 10;
pub const CODE_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    MinLength,
    Uppercase,
    Digit,
}

impl PasswordRule {
    pub const fn hint(self) -> &'static str {
        match self {
            Self::MinLength => "at least 8 characters",
            Self::Uppercase => "an uppercase letter",
            Self::Digit => "a number",
        }
    }
}

/// Input problems caught before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingPayInput,
    MissingCredentials,
    Required(&'static str),
    NameTooShort(&'static str),
    InvalidEmail,
    InvalidPhone,
    WeakPassword(Vec<PasswordRule>),
    PasswordMismatch,
    TermsNotAccepted,
    InvalidCode,
    NothingToUpdate,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPayInput => {
                f.write_str("Please enter a license plate number or upload a QR code.")
            }
            Self::MissingCredentials => f.write_str("Please enter both email and password."),
            Self::Required(field) => write!(f, "Please enter your {field}."),
            Self::NameTooShort(field) => {
                write!(f, "The {field} must have at least {MIN_NAME_LEN} characters.")
            }
            Self::InvalidEmail => f.write_str("Please enter a valid email address."),
            Self::InvalidPhone => {
                write!(f, "Please enter a valid phone number ({PHONE_DIGITS} digits).")
            }
            Self::WeakPassword(rules) => {
                let hints = rules.iter().map(|rule| rule.hint()).collect::<Vec<_>>();
                write!(f, "The password needs {}.", hints.join(", "))
            }
            Self::PasswordMismatch => f.write_str("The passwords do not match."),
            Self::TermsNotAccepted => f.write_str("Please accept the terms and conditions."),
            Self::InvalidCode => write!(f, "The code must have {CODE_DIGITS} digits."),
            Self::NothingToUpdate => f.write_str("Please fill in at least one field."),
        }
    }
}

impl std::error::Error for ValidationError {}

/// One `@`, no whitespace, and a domain with a dot followed by at least two
/// characters.
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty()
        || domain.contains('@')
        || value.chars().any(char::is_whitespace)
    {
        return false;
    }
    domain
        .char_indices()
        .skip(1)
        .find(|(_, ch)| *ch == '.')
        .is_some_and(|(dot, _)| domain[dot + 1..].chars().count() >= 2)
}

pub fn is_valid_phone(value: &str) -> bool {
    value.len() == PHONE_DIGITS && value.bytes().all(|byte| byte.is_ascii_digit())
}

pub fn is_valid_code(value: &str) -> bool {
    value.len() == CODE_DIGITS && value.bytes().all(|byte| byte.is_ascii_digit())
}

pub fn password_issues(value: &str) -> Vec<PasswordRule> {
    let mut issues = Vec::new();
    if value.chars().count() < MIN_PASSWORD_LEN {
        issues.push(PasswordRule::MinLength);
    }
    if !value.chars().any(|ch| ch.is_ascii_uppercase()) {
        issues.push(PasswordRule::Uppercase);
    }
    if !value.chars().any(|ch| ch.is_ascii_digit()) {
        issues.push(PasswordRule::Digit);
    }
    issues
}

fn check_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    let issues = password_issues(password);
    if !issues.is_empty() {
        return Err(ValidationError::WeakPassword(issues));
    }
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

fn check_name(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().chars().count() < MIN_NAME_LEN {
        return Err(ValidationError::NameTooShort(field));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayRequest {
    Plate(String),
    QrCode(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PayForm {
    pub license_plate: String,
    pub qr_code: Option<PathBuf>,
}

impl PayForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.request().map(|_| ())
    }

    /// A typed plate wins over an attached QR code.
    pub fn request(&self) -> Result<PayRequest, ValidationError> {
        let plate = self.license_plate.trim();
        if !plate.is_empty() {
            return Ok(PayRequest::Plate(plate.to_owned()));
        }
        match &self.qr_code {
            Some(path) => Ok(PayRequest::QrCode(path.clone())),
            None => Err(ValidationError::MissingPayInput),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignupForm {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub phone: String,
    pub accepted_terms: bool,
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_name(&self.name, "first name")?;
        check_name(&self.last_name, "last name")?;
        if !is_valid_email(self.email.trim()) {
            return Err(ValidationError::InvalidEmail);
        }
        check_password(&self.password, &self.confirm_password)?;
        if !is_valid_phone(self.phone.trim()) {
            return Err(ValidationError::InvalidPhone);
        }
        if !self.accepted_terms {
            return Err(ValidationError::TermsNotAccepted);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginForm {
    pub input: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.input.trim().is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }
        Ok(())
    }
}

/// Blank fields keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountInfoForm {
    pub name: String,
    pub last_name: String,
    pub phone: String,
}

impl AccountInfoForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name.trim();
        let last_name = self.last_name.trim();
        let phone = self.phone.trim();
        if name.is_empty() && last_name.is_empty() && phone.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }
        if !name.is_empty() {
            check_name(name, "first name")?;
        }
        if !last_name.is_empty() {
            check_name(last_name, "last name")?;
        }
        if !phone.is_empty() && !is_valid_phone(phone) {
            return Err(ValidationError::InvalidPhone);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountCredentialsForm {
    pub new_email: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl AccountCredentialsForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let email = self.new_email.trim();
        if email.is_empty() && self.new_password.is_empty() {
            return Err(ValidationError::NothingToUpdate);
        }
        if !email.is_empty() && !is_valid_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if !self.new_password.is_empty() {
            check_password(&self.new_password, &self.confirm_password)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContactForm {
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_email(self.email.trim()) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.subject.trim().is_empty() {
            return Err(ValidationError::Required("subject"));
        }
        if self.message.trim().is_empty() {
            return Err(ValidationError::Required("message"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverForm {
    pub channel: VerifyChannel,
    pub value: String,
}

impl RecoverForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let value = self.value.trim();
        match self.channel {
            VerifyChannel::Email if !is_valid_email(value) => Err(ValidationError::InvalidEmail),
            VerifyChannel::Sms if !is_valid_phone(value) => Err(ValidationError::InvalidPhone),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResetPasswordForm {
    pub password: String,
    pub confirm_password: String,
}

impl ResetPasswordForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_password(&self.password, &self.confirm_password)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerifyCodeForm {
    pub code: String,
}

impl VerifyCodeForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_code(self.code.trim()) {
            return Err(ValidationError::InvalidCode);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewsletterForm {
    pub email: String,
}

impl NewsletterForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_email(self.email.trim()) {
            return Err(ValidationError::InvalidEmail);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AccountCredentialsForm, AccountInfoForm, LoginForm, PasswordRule, PayForm, PayRequest,
        RecoverForm, SignupForm, ValidationError, is_valid_code, is_valid_email, is_valid_phone,
        password_issues,
    };
    use crate::VerifyChannel;
    use std::path::PathBuf;

    #[test]
    fn email_shapes() {
        for good in ["a@b.ro", "first.last@mail.example.com", "x@y.z.io"] {
            assert!(is_valid_email(good), "{good} should be accepted");
        }
        for bad in ["", "a@b", "a@b.c", "@b.ro", "a b@c.ro", "a@@b.ro", "a@.ro", "a@b.ro@c.de"] {
            assert!(!is_valid_email(bad), "{bad} should be rejected");
        }
    }

    #[test]
    fn phone_and_code_are_exact_digit_counts() {
        assert!(is_valid_phone("0712345678"));
        assert!(!is_valid_phone("071234567"));
        assert!(!is_valid_phone("07123456a8"));
        assert!(is_valid_code("123456"));
        assert!(!is_valid_code("12345"));
        assert!(!is_valid_code("12345x"));
    }

    #[test]
    fn password_reports_every_missing_rule() {
        assert_eq!(
            password_issues("abc"),
            vec![
                PasswordRule::MinLength,
                PasswordRule::Uppercase,
                PasswordRule::Digit
            ]
        );
        assert!(password_issues("Secret123").is_empty());
    }

    #[test]
    fn pay_needs_plate_or_qr() {
        let empty = PayForm::default();
        assert_eq!(empty.validate(), Err(ValidationError::MissingPayInput));
        assert_eq!(
            empty.validate().map_err(|error| error.to_string()),
            Err("Please enter a license plate number or upload a QR code.".to_owned())
        );

        let plate = PayForm {
            license_plate: " B123ABC ".to_owned(),
            qr_code: None,
        };
        assert_eq!(plate.request(), Ok(PayRequest::Plate("B123ABC".to_owned())));

        let both = PayForm {
            license_plate: "B123ABC".to_owned(),
            qr_code: Some(PathBuf::from("ticket.png")),
        };
        assert_eq!(both.request(), Ok(PayRequest::Plate("B123ABC".to_owned())));

        let qr_only = PayForm {
            license_plate: "  ".to_owned(),
            qr_code: Some(PathBuf::from("ticket.png")),
        };
        assert_eq!(
            qr_only.request(),
            Ok(PayRequest::QrCode(PathBuf::from("ticket.png")))
        );
    }

    #[test]
    fn signup_checks_fields_in_order() {
        let mut form = SignupForm {
            name: "Ana".to_owned(),
            last_name: "Pop".to_owned(),
            email: "ana@pop.ro".to_owned(),
            password: "Secret123".to_owned(),
            confirm_password: "Secret123".to_owned(),
            phone: "0712345678".to_owned(),
            accepted_terms: true,
        };
        assert_eq!(form.validate(), Ok(()));

        form.confirm_password = "Secret124".to_owned();
        assert_eq!(form.validate(), Err(ValidationError::PasswordMismatch));

        form.confirm_password = form.password.clone();
        form.accepted_terms = false;
        assert_eq!(form.validate(), Err(ValidationError::TermsNotAccepted));

        form.name = "Al".to_owned();
        assert_eq!(form.validate(), Err(ValidationError::NameTooShort("first name")));
    }

    #[test]
    fn login_requires_both_fields() {
        let form = LoginForm {
            input: "ana@pop.ro".to_owned(),
            password: String::new(),
        };
        assert_eq!(form.validate(), Err(ValidationError::MissingCredentials));
    }

    #[test]
    fn account_updates_need_at_least_one_field() {
        assert_eq!(
            AccountInfoForm::default().validate(),
            Err(ValidationError::NothingToUpdate)
        );
        let phone_only = AccountInfoForm {
            phone: "0712345678".to_owned(),
            ..AccountInfoForm::default()
        };
        assert_eq!(phone_only.validate(), Ok(()));

        let weak = AccountCredentialsForm {
            new_password: "short".to_owned(),
            confirm_password: "short".to_owned(),
            ..AccountCredentialsForm::default()
        };
        assert!(matches!(weak.validate(), Err(ValidationError::WeakPassword(_))));
    }

    #[test]
    fn recover_validates_by_channel() {
        let sms = RecoverForm {
            channel: VerifyChannel::Sms,
            value: "ana@pop.ro".to_owned(),
        };
        assert_eq!(sms.validate(), Err(ValidationError::InvalidPhone));
        let email = RecoverForm {
            channel: VerifyChannel::Email,
            value: "ana@pop.ro".to_owned(),
        };
        assert_eq!(email.validate(), Ok(()));
    }
}
