// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use parkpay_app::{
    HistoryEntry, HistoryPage, LoginSession, Outcome, Row, UserProfile, VerificationFlow,
    VerifyChannel, format_payment,
};
use reqwest::StatusCode;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

mod sync;

pub use sync::{SubscriptionSync, VehicleSync};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Pay,
    CreateAccount,
    ValidateViaEmail,
    ValidateViaSms,
    ResendValidateSms,
    Validate,
    Login,
    RecoverPasswordViaEmail,
    RecoverPasswordViaSms,
    ResendRecoverPassword,
    VerifyResetPasswordToken,
    ResetPassword,
    GetSubscriptionVehicles,
    AddSubscription,
    DeleteSubscription,
    GetVehicleHistory,
    AddVehicle,
    DeleteVehicle,
    UpdateAccountInformation,
    UpdateAccount,
    ValidateUpdateViaEmail,
    ValidateUpdateViaSms,
    ResendValidateUpdateSms,
    ValidateUpdate,
    Contact,
    SubscribeNewsletter,
    UnsubscribeNewsletter,
    GetAdmin,
}

impl Endpoint {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Pay => "/api/endpoint",
            Self::CreateAccount => "/api/createAccount",
            Self::ValidateViaEmail => "/api/validateViaEmail",
            Self::ValidateViaSms => "/api/validateViaSMS",
            Self::ResendValidateSms => "/api/resendValidateSMS",
            Self::Validate => "/api/validate",
            Self::Login => "/api/login",
            Self::RecoverPasswordViaEmail => "/api/recoverPasswordViaEmail",
            Self::RecoverPasswordViaSms => "/api/recoverPasswordViaSMS",
            Self::ResendRecoverPassword => "/api/resendRecoverPassword",
            Self::VerifyResetPasswordToken => "/api/verifyResetPasswordToken",
            Self::ResetPassword => "/api/resetPassword",
            Self::GetSubscriptionVehicles => "/api/getSubscriptionVehicles",
            Self::AddSubscription => "/api/addSubscription",
            Self::DeleteSubscription => "/api/deleteSubscription",
            Self::GetVehicleHistory => "/api/getVehicleHistory",
            Self::AddVehicle => "/api/addVehicle",
            Self::DeleteVehicle => "/api/deleteVehicle",
            Self::UpdateAccountInformation => "/api/updateAccountInformation",
            Self::UpdateAccount => "/api/updateAccount",
            Self::ValidateUpdateViaEmail => "/api/validateUpdateViaEmail",
            Self::ValidateUpdateViaSms => "/api/validateUpdateViaSMS",
            Self::ResendValidateUpdateSms => "/api/resendValidateUpdateSMS",
            Self::ValidateUpdate => "/api/validateUpdate",
            Self::Contact => "/api/contact",
            Self::SubscribeNewsletter => "/api/subscribeNewsletter",
            Self::UnsubscribeNewsletter => "/api/unsubscribeNewsletter",
            Self::GetAdmin => "/api/getAdmin",
        }
    }

    /// Where a code or link is requested for each flow and channel.
    pub const fn send_code(flow: VerificationFlow, channel: VerifyChannel) -> Self {
        match (flow, channel) {
            (VerificationFlow::Signup, VerifyChannel::Email) => Self::ValidateViaEmail,
            (VerificationFlow::Signup, VerifyChannel::Sms) => Self::ValidateViaSms,
            (VerificationFlow::Recover, VerifyChannel::Email) => Self::RecoverPasswordViaEmail,
            (VerificationFlow::Recover, VerifyChannel::Sms) => Self::RecoverPasswordViaSms,
            (VerificationFlow::AccountUpdate, VerifyChannel::Email) => Self::ValidateUpdateViaEmail,
            (VerificationFlow::AccountUpdate, VerifyChannel::Sms) => Self::ValidateUpdateViaSms,
        }
    }

    pub const fn resend_code(flow: VerificationFlow) -> Self {
        match flow {
            VerificationFlow::Signup => Self::ResendValidateSms,
            VerificationFlow::Recover => Self::ResendRecoverPassword,
            VerificationFlow::AccountUpdate => Self::ResendValidateUpdateSms,
        }
    }

    pub const fn check_token(flow: VerificationFlow) -> Self {
        match flow {
            VerificationFlow::Signup => Self::Validate,
            VerificationFlow::Recover => Self::VerifyResetPasswordToken,
            VerificationFlow::AccountUpdate => Self::ValidateUpdate,
        }
    }
}

/// Who a verification code goes to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recipient {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl From<&UserProfile> for Recipient {
    fn from(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount<'a> {
    pub name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub phone: &'a str,
}

/// Blocking client for the parking server's form-encoded API.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("api.base_url must not be empty -- set it in the [api] section of the config");
        }
        let parsed = Url::parse(&base_url).with_context(|| {
            format!("api.base_url {base_url:?} is not a valid URL -- use a form like http://localhost:8080")
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("api.base_url {base_url:?} must use http or https");
        }
        if timeout.is_zero() {
            bail!("api.timeout must be positive");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            api_key: api_key.to_owned(),
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Pays for a plate. The accepted value is the server's message.
    pub fn pay_plate(&self, plate: &str) -> Result<Outcome<String>> {
        let envelope: Envelope<Empty> = self.call(Endpoint::Pay, &[("licensePlate", plate)])?;
        Ok(envelope.message_outcome())
    }

    pub fn pay_qr_code(&self, image: &Path) -> Result<Outcome<String>> {
        let form = Form::new()
            .text("key", self.api_key.clone())
            .file("qrCodeImage", image)
            .with_context(|| format!("read QR code image {}", image.display()))?;
        let request = self.http.post(self.url(Endpoint::Pay)).multipart(form);
        let envelope: Envelope<Empty> = self.send(Endpoint::Pay, request)?;
        Ok(envelope.message_outcome())
    }

    pub fn create_account(&self, account: &NewAccount<'_>) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::CreateAccount,
            &[
                ("name", account.name),
                ("lastName", account.last_name),
                ("email", account.email),
                ("password", account.password),
                ("phone", account.phone),
            ],
        )
    }

    pub fn send_code(
        &self,
        flow: VerificationFlow,
        channel: VerifyChannel,
        to: &Recipient,
    ) -> Result<Outcome<()>> {
        let endpoint = Endpoint::send_code(flow, channel);
        match endpoint {
            Endpoint::ValidateViaEmail | Endpoint::ValidateUpdateViaEmail => self.post_unit(
                endpoint,
                &[("name", to.name.as_str()), ("email", to.email.as_str())],
            ),
            Endpoint::RecoverPasswordViaEmail => {
                self.post_unit(endpoint, &[("email", to.email.as_str())])
            }
            Endpoint::RecoverPasswordViaSms => {
                self.post_unit(endpoint, &[("phone", to.phone.as_str())])
            }
            _ => self.post_unit(
                endpoint,
                &[("email", to.email.as_str()), ("phone", to.phone.as_str())],
            ),
        }
    }

    pub fn resend_code(&self, flow: VerificationFlow, to: &Recipient) -> Result<Outcome<()>> {
        let endpoint = Endpoint::resend_code(flow);
        match flow {
            VerificationFlow::Recover => self.post_unit(endpoint, &[("phone", to.phone.as_str())]),
            VerificationFlow::Signup | VerificationFlow::AccountUpdate => self.post_unit(
                endpoint,
                &[("email", to.email.as_str()), ("phone", to.phone.as_str())],
            ),
        }
    }

    /// Checks a code or link token. The accepted value is the email the
    /// server tied it to, when it sends one.
    pub fn check_token(
        &self,
        flow: VerificationFlow,
        token: &str,
    ) -> Result<Outcome<Option<String>>> {
        let outcome: Outcome<TokenBody> =
            self.post_form(Endpoint::check_token(flow), &[("token", token)])?;
        Ok(outcome.map(|body| body.email.filter(|email| !email.trim().is_empty())))
    }

    pub fn login(&self, input: &str, password: &str) -> Result<Outcome<LoginSession>> {
        let outcome: Outcome<LoginBody> =
            self.post_form(Endpoint::Login, &[("input", input), ("password", password)])?;
        Ok(outcome.map(LoginBody::into_session))
    }

    /// Signs in again without a password after a validated link.
    pub fn relogin(&self, email: &str) -> Result<Outcome<LoginSession>> {
        let outcome: Outcome<LoginBody> = self.post_form(
            Endpoint::Login,
            &[("input", email), ("fromRedirect", "true")],
        )?;
        Ok(outcome.map(LoginBody::into_session))
    }

    pub fn reset_password(&self, email: &str, new_password: &str) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::ResetPassword,
            &[("email", email), ("newPassword", new_password)],
        )
    }

    pub fn subscription_vehicles(
        &self,
        email: &str,
        subscription: &str,
    ) -> Result<Outcome<Vec<Row>>> {
        let outcome: Outcome<VehiclesBody> = self.post_form(
            Endpoint::GetSubscriptionVehicles,
            &[("email", email), ("subscriptionName", subscription)],
        )?;
        Ok(outcome.map(VehiclesBody::into_rows))
    }

    pub fn add_subscription(&self, email: &str, subscription: &str) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::AddSubscription,
            &[("email", email), ("subscriptionName", subscription)],
        )
    }

    pub fn delete_subscription(&self, email: &str, subscription: &str) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::DeleteSubscription,
            &[("email", email), ("subscriptionName", subscription)],
        )
    }

    pub fn vehicle_history(&self, plate: &str) -> Result<Outcome<HistoryPage>> {
        let outcome: Outcome<HistoryBody> =
            self.post_form(Endpoint::GetVehicleHistory, &[("licensePlate", plate)])?;
        Ok(outcome.map(HistoryBody::into_page))
    }

    /// `activity` is every cell after the plate; the server answers with
    /// the stored row.
    pub fn add_vehicle(
        &self,
        email: &str,
        subscription: &str,
        plate: &str,
        activity: &[String],
    ) -> Result<Outcome<Row>> {
        let activity = serde_json::to_string(activity).context("encode vehicle activity")?;
        let outcome: Outcome<VehiclesBody> = self.post_form(
            Endpoint::AddVehicle,
            &[
                ("email", email),
                ("licensePlate", plate),
                ("subscriptionName", subscription),
                ("activityData", activity.as_str()),
            ],
        )?;
        match outcome {
            Outcome::Accepted(body) => body
                .into_rows()
                .into_iter()
                .next()
                .map(Outcome::Accepted)
                .ok_or_else(|| anyhow!("server accepted vehicle {plate} but sent no row back")),
            Outcome::Rejected(message) => Ok(Outcome::Rejected(message)),
        }
    }

    pub fn delete_vehicle(
        &self,
        email: &str,
        subscription: &str,
        plate: &str,
    ) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::DeleteVehicle,
            &[
                ("email", email),
                ("subscriptionName", subscription),
                ("licensePlate", plate),
            ],
        )
    }

    pub fn update_account_information(
        &self,
        email: &str,
        name: &str,
        last_name: &str,
        phone: &str,
    ) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::UpdateAccountInformation,
            &[
                ("email", email),
                ("newName", name),
                ("newLastName", last_name),
                ("newPhone", phone),
            ],
        )
    }

    pub fn update_account(
        &self,
        email: &str,
        new_email: &str,
        new_password: &str,
    ) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::UpdateAccount,
            &[
                ("email", email),
                ("newEmail", new_email),
                ("newPassword", new_password),
            ],
        )
    }

    pub fn contact(&self, email: &str, subject: &str, message: &str) -> Result<Outcome<()>> {
        self.post_unit(
            Endpoint::Contact,
            &[("email", email), ("subject", subject), ("message", message)],
        )
    }

    pub fn subscribe_newsletter(&self, email: &str) -> Result<Outcome<()>> {
        self.post_unit(Endpoint::SubscribeNewsletter, &[("email", email)])
    }

    pub fn unsubscribe_newsletter(&self, email: &str) -> Result<Outcome<()>> {
        self.post_unit(Endpoint::UnsubscribeNewsletter, &[("email", email)])
    }

    pub fn admin_emails(&self) -> Result<Outcome<Vec<Vec<String>>>> {
        let outcome: Outcome<AdminBody> = self.post_form(Endpoint::GetAdmin, &[])?;
        Ok(outcome.map(|body| body.emails_table.iter().map(value_row).collect()))
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    fn post_unit(&self, endpoint: Endpoint, fields: &[(&str, &str)]) -> Result<Outcome<()>> {
        let outcome: Outcome<Empty> = self.post_form(endpoint, fields)?;
        Ok(outcome.map(|_| ()))
    }

    fn post_form<T>(&self, endpoint: Endpoint, fields: &[(&str, &str)]) -> Result<Outcome<T>>
    where
        T: DeserializeOwned + Default,
    {
        Ok(self.call::<T>(endpoint, fields)?.into_outcome())
    }

    fn call<T>(&self, endpoint: Endpoint, fields: &[(&str, &str)]) -> Result<Envelope<T>>
    where
        T: DeserializeOwned + Default,
    {
        let mut form = Vec::with_capacity(fields.len() + 1);
        form.push(("key", self.api_key.as_str()));
        form.extend_from_slice(fields);
        let request = self.http.post(self.url(endpoint)).form(&form);
        self.send(endpoint, request)
    }

    fn send<T>(&self, endpoint: Endpoint, request: RequestBuilder) -> Result<Envelope<T>>
    where
        T: DeserializeOwned + Default,
    {
        debug!(endpoint = endpoint.path(), "sending request");
        let response = request
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let envelope: Envelope<T> = response
            .json()
            .with_context(|| format!("decode {} response", endpoint.path()))?;
        info!(endpoint = endpoint.path(), success = envelope.success, "api response");
        Ok(envelope)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    body: T,
}

impl<T> Envelope<T> {
    fn into_outcome(self) -> Outcome<T> {
        if self.success {
            Outcome::Accepted(self.body)
        } else {
            Outcome::Rejected(self.message.filter(|message| !message.trim().is_empty()))
        }
    }

    fn message_outcome(self) -> Outcome<String> {
        let success = self.success;
        let message = self.message.filter(|message| !message.trim().is_empty());
        if success {
            Outcome::Accepted(message.unwrap_or_default())
        } else {
            Outcome::Rejected(message)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenBody {
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LoginBody {
    name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    subscriptions_table: Vec<Value>,
}

impl LoginBody {
    fn into_session(self) -> LoginSession {
        // The server nests each subscription name in its own array.
        let subscriptions = self
            .subscriptions_table
            .iter()
            .filter_map(|entry| value_row(entry).into_iter().next())
            .filter(|name| !name.is_empty())
            .map(Row::single)
            .collect();
        LoginSession {
            profile: UserProfile {
                name: self.name.unwrap_or_default(),
                last_name: self.last_name.unwrap_or_default(),
                email: self.email.unwrap_or_default(),
                phone: self.phone.unwrap_or_default(),
            },
            subscriptions,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VehiclesBody {
    vehicles_table: Vec<Value>,
}

impl VehiclesBody {
    fn into_rows(self) -> Vec<Row> {
        self.vehicles_table
            .iter()
            .map(|entry| Row::new(value_row(entry)))
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HistoryBody {
    history: Vec<Value>,
    total_time_parked: Option<Value>,
    payment: Option<Value>,
}

impl HistoryBody {
    fn into_page(self) -> HistoryPage {
        HistoryPage {
            entries: self
                .history
                .iter()
                .map(|entry| HistoryEntry::from_cells(value_row(entry)))
                .collect(),
            total_time_parked: self
                .total_time_parked
                .as_ref()
                .map(cell_text)
                .filter(|text| !text.trim().is_empty()),
            payment: self
                .payment
                .as_ref()
                .map(cell_text)
                .filter(|text| !text.trim().is_empty())
                .map(|text| format_payment(&text)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AdminBody {
    emails_table: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_row(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(cell_text).collect(),
        other => vec![cell_text(other)],
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!(
            "request to {base_url} timed out -- raise api.timeout or check the server ({error})"
        );
    }
    anyhow!("cannot reach {base_url} -- check api.base_url and that the parking server is running ({error})")
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(message) = parsed.message
        && !message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), message);
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}
