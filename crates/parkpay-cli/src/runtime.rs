// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use parkpay_api::{Client, NewAccount, Recipient, SubscriptionSync, VehicleSync};
use parkpay_app::{
    AccountCredentialsForm, AccountInfoForm, ContactForm, HistoryPolicy, LoginForm, LoginSession,
    Outcome, PayRequest, RecoverForm, RemoteSync, ResetPasswordForm, Row, SignupForm,
    SubscriptionName, SyncScope, TableKind, UserProfile, VerificationFlow, VerifyChannel,
};
use parkpay_db::SessionStore;
use parkpay_tui::{SignedIn, TableIo};
use tracing::{debug, info};

/// The username that opens the admin dashboard.
const ADMIN_INPUT: &str = "admin";

pub struct ApiRuntime<'a> {
    store: &'a SessionStore,
    client: Client,
    policy: HistoryPolicy,
    /// Who the current verification code goes to.
    recipient: Option<Recipient>,
    /// Email tied to a validated recovery code.
    recovery_email: Option<String>,
}

impl<'a> ApiRuntime<'a> {
    pub fn new(store: &'a SessionStore, client: Client, policy: HistoryPolicy) -> Self {
        Self {
            store,
            client,
            policy,
            recipient: None,
            recovery_email: None,
        }
    }

    fn signed_in_email(&self) -> Result<String> {
        self.store
            .email()?
            .ok_or_else(|| anyhow!("no signed-in account in the session store; log in again"))
    }

    fn recipient(&self) -> Result<Recipient> {
        if let Some(recipient) = &self.recipient {
            return Ok(recipient.clone());
        }
        let profile = self
            .store
            .profile()?
            .ok_or_else(|| anyhow!("no account to send a code to; start the flow again"))?;
        Ok(Recipient::from(&profile))
    }

    fn remember_login(&self, session: &LoginSession, is_admin: bool) -> Result<SignedIn> {
        self.store.store_login(session)?;
        self.store.put_admin(is_admin)?;
        Ok(SignedIn {
            display_name: session.profile.display_name(),
            is_admin,
        })
    }
}

impl parkpay_tui::AppRuntime for ApiRuntime<'_> {
    fn restore_session(&mut self) -> Result<Option<SignedIn>> {
        let Some(profile) = self.store.profile()? else {
            return Ok(None);
        };
        Ok(Some(SignedIn {
            display_name: profile.display_name(),
            is_admin: self.store.is_admin()?,
        }))
    }

    fn history_policy(&self) -> HistoryPolicy {
        self.policy
    }

    fn table_io(&mut self, kind: TableKind) -> Result<TableIo<'_>> {
        let email = self.signed_in_email()?;
        let (sync, scope): (Box<dyn RemoteSync + '_>, SyncScope) = match kind {
            TableKind::Subscriptions => (
                Box::new(SubscriptionSync::new(&self.client)),
                SyncScope::account(email),
            ),
            TableKind::Vehicles => {
                let name = self.store.subscription_name()?.ok_or_else(|| {
                    anyhow!("no subscription is open; pick one on the subscriptions screen")
                })?;
                (
                    Box::new(VehicleSync::new(&self.client)),
                    SyncScope::subscription(email, name),
                )
            }
        };
        Ok(TableIo {
            sync,
            cache: &mut self.store,
            scope,
        })
    }

    fn subscription_name(&mut self) -> Result<Option<SubscriptionName>> {
        self.store.subscription_name()
    }

    fn open_subscription(&mut self, name: &SubscriptionName, vehicles: &[Row]) -> Result<()> {
        self.store.put_subscription_name(name)?;
        self.store.put_rows(TableKind::Vehicles, vehicles)
    }

    fn profile(&mut self) -> Result<UserProfile> {
        self.store
            .profile()?
            .ok_or_else(|| anyhow!("no signed-in account in the session store; log in again"))
    }

    fn pay(&mut self, request: &PayRequest) -> Result<Outcome<String>> {
        match request {
            PayRequest::Plate(plate) => self.client.pay_plate(plate),
            PayRequest::QrCode(path) => self.client.pay_qr_code(path),
        }
    }

    fn login(&mut self, form: &LoginForm) -> Result<Outcome<SignedIn>> {
        let input = form.input.trim();
        match self.client.login(input, &form.password)? {
            Outcome::Accepted(session) => {
                let signed_in = self.remember_login(&session, input == ADMIN_INPUT)?;
                Ok(Outcome::Accepted(signed_in))
            }
            Outcome::Rejected(message) => Ok(Outcome::Rejected(message)),
        }
    }

    fn relogin(&mut self) -> Result<Outcome<SignedIn>> {
        let email = match self.store.email()? {
            Some(email) => email,
            None => self.recipient()?.email,
        };
        match self.client.relogin(&email)? {
            Outcome::Accepted(session) => {
                self.recipient = None;
                let signed_in = self.remember_login(&session, false)?;
                Ok(Outcome::Accepted(signed_in))
            }
            Outcome::Rejected(message) => Ok(Outcome::Rejected(message)),
        }
    }

    fn logout(&mut self) -> Result<()> {
        self.recipient = None;
        self.recovery_email = None;
        self.store.clear_session()
    }

    fn create_account(&mut self, form: &SignupForm) -> Result<Outcome<()>> {
        let account = NewAccount {
            name: form.name.trim(),
            last_name: form.last_name.trim(),
            email: form.email.trim(),
            password: &form.password,
            phone: form.phone.trim(),
        };
        let outcome = self.client.create_account(&account)?;
        if outcome.is_accepted() {
            self.recipient = Some(Recipient {
                name: account.name.to_owned(),
                email: account.email.to_owned(),
                phone: account.phone.to_owned(),
            });
        }
        Ok(outcome)
    }

    fn send_code(&mut self, flow: VerificationFlow, channel: VerifyChannel) -> Result<Outcome<()>> {
        let recipient = self.recipient()?;
        debug!(flow = flow.label(), channel = channel.label(), "sending code");
        self.client.send_code(flow, channel, &recipient)
    }

    fn resend_code(&mut self, flow: VerificationFlow) -> Result<Outcome<()>> {
        let recipient = self.recipient()?;
        self.client.resend_code(flow, &recipient)
    }

    fn check_code(&mut self, flow: VerificationFlow, code: &str) -> Result<Outcome<()>> {
        match self.client.check_token(flow, code.trim())? {
            Outcome::Accepted(email) => {
                let email = email.or_else(|| {
                    self.recipient
                        .as_ref()
                        .map(|recipient| recipient.email.clone())
                        .filter(|email| !email.is_empty())
                });
                match (flow, email) {
                    (VerificationFlow::Recover, email) => self.recovery_email = email,
                    (_, Some(email)) => self.store.put(parkpay_app::SessionKey::Email, &email)?,
                    (_, None) => {}
                }
                info!(flow = flow.label(), "code validated");
                Ok(Outcome::Accepted(()))
            }
            Outcome::Rejected(message) => Ok(Outcome::Rejected(message)),
        }
    }

    fn request_recovery(&mut self, form: &RecoverForm) -> Result<Outcome<()>> {
        let value = form.value.trim().to_owned();
        let recipient = match form.channel {
            VerifyChannel::Email => Recipient {
                name: String::new(),
                email: value,
                phone: String::new(),
            },
            VerifyChannel::Sms => Recipient {
                name: String::new(),
                email: String::new(),
                phone: value,
            },
        };
        let outcome = self
            .client
            .send_code(VerificationFlow::Recover, form.channel, &recipient)?;
        if outcome.is_accepted() {
            self.recipient = Some(recipient);
        }
        Ok(outcome)
    }

    fn reset_password(&mut self, form: &ResetPasswordForm) -> Result<Outcome<()>> {
        let email = self
            .recovery_email
            .clone()
            .ok_or_else(|| anyhow!("no validated recovery code; start password recovery again"))?;
        let outcome = self.client.reset_password(&email, &form.password)?;
        if outcome.is_accepted() {
            self.recovery_email = None;
            self.recipient = None;
        }
        Ok(outcome)
    }

    fn update_account_information(&mut self, form: &AccountInfoForm) -> Result<Outcome<()>> {
        let mut profile = self.profile()?;
        let keep_or = |value: &str, current: &str| {
            let value = value.trim();
            if value.is_empty() {
                current.to_owned()
            } else {
                value.to_owned()
            }
        };
        let name = keep_or(&form.name, &profile.name);
        let last_name = keep_or(&form.last_name, &profile.last_name);
        let phone = keep_or(&form.phone, &profile.phone);

        let outcome = self.client.update_account_information(
            &profile.email,
            &name,
            &last_name,
            &phone,
        )?;
        if outcome.is_accepted() {
            profile.name = name;
            profile.last_name = last_name;
            profile.phone = phone;
            self.store.put_profile(&profile)?;
        }
        Ok(outcome)
    }

    fn update_credentials(&mut self, form: &AccountCredentialsForm) -> Result<Outcome<()>> {
        let profile = self.profile()?;
        let new_email = form.new_email.trim();
        let outcome = self
            .client
            .update_account(&profile.email, new_email, &form.new_password)?;
        if outcome.is_accepted() {
            let email = if new_email.is_empty() {
                profile.email.clone()
            } else {
                new_email.to_owned()
            };
            self.recipient = Some(Recipient {
                name: profile.name,
                email,
                phone: profile.phone,
            });
        }
        Ok(outcome)
    }

    fn contact(&mut self, form: &ContactForm) -> Result<Outcome<()>> {
        self.client
            .contact(form.email.trim(), form.subject.trim(), form.message.trim())
    }

    fn newsletter(&mut self, email: &str, subscribe: bool) -> Result<Outcome<()>> {
        if subscribe {
            self.client.subscribe_newsletter(email)
        } else {
            self.client.unsubscribe_newsletter(email)
        }
    }

    fn admin_emails(&mut self) -> Result<Outcome<Vec<Vec<String>>>> {
        let outcome = self.client.admin_emails()?;
        if let Outcome::Accepted(rows) = &outcome {
            self.store.put_emails_table(rows)?;
        }
        Ok(outcome)
    }
}
