// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use parkpay_app::{
    AccountCredentialsForm, AccountInfoForm, AppCommand, AppEvent, AppState, BulkReport,
    CommitOutcome, ContactForm, GENERIC_ERROR, HistoryOutcome, HistoryPolicy, LoginForm, MenuItem,
    NewsletterForm, Outcome, PayForm, PayRequest, RecoverForm, RemoteSync, ResetPasswordForm,
    Row, RowCache, Screen, SignupForm, SubscriptionName, SyncScope, TableKind, TableState,
    UserProfile, VerificationFlow, VerifyChannel, VerifyCodeForm, VisibleRow,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, Gauge, Paragraph, Row as TableRow, Table, Wrap,
};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const CHECKED: &str = "[x]";
const UNCHECKED: &str = "[ ]";
const EXPANDED: &str = "▾";
const COLLAPSED: &str = "▸";
const HISTORY_BRANCH: &str = "  └";
const ACCOUNT_CREDENTIALS_START: usize = 3;

const LOGIN_REJECTED: &str = "Login failed. Please check your credentials.";
const WRONG_CODE: &str = "The code entered is not correct.";
const VALIDATION_EMAIL_SENT: &str = "A validation email has been sent to your address.";
const RECOVERY_EMAIL_SENT: &str = "A password recovery email has been sent to your address.";

/// Who the runtime signed in, as the header shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub display_name: String,
    pub is_admin: bool,
}

/// Everything a table operation touches for one screen: the remote verbs,
/// the session cache, and who the rows belong to.
pub struct TableIo<'a> {
    pub sync: Box<dyn RemoteSync + 'a>,
    pub cache: &'a mut dyn RowCache,
    pub scope: SyncScope,
}

pub trait AppRuntime {
    fn restore_session(&mut self) -> Result<Option<SignedIn>>;
    fn history_policy(&self) -> HistoryPolicy;
    fn table_io(&mut self, kind: TableKind) -> Result<TableIo<'_>>;
    fn subscription_name(&mut self) -> Result<Option<SubscriptionName>>;
    /// Remembers the opened subscription and caches its vehicles.
    fn open_subscription(&mut self, name: &SubscriptionName, vehicles: &[Row]) -> Result<()>;
    fn profile(&mut self) -> Result<UserProfile>;

    fn pay(&mut self, request: &PayRequest) -> Result<Outcome<String>>;
    fn login(&mut self, form: &LoginForm) -> Result<Outcome<SignedIn>>;
    /// Signs in again with the stored email after a validated code.
    fn relogin(&mut self) -> Result<Outcome<SignedIn>>;
    fn logout(&mut self) -> Result<()>;
    fn create_account(&mut self, form: &SignupForm) -> Result<Outcome<()>>;

    fn send_code(&mut self, flow: VerificationFlow, channel: VerifyChannel) -> Result<Outcome<()>>;
    fn resend_code(&mut self, flow: VerificationFlow) -> Result<Outcome<()>>;
    fn check_code(&mut self, flow: VerificationFlow, code: &str) -> Result<Outcome<()>>;
    fn request_recovery(&mut self, form: &RecoverForm) -> Result<Outcome<()>>;
    fn reset_password(&mut self, form: &ResetPasswordForm) -> Result<Outcome<()>>;

    fn update_account_information(&mut self, form: &AccountInfoForm) -> Result<Outcome<()>>;
    fn update_credentials(&mut self, form: &AccountCredentialsForm) -> Result<Outcome<()>>;
    fn contact(&mut self, form: &ContactForm) -> Result<Outcome<()>>;
    fn newsletter(&mut self, email: &str, subscribe: bool) -> Result<Outcome<()>>;
    fn admin_emails(&mut self) -> Result<Outcome<Vec<Vec<String>>>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Banner {
    Error(String),
    Info(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Secret,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSpec {
    label: &'static str,
    kind: FieldKind,
}

impl FieldSpec {
    const fn text(label: &'static str) -> Self {
        Self {
            label,
            kind: FieldKind::Text,
        }
    }

    const fn secret(label: &'static str) -> Self {
        Self {
            label,
            kind: FieldKind::Secret,
        }
    }

    const fn toggle(label: &'static str) -> Self {
        Self {
            label,
            kind: FieldKind::Toggle,
        }
    }
}

const PAY_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("License plate"),
    FieldSpec::text("QR code image"),
];
const LOGIN_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("Email or username"),
    FieldSpec::secret("Password"),
];
const SIGNUP_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("First name"),
    FieldSpec::text("Last name"),
    FieldSpec::text("Email"),
    FieldSpec::secret("Password"),
    FieldSpec::secret("Confirm password"),
    FieldSpec::text("Phone"),
    FieldSpec::toggle("I accept the terms and conditions"),
];
const CODE_FIELDS: &[FieldSpec] = &[FieldSpec::text("Code")];
const RECOVER_EMAIL_FIELDS: &[FieldSpec] = &[FieldSpec::text("Email")];
const RECOVER_PHONE_FIELDS: &[FieldSpec] = &[FieldSpec::text("Phone")];
const RESET_FIELDS: &[FieldSpec] = &[
    FieldSpec::secret("New password"),
    FieldSpec::secret("Confirm password"),
];
const ACCOUNT_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("New first name"),
    FieldSpec::text("New last name"),
    FieldSpec::text("New phone"),
    FieldSpec::text("New email"),
    FieldSpec::secret("New password"),
    FieldSpec::secret("Confirm password"),
];
const CONTACT_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("Email"),
    FieldSpec::text("Subject"),
    FieldSpec::text("Message"),
];
const NEWSLETTER_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("Email"),
    FieldSpec::toggle("Unsubscribe instead"),
];

fn form_field_specs(screen: Screen, channel: Option<VerifyChannel>) -> &'static [FieldSpec] {
    match screen {
        Screen::Pay => PAY_FIELDS,
        Screen::Login => LOGIN_FIELDS,
        Screen::Signup => SIGNUP_FIELDS,
        Screen::VerifyCode => CODE_FIELDS,
        Screen::Recover => match channel {
            Some(VerifyChannel::Sms) => RECOVER_PHONE_FIELDS,
            _ => RECOVER_EMAIL_FIELDS,
        },
        Screen::ResetPassword => RESET_FIELDS,
        Screen::Account => ACCOUNT_FIELDS,
        Screen::Contact => CONTACT_FIELDS,
        Screen::Newsletter => NEWSLETTER_FIELDS,
        Screen::VerifyChannel
        | Screen::RecoverChannel
        | Screen::Redirect
        | Screen::Subscriptions
        | Screen::Vehicles
        | Screen::Admin => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FormUiState {
    values: Vec<String>,
    focus: usize,
}

impl FormUiState {
    fn with_fields(count: usize) -> Self {
        Self {
            values: vec![String::new(); count],
            focus: 0,
        }
    }

    fn value(&self, index: usize) -> String {
        self.values.get(index).cloned().unwrap_or_default()
    }

    fn is_checked(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(|value| !value.is_empty())
    }

    fn move_focus(&mut self, delta: isize) {
        let len = self.values.len() as isize;
        if len > 0 {
            self.focus = (self.focus as isize + delta).rem_euclid(len) as usize;
        }
    }

    fn clear(&mut self) {
        for value in &mut self.values {
            value.clear();
        }
        self.focus = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ViewData {
    form: FormUiState,
    table: Option<TableState>,
    subscription: Option<SubscriptionName>,
    profile: Option<UserProfile>,
    admin_rows: Vec<Vec<String>>,
    banner: Option<Banner>,
    channel_cursor: usize,
    status_token: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableCommand {
    MoveDown,
    MoveUp,
    Top,
    Bottom,
    ToggleSelect,
    CheckAll,
    UncheckAll,
    Add,
    DeleteSelected,
    ToggleHistory,
    ViewAllHistory,
    Open,
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TableEvent {
    Nothing,
    Status(String),
    Open {
        name: SubscriptionName,
        vehicles: Vec<Row>,
    },
    Back,
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();
    start(state, runtime, &mut view_data);

    let mut last_tick = Instant::now();
    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event
            && let Event::Key(key) = event::read().context("read event")?
            && handle_key_event(state, runtime, &mut view_data, &internal_tx, key)
        {
            break;
        }

        if state.countdown.is_some() && last_tick.elapsed() >= COUNTDOWN_TICK {
            last_tick = Instant::now();
            advance_countdown(state, runtime, &mut view_data, &internal_tx);
        } else if state.countdown.is_none() {
            last_tick = Instant::now();
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn start<R: AppRuntime>(state: &mut AppState, runtime: &mut R, view_data: &mut ViewData) {
    match runtime.restore_session() {
        Ok(Some(signed_in)) => {
            info!(user = %signed_in.display_name, "restored session");
            state.dispatch(AppCommand::SignedIn {
                display_name: signed_in.display_name,
                is_admin: signed_in.is_admin,
            });
        }
        Ok(None) => {}
        Err(error) => {
            warn!(error = %format!("{error:#}"), "restore session");
        }
    }
    let screen = state.screen;
    enter_screen(state, runtime, view_data, screen);
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn dispatch_and_refresh<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    command: AppCommand,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = state.dispatch(command);
    let mut redirected = false;
    for event in &events {
        match event {
            AppEvent::ScreenChanged(screen) => enter_screen(state, runtime, view_data, *screen),
            AppEvent::RedirectedToLogin(wanted) => {
                debug!(wanted = wanted.title(), "no session, showing login");
                redirected = true;
            }
            AppEvent::StatusUpdated(_) => {
                view_data.status_token = view_data.status_token.saturating_add(1);
                schedule_status_clear(internal_tx, view_data.status_token);
            }
            _ => {}
        }
    }
    if redirected {
        view_data.banner = Some(Banner::Error("Please log in to continue.".to_owned()));
    }
}

/// Resets per-screen view state and loads what the screen shows.
fn enter_screen<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    screen: Screen,
) {
    if let Some(table) = view_data.table.as_mut()
        && table.editor().pending().is_some()
        && let Err(error) = commit_table(table, runtime)
    {
        warn!(error = %format!("{error:#}"), "commit pending row on leave");
    }

    view_data.banner = None;
    view_data.table = None;
    view_data.profile = None;
    view_data.channel_cursor = 0;
    view_data.form = FormUiState::with_fields(form_field_specs(screen, state.channel).len());

    match screen {
        Screen::Login => {
            if let Some(notice) = state.take_notice() {
                view_data.banner = Some(Banner::Info(notice));
            }
        }
        Screen::Subscriptions => load_table(runtime, view_data, TableKind::Subscriptions),
        Screen::Vehicles => {
            match runtime.subscription_name() {
                Ok(name) => view_data.subscription = name,
                Err(error) => warn!(error = %format!("{error:#}"), "read subscription name"),
            }
            load_table(runtime, view_data, TableKind::Vehicles);
        }
        Screen::Account => match runtime.profile() {
            Ok(profile) => view_data.profile = Some(profile),
            Err(error) => report_failure(view_data, "load profile", &error),
        },
        Screen::Admin => refresh_admin(runtime, view_data),
        _ => {}
    }
}

fn load_table<R: AppRuntime>(runtime: &mut R, view_data: &mut ViewData, kind: TableKind) {
    let policy = runtime.history_policy();
    match runtime.table_io(kind) {
        Ok(io) => {
            let table = TableState::load(kind, &*io.cache, policy);
            debug!(table = kind.as_str(), rows = table.registry().len(), "loaded table");
            view_data.table = Some(table);
        }
        Err(error) => report_failure(view_data, "open table", &error),
    }
}

fn refresh_admin<R: AppRuntime>(runtime: &mut R, view_data: &mut ViewData) {
    match runtime.admin_emails() {
        Ok(Outcome::Accepted(rows)) => view_data.admin_rows = rows,
        Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
        Err(error) => report_failure(view_data, "load admin emails", &error),
    }
}

fn report_failure(view_data: &mut ViewData, action: &str, error: &anyhow::Error) {
    warn!(action, error = %format!("{error:#}"), "request failed");
    view_data.banner = Some(Banner::Error(GENERIC_ERROR.to_owned()));
}

fn reject(view_data: &mut ViewData, message: Option<String>, fallback: &str) {
    let text = message
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| fallback.to_owned());
    view_data.banner = Some(Banner::Error(text));
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if key.code == KeyCode::Char('p') && key.modifiers.contains(KeyModifiers::CONTROL) {
        state.dispatch(AppCommand::ToggleDropdown);
        return false;
    }

    if state.dropdown_open {
        handle_dropdown_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    match state.screen {
        Screen::Subscriptions | Screen::Vehicles => {
            handle_table_key(state, runtime, view_data, internal_tx, key);
        }
        Screen::VerifyChannel | Screen::RecoverChannel => {
            handle_channel_key(state, runtime, view_data, internal_tx, key);
        }
        Screen::Redirect => {
            state.dispatch(AppCommand::CancelCountdown);
            finish_redirect(state, runtime, view_data, internal_tx);
        }
        Screen::Admin => match key.code {
            KeyCode::Char('r') => {
                refresh_admin(runtime, view_data);
                emit_status(state, view_data, internal_tx, "admin emails refreshed");
            }
            KeyCode::Esc => {
                dispatch_and_refresh(state, runtime, view_data, AppCommand::Back, internal_tx);
            }
            _ => {}
        },
        _ => handle_form_key(state, runtime, view_data, internal_tx, key),
    }
    false
}

fn handle_dropdown_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            state.dispatch(AppCommand::MoveMenu(1));
        }
        KeyCode::Char('k') | KeyCode::Up => {
            state.dispatch(AppCommand::MoveMenu(-1));
        }
        KeyCode::Esc => {
            state.dispatch(AppCommand::CloseDropdown);
        }
        KeyCode::Enter => match state.selected_menu_item() {
            Some(MenuItem::Open(screen)) => {
                dispatch_and_refresh(
                    state,
                    runtime,
                    view_data,
                    AppCommand::Navigate(screen),
                    internal_tx,
                );
            }
            Some(MenuItem::Logout) => {
                if let Err(error) = runtime.logout() {
                    warn!(error = %format!("{error:#}"), "clear session on logout");
                }
                info!("logged out");
                dispatch_and_refresh(state, runtime, view_data, AppCommand::Logout, internal_tx);
                emit_status(state, view_data, internal_tx, "logged out");
            }
            None => {
                state.dispatch(AppCommand::CloseDropdown);
            }
        },
        _ => {}
    }
}

fn handle_channel_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let channels = VerifyChannel::ALL;
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.channel_cursor = (view_data.channel_cursor + 1) % channels.len();
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.channel_cursor =
                (view_data.channel_cursor + channels.len() - 1) % channels.len();
        }
        KeyCode::Esc => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::Back, internal_tx);
        }
        KeyCode::Enter => {
            let channel = channels[view_data.channel_cursor % channels.len()];
            state.dispatch(AppCommand::ChooseChannel(channel));
            if state.screen == Screen::RecoverChannel {
                dispatch_and_refresh(
                    state,
                    runtime,
                    view_data,
                    AppCommand::Navigate(Screen::Recover),
                    internal_tx,
                );
                return;
            }
            let flow = state.verification.unwrap_or(VerificationFlow::Signup);
            match runtime.send_code(flow, channel) {
                Ok(Outcome::Accepted(())) => {
                    info!(flow = flow.label(), channel = channel.label(), "verification sent");
                    after_code_sent(
                        state,
                        runtime,
                        view_data,
                        internal_tx,
                        channel,
                        VALIDATION_EMAIL_SENT,
                    );
                }
                Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
                Err(error) => report_failure(view_data, "send verification", &error),
            }
        }
        _ => {}
    }
}

/// Email links are opened outside the terminal, so the email channel ends
/// on the login screen; SMS continues with the code prompt.
fn after_code_sent<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    channel: VerifyChannel,
    email_notice: &str,
) {
    match channel {
        VerifyChannel::Email => {
            state.dispatch(AppCommand::SetNotice(email_notice.to_owned()));
            dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::Navigate(Screen::Login),
                internal_tx,
            );
        }
        VerifyChannel::Sms => {
            dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::Navigate(Screen::VerifyCode),
                internal_tx,
            );
        }
    }
}

fn advance_countdown<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = state.dispatch(AppCommand::TickCountdown);
    if events.contains(&AppEvent::CountdownExpired) {
        finish_redirect(state, runtime, view_data, internal_tx);
    }
}

fn finish_redirect<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let target = match runtime.relogin() {
        Ok(Outcome::Accepted(signed_in)) => {
            info!(user = %signed_in.display_name, "signed in after validation");
            state.dispatch(AppCommand::SignedIn {
                display_name: signed_in.display_name,
                is_admin: signed_in.is_admin,
            });
            Screen::Subscriptions
        }
        Ok(Outcome::Rejected(_)) => Screen::Login,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "relogin after validation");
            Screen::Login
        }
    };
    dispatch_and_refresh(
        state,
        runtime,
        view_data,
        AppCommand::Navigate(target),
        internal_tx,
    );
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let specs = form_field_specs(state.screen, state.channel);
    let focus = view_data.form.focus;
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::Back, internal_tx);
        }
        (KeyCode::Tab | KeyCode::Down, _) => view_data.form.move_focus(1),
        (KeyCode::BackTab | KeyCode::Up, _) => view_data.form.move_focus(-1),
        (KeyCode::Enter, _) => submit_form(state, runtime, view_data, internal_tx),
        (KeyCode::Char('r'), modifiers)
            if modifiers.contains(KeyModifiers::CONTROL) && state.screen == Screen::VerifyCode =>
        {
            resend_code(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Backspace, _) => {
            if let Some(value) = view_data.form.values.get_mut(focus) {
                value.pop();
            }
        }
        (KeyCode::Char(ch), modifiers) if !modifiers.contains(KeyModifiers::CONTROL) => {
            let kind = specs.get(focus).map(|spec| spec.kind);
            if let Some(value) = view_data.form.values.get_mut(focus) {
                if kind == Some(FieldKind::Toggle) {
                    if value.is_empty() {
                        value.push('x');
                    } else {
                        value.clear();
                    }
                } else {
                    value.push(ch);
                }
            }
        }
        _ => {}
    }
}

fn resend_code<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let flow = state.verification.unwrap_or(VerificationFlow::Signup);
    match runtime.resend_code(flow) {
        Ok(Outcome::Accepted(())) => emit_status(state, view_data, internal_tx, "code resent"),
        Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
        Err(error) => report_failure(view_data, "resend code", &error),
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.banner = None;
    let form = view_data.form.clone();
    match state.screen {
        Screen::Pay => {
            let pay = PayForm {
                license_plate: form.value(0),
                qr_code: non_blank(form.value(1)).map(PathBuf::from),
            };
            let request = match pay.request() {
                Ok(request) => request,
                Err(error) => {
                    view_data.banner = Some(Banner::Error(error.to_string()));
                    return;
                }
            };
            match runtime.pay(&request) {
                Ok(Outcome::Accepted(message)) => {
                    info!("payment accepted");
                    let text =
                        non_blank(message).unwrap_or_else(|| "Payment registered.".to_owned());
                    view_data.form.clear();
                    view_data.banner = Some(Banner::Info(text));
                }
                Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
                Err(error) => report_failure(view_data, "pay", &error),
            }
        }
        Screen::Login => {
            let login = LoginForm {
                input: form.value(0).trim().to_owned(),
                password: form.value(1),
            };
            if let Err(error) = login.validate() {
                view_data.banner = Some(Banner::Error(error.to_string()));
                return;
            }
            match runtime.login(&login) {
                Ok(Outcome::Accepted(signed_in)) => {
                    info!(user = %signed_in.display_name, admin = signed_in.is_admin, "logged in");
                    let target = if signed_in.is_admin {
                        Screen::Admin
                    } else {
                        Screen::Subscriptions
                    };
                    state.dispatch(AppCommand::SignedIn {
                        display_name: signed_in.display_name,
                        is_admin: signed_in.is_admin,
                    });
                    dispatch_and_refresh(
                        state,
                        runtime,
                        view_data,
                        AppCommand::Navigate(target),
                        internal_tx,
                    );
                }
                Ok(Outcome::Rejected(_)) => {
                    view_data.banner = Some(Banner::Error(LOGIN_REJECTED.to_owned()));
                }
                Err(error) => report_failure(view_data, "login", &error),
            }
        }
        Screen::Signup => {
            let signup = SignupForm {
                name: form.value(0).trim().to_owned(),
                last_name: form.value(1).trim().to_owned(),
                email: form.value(2).trim().to_owned(),
                password: form.value(3),
                confirm_password: form.value(4),
                phone: form.value(5).trim().to_owned(),
                accepted_terms: form.is_checked(6),
            };
            if let Err(error) = signup.validate() {
                view_data.banner = Some(Banner::Error(error.to_string()));
                return;
            }
            match runtime.create_account(&signup) {
                Ok(Outcome::Accepted(())) => {
                    info!("account created");
                    dispatch_and_refresh(
                        state,
                        runtime,
                        view_data,
                        AppCommand::BeginVerification(VerificationFlow::Signup),
                        internal_tx,
                    );
                }
                Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
                Err(error) => report_failure(view_data, "create account", &error),
            }
        }
        Screen::VerifyCode => {
            let code = VerifyCodeForm {
                code: form.value(0).trim().to_owned(),
            };
            if let Err(error) = code.validate() {
                view_data.banner = Some(Banner::Error(error.to_string()));
                return;
            }
            let flow = state.verification.unwrap_or(VerificationFlow::Signup);
            match runtime.check_code(flow, &code.code) {
                Ok(Outcome::Accepted(())) => {
                    info!(flow = flow.label(), "code accepted");
                    let target = match flow {
                        VerificationFlow::Recover => Screen::ResetPassword,
                        VerificationFlow::Signup | VerificationFlow::AccountUpdate => {
                            Screen::Redirect
                        }
                    };
                    dispatch_and_refresh(
                        state,
                        runtime,
                        view_data,
                        AppCommand::Navigate(target),
                        internal_tx,
                    );
                }
                Ok(Outcome::Rejected(_)) => {
                    view_data.banner = Some(Banner::Error(WRONG_CODE.to_owned()));
                }
                Err(error) => report_failure(view_data, "check code", &error),
            }
        }
        Screen::Recover => {
            let channel = state.channel.unwrap_or(VerifyChannel::Email);
            let recover = RecoverForm {
                channel,
                value: form.value(0).trim().to_owned(),
            };
            if let Err(error) = recover.validate() {
                view_data.banner = Some(Banner::Error(error.to_string()));
                return;
            }
            match runtime.request_recovery(&recover) {
                Ok(Outcome::Accepted(())) => {
                    info!(channel = channel.label(), "recovery requested");
                    after_code_sent(
                        state,
                        runtime,
                        view_data,
                        internal_tx,
                        channel,
                        RECOVERY_EMAIL_SENT,
                    );
                }
                Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
                Err(error) => report_failure(view_data, "request recovery", &error),
            }
        }
        Screen::ResetPassword => {
            let reset = ResetPasswordForm {
                password: form.value(0),
                confirm_password: form.value(1),
            };
            if let Err(error) = reset.validate() {
                view_data.banner = Some(Banner::Error(error.to_string()));
                return;
            }
            match runtime.reset_password(&reset) {
                Ok(Outcome::Accepted(())) => {
                    info!("password reset");
                    state.dispatch(AppCommand::SetNotice(
                        "Password updated successfully.".to_owned(),
                    ));
                    dispatch_and_refresh(
                        state,
                        runtime,
                        view_data,
                        AppCommand::Navigate(Screen::Login),
                        internal_tx,
                    );
                }
                Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
                Err(error) => report_failure(view_data, "reset password", &error),
            }
        }
        Screen::Account if form.focus < ACCOUNT_CREDENTIALS_START => {
            submit_account_information(state, runtime, view_data, &form);
        }
        Screen::Account => submit_credentials(state, runtime, view_data, internal_tx, &form),
        Screen::Contact => {
            let contact = ContactForm {
                email: form.value(0).trim().to_owned(),
                subject: form.value(1).trim().to_owned(),
                message: form.value(2).trim().to_owned(),
            };
            if let Err(error) = contact.validate() {
                view_data.banner = Some(Banner::Error(error.to_string()));
                return;
            }
            match runtime.contact(&contact) {
                Ok(Outcome::Accepted(())) => {
                    view_data.form.clear();
                    view_data.banner = Some(Banner::Info(
                        "Your message has been sent successfully.".to_owned(),
                    ));
                }
                Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
                Err(error) => report_failure(view_data, "contact", &error),
            }
        }
        Screen::Newsletter => {
            let newsletter = NewsletterForm {
                email: form.value(0).trim().to_owned(),
            };
            let subscribe = !form.is_checked(1);
            view_data.form.clear();
            if newsletter.validate().is_err() {
                debug!("ignored invalid newsletter email");
                return;
            }
            match runtime.newsletter(&newsletter.email, subscribe) {
                Ok(Outcome::Accepted(())) => {
                    let text = if subscribe {
                        "You have subscribed to the newsletter."
                    } else {
                        "You have successfully unsubscribed from the newsletter."
                    };
                    view_data.banner = Some(Banner::Info(text.to_owned()));
                }
                Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
                Err(error) => report_failure(view_data, "newsletter", &error),
            }
        }
        Screen::VerifyChannel
        | Screen::RecoverChannel
        | Screen::Redirect
        | Screen::Subscriptions
        | Screen::Vehicles
        | Screen::Admin => {}
    }
}

fn submit_account_information<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    form: &FormUiState,
) {
    let info = AccountInfoForm {
        name: form.value(0).trim().to_owned(),
        last_name: form.value(1).trim().to_owned(),
        phone: form.value(2).trim().to_owned(),
    };
    if let Err(error) = info.validate() {
        view_data.banner = Some(Banner::Error(error.to_string()));
        return;
    }
    match runtime.update_account_information(&info) {
        Ok(Outcome::Accepted(())) => {
            info!("account information updated");
            if let Ok(profile) = runtime.profile() {
                state.dispatch(AppCommand::SignedIn {
                    display_name: profile.display_name(),
                    is_admin: state.is_admin,
                });
                view_data.profile = Some(profile);
            }
            view_data.form.clear();
            view_data.banner = Some(Banner::Info(
                "Account information updated successfully.".to_owned(),
            ));
        }
        Ok(Outcome::Rejected(message)) => reject(view_data, message, GENERIC_ERROR),
        Err(error) => report_failure(view_data, "update account information", &error),
    }
}

fn submit_credentials<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    form: &FormUiState,
) {
    let credentials = AccountCredentialsForm {
        new_email: form.value(3).trim().to_owned(),
        new_password: form.value(4),
        confirm_password: form.value(5),
    };
    if let Err(error) = credentials.validate() {
        view_data.banner = Some(Banner::Error(error.to_string()));
        return;
    }
    match runtime.update_credentials(&credentials) {
        Ok(Outcome::Accepted(())) => {
            info!("account credentials updated");
            dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::BeginVerification(VerificationFlow::AccountUpdate),
                internal_tx,
            );
        }
        Ok(Outcome::Rejected(message)) => {
            reject(view_data, message, "The current password is incorrect.");
        }
        Err(error) => report_failure(view_data, "update account", &error),
    }
}

fn table_command_for_key(key: KeyEvent) -> Option<TableCommand> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    let command = match key.code {
        KeyCode::Char('j') | KeyCode::Down => TableCommand::MoveDown,
        KeyCode::Char('k') | KeyCode::Up => TableCommand::MoveUp,
        KeyCode::Char('g') | KeyCode::Home => TableCommand::Top,
        KeyCode::Char('G') | KeyCode::End => TableCommand::Bottom,
        KeyCode::Char(' ') => TableCommand::ToggleSelect,
        KeyCode::Char('a') => TableCommand::CheckAll,
        KeyCode::Char('u') => TableCommand::UncheckAll,
        KeyCode::Char('n') => TableCommand::Add,
        KeyCode::Char('d') => TableCommand::DeleteSelected,
        KeyCode::Char('h') => TableCommand::ToggleHistory,
        KeyCode::Char('H') => TableCommand::ViewAllHistory,
        KeyCode::Enter => TableCommand::Open,
        KeyCode::Esc => TableCommand::Back,
        _ => return None,
    };
    Some(command)
}

fn handle_table_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let editing = view_data
        .table
        .as_ref()
        .is_some_and(|table| table.editor().is_editing());
    let event = if editing {
        match view_data.table.as_mut() {
            Some(table) => handle_editor_key(table, runtime, key),
            None => return,
        }
    } else {
        let Some(command) = table_command_for_key(key) else {
            return;
        };
        match view_data.table.as_mut() {
            Some(table) => apply_table_command(table, runtime, command),
            None if command == TableCommand::Back => Ok(TableEvent::Back),
            None => return,
        }
    };

    match event {
        Ok(TableEvent::Nothing) => {}
        Ok(TableEvent::Status(message)) => emit_status(state, view_data, internal_tx, message),
        Ok(TableEvent::Open { name, vehicles }) => {
            if let Err(error) = runtime.open_subscription(&name, &vehicles) {
                report_failure(view_data, "open subscription", &error);
                return;
            }
            info!(subscription = %name, vehicles = vehicles.len(), "opened subscription");
            dispatch_and_refresh(
                state,
                runtime,
                view_data,
                AppCommand::Navigate(Screen::Vehicles),
                internal_tx,
            );
        }
        Ok(TableEvent::Back) => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::Back, internal_tx);
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "table update failed");
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("table update failed: {error}"),
            );
        }
    }
}

fn handle_editor_key<R: AppRuntime>(
    table: &mut TableState,
    runtime: &mut R,
    key: KeyEvent,
) -> Result<TableEvent> {
    let leave_by = match key.code {
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            table.editor_mut().insert_char(ch);
            return Ok(TableEvent::Nothing);
        }
        KeyCode::Backspace => {
            table.editor_mut().backspace();
            return Ok(TableEvent::Nothing);
        }
        KeyCode::Tab => {
            table.editor_mut().focus_next();
            return Ok(TableEvent::Nothing);
        }
        KeyCode::BackTab => {
            table.editor_mut().focus_prev();
            return Ok(TableEvent::Nothing);
        }
        KeyCode::Enter | KeyCode::Esc => 0,
        KeyCode::Up => -1,
        KeyCode::Down => 1,
        _ => return Ok(TableEvent::Nothing),
    };

    let outcome = commit_table(table, runtime)?;
    if leave_by != 0 {
        table.move_cursor(leave_by);
    }
    Ok(commit_event(table.kind(), outcome))
}

fn commit_table<R: AppRuntime>(table: &mut TableState, runtime: &mut R) -> Result<CommitOutcome> {
    let mut io = runtime.table_io(table.kind())?;
    table.commit_pending(io.sync.as_mut(), &io.scope, io.cache)
}

fn commit_event(kind: TableKind, outcome: CommitOutcome) -> TableEvent {
    match outcome {
        CommitOutcome::Created(key) => TableEvent::Status(format!("added {} {key}", kind.noun())),
        CommitOutcome::Discarded => TableEvent::Status("empty row discarded".to_owned()),
        CommitOutcome::NothingPending | CommitOutcome::Rejected(_) | CommitOutcome::Failed(_) => {
            TableEvent::Nothing
        }
    }
}

fn bulk_status(verb: &str, kind: TableKind, report: &BulkReport) -> String {
    let count = report.succeeded.len();
    match &report.stopped_at {
        None => format!("{verb} {count} {}", kind.as_str()),
        Some((key, _)) => format!("{verb} {count} {}, stopped at {key}", kind.as_str()),
    }
}

fn apply_table_command<R: AppRuntime>(
    table: &mut TableState,
    runtime: &mut R,
    command: TableCommand,
) -> Result<TableEvent> {
    let kind = table.kind();
    match command {
        TableCommand::MoveDown => table.move_cursor(1),
        TableCommand::MoveUp => table.move_cursor(-1),
        TableCommand::Top => table.jump_cursor(0),
        TableCommand::Bottom => table.jump_cursor(usize::MAX),
        TableCommand::ToggleSelect => {
            let Some(key) = table.cursor_key() else {
                return Ok(TableEvent::Nothing);
            };
            let verb = if table.toggle_selected(&key) {
                "selected"
            } else {
                "unselected"
            };
            return Ok(TableEvent::Status(format!("{verb} {key}")));
        }
        TableCommand::CheckAll => {
            table.check_all();
            return Ok(TableEvent::Status(format!(
                "selected {}",
                table.selection().len()
            )));
        }
        TableCommand::UncheckAll => {
            if !table.selection().bulk_actions_enabled() {
                return Ok(TableEvent::Status("nothing selected".to_owned()));
            }
            table.uncheck_all();
            return Ok(TableEvent::Status("selection cleared".to_owned()));
        }
        TableCommand::Add => {
            let mut io = runtime.table_io(kind)?;
            let previous = table.begin_add(io.sync.as_mut(), &io.scope, io.cache)?;
            return Ok(match previous.map(|outcome| commit_event(kind, outcome)) {
                Some(TableEvent::Status(message)) => TableEvent::Status(message),
                _ => TableEvent::Status(format!("new {}", kind.noun())),
            });
        }
        TableCommand::DeleteSelected => {
            if !table.selection().bulk_actions_enabled() {
                return Ok(TableEvent::Status("nothing selected".to_owned()));
            }
            let mut io = runtime.table_io(kind)?;
            let report = table.delete_selected(io.sync.as_mut(), &io.scope, io.cache)?;
            return Ok(TableEvent::Status(bulk_status("deleted", kind, &report)));
        }
        TableCommand::ToggleHistory => {
            if !kind.has_history() {
                return Ok(TableEvent::Nothing);
            }
            let Some(key) = table.cursor_key() else {
                return Ok(TableEvent::Nothing);
            };
            let mut io = runtime.table_io(kind)?;
            let outcome = table.toggle_history(io.sync.as_mut(), &key, io.cache)?;
            return Ok(match outcome {
                HistoryOutcome::Expanded(count) => {
                    TableEvent::Status(format!("history of {key}: {count} entries"))
                }
                HistoryOutcome::Collapsed(_) => TableEvent::Status(format!("collapsed {key}")),
                HistoryOutcome::Rejected(_)
                | HistoryOutcome::Failed(_)
                | HistoryOutcome::Unavailable => TableEvent::Nothing,
            });
        }
        TableCommand::ViewAllHistory => {
            if !kind.has_history() {
                return Ok(TableEvent::Nothing);
            }
            let mut io = runtime.table_io(kind)?;
            let report = table.view_all_history(io.sync.as_mut(), io.cache)?;
            return Ok(TableEvent::Status(bulk_status("toggled history of", kind, &report)));
        }
        TableCommand::Open => {
            if kind != TableKind::Subscriptions {
                return Ok(TableEvent::Nothing);
            }
            let Some(key) = table.cursor_key() else {
                return Ok(TableEvent::Nothing);
            };
            let mut io = runtime.table_io(kind)?;
            let vehicles = table.fetch_children(io.sync.as_mut(), &io.scope, &key);
            return Ok(match vehicles {
                Some(vehicles) => TableEvent::Open {
                    name: SubscriptionName::from(&key),
                    vehicles,
                },
                None => TableEvent::Nothing,
            });
        }
        TableCommand::Back => return Ok(TableEvent::Back),
    }
    Ok(TableEvent::Nothing)
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let header = Paragraph::new(header_text(state))
        .block(Block::default().title("parkpay").borders(Borders::ALL))
        .style(Style::default().fg(Color::White));
    frame.render_widget(header, layout[0]);

    let body = match banner_for(view_data) {
        Some(banner) => {
            let parts = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(1)])
                .split(layout[1]);
            let (text, color) = match &banner {
                Banner::Error(text) => (text.as_str(), Color::Red),
                Banner::Info(text) => (text.as_str(), Color::Green),
            };
            let widget = Paragraph::new(text.to_owned())
                .style(Style::default().fg(color))
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL));
            frame.render_widget(widget, parts[0]);
            parts[1]
        }
        None => layout[1],
    };

    match state.screen {
        Screen::Subscriptions | Screen::Vehicles => render_table(frame, body, view_data),
        Screen::Redirect => render_redirect(frame, body, state),
        Screen::Admin => render_admin(frame, body, view_data),
        Screen::VerifyChannel | Screen::RecoverChannel => {
            let widget = Paragraph::new(render_channel_text(state, view_data)).block(
                Block::default()
                    .title(state.screen.title())
                    .borders(Borders::ALL),
            );
            frame.render_widget(widget, body);
        }
        _ => {
            let widget = Paragraph::new(render_form_text(state, view_data))
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .title(state.screen.title())
                        .borders(Borders::ALL),
                );
            frame.render_widget(widget, body);
        }
    }

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, layout[2]);

    if state.dropdown_open {
        let area = centered_rect(40, 45, frame.area());
        frame.render_widget(Clear, area);
        let menu = Paragraph::new(render_menu_text(state)).block(
            Block::default()
                .title("account")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(menu, area);
    }
}

fn header_text(state: &AppState) -> String {
    let who = state
        .signed_in_as
        .as_deref()
        .unwrap_or("not signed in");
    format!("{} | {who}", state.screen.title())
}

/// A table error outranks the screen banner.
fn banner_for(view_data: &ViewData) -> Option<Banner> {
    view_data
        .table
        .as_ref()
        .and_then(TableState::error)
        .map(|error| Banner::Error(error.to_owned()))
        .or_else(|| view_data.banner.clone())
}

fn render_menu_text(state: &AppState) -> String {
    state
        .menu_items()
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let marker = if index == state.menu_cursor { ">" } else { " " };
            format!("{marker} {}", item.label())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_channel_text(state: &AppState, view_data: &ViewData) -> String {
    let prompt = match state.verification {
        Some(flow) if state.screen == Screen::VerifyChannel => {
            format!("Choose how to receive the {} code:", flow.label())
        }
        _ => "Choose how to recover your password:".to_owned(),
    };
    let mut lines = vec![prompt, String::new()];
    for (index, channel) in VerifyChannel::ALL.iter().enumerate() {
        let marker = if index == view_data.channel_cursor {
            ">"
        } else {
            " "
        };
        lines.push(format!("{marker} {}", channel.label()));
    }
    lines.join("\n")
}

fn render_form_text(state: &AppState, view_data: &ViewData) -> String {
    let mut lines = Vec::new();
    if state.screen == Screen::Account
        && let Some(profile) = &view_data.profile
    {
        lines.push(format!("Name:  {}", profile.display_name()));
        lines.push(format!("Email: {}", profile.email));
        lines.push(format!("Phone: {}", profile.phone));
        lines.push(String::new());
    }
    if state.screen == Screen::VerifyCode
        && let Some(flow) = state.verification
    {
        lines.push(format!("Enter the 6-digit {} code sent by SMS.", flow.label()));
        lines.push(String::new());
    }

    let specs = form_field_specs(state.screen, state.channel);
    for (index, spec) in specs.iter().enumerate() {
        if state.screen == Screen::Account && index == ACCOUNT_CREDENTIALS_START {
            lines.push(String::new());
        }
        let focused = index == view_data.form.focus;
        let marker = if focused { ">" } else { " " };
        let value = view_data.form.value(index);
        let shown = match spec.kind {
            FieldKind::Text => value,
            FieldKind::Secret => "*".repeat(value.chars().count()),
            FieldKind::Toggle if value.is_empty() => UNCHECKED.to_owned(),
            FieldKind::Toggle => CHECKED.to_owned(),
        };
        let cursor = if focused && spec.kind != FieldKind::Toggle {
            "_"
        } else {
            ""
        };
        lines.push(format!("{marker} {:<34} {shown}{cursor}", spec.label));
    }
    lines.join("\n")
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let Some(table) = &view_data.table else {
        let empty = Paragraph::new(String::new()).block(Block::default().borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    };

    let kind = table.kind();
    let mut widths = vec![Constraint::Length(5)];
    widths.extend(kind.columns().iter().map(|_| Constraint::Min(8)));

    let mut header_cells = vec![Cell::from("")];
    header_cells.extend(kind.columns().iter().map(|label| {
        Cell::from(*label).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));
    let header = TableRow::new(header_cells);

    let cursor = table.cursor();
    let rows = table
        .visible_rows()
        .into_iter()
        .enumerate()
        .map(|(index, visible)| {
            let (marker, cells, mut style) = table_row_parts(kind, &visible);
            if index == cursor {
                style = style.bg(Color::DarkGray);
            }
            let mut row_cells = vec![Cell::from(marker)];
            row_cells.extend(cells.into_iter().map(Cell::from));
            TableRow::new(row_cells).style(style)
        })
        .collect::<Vec<_>>();

    let widget = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(table, view_data.subscription.as_ref()))
                .borders(Borders::ALL),
        );
    frame.render_widget(widget, area);
}

fn table_row_parts(kind: TableKind, visible: &VisibleRow<'_>) -> (String, Vec<String>, Style) {
    match visible {
        VisibleRow::Entity {
            row,
            selected,
            expanded,
        } => {
            let check = if *selected { CHECKED } else { UNCHECKED };
            let marker = if !kind.has_history() {
                check.to_owned()
            } else if *expanded {
                format!("{check}{EXPANDED}")
            } else {
                format!("{check}{COLLAPSED}")
            };
            let style = if *selected {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            (marker, row.cells.clone(), style)
        }
        VisibleRow::History { cells, .. } => (
            HISTORY_BRANCH.to_owned(),
            cells.clone(),
            Style::default().fg(Color::DarkGray),
        ),
        VisibleRow::Pending(pending) => {
            let cells = pending
                .cells()
                .iter()
                .enumerate()
                .map(|(index, cell)| {
                    if index == pending.focus() {
                        format!("{cell}_")
                    } else {
                        cell.clone()
                    }
                })
                .collect();
            (
                " +".to_owned(),
                cells,
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        }
    }
}

fn table_title(table: &TableState, subscription: Option<&SubscriptionName>) -> String {
    let mut title = table.kind().label().to_owned();
    if table.kind() == TableKind::Vehicles
        && let Some(name) = subscription
    {
        title = format!("{title} of {name}");
    }
    let selected = table.selection().len();
    if selected > 0 {
        title = format!("{title} ({selected} selected)");
    }
    title
}

fn render_redirect(frame: &mut ratatui::Frame<'_>, area: Rect, state: &AppState) {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Length(3), Constraint::Min(0)])
        .split(area);
    let message = Paragraph::new(
        "The operation has been successfully validated. You will be redirected to your account after the time expires.",
    )
    .wrap(Wrap { trim: true })
    .block(Block::default().title("validated").borders(Borders::ALL));
    frame.render_widget(message, parts[0]);

    if let Some(countdown) = &state.countdown {
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL))
            .gauge_style(Style::default().fg(Color::Cyan))
            .ratio(countdown.progress().clamp(0.0, 1.0))
            .label(format!("{}s", countdown.remaining()));
        frame.render_widget(gauge, parts[1]);
    }
}

fn render_admin(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let columns = view_data
        .admin_rows
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(1)
        .max(1);
    let widths = vec![Constraint::Min(12); columns];
    let rows = view_data
        .admin_rows
        .iter()
        .map(|row| TableRow::new(row.iter().cloned().map(Cell::from).collect::<Vec<_>>()))
        .collect::<Vec<_>>();
    let widget = Table::new(rows, widths).column_spacing(2).block(
        Block::default()
            .title(format!("Registered emails ({})", view_data.admin_rows.len()))
            .borders(Borders::ALL),
    );
    frame.render_widget(widget, area);
}

fn screen_hints(state: &AppState, view_data: &ViewData) -> &'static str {
    match state.screen {
        Screen::Subscriptions | Screen::Vehicles => {
            let editing = view_data
                .table
                .as_ref()
                .is_some_and(|table| table.editor().is_editing());
            match (editing, state.screen) {
                (true, _) => "tab/shift+tab cell | enter save | esc leave row",
                (false, Screen::Subscriptions) => {
                    "j/k move | space select | a/u all/none | n add | d delete | enter open"
                }
                (false, _) => {
                    "j/k move | space select | a/u all/none | n add | d delete | h/H history | esc back"
                }
            }
        }
        Screen::VerifyChannel | Screen::RecoverChannel => "j/k choose | enter send | esc back",
        Screen::Redirect => "any key continue now",
        Screen::Admin => "r refresh | esc back",
        Screen::VerifyCode => "enter verify | ctrl+r resend | esc back",
        _ => "tab/shift+tab field | enter submit | esc back",
    }
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if state.dropdown_open {
        return "j/k move | enter open | esc close".to_owned();
    }
    let hints = screen_hints(state, view_data);
    match &state.status_line {
        Some(status) => format!("{status} | {hints} | ctrl+p menu | ctrl+q"),
        None => format!("{hints} | ctrl+p menu | ctrl+q"),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        AppRuntime, Banner, SignedIn, TableIo, ViewData, advance_countdown, dispatch_and_refresh,
        handle_key_event, render, start, status_text,
    };
    use anyhow::{Result, anyhow};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use parkpay_app::{
        AccountCredentialsForm, AccountInfoForm, AppCommand, AppState, ContactForm, HistoryPolicy,
        LoginForm, Outcome, PayRequest, REDIRECT_SECONDS, RecoverForm, ResetPasswordForm, Row,
        RowCache, Screen, SignupForm, SubscriptionName, TableKind, UserProfile, VehicleStatus,
        VerificationFlow, VerifyChannel,
    };
    use parkpay_testkit::{
        FakeSync, MemoryCache, demo_profile, demo_scope, history_page, vehicle_row,
    };
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;

    struct TestRuntime {
        subscriptions: FakeSync,
        vehicles: FakeSync,
        cache: MemoryCache,
        signed_in: Option<SignedIn>,
        login_result: Option<Outcome<SignedIn>>,
        relogin_result: Option<Outcome<SignedIn>>,
        pay_requests: Vec<PayRequest>,
        opened: Vec<SubscriptionName>,
        sent_codes: Vec<(VerificationFlow, VerifyChannel)>,
        checked_codes: Vec<String>,
        admin_rows: Vec<Vec<String>>,
        logged_out: bool,
        relogins: usize,
    }

    impl TestRuntime {
        fn new() -> Self {
            Self {
                subscriptions: FakeSync::new(TableKind::Subscriptions),
                vehicles: FakeSync::new(TableKind::Vehicles),
                cache: MemoryCache::default(),
                signed_in: None,
                login_result: None,
                relogin_result: None,
                pay_requests: Vec::new(),
                opened: Vec::new(),
                sent_codes: Vec::new(),
                checked_codes: Vec::new(),
                admin_rows: Vec::new(),
                logged_out: false,
                relogins: 0,
            }
        }

        fn signed_in() -> Self {
            let mut runtime = Self::new();
            runtime.signed_in = Some(SignedIn {
                display_name: demo_profile().display_name(),
                is_admin: false,
            });
            runtime
        }

        fn with_rows(mut self, kind: TableKind, rows: &[Row]) -> Result<Self> {
            let raw = kind.encode_rows(rows)?;
            self.cache.write_table(kind, &raw)?;
            Ok(self)
        }
    }

    impl AppRuntime for TestRuntime {
        fn restore_session(&mut self) -> Result<Option<SignedIn>> {
            Ok(self.signed_in.clone())
        }

        fn history_policy(&self) -> HistoryPolicy {
            HistoryPolicy::KeepAll
        }

        fn table_io(&mut self, kind: TableKind) -> Result<TableIo<'_>> {
            let sync: Box<dyn parkpay_app::RemoteSync + '_> = match kind {
                TableKind::Subscriptions => Box::new(&mut self.subscriptions),
                TableKind::Vehicles => Box::new(&mut self.vehicles),
            };
            Ok(TableIo {
                sync,
                cache: &mut self.cache,
                scope: demo_scope(),
            })
        }

        fn subscription_name(&mut self) -> Result<Option<SubscriptionName>> {
            Ok(self.opened.last().cloned())
        }

        fn open_subscription(&mut self, name: &SubscriptionName, vehicles: &[Row]) -> Result<()> {
            let raw = TableKind::Vehicles.encode_rows(vehicles)?;
            self.cache.write_table(TableKind::Vehicles, &raw)?;
            self.opened.push(name.clone());
            Ok(())
        }

        fn profile(&mut self) -> Result<UserProfile> {
            Ok(demo_profile())
        }

        fn pay(&mut self, request: &PayRequest) -> Result<Outcome<String>> {
            self.pay_requests.push(request.clone());
            Ok(Outcome::Accepted("Payment registered for 2 hours.".to_owned()))
        }

        fn login(&mut self, _form: &LoginForm) -> Result<Outcome<SignedIn>> {
            self.login_result
                .take()
                .ok_or_else(|| anyhow!("login not scripted"))
        }

        fn relogin(&mut self) -> Result<Outcome<SignedIn>> {
            self.relogins += 1;
            self.relogin_result
                .take()
                .ok_or_else(|| anyhow!("relogin not scripted"))
        }

        fn logout(&mut self) -> Result<()> {
            self.logged_out = true;
            Ok(())
        }

        fn create_account(&mut self, _form: &SignupForm) -> Result<Outcome<()>> {
            Ok(Outcome::Accepted(()))
        }

        fn send_code(
            &mut self,
            flow: VerificationFlow,
            channel: VerifyChannel,
        ) -> Result<Outcome<()>> {
            self.sent_codes.push((flow, channel));
            Ok(Outcome::Accepted(()))
        }

        fn resend_code(&mut self, _flow: VerificationFlow) -> Result<Outcome<()>> {
            Ok(Outcome::Accepted(()))
        }

        fn check_code(&mut self, _flow: VerificationFlow, code: &str) -> Result<Outcome<()>> {
            self.checked_codes.push(code.to_owned());
            if code == "123456" {
                Ok(Outcome::Accepted(()))
            } else {
                Ok(Outcome::Rejected(None))
            }
        }

        fn request_recovery(&mut self, _form: &RecoverForm) -> Result<Outcome<()>> {
            Ok(Outcome::Accepted(()))
        }

        fn reset_password(&mut self, _form: &ResetPasswordForm) -> Result<Outcome<()>> {
            Ok(Outcome::Accepted(()))
        }

        fn update_account_information(&mut self, _form: &AccountInfoForm) -> Result<Outcome<()>> {
            Ok(Outcome::Accepted(()))
        }

        fn update_credentials(&mut self, _form: &AccountCredentialsForm) -> Result<Outcome<()>> {
            Ok(Outcome::Rejected(None))
        }

        fn contact(&mut self, _form: &ContactForm) -> Result<Outcome<()>> {
            Ok(Outcome::Accepted(()))
        }

        fn newsletter(&mut self, _email: &str, _subscribe: bool) -> Result<Outcome<()>> {
            Err(anyhow!("newsletter should not be called"))
        }

        fn admin_emails(&mut self) -> Result<Outcome<Vec<Vec<String>>>> {
            Ok(Outcome::Accepted(self.admin_rows.clone()))
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    fn type_text(
        state: &mut AppState,
        runtime: &mut TestRuntime,
        view_data: &mut ViewData,
        text: &str,
    ) {
        let (tx, _rx) = mpsc::channel();
        for ch in text.chars() {
            handle_key_event(state, runtime, view_data, &tx, key(KeyCode::Char(ch)));
        }
    }

    fn press(
        state: &mut AppState,
        runtime: &mut TestRuntime,
        view_data: &mut ViewData,
        keys: &[KeyEvent],
    ) {
        let (tx, _rx) = mpsc::channel();
        for key in keys {
            let _ = handle_key_event(state, runtime, view_data, &tx, *key);
        }
    }

    fn open_screen(state: &mut AppState, runtime: &mut TestRuntime, screen: Screen) -> ViewData {
        let mut view_data = ViewData::default();
        start(state, runtime, &mut view_data);
        let (tx, _rx) = mpsc::channel();
        dispatch_and_refresh(
            state,
            runtime,
            &mut view_data,
            AppCommand::Navigate(screen),
            &tx,
        );
        view_data
    }

    #[test]
    fn ctrl_q_quits() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        let mut view_data = ViewData::default();
        let (tx, _rx) = mpsc::channel();
        assert!(handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            ctrl('q')
        ));
    }

    #[test]
    fn empty_pay_form_never_reaches_the_server() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Pay);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert!(runtime.pay_requests.is_empty());
        assert_eq!(
            view_data.banner,
            Some(Banner::Error(
                "Please enter a license plate number or upload a QR code.".to_owned()
            ))
        );
    }

    #[test]
    fn pay_by_plate_shows_server_message() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Pay);

        type_text(&mut state, &mut runtime, &mut view_data, "B123ABC");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(
            runtime.pay_requests,
            vec![PayRequest::Plate("B123ABC".to_owned())]
        );
        assert_eq!(
            view_data.banner,
            Some(Banner::Info("Payment registered for 2 hours.".to_owned()))
        );
        assert!(view_data.form.value(0).is_empty());
    }

    #[test]
    fn guarded_screen_asks_for_login() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        let view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        assert_eq!(state.screen, Screen::Login);
        assert_eq!(
            view_data.banner,
            Some(Banner::Error("Please log in to continue.".to_owned()))
        );
    }

    #[test]
    fn login_opens_cached_subscriptions() -> Result<()> {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new()
            .with_rows(TableKind::Subscriptions, &[Row::single("Family")])?;
        runtime.login_result = Some(Outcome::Accepted(SignedIn {
            display_name: "Ana Popescu".to_owned(),
            is_admin: false,
        }));
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Login);

        type_text(&mut state, &mut runtime, &mut view_data, "ana@pop.ro");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Tab)]);
        type_text(&mut state, &mut runtime, &mut view_data, "Secret123");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::Subscriptions);
        assert_eq!(state.signed_in_as.as_deref(), Some("Ana Popescu"));
        let table = view_data.table.as_ref().ok_or_else(|| anyhow!("table loaded"))?;
        assert_eq!(table.registry().len(), 1);
        Ok(())
    }

    #[test]
    fn rejected_login_shows_credentials_hint() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        runtime.login_result = Some(Outcome::Rejected(Some("nope".to_owned())));
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Login);

        type_text(&mut state, &mut runtime, &mut view_data, "ana@pop.ro");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Tab)]);
        type_text(&mut state, &mut runtime, &mut view_data, "wrong");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::Login);
        assert_eq!(
            view_data.banner,
            Some(Banner::Error(
                "Login failed. Please check your credentials.".to_owned()
            ))
        );
    }

    #[test]
    fn admin_login_lands_on_admin_dashboard() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        runtime.admin_rows = vec![vec!["ana@pop.ro".to_owned()]];
        runtime.login_result = Some(Outcome::Accepted(SignedIn {
            display_name: "Guest".to_owned(),
            is_admin: true,
        }));
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Login);

        type_text(&mut state, &mut runtime, &mut view_data, "admin");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Tab)]);
        type_text(&mut state, &mut runtime, &mut view_data, "x");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::Admin);
        assert_eq!(view_data.admin_rows.len(), 1);
    }

    #[test]
    fn new_subscription_is_created_once_when_the_row_is_left() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::signed_in();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Char('n'))]);
        type_text(&mut state, &mut runtime, &mut view_data, "Family");
        press(
            &mut state,
            &mut runtime,
            &mut view_data,
            &[key(KeyCode::Esc), key(KeyCode::Char('k'))],
        );

        assert_eq!(runtime.subscriptions.create_calls(), 1);
        assert_eq!(
            runtime.cache.raw(TableKind::Subscriptions),
            Some(r#"["Family"]"#)
        );
        assert_eq!(state.status_line.as_deref(), Some("added subscription Family"));
    }

    #[test]
    fn typing_in_pending_row_does_not_trigger_table_commands() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::signed_in();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Char('n'))]);
        type_text(&mut state, &mut runtime, &mut view_data, "dad");

        let pending = view_data
            .table
            .as_ref()
            .and_then(|table| table.editor().pending())
            .map(|pending| pending.identifier());
        assert_eq!(pending.as_deref(), Some("dad"));
        assert_eq!(runtime.subscriptions.delete_calls(), 0);
        assert!(status_text(&state, &view_data).contains("esc leave row"));
    }

    #[test]
    fn space_then_d_deletes_the_selected_subscription() -> Result<()> {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::signed_in().with_rows(
            TableKind::Subscriptions,
            &[Row::single("Family"), Row::single("Work")],
        )?;
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        press(
            &mut state,
            &mut runtime,
            &mut view_data,
            &[key(KeyCode::Char(' ')), key(KeyCode::Char('d'))],
        );

        assert_eq!(runtime.subscriptions.delete_calls(), 1);
        assert_eq!(runtime.cache.rows(TableKind::Subscriptions)?, vec![Row::single("Work")]);
        assert_eq!(state.status_line.as_deref(), Some("deleted 1 subscriptions"));
        Ok(())
    }

    #[test]
    fn delete_without_selection_sends_nothing() -> Result<()> {
        let mut state = AppState::default();
        let mut runtime =
            TestRuntime::signed_in().with_rows(TableKind::Subscriptions, &[Row::single("Family")])?;
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Char('d'))]);

        assert_eq!(runtime.subscriptions.delete_calls(), 0);
        assert_eq!(state.status_line.as_deref(), Some("nothing selected"));
        Ok(())
    }

    #[test]
    fn enter_on_subscription_opens_its_vehicles() -> Result<()> {
        let mut state = AppState::default();
        let mut runtime =
            TestRuntime::signed_in().with_rows(TableKind::Subscriptions, &[Row::single("Family")])?;
        runtime.subscriptions = FakeSync::new(TableKind::Subscriptions).with_children(Ok(
            Outcome::Accepted(vec![vehicle_row("B123ABC", VehicleStatus::Active)]),
        ));
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::Vehicles);
        assert_eq!(runtime.opened, vec![SubscriptionName::from("Family")]);
        assert_eq!(view_data.subscription, Some(SubscriptionName::from("Family")));
        let table = view_data.table.as_ref().ok_or_else(|| anyhow!("vehicles loaded"))?;
        assert_eq!(table.registry().len(), 1);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Esc)]);
        assert_eq!(state.screen, Screen::Subscriptions);
        Ok(())
    }

    #[test]
    fn failed_drill_in_stays_on_subscriptions() -> Result<()> {
        let mut state = AppState::default();
        let mut runtime =
            TestRuntime::signed_in().with_rows(TableKind::Subscriptions, &[Row::single("Family")])?;
        runtime.subscriptions = FakeSync::new(TableKind::Subscriptions)
            .with_children(Ok(Outcome::Rejected(None)));
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::Subscriptions);
        assert!(runtime.opened.is_empty());
        assert_eq!(
            super::banner_for(&view_data),
            Some(Banner::Error(
                "Error fetching vehicles for subscription.".to_owned()
            ))
        );
        Ok(())
    }

    #[test]
    fn h_expands_vehicle_history_under_the_cursor() -> Result<()> {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::signed_in()
            .with_rows(TableKind::Vehicles, &[vehicle_row("B123ABC", VehicleStatus::Inactive)])?;
        runtime.vehicles = FakeSync::new(TableKind::Vehicles).with_history(Ok(
            Outcome::Accepted(history_page(&[
                ["2024-01-02", "09:00", "2024-01-02", "11:00"],
                ["2024-01-01", "08:00", "2024-01-01", "10:00"],
            ])),
        ));
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Vehicles);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Char('h'))]);

        let table = view_data.table.as_ref().ok_or_else(|| anyhow!("vehicles loaded"))?;
        assert_eq!(table.visible_len(), 3);
        assert_eq!(runtime.vehicles.history_calls(), 1);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Char('h'))]);
        let table = view_data.table.as_ref().ok_or_else(|| anyhow!("vehicles loaded"))?;
        assert_eq!(table.visible_len(), 1);
        Ok(())
    }

    #[test]
    fn logout_from_dropdown_clears_session() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::signed_in();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Subscriptions);

        press(&mut state, &mut runtime, &mut view_data, &[ctrl('p')]);
        assert!(state.dropdown_open);
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Char('k'))]);
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert!(runtime.logged_out);
        assert_eq!(state.screen, Screen::Pay);
        assert_eq!(state.signed_in_as, None);
    }

    #[test]
    fn sms_signup_verification_ends_in_redirect_and_relogin() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        runtime.relogin_result = Some(Outcome::Accepted(SignedIn {
            display_name: "Ana Popescu".to_owned(),
            is_admin: false,
        }));
        let mut view_data = ViewData::default();
        let (tx, _rx) = mpsc::channel();
        dispatch_and_refresh(
            &mut state,
            &mut runtime,
            &mut view_data,
            AppCommand::BeginVerification(VerificationFlow::Signup),
            &tx,
        );
        assert_eq!(state.screen, Screen::VerifyChannel);

        press(
            &mut state,
            &mut runtime,
            &mut view_data,
            &[key(KeyCode::Char('j')), key(KeyCode::Enter)],
        );
        assert_eq!(
            runtime.sent_codes,
            vec![(VerificationFlow::Signup, VerifyChannel::Sms)]
        );
        assert_eq!(state.screen, Screen::VerifyCode);

        type_text(&mut state, &mut runtime, &mut view_data, "123456");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);
        assert_eq!(state.screen, Screen::Redirect);

        for _ in 0..REDIRECT_SECONDS {
            advance_countdown(&mut state, &mut runtime, &mut view_data, &tx);
        }
        assert_eq!(runtime.relogins, 1);
        assert_eq!(state.screen, Screen::Subscriptions);
        assert_eq!(state.countdown, None);
    }

    #[test]
    fn wrong_code_keeps_the_prompt() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::VerifyCode);

        type_text(&mut state, &mut runtime, &mut view_data, "654321");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::VerifyCode);
        assert_eq!(
            view_data.banner,
            Some(Banner::Error("The code entered is not correct.".to_owned()))
        );
    }

    #[test]
    fn email_recovery_returns_to_login_with_notice() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        let mut view_data = ViewData::default();
        let (tx, _rx) = mpsc::channel();
        dispatch_and_refresh(
            &mut state,
            &mut runtime,
            &mut view_data,
            AppCommand::BeginVerification(VerificationFlow::Recover),
            &tx,
        );
        assert_eq!(state.screen, Screen::RecoverChannel);

        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);
        assert_eq!(state.screen, Screen::Recover);
        type_text(&mut state, &mut runtime, &mut view_data, "ana@pop.ro");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::Login);
        assert_eq!(
            view_data.banner,
            Some(Banner::Info(
                "A password recovery email has been sent to your address.".to_owned()
            ))
        );
    }

    #[test]
    fn invalid_newsletter_email_is_ignored() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::new();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Newsletter);

        type_text(&mut state, &mut runtime, &mut view_data, "not-an-email");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(view_data.banner, None);
        assert!(view_data.form.value(0).is_empty());
    }

    #[test]
    fn rejected_credentials_update_uses_password_message() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::signed_in();
        let mut view_data = open_screen(&mut state, &mut runtime, Screen::Account);
        view_data.form.focus = 3;

        type_text(&mut state, &mut runtime, &mut view_data, "new@pop.ro");
        press(&mut state, &mut runtime, &mut view_data, &[key(KeyCode::Enter)]);

        assert_eq!(state.screen, Screen::Account);
        assert_eq!(
            view_data.banner,
            Some(Banner::Error("The current password is incorrect.".to_owned()))
        );
    }

    #[test]
    fn every_screen_renders() -> Result<()> {
        let mut runtime = TestRuntime::signed_in()
            .with_rows(TableKind::Vehicles, &[vehicle_row("B123ABC", VehicleStatus::Active)])?;
        let mut terminal = Terminal::new(TestBackend::new(120, 32))?;
        let screens = [
            Screen::Pay,
            Screen::Login,
            Screen::Signup,
            Screen::VerifyChannel,
            Screen::VerifyCode,
            Screen::RecoverChannel,
            Screen::Recover,
            Screen::ResetPassword,
            Screen::Redirect,
            Screen::Subscriptions,
            Screen::Vehicles,
            Screen::Account,
            Screen::Contact,
            Screen::Newsletter,
            Screen::Admin,
        ];
        for screen in screens {
            let mut state = AppState::default();
            let mut view_data = open_screen(&mut state, &mut runtime, screen);
            state.dropdown_open = screen == Screen::Admin;
            terminal.draw(|frame| render(frame, &state, &view_data))?;
            view_data.banner = Some(Banner::Info("ok".to_owned()));
            terminal.draw(|frame| render(frame, &state, &view_data))?;
        }
        Ok(())
    }
}
