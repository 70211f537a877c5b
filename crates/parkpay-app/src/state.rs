// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{Countdown, CountdownStep, VerificationFlow, VerifyChannel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Pay,
    Login,
    Signup,
    VerifyChannel,
    VerifyCode,
    RecoverChannel,
    Recover,
    ResetPassword,
    Redirect,
    Subscriptions,
    Vehicles,
    Account,
    Contact,
    Newsletter,
    Admin,
}

impl Screen {
    pub const fn title(self) -> &'static str {
        match self {
            Self::Pay => "Pay parking",
            Self::Login => "Log in",
            Self::Signup => "Create account",
            Self::VerifyChannel => "Validate",
            Self::VerifyCode => "Enter code",
            Self::RecoverChannel => "Recover password",
            Self::Recover => "Recover password",
            Self::ResetPassword => "Reset password",
            Self::Redirect => "Validated",
            Self::Subscriptions => "Subscriptions",
            Self::Vehicles => "Vehicles",
            Self::Account => "Account",
            Self::Contact => "Contact",
            Self::Newsletter => "Newsletter",
            Self::Admin => "Admin",
        }
    }

    pub const fn requires_session(self) -> bool {
        matches!(
            self,
            Self::Subscriptions | Self::Vehicles | Self::Account | Self::Admin
        )
    }

    /// Where `esc` goes from here.
    pub const fn parent(self) -> Self {
        match self {
            Self::Vehicles => Self::Subscriptions,
            Self::VerifyCode => Self::VerifyChannel,
            Self::Signup | Self::RecoverChannel | Self::Recover | Self::ResetPassword => {
                Self::Login
            }
            _ => Self::Pay,
        }
    }

    pub const fn has_table(self) -> bool {
        matches!(self, Self::Subscriptions | Self::Vehicles)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Open(Screen),
    Logout,
}

impl MenuItem {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open(Screen::Subscriptions) => "My subscriptions",
            Self::Open(Screen::Account) => "Account settings",
            Self::Open(Screen::Admin) => "Admin dashboard",
            Self::Open(Screen::Signup) => "Create account",
            Self::Open(screen) => screen.title(),
            Self::Logout => "Log out",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub screen: Screen,
    pub dropdown_open: bool,
    pub menu_cursor: usize,
    pub status_line: Option<String>,
    pub notice: Option<String>,
    pub signed_in_as: Option<String>,
    pub is_admin: bool,
    pub verification: Option<VerificationFlow>,
    pub channel: Option<VerifyChannel>,
    pub countdown: Option<Countdown>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            screen: Screen::Pay,
            dropdown_open: false,
            menu_cursor: 0,
            status_line: None,
            notice: None,
            signed_in_as: None,
            is_admin: false,
            verification: None,
            channel: None,
            countdown: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Navigate(Screen),
    Back,
    ToggleDropdown,
    CloseDropdown,
    MoveMenu(isize),
    SetStatus(String),
    ClearStatus,
    SetNotice(String),
    SignedIn { display_name: String, is_admin: bool },
    Logout,
    BeginVerification(VerificationFlow),
    ChooseChannel(VerifyChannel),
    TickCountdown,
    CancelCountdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ScreenChanged(Screen),
    RedirectedToLogin(Screen),
    DropdownToggled(bool),
    StatusUpdated(String),
    StatusCleared,
    NoticeSet(String),
    SessionStarted(String),
    SessionEnded,
    VerificationStarted(VerificationFlow),
    ChannelChosen(VerifyChannel),
    CountdownTicked(u32),
    CountdownExpired,
}

impl AppState {
    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::Navigate(screen) => self.navigate(screen),
            AppCommand::Back => self.navigate(self.screen.parent()),
            AppCommand::ToggleDropdown => {
                self.dropdown_open = !self.dropdown_open;
                self.menu_cursor = 0;
                vec![AppEvent::DropdownToggled(self.dropdown_open)]
            }
            AppCommand::CloseDropdown => {
                if !self.dropdown_open {
                    return Vec::new();
                }
                self.dropdown_open = false;
                vec![AppEvent::DropdownToggled(false)]
            }
            AppCommand::MoveMenu(delta) => {
                let len = self.menu_items().len() as isize;
                if len > 0 {
                    self.menu_cursor = (self.menu_cursor as isize + delta).rem_euclid(len) as usize;
                }
                Vec::new()
            }
            AppCommand::SetStatus(message) => vec![self.set_status(message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
            AppCommand::SetNotice(message) => {
                self.notice = Some(message.clone());
                vec![AppEvent::NoticeSet(message)]
            }
            AppCommand::SignedIn {
                display_name,
                is_admin,
            } => {
                self.signed_in_as = Some(display_name.clone());
                self.is_admin = is_admin;
                vec![AppEvent::SessionStarted(display_name)]
            }
            AppCommand::Logout => {
                self.signed_in_as = None;
                self.is_admin = false;
                self.dropdown_open = false;
                let mut events = vec![AppEvent::SessionEnded];
                events.extend(self.navigate(Screen::Pay));
                events
            }
            AppCommand::BeginVerification(flow) => {
                self.verification = Some(flow);
                self.channel = None;
                let mut events = vec![AppEvent::VerificationStarted(flow)];
                let screen = match flow {
                    VerificationFlow::Recover => Screen::RecoverChannel,
                    VerificationFlow::Signup | VerificationFlow::AccountUpdate => {
                        Screen::VerifyChannel
                    }
                };
                events.extend(self.navigate(screen));
                events
            }
            AppCommand::ChooseChannel(channel) => {
                self.channel = Some(channel);
                vec![AppEvent::ChannelChosen(channel)]
            }
            AppCommand::TickCountdown => self.tick_countdown(),
            AppCommand::CancelCountdown => {
                if let Some(countdown) = self.countdown.as_mut() {
                    countdown.cancel();
                }
                Vec::new()
            }
        }
    }

    /// Entries of the account dropdown for the current session.
    pub fn menu_items(&self) -> Vec<MenuItem> {
        if self.signed_in_as.is_none() {
            return vec![
                MenuItem::Open(Screen::Login),
                MenuItem::Open(Screen::Signup),
                MenuItem::Open(Screen::Contact),
                MenuItem::Open(Screen::Newsletter),
            ];
        }
        let mut items = vec![
            MenuItem::Open(Screen::Subscriptions),
            MenuItem::Open(Screen::Account),
        ];
        if self.is_admin {
            items.push(MenuItem::Open(Screen::Admin));
        }
        items.extend([
            MenuItem::Open(Screen::Contact),
            MenuItem::Open(Screen::Newsletter),
            MenuItem::Logout,
        ]);
        items
    }

    pub fn selected_menu_item(&self) -> Option<MenuItem> {
        self.menu_items().get(self.menu_cursor).copied()
    }

    /// Takes the pending login notice so it shows only once.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    fn navigate(&mut self, wanted: Screen) -> Vec<AppEvent> {
        self.dropdown_open = false;
        let mut events = Vec::new();
        let screen = if wanted.requires_session() && self.signed_in_as.is_none() {
            events.push(AppEvent::RedirectedToLogin(wanted));
            Screen::Login
        } else {
            wanted
        };

        if self.screen == Screen::Redirect && screen != Screen::Redirect {
            self.countdown = None;
        }
        if screen == Screen::Redirect && self.countdown.is_none() {
            self.countdown = Some(Countdown::redirect());
        }

        self.screen = screen;
        events.push(AppEvent::ScreenChanged(screen));
        events
    }

    fn tick_countdown(&mut self) -> Vec<AppEvent> {
        let Some(countdown) = self.countdown.as_mut() else {
            return Vec::new();
        };
        match countdown.tick() {
            CountdownStep::Running(remaining) => vec![AppEvent::CountdownTicked(remaining)],
            CountdownStep::Expired => vec![AppEvent::CountdownExpired],
            CountdownStep::Idle => Vec::new(),
        }
    }

    fn set_status(&mut self, message: String) -> AppEvent {
        self.status_line = Some(message.clone());
        AppEvent::StatusUpdated(message)
    }
}
