// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ids::*;

pub const VEHICLE_COLUMNS: [&str; 8] = [
    "License plate",
    "Entry date",
    "Entry time",
    "Exit date",
    "Exit time",
    "Time parked",
    "Payment",
    "Status",
];

pub const SUBSCRIPTION_COLUMNS: [&str; 1] = ["Subscription"];

/// Cell index of the status column in a vehicle row.
pub const VEHICLE_STATUS_CELL: usize = 7;
pub const VEHICLE_TIME_PARKED_CELL: usize = 5;
pub const VEHICLE_PAYMENT_CELL: usize = 6;

/// History rows fill the parent's cells 1 through 4.
pub const HISTORY_FIRST_CELL: usize = 1;
pub const HISTORY_CELLS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    Subscriptions,
    Vehicles,
}

impl TableKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscriptions => "subscriptions",
            Self::Vehicles => "vehicles",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Subscriptions => "Subscriptions",
            Self::Vehicles => "Vehicles",
        }
    }

    pub const fn noun(self) -> &'static str {
        match self {
            Self::Subscriptions => "subscription",
            Self::Vehicles => "vehicle",
        }
    }

    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Subscriptions => &SUBSCRIPTION_COLUMNS,
            Self::Vehicles => &VEHICLE_COLUMNS,
        }
    }

    pub const fn column_count(self) -> usize {
        self.columns().len()
    }

    pub const fn cache_key(self) -> SessionKey {
        match self {
            Self::Subscriptions => SessionKey::SubscriptionsTable,
            Self::Vehicles => SessionKey::VehiclesTable,
        }
    }

    pub const fn has_history(self) -> bool {
        matches!(self, Self::Vehicles)
    }

    /// Subscriptions are cached as a flat list of names, vehicles as a list
    /// of cell arrays.
    pub fn encode_rows(self, rows: &[Row]) -> Result<String> {
        let encoded = match self {
            Self::Subscriptions => {
                let names = rows.iter().map(|row| row.key().into_inner()).collect::<Vec<_>>();
                serde_json::to_string(&names)
            }
            Self::Vehicles => {
                let cells = rows.iter().map(|row| row.cells.clone()).collect::<Vec<_>>();
                serde_json::to_string(&cells)
            }
        };
        encoded.with_context(|| format!("encode {} table", self.as_str()))
    }

    pub fn decode_rows(self, raw: &str) -> Result<Vec<Row>> {
        match self {
            Self::Subscriptions => {
                let names: Vec<String> = serde_json::from_str(raw)
                    .with_context(|| format!("decode {} table", self.as_str()))?;
                Ok(names.into_iter().map(Row::single).collect())
            }
            Self::Vehicles => {
                let cells: Vec<Vec<String>> = serde_json::from_str(raw)
                    .with_context(|| format!("decode {} table", self.as_str()))?;
                Ok(cells.into_iter().map(Row::new).collect())
            }
        }
    }
}

/// Well-known keys of the client-side session cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionKey {
    Name,
    LastName,
    Email,
    Phone,
    SubscriptionsTable,
    SubscriptionName,
    VehiclesTable,
    EmailsTable,
    Admin,
}

impl SessionKey {
    pub const ALL: [Self; 9] = [
        Self::Name,
        Self::LastName,
        Self::Email,
        Self::Phone,
        Self::SubscriptionsTable,
        Self::SubscriptionName,
        Self::VehiclesTable,
        Self::EmailsTable,
        Self::Admin,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::LastName => "lastName",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::SubscriptionsTable => "subscriptionsTable",
            Self::SubscriptionName => "subscriptionName",
            Self::VehiclesTable => "vehiclesTable",
            Self::EmailsTable => "emailsTable",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == value)
    }

    /// Keys dropped on logout. The admin flag and emails table survive.
    pub const fn is_user_scoped(self) -> bool {
        !matches!(self, Self::Admin | Self::EmailsTable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<String>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    pub fn single(value: impl Into<String>) -> Self {
        Self {
            cells: vec![value.into()],
        }
    }

    pub fn key(&self) -> RowKey {
        RowKey::new(self.cell(0))
    }

    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn set_cell(&mut self, index: usize, value: impl Into<String>) {
        if self.cells.len() <= index {
            self.cells.resize(index + 1, String::new());
        }
        self.cells[index] = value.into();
    }

    pub fn matches(&self, key: &RowKey) -> bool {
        self.cell(0) == key.as_str()
    }

    pub fn vehicle_status(&self) -> Option<VehicleStatus> {
        VehicleStatus::parse(self.cell(VEHICLE_STATUS_CELL).trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleStatus {
    Active,
    Inactive,
}

impl VehicleStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Active" => Some(Self::Active),
            "Inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryEntry {
    pub cells: [String; HISTORY_CELLS],
}

impl HistoryEntry {
    /// Short server arrays are padded with blanks, extra cells are dropped.
    pub fn from_cells(values: Vec<String>) -> Self {
        let mut entry = Self::default();
        for (slot, value) in entry.cells.iter_mut().zip(values) {
            *slot = value;
        }
        entry
    }

    /// Lays the entry out across a row of `width` cells, leaving the
    /// identifier column and everything past the history span blank.
    pub fn to_row_cells(&self, width: usize) -> Vec<String> {
        let mut cells = vec![String::new(); width];
        for (offset, value) in self.cells.iter().enumerate() {
            if let Some(slot) = cells.get_mut(HISTORY_FIRST_CELL + offset) {
                slot.clone_from(value);
            }
        }
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryPage {
    /// Newest entry first, as the server lists them.
    pub entries: Vec<HistoryEntry>,
    pub total_time_parked: Option<String>,
    pub payment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPolicy {
    #[default]
    OmitLatest,
    OmitLatestWhenInactive,
    KeepAll,
}

impl HistoryPolicy {
    pub const ALL: [Self; 3] = [Self::OmitLatest, Self::OmitLatestWhenInactive, Self::KeepAll];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OmitLatest => "omit-latest",
            Self::OmitLatestWhenInactive => "omit-latest-when-inactive",
            Self::KeepAll => "keep-all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|policy| policy.as_str() == value)
    }

    pub fn drops_latest(self, status: Option<VehicleStatus>) -> bool {
        match self {
            Self::OmitLatest => true,
            Self::OmitLatestWhenInactive => status == Some(VehicleStatus::Inactive),
            Self::KeepAll => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            "Guest".to_owned()
        } else {
            full.to_owned()
        }
    }
}

/// Everything the login endpoint hands back for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginSession {
    pub profile: UserProfile,
    pub subscriptions: Vec<Row>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationFlow {
    Signup,
    Recover,
    AccountUpdate,
}

impl VerificationFlow {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Signup => "account validation",
            Self::Recover => "password recovery",
            Self::AccountUpdate => "account update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyChannel {
    Email,
    Sms,
}

impl VerifyChannel {
    pub const ALL: [Self; 2] = [Self::Email, Self::Sms];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::Sms => "SMS",
        }
    }
}

/// Appends the currency suffix to bare numeric payments.
pub fn format_payment(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit() || ch == '.') {
        format!("{trimmed} RON")
    } else {
        trimmed.to_owned()
    }
}
