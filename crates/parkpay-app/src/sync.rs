// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;

use crate::{HistoryPage, Row, RowKey, SubscriptionName, TableKind};

/// Result of a call the server understood. `Rejected` carries the
/// server's `message` when it sent one; transport failures travel as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Accepted(T),
    Rejected(Option<String>),
}

impl<T> Outcome<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Accepted(value) => Outcome::Accepted(f(value)),
            Self::Rejected(message) => Outcome::Rejected(message),
        }
    }

    pub fn accepted(self) -> Option<T> {
        match self {
            Self::Accepted(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }
}

/// Who owns the rows being synced: the signed-in account and, for the
/// vehicles table, the subscription being viewed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncScope {
    pub email: String,
    pub subscription: Option<SubscriptionName>,
}

impl SyncScope {
    pub fn account(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            subscription: None,
        }
    }

    pub fn subscription(email: impl Into<String>, name: SubscriptionName) -> Self {
        Self {
            email: email.into(),
            subscription: Some(name),
        }
    }

    pub fn subscription_name(&self) -> &str {
        self.subscription
            .as_ref()
            .map(SubscriptionName::as_str)
            .unwrap_or("")
    }
}

/// The four remote verbs a table needs.
pub trait RemoteSync {
    fn kind(&self) -> TableKind;

    /// `extra` holds the trimmed text of every cell after the identifier.
    fn create(
        &mut self,
        scope: &SyncScope,
        key: &RowKey,
        extra: &[String],
    ) -> Result<Outcome<Row>>;

    fn delete(&mut self, scope: &SyncScope, key: &RowKey) -> Result<Outcome<()>>;

    fn list_children(&mut self, scope: &SyncScope, parent: &RowKey) -> Result<Outcome<Vec<Row>>>;

    fn get_history(&mut self, key: &RowKey) -> Result<Outcome<HistoryPage>>;
}

impl<S: RemoteSync + ?Sized> RemoteSync for &mut S {
    fn kind(&self) -> TableKind {
        (**self).kind()
    }

    fn create(
        &mut self,
        scope: &SyncScope,
        key: &RowKey,
        extra: &[String],
    ) -> Result<Outcome<Row>> {
        (**self).create(scope, key, extra)
    }

    fn delete(&mut self, scope: &SyncScope, key: &RowKey) -> Result<Outcome<()>> {
        (**self).delete(scope, key)
    }

    fn list_children(&mut self, scope: &SyncScope, parent: &RowKey) -> Result<Outcome<Vec<Row>>> {
        (**self).list_children(scope, parent)
    }

    fn get_history(&mut self, key: &RowKey) -> Result<Outcome<HistoryPage>> {
        (**self).get_history(key)
    }
}

/// Where a table's rows are persisted between screens.
pub trait RowCache {
    fn read_table(&self, kind: TableKind) -> Result<Option<String>>;
    fn write_table(&mut self, kind: TableKind, raw: &str) -> Result<()>;
}

impl<C: RowCache + ?Sized> RowCache for &mut C {
    fn read_table(&self, kind: TableKind) -> Result<Option<String>> {
        (**self).read_table(kind)
    }

    fn write_table(&mut self, kind: TableKind, raw: &str) -> Result<()> {
        (**self).write_table(kind, raw)
    }
}
