// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::Client;
use anyhow::Result;
use parkpay_app::{HistoryPage, Outcome, RemoteSync, Row, RowKey, SyncScope, TableKind};

/// Subscription table verbs. Children are the subscription's vehicles.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionSync<'a> {
    client: &'a Client,
}

impl<'a> SubscriptionSync<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }
}

impl RemoteSync for SubscriptionSync<'_> {
    fn kind(&self) -> TableKind {
        TableKind::Subscriptions
    }

    fn create(
        &mut self,
        scope: &SyncScope,
        key: &RowKey,
        _extra: &[String],
    ) -> Result<Outcome<Row>> {
        let outcome = self.client.add_subscription(&scope.email, key.as_str())?;
        Ok(outcome.map(|()| Row::single(key.as_str())))
    }

    fn delete(&mut self, scope: &SyncScope, key: &RowKey) -> Result<Outcome<()>> {
        self.client.delete_subscription(&scope.email, key.as_str())
    }

    fn list_children(&mut self, scope: &SyncScope, parent: &RowKey) -> Result<Outcome<Vec<Row>>> {
        self.client.subscription_vehicles(&scope.email, parent.as_str())
    }

    fn get_history(&mut self, _key: &RowKey) -> Result<Outcome<HistoryPage>> {
        Ok(Outcome::Rejected(Some(
            "Subscriptions do not keep a parking history.".to_owned(),
        )))
    }
}

/// Vehicle table verbs, scoped to the open subscription.
#[derive(Debug, Clone, Copy)]
pub struct VehicleSync<'a> {
    client: &'a Client,
}

impl<'a> VehicleSync<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }
}

impl RemoteSync for VehicleSync<'_> {
    fn kind(&self) -> TableKind {
        TableKind::Vehicles
    }

    fn create(
        &mut self,
        scope: &SyncScope,
        key: &RowKey,
        extra: &[String],
    ) -> Result<Outcome<Row>> {
        self.client
            .add_vehicle(&scope.email, scope.subscription_name(), key.as_str(), extra)
    }

    fn delete(&mut self, scope: &SyncScope, key: &RowKey) -> Result<Outcome<()>> {
        self.client
            .delete_vehicle(&scope.email, scope.subscription_name(), key.as_str())
    }

    fn list_children(&mut self, _scope: &SyncScope, _parent: &RowKey) -> Result<Outcome<Vec<Row>>> {
        Ok(Outcome::Accepted(Vec::new()))
    }

    fn get_history(&mut self, key: &RowKey) -> Result<Outcome<HistoryPage>> {
        self.client.vehicle_history(key.as_str())
    }
}
