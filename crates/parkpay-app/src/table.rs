// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::{
    HistoryEntry, HistoryPage, HistoryPolicy, Outcome, RemoteSync, Row, RowCache, RowKey,
    SyncScope, TableKind, VEHICLE_PAYMENT_CELL, VEHICLE_TIME_PARKED_CELL, VehicleStatus,
    format_payment,
};

pub const GENERIC_ERROR: &str = "An error occurred. Please try again later.";
pub const FETCH_CHILDREN_ERROR: &str = "Error fetching vehicles for subscription.";
pub const FETCH_CHILDREN_TRANSPORT_ERROR: &str = "Error communicating with the server.";

/// Ordered rows of one table, mirrored into the session cache on every
/// mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRegistry {
    kind: TableKind,
    rows: Vec<Row>,
}

impl RowRegistry {
    pub fn new(kind: TableKind, rows: Vec<Row>) -> Self {
        Self { kind, rows }
    }

    /// A missing or unreadable cache yields an empty table.
    pub fn load(kind: TableKind, cache: &dyn RowCache) -> Self {
        let raw = match cache.read_table(kind) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::new(kind, Vec::new()),
            Err(error) => {
                warn!(table = kind.as_str(), error = %format!("{error:#}"), "read cached table");
                return Self::new(kind, Vec::new());
            }
        };

        match kind.decode_rows(&raw) {
            Ok(rows) => {
                debug!(table = kind.as_str(), rows = rows.len(), "loaded cached table");
                Self::new(kind, rows)
            }
            Err(error) => {
                warn!(
                    table = kind.as_str(),
                    error = %format!("{error:#}"),
                    "cached table is not valid JSON; starting empty"
                );
                Self::new(kind, Vec::new())
            }
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &RowKey) -> Option<&Row> {
        self.rows.iter().find(|row| row.matches(key))
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.get(key).is_some()
    }

    /// The row list only changes once the cache has accepted the new value.
    pub fn append(&mut self, row: Row, cache: &mut dyn RowCache) -> Result<()> {
        let mut rows = self.rows.clone();
        rows.push(row);
        self.replace_rows(rows, cache)
    }

    pub fn remove(&mut self, key: &RowKey, cache: &mut dyn RowCache) -> Result<bool> {
        if !self.contains(key) {
            return Ok(false);
        }
        let rows = self
            .rows
            .iter()
            .filter(|row| !row.matches(key))
            .cloned()
            .collect();
        self.replace_rows(rows, cache)?;
        Ok(true)
    }

    /// Applies `edit` to the row and persists only when it changed.
    pub fn update(
        &mut self,
        key: &RowKey,
        cache: &mut dyn RowCache,
        edit: impl FnOnce(&mut Row),
    ) -> Result<bool> {
        let Some(index) = self.rows.iter().position(|row| row.matches(key)) else {
            return Ok(false);
        };
        let mut edited = self.rows[index].clone();
        edit(&mut edited);
        if edited == self.rows[index] {
            return Ok(false);
        }
        let mut rows = self.rows.clone();
        rows[index] = edited;
        self.replace_rows(rows, cache)?;
        Ok(true)
    }

    fn replace_rows(&mut self, rows: Vec<Row>, cache: &mut dyn RowCache) -> Result<()> {
        let raw = self.kind.encode_rows(&rows)?;
        cache.write_table(self.kind, &raw)?;
        self.rows = rows;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionSet {
    keys: BTreeSet<RowKey>,
}

impl SelectionSet {
    /// Returns whether the key is selected afterwards.
    pub fn toggle(&mut self, key: &RowKey) -> bool {
        if self.keys.remove(key) {
            false
        } else {
            self.keys.insert(key.clone());
            true
        }
    }

    pub fn deselect(&mut self, key: &RowKey) -> bool {
        self.keys.remove(key)
    }

    pub fn check_all<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>) {
        for row in rows {
            let key = row.key();
            if !key.is_blank() {
                self.keys.insert(key);
            }
        }
    }

    pub fn uncheck_all(&mut self) {
        self.keys.clear();
    }

    pub fn contains(&self, key: &RowKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn bulk_actions_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowKey> {
        self.keys.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorPhase {
    #[default]
    Idle,
    Editing,
    Committing,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRow {
    cells: Vec<String>,
    focus: usize,
    saved: bool,
}

impl PendingRow {
    fn new(columns: usize) -> Self {
        Self {
            cells: vec![String::new(); columns.max(1)],
            focus: 0,
            saved: false,
        }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn identifier(&self) -> String {
        self.cells
            .first()
            .map(|cell| cell.trim().to_owned())
            .unwrap_or_default()
    }

    pub fn extra(&self) -> Vec<String> {
        self.cells
            .iter()
            .skip(1)
            .map(|cell| cell.trim().to_owned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitRequest {
    Discard,
    Create { key: RowKey, extra: Vec<String> },
}

/// The transient new-row editor. `request_commit` hands out at most one
/// request per pending row, whichever of blur or Enter arrives first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineEditor {
    pending: Option<PendingRow>,
    phase: EditorPhase,
}

impl InlineEditor {
    pub fn begin(&mut self, columns: usize) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(PendingRow::new(columns));
        self.phase = EditorPhase::Editing;
        true
    }

    pub fn phase(&self) -> EditorPhase {
        self.phase
    }

    pub fn is_editing(&self) -> bool {
        self.phase == EditorPhase::Editing
    }

    pub fn pending(&self) -> Option<&PendingRow> {
        self.pending.as_ref()
    }

    fn editable(&mut self) -> Option<&mut PendingRow> {
        self.pending.as_mut().filter(|pending| !pending.saved)
    }

    pub fn insert_char(&mut self, ch: char) {
        if let Some(pending) = self.editable()
            && let Some(cell) = pending.cells.get_mut(pending.focus)
        {
            cell.push(ch);
        }
    }

    pub fn backspace(&mut self) {
        if let Some(pending) = self.editable()
            && let Some(cell) = pending.cells.get_mut(pending.focus)
        {
            cell.pop();
        }
    }

    /// Moves focus to a sibling cell. Focus never leaves the row this way.
    pub fn focus_next(&mut self) {
        if let Some(pending) = self.editable() {
            pending.focus = (pending.focus + 1) % pending.cells.len();
        }
    }

    pub fn focus_prev(&mut self) {
        if let Some(pending) = self.editable() {
            let len = pending.cells.len();
            pending.focus = (pending.focus + len - 1) % len;
        }
    }

    pub fn request_commit(&mut self) -> Option<CommitRequest> {
        let pending = self.pending.as_mut()?;
        if pending.saved {
            return None;
        }
        pending.saved = true;

        let identifier = pending.identifier();
        if identifier.is_empty() {
            self.phase = EditorPhase::Discarded;
            return Some(CommitRequest::Discard);
        }

        self.phase = EditorPhase::Committing;
        Some(CommitRequest::Create {
            key: RowKey::new(identifier),
            extra: pending.extra(),
        })
    }

    pub fn finish(&mut self) {
        self.pending = None;
        self.phase = EditorPhase::Idle;
    }
}

/// Drops the newest entry when the policy says the parent row already
/// shows it. Entries arrive newest first.
pub fn visible_history(
    entries: Vec<HistoryEntry>,
    status: Option<VehicleStatus>,
    policy: HistoryPolicy,
) -> Vec<HistoryEntry> {
    let skip = usize::from(!entries.is_empty() && policy.drops_latest(status));
    entries.into_iter().skip(skip).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryExpander {
    expanded: BTreeMap<RowKey, Vec<HistoryEntry>>,
    all_expanded: bool,
}

impl HistoryExpander {
    pub fn is_expanded(&self, key: &RowKey) -> bool {
        self.expanded.contains_key(key)
    }

    pub fn entries(&self, key: &RowKey) -> &[HistoryEntry] {
        self.expanded.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn expand(&mut self, key: RowKey, entries: Vec<HistoryEntry>) {
        self.expanded.insert(key, entries);
    }

    /// Returns how many history rows went away.
    pub fn collapse(&mut self, key: &RowKey) -> Option<usize> {
        self.expanded.remove(key).map(|entries| entries.len())
    }

    pub fn all_expanded(&self) -> bool {
        self.all_expanded
    }

    pub fn set_all_expanded(&mut self, value: bool) {
        self.all_expanded = value;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    NothingPending,
    Discarded,
    Created(RowKey),
    Rejected(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    Expanded(usize),
    Collapsed(usize),
    Rejected(String),
    Failed(String),
    Unavailable,
}

impl HistoryOutcome {
    fn failure(&self) -> Option<&str> {
        match self {
            Self::Rejected(message) | Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Outcome of a sequential bulk action. Processing stops at the first
/// failure; keys handled before it keep their result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkReport {
    pub succeeded: Vec<RowKey>,
    pub stopped_at: Option<(RowKey, String)>,
}

impl BulkReport {
    pub fn is_complete(&self) -> bool {
        self.stopped_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleRow<'a> {
    Entity {
        row: &'a Row,
        selected: bool,
        expanded: bool,
    },
    History {
        parent: RowKey,
        cells: Vec<String>,
    },
    Pending(&'a PendingRow),
}

impl VisibleRow<'_> {
    pub fn owner(&self) -> Option<RowKey> {
        match self {
            Self::Entity { row, .. } => Some(row.key()),
            Self::History { parent, .. } => Some(parent.clone()),
            Self::Pending(_) => None,
        }
    }
}

/// One selectable, editable table: rows, checked keys, the pending row
/// editor and per-row history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableState {
    registry: RowRegistry,
    selection: SelectionSet,
    editor: InlineEditor,
    history: HistoryExpander,
    policy: HistoryPolicy,
    error: Option<String>,
    cursor: usize,
}

impl TableState {
    pub fn new(registry: RowRegistry, policy: HistoryPolicy) -> Self {
        Self {
            registry,
            selection: SelectionSet::default(),
            editor: InlineEditor::default(),
            history: HistoryExpander::default(),
            policy,
            error: None,
            cursor: 0,
        }
    }

    pub fn load(kind: TableKind, cache: &dyn RowCache, policy: HistoryPolicy) -> Self {
        Self::new(RowRegistry::load(kind, cache), policy)
    }

    pub fn kind(&self) -> TableKind {
        self.registry.kind()
    }

    pub fn registry(&self) -> &RowRegistry {
        &self.registry
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn editor(&self) -> &InlineEditor {
        &self.editor
    }

    pub fn history(&self) -> &HistoryExpander {
        &self.history
    }

    pub fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn toggle_selected(&mut self, key: &RowKey) -> bool {
        self.selection.toggle(key)
    }

    pub fn check_all(&mut self) {
        self.selection.check_all(self.registry.rows());
    }

    pub fn uncheck_all(&mut self) {
        self.selection.uncheck_all();
    }

    pub fn editor_mut(&mut self) -> &mut InlineEditor {
        &mut self.editor
    }

    /// Opens a pending row. An already open one goes through the commit
    /// protocol first and its outcome is returned.
    pub fn begin_add(
        &mut self,
        sync: &mut dyn RemoteSync,
        scope: &SyncScope,
        cache: &mut dyn RowCache,
    ) -> Result<Option<CommitOutcome>> {
        self.error = None;
        let previous = if self.editor.pending().is_some() {
            Some(self.commit_pending(sync, scope, cache)?)
        } else {
            None
        };
        self.selection.uncheck_all();
        self.editor.begin(self.kind().column_count());
        self.cursor = self.visible_len().saturating_sub(1);
        Ok(previous)
    }

    /// Runs on Enter and on blur alike.
    pub fn commit_pending(
        &mut self,
        sync: &mut dyn RemoteSync,
        scope: &SyncScope,
        cache: &mut dyn RowCache,
    ) -> Result<CommitOutcome> {
        let Some(request) = self.editor.request_commit() else {
            return Ok(CommitOutcome::NothingPending);
        };

        let (key, extra) = match request {
            CommitRequest::Discard => {
                debug!(table = self.kind().as_str(), "discarded empty pending row");
                self.editor.finish();
                self.clamp_cursor();
                return Ok(CommitOutcome::Discarded);
            }
            CommitRequest::Create { key, extra } => (key, extra),
        };

        let outcome = match sync.create(scope, &key, &extra) {
            Ok(Outcome::Accepted(row)) => match self.registry.append(row, cache) {
                Ok(()) => {
                    info!(table = self.kind().as_str(), key = %key, "created row");
                    self.editor.finish();
                    self.clamp_cursor();
                    return Ok(CommitOutcome::Created(key));
                }
                Err(error) => {
                    warn!(
                        table = self.kind().as_str(),
                        key = %key,
                        error = %format!("{error:#}"),
                        "created row could not be cached"
                    );
                    CommitOutcome::Failed(GENERIC_ERROR.to_owned())
                }
            },
            Ok(Outcome::Rejected(message)) => {
                let text = message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| format!("The {} already exists.", self.kind().noun()));
                info!(table = self.kind().as_str(), key = %key, reason = %text, "create rejected");
                CommitOutcome::Rejected(text)
            }
            Err(error) => {
                warn!(
                    table = self.kind().as_str(),
                    key = %key,
                    error = %format!("{error:#}"),
                    "create failed"
                );
                CommitOutcome::Failed(GENERIC_ERROR.to_owned())
            }
        };

        if let CommitOutcome::Rejected(text) | CommitOutcome::Failed(text) = &outcome {
            self.error = Some(text.clone());
        }
        self.editor.finish();
        self.clamp_cursor();
        Ok(outcome)
    }

    /// Deletes checked rows one at a time in table order. A server rejection,
    /// a transport error, or a failed cache write stops the run at that row.
    pub fn delete_selected(
        &mut self,
        sync: &mut dyn RemoteSync,
        scope: &SyncScope,
        cache: &mut dyn RowCache,
    ) -> Result<BulkReport> {
        self.error = None;
        let mut report = BulkReport::default();

        for key in self.selected_keys_in_order() {
            let failure = match sync.delete(scope, &key) {
                Ok(Outcome::Accepted(())) => match self.registry.remove(&key, cache) {
                    Ok(_) => {
                        self.history.collapse(&key);
                        self.selection.deselect(&key);
                        info!(table = self.kind().as_str(), key = %key, "deleted row");
                        report.succeeded.push(key);
                        continue;
                    }
                    Err(error) => {
                        warn!(
                            table = self.kind().as_str(),
                            key = %key,
                            error = %format!("{error:#}"),
                            "deleted row could not be dropped from the cache"
                        );
                        GENERIC_ERROR.to_owned()
                    }
                },
                Ok(Outcome::Rejected(message)) => message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| format!("Failed to delete {}.", self.kind().noun())),
                Err(error) => {
                    warn!(
                        table = self.kind().as_str(),
                        key = %key,
                        error = %format!("{error:#}"),
                        "delete failed"
                    );
                    GENERIC_ERROR.to_owned()
                }
            };
            warn!(
                table = self.kind().as_str(),
                key = %key,
                remaining = self.selection.len(),
                "bulk delete stopped"
            );
            self.error = Some(failure.clone());
            report.stopped_at = Some((key, failure));
            break;
        }

        if report.is_complete() {
            self.selection.uncheck_all();
        }
        self.clamp_cursor();
        Ok(report)
    }

    pub fn toggle_history(
        &mut self,
        sync: &mut dyn RemoteSync,
        key: &RowKey,
        cache: &mut dyn RowCache,
    ) -> Result<HistoryOutcome> {
        if !self.kind().has_history() {
            return Ok(HistoryOutcome::Unavailable);
        }
        if let Some(removed) = self.history.collapse(key) {
            self.history.set_all_expanded(false);
            self.clamp_cursor();
            return Ok(HistoryOutcome::Collapsed(removed));
        }
        let Some(status) = self.registry.get(key).map(Row::vehicle_status) else {
            return Ok(HistoryOutcome::Unavailable);
        };

        match sync.get_history(key) {
            Ok(Outcome::Accepted(page)) => {
                self.merge_summary(key, &page, cache)?;
                let entries = visible_history(page.entries, status, self.policy);
                let inserted = entries.len();
                self.history.expand(key.clone(), entries);
                debug!(key = %key, inserted, "expanded history");
                Ok(HistoryOutcome::Expanded(inserted))
            }
            Ok(Outcome::Rejected(message)) => {
                let text = message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_ERROR.to_owned());
                self.error = Some(text.clone());
                Ok(HistoryOutcome::Rejected(text))
            }
            Err(error) => {
                warn!(key = %key, error = %format!("{error:#}"), "history fetch failed");
                self.error = Some(GENERIC_ERROR.to_owned());
                Ok(HistoryOutcome::Failed(GENERIC_ERROR.to_owned()))
            }
        }
    }

    /// Flips every row that matches the current all-expanded flag, then
    /// flips the flag.
    pub fn view_all_history(
        &mut self,
        sync: &mut dyn RemoteSync,
        cache: &mut dyn RowCache,
    ) -> Result<BulkReport> {
        let mut report = BulkReport::default();
        if !self.kind().has_history() || self.registry.is_empty() {
            return Ok(report);
        }
        self.error = None;

        let target = self.history.all_expanded();
        let keys = self
            .registry
            .rows()
            .iter()
            .map(Row::key)
            .filter(|key| self.history.is_expanded(key) == target)
            .collect::<Vec<_>>();

        for key in keys {
            let outcome = self.toggle_history(sync, &key, cache)?;
            if let Some(message) = outcome.failure() {
                warn!(key = %key, "view all history stopped");
                report.stopped_at = Some((key, message.to_owned()));
                break;
            }
            report.succeeded.push(key);
        }

        if report.is_complete() {
            self.history.set_all_expanded(!target);
            self.selection.uncheck_all();
        }
        self.clamp_cursor();
        Ok(report)
    }

    /// Asks for the children of `key`. Failures land in the table error.
    pub fn fetch_children(
        &mut self,
        sync: &mut dyn RemoteSync,
        scope: &SyncScope,
        key: &RowKey,
    ) -> Option<Vec<Row>> {
        self.error = None;
        match sync.list_children(scope, key) {
            Ok(Outcome::Accepted(rows)) => Some(rows),
            Ok(Outcome::Rejected(_)) => {
                self.error = Some(FETCH_CHILDREN_ERROR.to_owned());
                None
            }
            Err(error) => {
                warn!(key = %key, error = %format!("{error:#}"), "list children failed");
                self.error = Some(FETCH_CHILDREN_TRANSPORT_ERROR.to_owned());
                None
            }
        }
    }

    fn merge_summary(
        &mut self,
        key: &RowKey,
        page: &HistoryPage,
        cache: &mut dyn RowCache,
    ) -> Result<()> {
        if page.total_time_parked.is_none() && page.payment.is_none() {
            return Ok(());
        }
        self.registry.update(key, cache, |row| {
            if let Some(total) = &page.total_time_parked {
                row.set_cell(VEHICLE_TIME_PARKED_CELL, total.trim());
            }
            if let Some(payment) = &page.payment {
                row.set_cell(VEHICLE_PAYMENT_CELL, format_payment(payment));
            }
        })?;
        Ok(())
    }

    fn selected_keys_in_order(&self) -> Vec<RowKey> {
        self.registry
            .rows()
            .iter()
            .map(Row::key)
            .filter(|key| self.selection.contains(key))
            .collect()
    }

    pub fn visible_rows(&self) -> Vec<VisibleRow<'_>> {
        let width = self.kind().column_count();
        let mut out = Vec::with_capacity(self.registry.len());
        for row in self.registry.rows() {
            let key = row.key();
            let expanded = self.history.is_expanded(&key);
            out.push(VisibleRow::Entity {
                row,
                selected: self.selection.contains(&key),
                expanded,
            });
            for entry in self.history.entries(&key) {
                out.push(VisibleRow::History {
                    parent: key.clone(),
                    cells: entry.to_row_cells(width),
                });
            }
        }
        if let Some(pending) = self.editor.pending() {
            out.push(VisibleRow::Pending(pending));
        }
        out
    }

    pub fn visible_len(&self) -> usize {
        let history_rows = self
            .registry
            .rows()
            .iter()
            .map(|row| self.history.entries(&row.key()).len())
            .sum::<usize>();
        self.registry.len() + history_rows + usize::from(self.editor.pending().is_some())
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.visible_len();
        if len == 0 {
            self.cursor = 0;
            return;
        }
        let next = (self.cursor as isize + delta).clamp(0, len as isize - 1);
        self.cursor = next as usize;
    }

    pub fn jump_cursor(&mut self, index: usize) {
        self.cursor = index;
        self.clamp_cursor();
    }

    /// The entity row under the cursor; history rows resolve to their parent.
    pub fn cursor_key(&self) -> Option<RowKey> {
        self.visible_rows()
            .get(self.cursor)
            .and_then(VisibleRow::owner)
    }

    fn clamp_cursor(&mut self) {
        let len = self.visible_len();
        if self.cursor >= len {
            self.cursor = len.saturating_sub(1);
        }
    }
}
