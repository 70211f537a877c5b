// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use parkpay_app::{
    HistoryEntry, HistoryPage, Outcome, RemoteSync, Row, RowCache, RowKey, SyncScope, TableKind,
    UserProfile, VehicleStatus,
};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

const COUNTY_CODES: [&str; 12] = [
    "B", "CJ", "IS", "TM", "BV", "CT", "SB", "AG", "PH", "DJ", "BH", "MS",
];

const SUBSCRIPTION_NAMES: [&str; 8] = [
    "Family", "Work", "Weekend", "Office", "Fleet", "Guests", "Night", "Campus",
];

const FIRST_NAMES: [&str; 10] = [
    "Ana", "Mihai", "Ioana", "Andrei", "Elena", "Radu", "Maria", "Vlad", "Irina", "Dan",
];
const LAST_NAMES: [&str; 10] = [
    "Popescu", "Ionescu", "Stan", "Dumitru", "Marin", "Tudor", "Rusu", "Matei", "Ene", "Lazar",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator of profiles, plates, vehicle rows and history for
/// tests.
#[derive(Debug, Clone)]
pub struct ParkingFaker {
    rng: DeterministicRng,
}

impl ParkingFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn profile(&mut self) -> UserProfile {
        let name = self.pick(&FIRST_NAMES).to_owned();
        let last_name = self.pick(&LAST_NAMES).to_owned();
        let email = format!(
            "{}.{}@example.ro",
            name.to_ascii_lowercase(),
            last_name.to_ascii_lowercase()
        );
        let phone = format!("07{:08}", self.rng.next_u64() % 100_000_000);
        UserProfile {
            name,
            last_name,
            email,
            phone,
        }
    }

    /// Romanian-style plate such as `CJ07XYZ`.
    pub fn plate(&mut self) -> String {
        let county = self.pick(&COUNTY_CODES);
        let digits = 1 + self.rng.int_n(99);
        let letters = (0..3)
            .map(|_| char::from(b'A' + self.rng.int_n(26) as u8))
            .collect::<String>();
        format!("{county}{digits:02}{letters}")
    }

    pub fn subscription_names(&mut self, count: usize) -> Vec<String> {
        let start = self.rng.int_n(SUBSCRIPTION_NAMES.len());
        (0..count.min(SUBSCRIPTION_NAMES.len()))
            .map(|offset| {
                SUBSCRIPTION_NAMES[(start + offset) % SUBSCRIPTION_NAMES.len()].to_owned()
            })
            .collect()
    }

    pub fn vehicle_row(&mut self) -> Row {
        let plate = self.plate();
        let day = 1 + self.rng.int_n(28);
        let hour = 6 + self.rng.int_n(12);
        let active = self.rng.bool();
        let (exit_date, exit_time, parked, payment) = if active {
            (String::new(), String::new(), String::new(), String::new())
        } else {
            let hours = 1 + self.rng.int_n(5);
            (
                format!("2024-03-{day:02}"),
                format!("{:02}:15", hour + hours),
                format!("{hours}h 15m"),
                format!("{} RON", hours * 5),
            )
        };
        let status = if active {
            VehicleStatus::Active
        } else {
            VehicleStatus::Inactive
        };
        Row::new(vec![
            plate,
            format!("2024-03-{day:02}"),
            format!("{hour:02}:00"),
            exit_date,
            exit_time,
            parked,
            payment,
            status.as_str().to_owned(),
        ])
    }

    pub fn vehicle_rows(&mut self, count: usize) -> Vec<Row> {
        (0..count).map(|_| self.vehicle_row()).collect()
    }

    /// Newest entry first, like the server.
    pub fn history(&mut self, len: usize) -> Vec<HistoryEntry> {
        (0..len)
            .rev()
            .map(|day| {
                let hour = 7 + self.rng.int_n(10);
                HistoryEntry::from_cells(vec![
                    format!("2024-02-{:02}", day + 1),
                    format!("{hour:02}:00"),
                    format!("2024-02-{:02}", day + 1),
                    format!("{:02}:30", hour + 1),
                ])
            })
            .collect()
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

pub type Scripted<T> = std::result::Result<Outcome<T>, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCall {
    Create { key: RowKey, extra: Vec<String> },
    Delete(RowKey),
    ListChildren(RowKey),
    History(RowKey),
}

/// Scripted `RemoteSync`. Each verb pops its queue; an empty queue answers
/// with success. `Err(message)` simulates a transport failure.
#[derive(Debug, Clone)]
pub struct FakeSync {
    kind: TableKind,
    creates: VecDeque<Scripted<Row>>,
    deletes: VecDeque<Scripted<()>>,
    children: VecDeque<Scripted<Vec<Row>>>,
    histories: VecDeque<Scripted<HistoryPage>>,
    calls: Vec<SyncCall>,
}

impl FakeSync {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            creates: VecDeque::new(),
            deletes: VecDeque::new(),
            children: VecDeque::new(),
            histories: VecDeque::new(),
            calls: Vec::new(),
        }
    }

    pub fn with_create(mut self, response: Scripted<Row>) -> Self {
        self.creates.push_back(response);
        self
    }

    pub fn with_delete(mut self, response: Scripted<()>) -> Self {
        self.deletes.push_back(response);
        self
    }

    pub fn with_children(mut self, response: Scripted<Vec<Row>>) -> Self {
        self.children.push_back(response);
        self
    }

    pub fn with_history(mut self, response: Scripted<HistoryPage>) -> Self {
        self.histories.push_back(response);
        self
    }

    pub fn calls(&self) -> &[SyncCall] {
        &self.calls
    }

    pub fn create_calls(&self) -> usize {
        self.count(|call| matches!(call, SyncCall::Create { .. }))
    }

    pub fn delete_calls(&self) -> usize {
        self.count(|call| matches!(call, SyncCall::Delete(_)))
    }

    pub fn history_calls(&self) -> usize {
        self.count(|call| matches!(call, SyncCall::History(_)))
    }

    fn count(&self, predicate: impl Fn(&SyncCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    fn echo_row(&self, key: &RowKey, extra: &[String]) -> Row {
        let mut cells = vec![key.as_str().to_owned()];
        cells.extend(extra.iter().cloned());
        cells.resize(self.kind.column_count(), String::new());
        Row::new(cells)
    }
}

fn answer<T>(scripted: Option<Scripted<T>>, fallback: impl FnOnce() -> T) -> Result<Outcome<T>> {
    match scripted {
        Some(Ok(outcome)) => Ok(outcome),
        Some(Err(message)) => Err(anyhow!(message)),
        None => Ok(Outcome::Accepted(fallback())),
    }
}

impl RemoteSync for FakeSync {
    fn kind(&self) -> TableKind {
        self.kind
    }

    fn create(
        &mut self,
        _scope: &SyncScope,
        key: &RowKey,
        extra: &[String],
    ) -> Result<Outcome<Row>> {
        self.calls.push(SyncCall::Create {
            key: key.clone(),
            extra: extra.to_vec(),
        });
        let echo = self.echo_row(key, extra);
        answer(self.creates.pop_front(), || echo)
    }

    fn delete(&mut self, _scope: &SyncScope, key: &RowKey) -> Result<Outcome<()>> {
        self.calls.push(SyncCall::Delete(key.clone()));
        answer(self.deletes.pop_front(), || ())
    }

    fn list_children(&mut self, _scope: &SyncScope, parent: &RowKey) -> Result<Outcome<Vec<Row>>> {
        self.calls.push(SyncCall::ListChildren(parent.clone()));
        answer(self.children.pop_front(), Vec::new)
    }

    fn get_history(&mut self, key: &RowKey) -> Result<Outcome<HistoryPage>> {
        self.calls.push(SyncCall::History(key.clone()));
        answer(self.histories.pop_front(), HistoryPage::default)
    }
}

/// In-memory `RowCache` that also counts writes. `failing_writes` turns it
/// into a cache that rejects every write, like a full or read-only disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    tables: HashMap<TableKind, String>,
    writes: usize,
    reject_writes: bool,
}

impl MemoryCache {
    pub fn with_rows(kind: TableKind, rows: &[Row]) -> Result<Self> {
        let mut cache = Self::default();
        cache.write_table(kind, &kind.encode_rows(rows)?)?;
        cache.writes = 0;
        Ok(cache)
    }

    pub fn with_raw(kind: TableKind, raw: &str) -> Self {
        let mut tables = HashMap::new();
        tables.insert(kind, raw.to_owned());
        Self {
            tables,
            ..Self::default()
        }
    }

    pub fn failing_writes(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    pub fn raw(&self, kind: TableKind) -> Option<&str> {
        self.tables.get(&kind).map(String::as_str)
    }

    pub fn rows(&self, kind: TableKind) -> Result<Vec<Row>> {
        match self.raw(kind) {
            Some(raw) => kind.decode_rows(raw),
            None => Ok(Vec::new()),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl RowCache for MemoryCache {
    fn read_table(&self, kind: TableKind) -> Result<Option<String>> {
        Ok(self.tables.get(&kind).cloned())
    }

    fn write_table(&mut self, kind: TableKind, raw: &str) -> Result<()> {
        if self.reject_writes {
            bail!("write {} table: disk is read-only", kind.as_str());
        }
        self.tables.insert(kind, raw.to_owned());
        self.writes += 1;
        Ok(())
    }
}

pub fn vehicle_row(plate: &str, status: VehicleStatus) -> Row {
    let (exit_date, exit_time) = match status {
        VehicleStatus::Active => ("", ""),
        VehicleStatus::Inactive => ("2024-01-01", "12:00"),
    };
    Row::new(
        [
            plate,
            "2024-01-01",
            "10:00",
            exit_date,
            exit_time,
            "",
            "",
            status.as_str(),
        ]
        .into_iter()
        .map(str::to_owned)
        .collect(),
    )
}

pub fn history_page(entries: &[[&str; 4]]) -> HistoryPage {
    HistoryPage {
        entries: entries
            .iter()
            .map(|cells| {
                HistoryEntry::from_cells(cells.iter().map(|cell| (*cell).to_owned()).collect())
            })
            .collect(),
        total_time_parked: None,
        payment: None,
    }
}

pub fn demo_profile() -> UserProfile {
    UserProfile {
        name: "Ana".to_owned(),
        last_name: "Popescu".to_owned(),
        email: "ana.popescu@example.ro".to_owned(),
        phone: "0712345678".to_owned(),
    }
}

pub fn demo_scope() -> SyncScope {
    SyncScope::account(demo_profile().email)
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("session.db");
    Ok((dir, db_path))
}
