//! Test doubles for the transport and sign-in seams.
//!
//! Enabled in unit tests and, for downstream crates, with the
//! `test-utils` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Duration;

use crate::api::{TabularTransport, ValueRange};
use crate::auth::{Credential, SignInProvider, SignedInUser};
use crate::clock::Clock;
use crate::error::{Result, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operation kinds recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read { range: String },
    Append { range: String },
    Update { sheet: String, row: u32 },
    Delete { sheet: String, row: u32 },
    Create { title: String },
}

/// In-memory spreadsheet. Sheets are plain row vectors; row `n` lives at
/// index `n - 1`.
#[derive(Default)]
pub struct MemoryTransport {
    sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
    failures: Mutex<VecDeque<StoreError>>,
    calls: Mutex<Vec<Call>>,
    tokens: Mutex<Vec<String>>,
}

fn sheet_of(range: &str) -> &str {
    range.split('!').next().unwrap_or(range)
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(self, sheet: &str, rows: Vec<Vec<&str>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(str::to_string).collect())
            .collect();
        lock(&self.sheets).insert(sheet.to_string(), rows);
        self
    }

    /// Make the next calls fail with these errors, in order.
    pub fn fail_next(&self, errors: Vec<StoreError>) {
        lock(&self.failures).extend(errors);
    }

    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        lock(&self.sheets).get(sheet).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn read_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, Call::Read { .. }))
            .count()
    }

    /// Access tokens presented, one per call.
    pub fn tokens_seen(&self) -> Vec<String> {
        lock(&self.tokens).clone()
    }

    fn record(&self, credential: &Credential, call: Call) -> Result<()> {
        lock(&self.calls).push(call);
        lock(&self.tokens).push(credential.access_token.clone());
        match lock(&self.failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TabularTransport for MemoryTransport {
    async fn read_range(
        &self,
        credential: &Credential,
        _store_id: &str,
        range: &str,
    ) -> Result<ValueRange> {
        // Let concurrent callers interleave like a real network call would
        tokio::task::yield_now().await;
        self.record(credential, Call::Read { range: range.to_string() })?;
        let sheet = sheet_of(range);
        let rows = self.rows(sheet);
        Ok(ValueRange::new(&format!("{}!A1:E{}", sheet, rows.len().max(1)), rows))
    }

    async fn append_row(
        &self,
        credential: &Credential,
        _store_id: &str,
        range: &str,
        row: &[String],
    ) -> Result<()> {
        self.record(credential, Call::Append { range: range.to_string() })?;
        lock(&self.sheets)
            .entry(sheet_of(range).to_string())
            .or_default()
            .push(row.to_vec());
        Ok(())
    }

    async fn update_row(
        &self,
        credential: &Credential,
        _store_id: &str,
        sheet: &str,
        row_number: u32,
        row: &[String],
    ) -> Result<()> {
        self.record(credential, Call::Update { sheet: sheet.to_string(), row: row_number })?;
        let mut sheets = lock(&self.sheets);
        let rows = sheets.entry(sheet.to_string()).or_default();
        let index = row_number.saturating_sub(1) as usize;
        if rows.len() <= index {
            rows.resize(index + 1, Vec::new());
        }
        rows[index] = row.to_vec();
        Ok(())
    }

    async fn delete_row(
        &self,
        credential: &Credential,
        _store_id: &str,
        sheet: &str,
        row_number: u32,
    ) -> Result<()> {
        self.record(credential, Call::Delete { sheet: sheet.to_string(), row: row_number })?;
        let mut sheets = lock(&self.sheets);
        let rows = sheets.entry(sheet.to_string()).or_default();
        let index = row_number.saturating_sub(1) as usize;
        if row_number == 0 || index >= rows.len() {
            return Err(StoreError::ProviderSpecific(format!("Row {} out of range", row_number)));
        }
        rows.remove(index);
        Ok(())
    }

    async fn create_store(
        &self,
        credential: &Credential,
        title: &str,
        sheets: &[&str],
    ) -> Result<String> {
        self.record(credential, Call::Create { title: title.to_string() })?;
        let mut existing = lock(&self.sheets);
        for sheet in sheets {
            existing.entry(sheet.to_string()).or_default();
        }
        Ok(format!("memory-{}", title.to_lowercase().replace(' ', "-")))
    }
}

/// Sign-in provider with scripted outcomes. Issues `token-1`, `token-2`,
/// ... each valid for one hour from the clock's current time.
pub struct ScriptedSignIn {
    clock: Arc<dyn Clock>,
    email: String,
    credential: Mutex<Option<Credential>>,
    remembered: AtomicBool,
    issued: AtomicU32,
    refresh_calls: AtomicU32,
    refresh_failures: Mutex<VecDeque<StoreError>>,
    sign_in_failure: Mutex<Option<StoreError>>,
}

impl ScriptedSignIn {
    pub fn new(clock: Arc<dyn Clock>, email: &str) -> Self {
        Self {
            clock,
            email: email.to_string(),
            credential: Mutex::new(None),
            remembered: AtomicBool::new(false),
            issued: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            refresh_failures: Mutex::new(VecDeque::new()),
            sign_in_failure: Mutex::new(None),
        }
    }

    pub fn fail_next_refreshes(&self, errors: Vec<StoreError>) {
        lock(&self.refresh_failures).extend(errors);
    }

    pub fn fail_sign_in(&self, error: StoreError) {
        *lock(&self.sign_in_failure) = Some(error);
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn issue(&self) -> Credential {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let expires_at = self.clock.now() + Duration::hours(1);
        let credential = Credential::new(format!("token-{}", n), expires_at);
        *lock(&self.credential) = Some(credential.clone());
        credential
    }
}

#[async_trait]
impl SignInProvider for ScriptedSignIn {
    async fn sign_in(&self) -> Result<SignedInUser> {
        if let Some(err) = lock(&self.sign_in_failure).take() {
            return Err(err);
        }
        self.remembered.store(true, Ordering::SeqCst);
        Ok(SignedInUser {
            email: self.email.clone(),
            credential: self.issue(),
        })
    }

    async fn restore_previous_sign_in(&self) -> Result<Option<SignedInUser>> {
        if !self.remembered.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let credential = match self.current_credential() {
            Some(credential) => credential,
            None => self.issue(),
        };
        Ok(Some(SignedInUser {
            email: self.email.clone(),
            credential,
        }))
    }

    async fn sign_out(&self) -> Result<()> {
        self.remembered.store(false, Ordering::SeqCst);
        *lock(&self.credential) = None;
        Ok(())
    }

    fn current_credential(&self) -> Option<Credential> {
        lock(&self.credential).clone()
    }

    async fn refresh_credential(&self) -> Result<Credential> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.refresh_failures).pop_front() {
            return Err(err);
        }
        Ok(self.issue())
    }
}
