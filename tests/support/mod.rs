//! Shared test doubles

use activity_fetcher::gateway::{CallError, CallGateway};
use activity_fetcher::{ActivityRecord, Commit, FetchWindow, RecordKind};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One call observed by [`FakeGateway`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Window {
        kind: RecordKind,
        identity: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    Single {
        kind: RecordKind,
        parent: String,
        child: String,
    },
}

impl FakeCall {
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            FakeCall::Window { start, end, .. } => Some((*start, *end)),
            FakeCall::Single { .. } => None,
        }
    }
}

type Responder = dyn Fn(&FakeCall) -> Result<Vec<ActivityRecord>, CallError> + Send + Sync;

/// Scripted gateway: queued errors are returned first, then `responder` answers
pub struct FakeGateway {
    calls: Mutex<Vec<FakeCall>>,
    errors: Mutex<VecDeque<CallError>>,
    responder: Box<Responder>,
    source: String,
}

impl FakeGateway {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&FakeCall) -> Result<Vec<ActivityRecord>, CallError> + Send + Sync + 'static,
    {
        Self::with_source("", responder)
    }

    /// Gateway reporting `source` as its data source
    pub fn with_source<F>(source: &str, responder: F) -> Arc<Self>
    where
        F: Fn(&FakeCall) -> Result<Vec<ActivityRecord>, CallError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            errors: Mutex::new(VecDeque::new()),
            responder: Box::new(responder),
            source: source.to_string(),
        })
    }

    /// Gateway returning no records for every call
    pub fn empty() -> Arc<Self> {
        Self::new(|_| Ok(Vec::new()))
    }

    /// Gateway returning `errors` in order, then empty results
    pub fn failing_with(errors: Vec<CallError>) -> Arc<Self> {
        let gateway = Self::empty();
        gateway.queue_errors(errors);
        gateway
    }

    /// Return `errors` ahead of the responder's answers
    pub fn queue_errors(&self, errors: Vec<CallError>) {
        self.errors.lock().unwrap().extend(errors);
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, call: FakeCall) -> Result<Vec<ActivityRecord>, CallError> {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(error) = self.errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        (self.responder)(&call)
    }
}

#[async_trait]
impl CallGateway for FakeGateway {
    async fn fetch_by_window(
        &self,
        kind: RecordKind,
        identity: &str,
        window: &FetchWindow,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        self.answer(FakeCall::Window {
            kind,
            identity: identity.to_string(),
            start: window.start(),
            end: window.end(),
        })
    }

    async fn fetch_single(
        &self,
        kind: RecordKind,
        parent: &str,
        child: &str,
    ) -> Result<Vec<ActivityRecord>, CallError> {
        self.answer(FakeCall::Single {
            kind,
            parent: parent.to_string(),
            child: child.to_string(),
        })
    }

    fn source(&self) -> &str {
        &self.source
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn commit(sha: &str, day: NaiveDate) -> ActivityRecord {
    ActivityRecord::Commit(Commit {
        sha: Some(sha.to_string()),
        repository: Some("octo/repo".to_string()),
        message: format!("commit {sha}"),
        committed_at: Some(Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap())),
        ..Default::default()
    })
}

/// `count` commits named `{prefix}-{i}` dated `day`
pub fn commits(prefix: &str, count: usize, day: NaiveDate) -> Vec<ActivityRecord> {
    (0..count)
        .map(|i| commit(&format!("{prefix}-{i}"), day))
        .collect()
}

pub fn shas(records: &[ActivityRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| match record {
            ActivityRecord::Commit(c) => c.sha.clone(),
            _ => None,
        })
        .collect()
}

pub fn server_error() -> CallError {
    CallError::Server {
        status: 503,
        message: "unavailable".to_string(),
    }
}
