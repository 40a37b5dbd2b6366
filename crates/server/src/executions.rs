use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mailbrief_core::RunReport;

/// How many finished executions are retained for `/history`.
const DEFAULT_CAPACITY: usize = 50;

/// Lifecycle state of a digest execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    Aborted,
    TimedOut,
}

/// One digest execution, shaped for the `/execution/{id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_arn: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub start_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_date: Option<String>,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// In-memory registry of recent executions.
#[derive(Debug)]
pub struct ExecutionRegistry {
    records: DashMap<String, ExecutionRecord>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for ExecutionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ExecutionRegistry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a run as started; returns the execution id.
    pub fn start(&self, name: impl Into<String>, input: serde_json::Value) -> String {
        let id = Uuid::new_v4().to_string();
        let record = ExecutionRecord {
            execution_arn: format!("mailbrief:execution:{id}"),
            name: name.into(),
            status: ExecutionStatus::Running,
            start_date: Utc::now().to_rfc3339(),
            stop_date: None,
            input,
            output: None,
            error: None,
            cause: None,
        };
        self.records.insert(id.clone(), record);

        let mut order = self.order.lock().unwrap();
        order.push_front(id.clone());
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_back() {
                self.records.remove(&evicted);
            }
        }
        id
    }

    /// Record the outcome of a finished run.
    pub fn finish(&self, id: &str, report: &RunReport) {
        if let Some(mut record) = self.records.get_mut(id) {
            record.status = if report.success {
                ExecutionStatus::Succeeded
            } else {
                ExecutionStatus::Failed
            };
            record.stop_date = Some(Utc::now().to_rfc3339());
            record.output = serde_json::to_value(report).ok();
            record.error = report.error.clone();
            if !report.success {
                record.cause = Some(report.message.clone());
            }
        }
    }

    /// Record a run that died without producing a report.
    pub fn abort(&self, id: &str, error: impl Into<String>, cause: impl Into<String>) {
        if let Some(mut record) = self.records.get_mut(id) {
            record.status = ExecutionStatus::Aborted;
            record.stop_date = Some(Utc::now().to_rfc3339());
            record.error = Some(error.into());
            record.cause = Some(cause.into());
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<ExecutionRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Most recent executions first, at most `limit`.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let order = self.order.lock().unwrap();
        order
            .iter()
            .take(limit)
            .filter_map(|id| self.records.get(id).map(|r| r.clone()))
            .collect()
    }
}
