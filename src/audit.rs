use std::{
    collections::VecDeque,
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::TabId;
use crate::decision::{DecisionRule, Evaluation};
use crate::navigation::{NavigationRequest, TransitionKind};

/// Append-only JSON-L record of every decision the interceptor made.
#[derive(Debug, Clone)]
pub struct DecisionLog {
    path: PathBuf,
}

impl DecisionLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_record(&self, record: &DecisionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Unable to create audit directory {}", parent.display())
            })?;
        }
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open decision log {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// The most recent `limit` records, oldest first.
    pub fn read_records(&self, limit: usize) -> Result<Vec<DecisionRecord>> {
        if limit == 0 || !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open decision log {}", self.path.display()))?;

        let mut buffer: VecDeque<DecisionRecord> = VecDeque::with_capacity(limit);
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: DecisionRecord = serde_json::from_str(&line).with_context(|| {
                format!("Malformed decision record at {}:{}", self.path.display(), idx + 1)
            })?;
            if buffer.len() == limit {
                buffer.pop_front();
            }
            buffer.push_back(record);
        }
        Ok(buffer.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub record_id: Uuid,
    pub tab: Option<TabId>,
    pub chain: Option<Uuid>,
    pub url: String,
    pub transition: TransitionKind,
    pub redirect: bool,
    pub rule: DecisionRule,
    pub decision: String,
    pub target: Option<String>,
}

impl DecisionRecord {
    pub fn new(
        tab: Option<TabId>,
        request: &NavigationRequest<'_>,
        evaluation: &Evaluation,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            record_id: Uuid::new_v4(),
            tab,
            chain: request.chain().map(|chain| chain.id()),
            url: request.url().to_string(),
            transition: request.transition().kind,
            redirect: request.is_redirect(),
            rule: evaluation.rule,
            decision: evaluation.decision.label().to_string(),
            target: evaluation.decision.target(),
        }
    }
}
