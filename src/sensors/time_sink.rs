//! Time Sink: the share of file touches that rework a file an earlier pull
//! request already touched in the same window.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::percent;
use crate::normalization::{ActivityEvent, EventPayload};

const MAX_CHURN_FILES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChurnFile {
    pub file: String,
    /// Distinct pull requests that touched the file
    pub pr_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimeSinkReport {
    pub score: u32,
    pub previous_score: u32,
    pub total_touches: usize,
    pub rework_touches: usize,
    pub churn_files: Vec<ChurnFile>,
}

impl TimeSinkReport {
    pub fn empty() -> Self {
        Self {
            score: 0,
            previous_score: 0,
            total_touches: 0,
            rework_touches: 0,
            churn_files: Vec::new(),
        }
    }
}

/// Single-window tally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowTally {
    pub score: u32,
    pub total_touches: usize,
    pub rework_touches: usize,
    pub churn_files: Vec<ChurnFile>,
}

fn is_noise(path: &str) -> bool {
    path.ends_with(".lock") || path.contains("dist/") || path.ends_with(".map")
}

pub fn tally(events: &[ActivityEvent]) -> WindowTally {
    let mut touches: Vec<(i64, &str, i64)> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::FileChange(p) if !is_noise(&p.file) => {
                Some((e.ts, p.file.as_str(), p.pr_id))
            }
            _ => None,
        })
        .collect();
    // Stable: equal timestamps keep their input order
    touches.sort_by_key(|(ts, _, _)| *ts);

    let mut history: HashMap<&str, HashSet<i64>> = HashMap::new();
    let mut rework = 0usize;
    for (_, file, pr_id) in &touches {
        let seen = history.entry(*file).or_default();
        if !seen.is_empty() && !seen.contains(pr_id) {
            rework += 1;
        }
        seen.insert(*pr_id);
    }

    let mut churn_files: Vec<ChurnFile> = history
        .into_iter()
        .filter(|(_, prs)| prs.len() > 1)
        .map(|(file, prs)| ChurnFile {
            file: file.to_string(),
            pr_count: prs.len(),
        })
        .collect();
    churn_files.sort_by(|a, b| b.pr_count.cmp(&a.pr_count).then_with(|| a.file.cmp(&b.file)));
    churn_files.truncate(MAX_CHURN_FILES);

    WindowTally {
        score: percent(rework, touches.len()),
        total_touches: touches.len(),
        rework_touches: rework,
        churn_files,
    }
}

pub fn compute(current: &[ActivityEvent], previous: &[ActivityEvent]) -> TimeSinkReport {
    let now = tally(current);
    TimeSinkReport {
        score: now.score,
        previous_score: tally(previous).score,
        total_touches: now.total_touches,
        rework_touches: now.rework_touches,
        churn_files: now.churn_files,
    }
}
