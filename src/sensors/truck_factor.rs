//! Truck Factor: how many frequently touched files are dominated by a single
//! author.
//!
//! Attribution goes through the merge event of each pull request, so a file
//! change whose pull request has no merge event in the window is not counted.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::normalization::{ActivityEvent, EventPayload};

/// Touches a file needs before ownership is judged
const MIN_SIGNIFICANT_TOUCHES: u32 = 3;
const MAX_TOP_FILES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Hero {
    pub author: String,
    pub file_count: usize,
    pub top_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TruckFactorReport {
    pub risk_score: u32,
    pub previous_risk_score: u32,
    pub heroes: Vec<Hero>,
    /// Significant files in the current window
    pub total_files: usize,
}

impl TruckFactorReport {
    pub fn empty() -> Self {
        Self {
            risk_score: 0,
            previous_risk_score: 0,
            heroes: Vec::new(),
            total_files: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRisk {
    pub risk_score: u32,
    pub heroes: Vec<Hero>,
    pub significant_files: usize,
    pub hero_files: usize,
}

fn is_excluded(path: &str) -> bool {
    path.ends_with(".lock") || path.contains("dist/") || path.contains("node_modules/")
}

/// More than 70% of the touches, in integers
fn dominates(count: u32, total: u32) -> bool {
    count * 10 > total * 7
}

pub fn assess(events: &[ActivityEvent]) -> WindowRisk {
    let mut pr_authors: HashMap<i64, &str> = HashMap::new();
    for event in events {
        if let EventPayload::Merge(p) = &event.payload
            && !p.author.is_empty()
        {
            pr_authors.insert(p.pr_id, p.author.as_str());
        }
    }

    // file -> author -> touches, both ordered so the scan below is reproducible
    let mut file_authors: BTreeMap<&str, BTreeMap<&str, u32>> = BTreeMap::new();
    for event in events {
        let EventPayload::FileChange(p) = &event.payload else {
            continue;
        };
        if is_excluded(&p.file) {
            continue;
        }
        let Some(author) = pr_authors.get(&p.pr_id) else {
            continue;
        };
        *file_authors
            .entry(p.file.as_str())
            .or_default()
            .entry(*author)
            .or_default() += 1;
    }

    let mut significant = 0usize;
    let mut hero_files = 0usize;
    let mut by_author: BTreeMap<&str, (usize, Vec<String>)> = BTreeMap::new();

    for (file, authors) in &file_authors {
        let total: u32 = authors.values().sum();
        if total < MIN_SIGNIFICANT_TOUCHES {
            continue;
        }
        significant += 1;

        let dominant = authors
            .iter()
            .find(|(_, count)| dominates(**count, total))
            .map(|(author, _)| *author);
        if let Some(author) = dominant {
            hero_files += 1;
            let (count, files) = by_author.entry(author).or_default();
            *count += 1;
            if files.len() < MAX_TOP_FILES {
                files.push(file.to_string());
            }
        }
    }

    let mut heroes: Vec<Hero> = by_author
        .into_iter()
        .map(|(author, (file_count, top_files))| Hero {
            author: author.to_string(),
            file_count,
            top_files,
        })
        .collect();
    // Stable sort over author-ordered input breaks ties by author
    heroes.sort_by(|a, b| b.file_count.cmp(&a.file_count));

    let risk_score = if significant == 0 {
        0
    } else {
        ((200.0 * hero_files as f64 / significant as f64).round() as u32).min(100)
    };

    WindowRisk {
        risk_score,
        heroes,
        significant_files: significant,
        hero_files,
    }
}

pub fn compute(current: &[ActivityEvent], previous: &[ActivityEvent]) -> TruckFactorReport {
    let now = assess(current);
    TruckFactorReport {
        risk_score: now.risk_score,
        previous_risk_score: assess(previous).risk_score,
        heroes: now.heroes,
        total_files: now.significant_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(pr: i64, author: &str) -> ActivityEvent {
        ActivityEvent::merge(pr, author, "2025-01-01T00:00:00Z", pr)
    }

    fn touch(pr: i64, file: &str) -> ActivityEvent {
        ActivityEvent::file_change(pr, file, 1, 1, pr)
    }

    #[test]
    fn single_dominated_file_is_maximum_risk() {
        let mut events: Vec<_> = (1..=4).map(|pr| merged(pr, "alice")).collect();
        events.extend((1..=4).map(|pr| touch(pr, "src/core.ts")));

        let report = compute(&events, &[]);
        assert_eq!(report.risk_score, 100);
        assert_eq!(report.total_files, 1);
        assert_eq!(
            report.heroes,
            vec![Hero {
                author: "alice".to_string(),
                file_count: 1,
                top_files: vec!["src/core.ts".to_string()],
            }]
        );
    }

    #[test]
    fn sparse_files_are_never_significant() {
        let events = vec![
            merged(1, "alice"),
            merged(2, "alice"),
            touch(1, "src/rare.ts"),
            touch(2, "src/rare.ts"),
        ];
        let risk = assess(&events);
        assert_eq!(risk.significant_files, 0);
        assert_eq!(risk.hero_files, 0);
        assert_eq!(risk.risk_score, 0);
    }

    #[test]
    fn shared_ownership_is_not_a_hero_file() {
        // alice 2 of 3 touches is 66%, below the bar
        let events = vec![
            merged(1, "alice"),
            merged(2, "alice"),
            merged(3, "bob"),
            touch(1, "src/shared.rs"),
            touch(2, "src/shared.rs"),
            touch(3, "src/shared.rs"),
        ];
        let risk = assess(&events);
        assert_eq!(risk.significant_files, 1);
        assert_eq!(risk.hero_files, 0);
        assert!(risk.heroes.is_empty());
    }

    #[test]
    fn unattributed_and_excluded_touches_are_skipped() {
        let mut events = vec![merged(1, "alice")];
        for _ in 0..5 {
            events.push(touch(1, "node_modules/pkg/index.js"));
            events.push(touch(1, "yarn.lock"));
            // pull request 9 never merged inside the window
            events.push(touch(9, "src/orphan.rs"));
        }
        let risk = assess(&events);
        assert_eq!(risk.significant_files, 0);
    }

    #[test]
    fn heroes_sorted_by_file_count_then_author() {
        let mut events = vec![merged(1, "zed"), merged(2, "amy"), merged(3, "bob")];
        for file in ["z1", "z2"] {
            events.extend((0..3).map(|_| touch(1, file)));
        }
        for file in ["b1", "a1"] {
            let pr = if file == "b1" { 3 } else { 2 };
            events.extend((0..3).map(|_| touch(pr, file)));
        }

        let risk = assess(&events);
        let order: Vec<_> = risk.heroes.iter().map(|h| h.author.as_str()).collect();
        assert_eq!(order, vec!["zed", "amy", "bob"]);
        assert_eq!(risk.heroes[0].top_files, vec!["z1", "z2"]);
        assert_eq!(risk.risk_score, 100);
    }

    #[test]
    fn quarter_hero_files_scores_half_risk() {
        let mut events = vec![merged(1, "alice"), merged(2, "bob")];
        events.extend((0..3).map(|_| touch(1, "hero.rs")));
        for file in ["s1.rs", "s2.rs", "s3.rs"] {
            events.push(touch(1, file));
            events.push(touch(2, file));
            events.push(touch(2, file));
            events.push(touch(1, file));
        }
        let risk = assess(&events);
        assert_eq!(risk.significant_files, 4);
        assert_eq!(risk.hero_files, 1);
        assert_eq!(risk.risk_score, 50);
    }

    #[test]
    fn top_files_are_capped_at_five() {
        let mut events = vec![merged(1, "alice")];
        for i in 0..7 {
            let file = format!("src/f{i}.rs");
            events.extend((0..3).map(|_| touch(1, &file)));
        }
        let risk = assess(&events);
        assert_eq!(risk.heroes[0].file_count, 7);
        assert_eq!(risk.heroes[0].top_files.len(), 5);
        assert_eq!(risk.heroes[0].top_files[0], "src/f0.rs");
    }
}
