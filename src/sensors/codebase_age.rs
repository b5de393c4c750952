//! Codebase Age: a heuristic "effective year" for a JavaScript/TypeScript
//! stack, read from `package.json` and `tsconfig.json` on the default branch.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

use crate::connectors::github::GitHubClient;

const BASE_YEAR: i32 = 2024;
const MAX_YEAR: i32 = 2025;

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)//.*$").expect("valid regex literal"));
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex literal"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
    Modern,
    Neutral,
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgeMarker {
    pub marker: String,
    pub impact: String,
    pub status: MarkerStatus,
}

impl AgeMarker {
    fn new(marker: impl Into<String>, impact: &str, status: MarkerStatus) -> Self {
        Self {
            marker: marker.into(),
            impact: impact.to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CodebaseAgeReport {
    pub year: i32,
    /// `Modern Stack`, `Legacy Stack` or `Unknown`
    pub status: String,
    pub points: Vec<AgeMarker>,
}

impl CodebaseAgeReport {
    /// Returned when the repository files could not be fetched at all.
    pub fn analysis_failed() -> Self {
        Self {
            year: BASE_YEAR,
            status: "Unknown".to_string(),
            points: vec![AgeMarker::new(
                "Analysis Failed",
                "Unknown",
                MarkerStatus::Neutral,
            )],
        }
    }
}

struct Tally {
    year: i32,
    modern: bool,
    points: Vec<AgeMarker>,
}

impl Tally {
    fn modern(&mut self, marker: impl Into<String>, impact: &str, years: i32) {
        self.year += years;
        self.points
            .push(AgeMarker::new(marker, impact, MarkerStatus::Modern));
    }

    fn neutral(&mut self, marker: impl Into<String>, impact: &str) {
        self.points
            .push(AgeMarker::new(marker, impact, MarkerStatus::Neutral));
    }

    /// `status` is usually legacy; React 17 is reported neutral but still ages the stack
    fn ages(&mut self, marker: impl Into<String>, impact: &str, status: MarkerStatus, years: i32) {
        self.year -= years;
        self.modern = false;
        self.points.push(AgeMarker::new(marker, impact, status));
    }
}

fn dependency<'a>(manifest: &'a Value, sections: &[&str], name: &str) -> Option<&'a Value> {
    sections
        .iter()
        .find_map(|section| manifest.get(*section).and_then(|deps| deps.get(name)))
}

/// Leading integer of a semver range such as `^18.2.0` or `>=17`.
fn major_version(range: &str) -> Option<u32> {
    let cleaned: String = range
        .chars()
        .filter(|c| !matches!(c, '^' | '~' | '>' | '=' | '<'))
        .collect();
    let digits: String = cleaned
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn inspect_manifest(tally: &mut Tally, manifest: &Value) {
    let react = dependency(
        manifest,
        &["dependencies", "devDependencies", "peerDependencies"],
        "react",
    )
    .and_then(Value::as_str);

    // A range with no leading major (`latest`, `*`, `workspace:*`) scores as old React
    if let Some(range) = react {
        match major_version(range) {
            Some(major) if major >= 18 => tally.modern(format!("React {major}"), "+2 years", 2),
            Some(17) => tally.ages("React 17", "Neutral", MarkerStatus::Neutral, 1),
            Some(major) => tally.ages(
                format!("React {major}"),
                "-2 years",
                MarkerStatus::Legacy,
                3,
            ),
            None => tally.ages(
                format!("React {range}"),
                "-2 years",
                MarkerStatus::Legacy,
                3,
            ),
        }
    }

    if manifest.get("type").and_then(Value::as_str) == Some("module") {
        tally.modern("ESM Native", "+1 year", 1);
    } else if dependency(manifest, &["devDependencies", "dependencies"], "vite").is_some()
        || dependency(manifest, &["dependencies"], "next").is_some()
    {
        tally.neutral("Bundled (Vite/Next)", "Neutral");
    } else {
        tally.ages("CommonJS detected", "-2 years", MarkerStatus::Legacy, 2);
    }
}

fn inspect_tsconfig(tally: &mut Tally, raw: &str) {
    let stripped = LINE_COMMENT.replace_all(raw, "");
    let stripped = BLOCK_COMMENT.replace_all(&stripped, "");

    match serde_json::from_str::<Value>(&stripped) {
        Ok(config) => {
            let strict = config
                .get("compilerOptions")
                .and_then(|opts| opts.get("strict"))
                .and_then(Value::as_bool);
            if strict == Some(true) {
                tally.modern("Strict TypeScript", "+1 year", 1);
            } else {
                tally.ages("No Strict TS", "-1 year", MarkerStatus::Legacy, 1);
            }
        }
        Err(_) if raw.contains(r#""strict": true"#) => {
            tally.modern("Strict TypeScript", "+1 year", 1);
        }
        Err(_) => tally.neutral("TS Config Parse Error", "Unknown"),
    }
}

/// Score the two configuration files. `None` means the file does not exist.
pub fn analyze(manifest: Option<&str>, tsconfig: Option<&str>) -> CodebaseAgeReport {
    let mut tally = Tally {
        year: BASE_YEAR,
        modern: true,
        points: Vec::new(),
    };

    // Arrays are inspected like objects and simply find no dependencies
    match manifest.map(serde_json::from_str::<Value>) {
        Some(Ok(value)) if value.is_object() || value.is_array() => {
            inspect_manifest(&mut tally, &value)
        }
        Some(Ok(_)) => tally.neutral("Invalid package.json", "Unknown"),
        Some(Err(error)) => warn!(%error, "Skipping unparsable package.json"),
        None => tally.neutral("No package.json", "Unknown"),
    }

    match tsconfig {
        Some(raw) => inspect_tsconfig(&mut tally, raw),
        None if manifest.is_some() => {
            tally.ages("No TypeScript", "-1 year", MarkerStatus::Legacy, 1)
        }
        None => {}
    }

    CodebaseAgeReport {
        year: tally.year.min(MAX_YEAR),
        status: if tally.modern {
            "Modern Stack"
        } else {
            "Legacy Stack"
        }
        .to_string(),
        points: tally.points,
    }
}

/// Fetch both files and score them. Never fails: a transport error yields
/// [`CodebaseAgeReport::analysis_failed`].
pub async fn inspect(github: &GitHubClient, access_token: &str, full_name: &str) -> CodebaseAgeReport {
    let (manifest, tsconfig) = tokio::join!(
        github.get_file_contents(access_token, full_name, "package.json"),
        github.get_file_contents(access_token, full_name, "tsconfig.json"),
    );

    match (manifest, tsconfig) {
        (Ok(manifest), Ok(tsconfig)) => analyze(manifest.as_deref(), tsconfig.as_deref()),
        (Err(error), _) | (_, Err(error)) => {
            warn!(repo = full_name, %error, "Codebase age analysis failed");
            CodebaseAgeReport::analysis_failed()
        }
    }
}

/// Canned result for callers without a GitHub session.
///
/// Stub: the choice depends only on whether the id contains a `7` or a `1`,
/// not on the repository's contents.
pub fn placeholder_report(github_repo_id: i64) -> CodebaseAgeReport {
    let id = github_repo_id.to_string();
    if id.contains('7') || id.contains('1') {
        CodebaseAgeReport {
            year: 2019,
            status: "Legacy Stack".to_string(),
            points: vec![
                AgeMarker::new("React < 17", "-2 years", MarkerStatus::Legacy),
                AgeMarker::new("CommonJS detected", "-2 years", MarkerStatus::Legacy),
                AgeMarker::new("No Strict TS", "-1 year", MarkerStatus::Legacy),
            ],
        }
    } else {
        CodebaseAgeReport {
            year: 2023,
            status: "Modern Stack".to_string(),
            points: vec![
                AgeMarker::new("React 18+", "+2 years", MarkerStatus::Modern),
                AgeMarker::new("ESM Native", "+1 year", MarkerStatus::Modern),
                AgeMarker::new("Strict TypeScript", "+1 year", MarkerStatus::Modern),
            ],
        }
    }
}
