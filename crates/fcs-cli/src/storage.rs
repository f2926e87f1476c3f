//! Report storage
//!
//! Every `fcs run` is saved under the configured report directory as
//! `{discovery}_{timestamp}/` holding `report.json`, `summary.json` and a
//! `config.toml` snapshot.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fcs_core::{Config, Report, Summary};

/// Everything persisted for one run
pub struct ReportData<'a> {
    pub config: &'a Config,
    /// Discovery model name, used in the directory name
    pub discovery_name: &'a str,
    pub report: &'a Report,
    pub summary: &'a Summary,
    pub duration_secs: f64,
}

/// Save a run into a new timestamped directory under `base`.
///
/// Returns the directory written.
pub fn save_report(base: &Path, data: &ReportData) -> Result<PathBuf, std::io::Error> {
    let dir = base.join(build_dir_name(data.discovery_name));
    std::fs::create_dir_all(&dir)?;

    let config_toml =
        toml::to_string_pretty(data.config).map_err(|e| std::io::Error::other(e.to_string()))?;
    std::fs::write(dir.join("config.toml"), config_toml)?;

    std::fs::write(dir.join("report.json"), to_json(data.report)?)?;

    let summary = serde_json::json!({
        "summary": data.summary,
        "meta": {
            "timestamp": timestamp_iso(),
            "duration_secs": data.duration_secs,
            "discovery": data.config.discovery.display().to_string(),
            "manifest": data.config.manifest.display().to_string(),
        },
    });
    std::fs::write(dir.join("summary.json"), to_json(&summary)?)?;

    Ok(dir)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, std::io::Error> {
    serde_json::to_string_pretty(value).map_err(|e| std::io::Error::other(e.to_string()))
}

/// `{name}_{timestamp}`, name reduced to filesystem-safe characters
fn build_dir_name(discovery_name: &str) -> String {
    let name: String = discovery_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let name = if name.is_empty() { "run".to_string() } else { name };
    format!("{name}_{}", timestamp_compact())
}

/// `20261018T193000`
fn timestamp_compact() -> String {
    let (y, mo, d, h, mi, s) = utc_now();
    format!("{y:04}{mo:02}{d:02}T{h:02}{mi:02}{s:02}")
}

/// `2026-10-18T19:30:00Z`
fn timestamp_iso() -> String {
    let (y, mo, d, h, mi, s) = utc_now();
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
}

fn utc_now() -> (i32, u32, u32, u32, u32, u32) {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (y, m, d) = civil_from_days(i64::try_from(secs / 86_400).unwrap_or_default());
    let tod = u32::try_from(secs % 86_400).unwrap_or_default();
    (y, m, d, tod / 3600, (tod % 3600) / 60, tod % 60)
}

/// Days since the Unix epoch to a proleptic Gregorian (year, month, day).
///
/// <https://howardhinnant.github.io/date_algorithms.html#civil_from_days>
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = i64::from(yoe) + era * 400 + i64::from(m <= 2);
    (y as i32, m, d)
}
