use chrono::{DateTime, Duration, Months, TimeZone, Utc};
use std::path::Path;

const LOG_PREFIX: &str = "letsencrypt.log";

/// How long certbot's per-domain logs are kept, parsed from settings like `"3 months"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Days(u32),
    Weeks(u32),
    Months(u32),
    Years(u32),
}

impl Default for Retention {
    fn default() -> Self {
        Retention::Months(3)
    }
}

impl Retention {
    /// Parse `"<n> <unit>"`. Malformed input is logged and replaced piecewise by the default
    /// of three months.
    pub fn parse(value: &str) -> Self {
        let parts: Vec<&str> = value.split_whitespace().collect();
        let [count, unit] = parts[..] else {
            tracing::error!("invalid log_retention format: '{value}'. Must be 'value unit'. Using default.");
            return Retention::default();
        };
        let count = count.parse().unwrap_or_else(|_| {
            tracing::error!("invalid log_retention value: '{count}'. Must be an integer. Using default.");
            3
        });
        let unit = unit.to_lowercase();
        if unit.contains("day") {
            Retention::Days(count)
        } else if unit.contains("week") {
            Retention::Weeks(count)
        } else if unit.contains("month") {
            Retention::Months(count)
        } else if unit.contains("year") {
            Retention::Years(count)
        } else {
            tracing::error!("invalid log_retention unit: '{unit}'. Defaulting to 3 months.");
            Retention::default()
        }
    }

    /// The oldest modification time that is kept. Months and years are calendar-based in the
    /// timezone of `now`.
    pub fn cutoff<Z: TimeZone>(self, now: &DateTime<Z>) -> DateTime<Utc> {
        let now = now.clone();
        let cutoff = match self {
            Retention::Days(n) => now.checked_sub_signed(Duration::days(n.into())),
            Retention::Weeks(n) => now.checked_sub_signed(Duration::weeks(n.into())),
            Retention::Months(n) => now.checked_sub_months(Months::new(n)),
            Retention::Years(n) => now.checked_sub_months(Months::new(n.saturating_mul(12))),
        };
        cutoff.map_or(DateTime::<Utc>::MIN_UTC, |c| c.with_timezone(&Utc))
    }
}

/// Delete `<certs>/<domain>/letsencrypt.log*` files last modified before `cutoff`. Returns the
/// number of files deleted; files that can't be inspected or removed are logged and skipped.
pub async fn cleanup_logs<'a, I>(certs_dir: &Path, domains: I, cutoff: DateTime<Utc>) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let mut deleted = 0;
    for domain in domains {
        let dir = certs_dir.join(domain);
        if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
            continue;
        }
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!("failed to scan directory {}: {err}", dir.display());
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!("failed to scan directory {}: {err}", dir.display());
                    break;
                }
            };
            if !entry.file_name().to_string_lossy().starts_with(LOG_PREFIX) {
                continue;
            }
            let path = entry.path();
            match remove_if_older(&path, cutoff).await {
                Ok(true) => {
                    tracing::info!("deleted old log: {}", path.display());
                    deleted += 1;
                }
                Ok(false) => {}
                Err(err) => tracing::error!("failed to check or delete log {}: {err}", path.display()),
            }
        }
    }
    deleted
}

async fn remove_if_older(path: &Path, cutoff: DateTime<Utc>) -> std::io::Result<bool> {
    let modified: DateTime<Utc> = tokio::fs::metadata(path).await?.modified()?.into();
    if modified >= cutoff {
        return Ok(false);
    }
    tokio::fs::remove_file(path).await?;
    Ok(true)
}
