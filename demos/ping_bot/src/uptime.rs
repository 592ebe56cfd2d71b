//! An api that remembers when the bot came up.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::info;
use ward::prelude::*;

#[derive(Default)]
pub struct Uptime {
    core: ImportableCore<NoData>,
    started: OnceLock<Instant>,
}

impl Uptime {
    /// Time since the first start, if the api has been started.
    pub fn uptime(&self) -> Option<Duration> {
        self.started.get().map(Instant::elapsed)
    }
}

impl Importable for Uptime {
    type Data = NoData;

    fn default_id(&self) -> String {
        "uptime".into()
    }

    fn core(&self) -> &ImportableCore<NoData> {
        &self.core
    }
}

#[async_trait]
impl Api for Uptime {
    async fn on_start(&self) -> HookResult {
        if self.started.set(Instant::now()).is_ok() {
            info!(id = %self.id(), "Uptime clock started");
        }
        Ok(())
    }
}

/// Formats a duration as `1d 2h 3m 4s`, dropping leading zero units.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        secs / 3_600 % 24,
        secs / 60 % 60,
        secs % 60,
    );

    let mut parts = Vec::new();
    for (value, unit) in [(days, "d"), (hours, "h"), (minutes, "m")] {
        if value > 0 || !parts.is_empty() {
            parts.push(format!("{value}{unit}"));
        }
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(61)), "1m 1s");
        assert_eq!(format_duration(Duration::from_secs(3_600)), "1h 0m 0s");
        assert_eq!(
            format_duration(Duration::from_secs(90_061)),
            "1d 1h 1m 1s"
        );
    }

    #[tokio::test]
    async fn test_uptime_set_on_start() {
        let uptime = Uptime::default();
        assert!(uptime.uptime().is_none());
        uptime.on_start().await.unwrap();
        assert!(uptime.uptime().is_some());
    }
}
