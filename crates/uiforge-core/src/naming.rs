use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Names for projects created during post-login reconciliation.
#[derive(Clone)]
pub struct ProjectNamer {
    clock: Clock,
    last_sequence: Arc<AtomicU64>,
}

impl ProjectNamer {
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            clock: Arc::new(clock),
            last_sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// e.g. `Design from 3/1/2026, 4:05:09 PM`
    pub fn anonymous_import_name(&self) -> String {
        let now = (self.clock)();
        format!("Design from {}", now.format("%-m/%-d/%Y, %-I:%M:%S %p"))
    }

    /// `New Design #<n>`, where `n` strictly increases even when called
    /// several times within one millisecond.
    pub fn blank_project_name(&self) -> String {
        format!("New Design #{}", self.next_sequence())
    }

    fn next_sequence(&self) -> u64 {
        let now = (self.clock)().timestamp_millis().max(0) as u64;
        let previous = self
            .last_sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}

impl Default for ProjectNamer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_clock() -> ProjectNamer {
        ProjectNamer::with_clock(|| {
            Utc.with_ymd_and_hms(2026, 3, 1, 16, 5, 9)
                .single()
                .unwrap_or_default()
        })
    }

    #[test]
    fn anonymous_import_name_is_human_readable() {
        assert_eq!(
            fixed_clock().anonymous_import_name(),
            "Design from 3/1/2026, 4:05:09 PM"
        );
    }

    #[test]
    fn blank_names_are_unique_under_a_frozen_clock() {
        let namer = fixed_clock();
        let first = namer.blank_project_name();
        let second = namer.blank_project_name();
        let third = namer.clone().blank_project_name();
        assert_ne!(first, second);
        assert_ne!(second, third);
        for name in [&first, &second, &third] {
            let n = name.strip_prefix("New Design #").expect("prefix");
            assert!(n.parse::<u64>().is_ok(), "{name}");
        }
    }

    #[test]
    fn blank_names_follow_the_clock_when_it_moves_forward() {
        let namer = ProjectNamer::new();
        let name = namer.blank_project_name();
        let n: i64 = name
            .trim_start_matches("New Design #")
            .parse()
            .expect("number");
        assert!(n >= Utc::now().timestamp_millis() - 60_000);
    }
}
