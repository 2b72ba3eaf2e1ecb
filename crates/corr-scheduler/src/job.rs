//! Scheduled job records, recurrence rules and the persisted table

use crate::error::SchedulerError;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use corr_core::TaskSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Recurrence rule for a scheduled job
///
/// All times of day are UTC. `Interval` repeats on a fixed period; `Daily`
/// and `Weekly` fire at a wall-clock time. Persisted as the
/// `schedule_type`/`schedule_params` pair of the job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "schedule_type",
    content = "schedule_params",
    rename_all = "snake_case"
)]
pub enum ScheduleSpec {
    /// Every `every_secs` seconds
    Interval { every_secs: u64 },
    /// Every day at `time` ("HH:MM")
    Daily { time: String },
    /// Every week on `day` ("monday".."sunday") at `time` ("HH:MM")
    Weekly { day: String, time: String },
}

impl ScheduleSpec {
    /// The first firing time strictly after `after`
    ///
    /// Also serves as validation: an unparseable time or weekday, or a zero
    /// interval, yields `InvalidSchedule`.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        match self {
            Self::Interval { every_secs } => {
                if *every_secs == 0 {
                    return Err(SchedulerError::InvalidSchedule(
                        "Interval must be at least one second".to_string(),
                    ));
                }
                Ok(after + Duration::seconds(*every_secs as i64))
            }
            Self::Daily { time } => {
                let t = parse_time_of_day(time)?;
                let mut candidate = after.date_naive().and_time(t).and_utc();
                if candidate <= after {
                    candidate += Duration::days(1);
                }
                Ok(candidate)
            }
            Self::Weekly { day, time } => {
                let weekday = Weekday::from_str(day).map_err(|_| {
                    SchedulerError::InvalidSchedule(format!("Unknown weekday: {day}"))
                })?;
                let t = parse_time_of_day(time)?;
                let days_ahead = i64::from(
                    (weekday.num_days_from_monday() + 7 - after.weekday().num_days_from_monday())
                        % 7,
                );
                let mut candidate = (after.date_naive() + Duration::days(days_ahead))
                    .and_time(t)
                    .and_utc();
                if candidate <= after {
                    candidate += Duration::days(7);
                }
                Ok(candidate)
            }
        }
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, SchedulerError> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| {
        SchedulerError::InvalidSchedule(format!("Invalid time of day: {s} (expected HH:MM)"))
    })
}

/// The action a job performs when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSpec {
    /// Enqueue a task on a named agent
    AgentTask { agent_id: String, task: TaskSpec },
    /// Start a workflow (kind is parsed by the dispatcher)
    Workflow {
        workflow_type: String,
        symbols: Vec<String>,
    },
    /// Run a system-wide health check
    HealthCheck,
}

/// One persisted scheduled job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job_id: String,
    pub job_name: String,
    #[serde(flatten)]
    pub schedule: ScheduleSpec,
    #[serde(rename = "job_config")]
    pub job_spec: JobSpec,
    pub created_at: DateTime<Utc>,
    /// Completion time of the last successful execution
    pub last_run: Option<DateTime<Utc>>,
    /// Next firing time; `None` while disabled
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    /// Monotone count of failed executions, retries included
    pub failure_count: u64,
    pub enabled: bool,
}

/// The persisted job table
///
/// `job_counter` survives restarts so job ids never repeat within one
/// schedule file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobTable {
    pub jobs: BTreeMap<String, ScheduledJob>,
    pub job_counter: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_interval_next_run() {
        let spec = ScheduleSpec::Interval { every_secs: 3600 };
        let after = at(2025, 6, 2, 9, 30);
        assert_eq!(spec.next_run_after(after).unwrap(), at(2025, 6, 2, 10, 30));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let spec = ScheduleSpec::Interval { every_secs: 0 };
        assert!(matches!(
            spec.next_run_after(Utc::now()),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_daily_rolls_to_tomorrow() {
        let spec = ScheduleSpec::Daily {
            time: "06:00".to_string(),
        };
        // 09:30 is past 06:00, so the next firing is tomorrow morning
        let after = at(2025, 6, 2, 9, 30);
        assert_eq!(spec.next_run_after(after).unwrap(), at(2025, 6, 3, 6, 0));

        // 05:00 is before 06:00, so it fires later the same day
        let after = at(2025, 6, 2, 5, 0);
        assert_eq!(spec.next_run_after(after).unwrap(), at(2025, 6, 2, 6, 0));
    }

    #[test]
    fn test_weekly_next_run() {
        let spec = ScheduleSpec::Weekly {
            day: "friday".to_string(),
            time: "17:00".to_string(),
        };
        // 2025-06-02 is a Monday
        let after = at(2025, 6, 2, 12, 0);
        assert_eq!(spec.next_run_after(after).unwrap(), at(2025, 6, 6, 17, 0));

        // Friday after the firing time rolls a full week
        let after = at(2025, 6, 6, 18, 0);
        assert_eq!(spec.next_run_after(after).unwrap(), at(2025, 6, 13, 17, 0));
    }

    #[test]
    fn test_invalid_time_and_weekday() {
        let spec = ScheduleSpec::Daily {
            time: "25:99".to_string(),
        };
        assert!(matches!(
            spec.next_run_after(Utc::now()),
            Err(SchedulerError::InvalidSchedule(_))
        ));

        let spec = ScheduleSpec::Weekly {
            day: "someday".to_string(),
            time: "09:00".to_string(),
        };
        assert!(matches!(
            spec.next_run_after(Utc::now()),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_job_spec_wire_format() {
        let spec = JobSpec::Workflow {
            workflow_type: "quick_analysis".to_string(),
            symbols: vec!["AAPL".to_string()],
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["kind"], "workflow");

        let back: JobSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn test_persisted_record_shape() {
        let job = ScheduledJob {
            job_id: "job_1_1717320000".to_string(),
            job_name: "Nightly Collection".to_string(),
            schedule: ScheduleSpec::Daily {
                time: "02:00".to_string(),
            },
            job_spec: JobSpec::HealthCheck,
            created_at: Utc::now(),
            last_run: None,
            next_run: None,
            run_count: 0,
            failure_count: 0,
            enabled: true,
        };

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["schedule_type"], "daily");
        assert_eq!(json["schedule_params"]["time"], "02:00");
        assert_eq!(json["job_config"]["kind"], "health_check");

        let back: ScheduledJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.schedule, job.schedule);
        assert_eq!(back.job_spec, job.job_spec);
    }
}
