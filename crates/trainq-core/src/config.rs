use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How the queue picks the next job to dispatch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOrder {
    /// Strict admission order; priority is stored but not consulted.
    #[default]
    Fifo,
    /// Higher priority first, admission order within the same priority.
    Priority,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Delay before a transiently failed attempt is repeated.
    #[serde(
        serialize_with = "serialize_human_duration",
        deserialize_with = "deserialize_human_duration"
    )]
    pub retry_backoff: Duration,
    /// How many times a transient failure is retried.
    pub transient_retry_limit: u32,
    /// Periodic reprocessing of the queue, in addition to the reprocessing
    /// triggered by freed resources. `None` disables the timer.
    #[serde(
        serialize_with = "serialize_human_duration_opt",
        deserialize_with = "deserialize_human_duration_opt"
    )]
    pub reprocess_interval: Option<Duration>,
    #[serde(
        serialize_with = "serialize_human_duration",
        deserialize_with = "deserialize_human_duration"
    )]
    pub memory_sample_interval: Duration,
    /// Fail jobs running longer than their `max_runtime_hours`.
    pub enforce_time_limit: bool,
    pub dispatch_order: DispatchOrder,
    /// Dispatch later queue entries when the head cannot be placed.
    pub backfill: bool,
    /// Reject requests that no registered resource could ever hold.
    pub reject_unsatisfiable: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            retry_backoff: Duration::from_secs(5),
            transient_retry_limit: 1,
            reprocess_interval: Some(Duration::from_secs(30)),
            memory_sample_interval: Duration::from_secs(1),
            enforce_time_limit: false,
            dispatch_order: DispatchOrder::Fifo,
            backfill: false,
            reject_unsatisfiable: true,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.memory_sample_interval.is_zero() {
            return Err("memory_sample_interval must be greater than zero".into());
        }
        if self.reprocess_interval.is_some_and(|d| d.is_zero()) {
            return Err("reprocess_interval must be greater than zero".into());
        }
        Ok(())
    }
}

fn serialize_human_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

fn serialize_human_duration_opt<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => serialize_human_duration(duration, serializer),
        None => serializer.serialize_none(),
    }
}

fn deserialize_human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    humantime::parse_duration(&buf).map_err(serde::de::Error::custom)
}

fn deserialize_human_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = Option::<String>::deserialize(deserializer)?;
    match buf.as_deref() {
        None | Some("never") => Ok(None),
        Some(value) => humantime::parse_duration(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
