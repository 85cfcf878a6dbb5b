//! Forwarding pipeline configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where pipeline stdout/stderr end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRouting {
    /// Forward each line into tracing
    #[default]
    Stdout,
    /// Drop pipeline output
    Discard,
}

impl FromStr for LogRouting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogRouting::Stdout),
            "discard" | "none" | "null" => Ok(LogRouting::Discard),
            other => Err(format!("unknown log routing '{other}', expected stdout or discard")),
        }
    }
}

impl fmt::Display for LogRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRouting::Stdout => write!(f, "stdout"),
            LogRouting::Discard => write!(f, "discard"),
        }
    }
}

/// Parameters of the cloud sink pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Sink stream identifier
    pub stream_name: String,

    pub region: String,

    pub retention_hours: u32,

    pub fragment_duration_ms: u32,

    /// Sink buffer size in MiB
    pub buffer_size_mb: u32,

    pub log_routing: LogRouting,

    /// Pipeline executable
    pub program: String,
}

impl PipelineConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            ..Default::default()
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn retention_hours(mut self, hours: u32) -> Self {
        self.retention_hours = hours;
        self
    }

    pub fn fragment_duration_ms(mut self, ms: u32) -> Self {
        self.fragment_duration_ms = ms;
        self
    }

    pub fn buffer_size_mb(mut self, mb: u32) -> Self {
        self.buffer_size_mb = mb;
        self
    }

    pub fn log_routing(mut self, routing: LogRouting) -> Self {
        self.log_routing = routing;
        self
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// `kvssink` element with its properties, shared by push and pull pipelines
    pub fn sink_element(&self) -> Vec<String> {
        vec![
            "kvssink".to_string(),
            format!("stream-name={}", self.stream_name),
            format!("aws-region={}", self.region),
            format!("retention-period={}", self.retention_hours),
            format!("fragment-duration={}", self.fragment_duration_ms),
            format!("storage-size={}", self.buffer_size_mb),
            "key-frame-fragmentation=true".to_string(),
        ]
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            region: "us-east-1".to_string(),
            retention_hours: 24,
            fragment_duration_ms: 2000,
            buffer_size_mb: 512,
            log_routing: LogRouting::Stdout,
            program: "gst-launch-1.0".to_string(),
        }
    }
}

/// Supervisor timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorPolicy {
    /// Minimum spacing between restarts
    pub restart_cooldown: Duration,

    /// Wait after SIGINT before escalating
    pub interrupt_wait: Duration,

    /// Wait after SIGTERM before escalating
    pub terminate_wait: Duration,

    /// Wait after SIGKILL before reporting a possible leak
    pub kill_wait: Duration,

    /// Throughput log interval
    pub report_interval: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            restart_cooldown: Duration::from_secs(5),
            interrupt_wait: Duration::from_secs(5),
            terminate_wait: Duration::from_secs(3),
            kill_wait: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
        }
    }
}

impl SupervisorPolicy {
    pub fn restart_cooldown(mut self, cooldown: Duration) -> Self {
        self.restart_cooldown = cooldown;
        self
    }

    /// Use the same wait for every shutdown stage
    pub fn shutdown_waits(mut self, wait: Duration) -> Self {
        self.interrupt_wait = wait;
        self.terminate_wait = wait;
        self.kill_wait = wait;
        self
    }

    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::new("cam-1");
        assert_eq!(config.stream_name, "cam-1");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.fragment_duration_ms, 2000);
        assert_eq!(config.buffer_size_mb, 512);
        assert_eq!(config.log_routing, LogRouting::Stdout);
        assert_eq!(config.program, "gst-launch-1.0");
    }

    #[test]
    fn test_sink_element() {
        let config = PipelineConfig::new("cam-1")
            .region("eu-west-1")
            .retention_hours(48);
        let sink = config.sink_element();

        assert_eq!(sink[0], "kvssink");
        assert!(sink.contains(&"stream-name=cam-1".to_string()));
        assert!(sink.contains(&"aws-region=eu-west-1".to_string()));
        assert!(sink.contains(&"retention-period=48".to_string()));
        assert!(sink.contains(&"key-frame-fragmentation=true".to_string()));
    }

    #[test]
    fn test_log_routing_parse() {
        assert_eq!("stdout".parse::<LogRouting>(), Ok(LogRouting::Stdout));
        assert_eq!("DISCARD".parse::<LogRouting>(), Ok(LogRouting::Discard));
        assert!("file".parse::<LogRouting>().is_err());
        assert_eq!(LogRouting::Discard.to_string(), "discard");
    }

    #[test]
    fn test_policy_builder() {
        let policy = SupervisorPolicy::default()
            .restart_cooldown(Duration::from_millis(50))
            .shutdown_waits(Duration::from_millis(10));
        assert_eq!(policy.restart_cooldown, Duration::from_millis(50));
        assert_eq!(policy.kill_wait, Duration::from_millis(10));
        assert_eq!(policy.report_interval, Duration::from_secs(10));
    }
}
