//! Pull pipeline command construction

use tokio::process::Command;

use super::source::PullSource;
use crate::forwarder::PipelineConfig;

/// Builds the command for one pull run
pub trait SourceLauncher: Send + Sync {
    fn command(&self, source: &PullSource, config: &PipelineConfig) -> Command;
}

impl<F> SourceLauncher for F
where
    F: Fn(&PullSource, &PipelineConfig) -> Command + Send + Sync,
{
    fn command(&self, source: &PullSource, config: &PipelineConfig) -> Command {
        self(source, config)
    }
}

/// `gst-launch-1.0` pulling RTSP and forwarding to the cloud sink
///
/// ```text
/// -e rtspsrc location=... ! rtph264depay ! h264parse ! video/x-h264,... ! kvssink ...
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GstPullLauncher;

impl GstPullLauncher {
    pub fn arguments(source: &PullSource, config: &PipelineConfig) -> Vec<String> {
        let mut args = vec![
            // EOS on SIGINT so the sink flushes its last fragment
            "-e".to_string(),
            "-q".to_string(),
            "rtspsrc".to_string(),
            format!("location={}", source.url()),
            format!("protocols={}", source.transport),
            format!("retry={}", source.retry),
            // rtspsrc takes microseconds
            format!("timeout={}", source.timeout.as_micros()),
        ];
        if source.is_tls() {
            // Lab cameras use self-signed certificates
            args.push("tls-validation-flags=0".to_string());
        }
        for element in [
            "rtph264depay",
            "h264parse",
            "video/x-h264,stream-format=avc,alignment=au",
        ] {
            args.push("!".to_string());
            args.push(element.to_string());
        }
        args.push("!".to_string());
        args.extend(config.sink_element());
        args
    }
}

impl SourceLauncher for GstPullLauncher {
    fn command(&self, source: &PullSource, config: &PipelineConfig) -> Command {
        let mut command = Command::new(&config.program);
        command.args(Self::arguments(source, config));
        command
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pull::Transport;

    #[test]
    fn test_rtsp_arguments() {
        let source = PullSource::parse("rtsp://cam.local/ch1")
            .unwrap()
            .transport(Transport::Udp)
            .retry(5)
            .timeout(Duration::from_secs(2));
        let args = GstPullLauncher::arguments(&source, &PipelineConfig::new("cam-1"));

        assert_eq!(&args[..2], &["-e", "-q"]);
        assert_eq!(args[2], "rtspsrc");
        assert_eq!(args[3], "location=rtsp://cam.local/ch1");
        assert!(args.contains(&"protocols=udp".to_string()));
        assert!(args.contains(&"retry=5".to_string()));
        assert!(args.contains(&"timeout=2000000".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("tls-validation-flags")));

        let depay = args.iter().position(|a| a == "rtph264depay").unwrap();
        let sink = args.iter().position(|a| a == "kvssink").unwrap();
        assert!(depay < sink);
        assert!(args.contains(&"stream-name=cam-1".to_string()));
    }

    #[test]
    fn test_rtsps_disables_tls_validation() {
        let source = PullSource::parse("rtsps://cam.local/ch1").unwrap();
        let args = GstPullLauncher::arguments(&source, &PipelineConfig::new("cam-1"));
        assert!(args.contains(&"tls-validation-flags=0".to_string()));
    }
}
