//! Pipeline command construction

use tokio::process::Command;

use super::config::PipelineConfig;

/// Builds the command for one pipeline run
///
/// The supervisor sets stdio, credentials and process-group options on the
/// returned command before spawning it.
pub trait PipelineLauncher: Send + Sync {
    fn command(&self, config: &PipelineConfig) -> Command;
}

impl<F> PipelineLauncher for F
where
    F: Fn(&PipelineConfig) -> Command + Send + Sync,
{
    fn command(&self, config: &PipelineConfig) -> Command {
        self(config)
    }
}

/// `gst-launch-1.0` reading an Annex-B H.264 stream from stdin
///
/// ```text
/// -e fdsrc fd=0 ! h264parse ! video/x-h264,stream-format=avc,alignment=au ! kvssink ...
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct GstLauncher;

impl GstLauncher {
    pub fn arguments(config: &PipelineConfig) -> Vec<String> {
        let mut args: Vec<String> = [
            // EOS on SIGINT so the sink flushes its last fragment
            "-e",
            "-q",
            "fdsrc",
            "fd=0",
            "!",
            "h264parse",
            "!",
            "video/x-h264,stream-format=avc,alignment=au",
            "!",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(config.sink_element());
        args
    }
}

impl PipelineLauncher for GstLauncher {
    fn command(&self, config: &PipelineConfig) -> Command {
        let mut command = Command::new(&config.program);
        command.args(Self::arguments(config));
        command
    }
}
