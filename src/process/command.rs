//! Transcoder invocation
//!
//! Builds the fixed argument template used to relay a source into the
//! streaming server. Only the binary and codec parameters are configurable;
//! the shape of the command line is not.

use std::process::Stdio;

use tokio::process::Command;

use super::SpawnError;

/// Transcoder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderConfig {
    /// Binary name or path (looked up in `PATH` when bare)
    pub binary: String,

    /// Read the input at its native frame rate (`-re`)
    pub realtime: bool,

    /// Video encoder
    pub video_codec: String,

    /// Encoder preset
    pub preset: String,

    /// Constant rate factor
    pub crf: u8,

    /// Audio encoder
    pub audio_codec: String,

    /// Output container
    pub format: String,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            realtime: true,
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            format: "flv".to_string(),
        }
    }
}

impl TranscoderConfig {
    /// Set the transcoder binary
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set the video encoder and preset
    pub fn video(mut self, codec: impl Into<String>, preset: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self.preset = preset.into();
        self
    }

    /// Set the constant rate factor (capped at 51)
    pub fn crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    /// Set the audio encoder
    pub fn audio_codec(mut self, codec: impl Into<String>) -> Self {
        self.audio_codec = codec.into();
        self
    }
}

/// A fully resolved transcoder command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderCommand {
    program: String,
    args: Vec<String>,
}

impl TranscoderCommand {
    /// Create a command from an explicit program and argument list
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the relay command for `source` → `output`
    ///
    /// RTSP sources are forced onto TCP transport. Neither URI may look like
    /// an option flag.
    pub fn relay(config: &TranscoderConfig, source: &str, output: &str) -> Result<Self, SpawnError> {
        check_operand("source", source)?;
        check_operand("output", output)?;

        let mut args = Vec::with_capacity(18);
        if config.realtime {
            args.push("-re".to_string());
        }
        if is_rtsp(source) {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        args.extend([
            "-i".to_string(),
            source.to_string(),
            "-c:v".to_string(),
            config.video_codec.clone(),
            "-preset".to_string(),
            config.preset.clone(),
            "-crf".to_string(),
            config.crf.to_string(),
            "-c:a".to_string(),
            config.audio_codec.clone(),
            "-f".to_string(),
            config.format.clone(),
            output.to_string(),
        ]);

        Ok(Self {
            program: config.binary.clone(),
            args,
        })
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument list
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Build a tokio command with all stdio wired for supervision
    pub(super) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn is_rtsp(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("rtsp://") || lower.starts_with("rtsps://")
}

fn check_operand(name: &'static str, value: &str) -> Result<(), SpawnError> {
    if value.trim().is_empty() {
        return Err(SpawnError::InvalidArgument(format!("{name} is empty")));
    }
    if value.starts_with('-') {
        return Err(SpawnError::InvalidArgument(format!(
            "{name} must not start with '-'"
        )));
    }
    Ok(())
}
