/*!
Decode and simulation sessions.

A decode session runs one worker thread per capture file. Each worker loads
the capture, analyzes it and writes `<capture>.frames.json`; results come
back to the session over a channel so one bad file does not stop the rest.

A simulation session writes a generated capture, plus the configuration that
produced it, into a timestamped subdirectory.
*/

use anyhow::{anyhow, bail, Context, Result};
use asyncframe::{Analyzer, AsyncSerialAnalyzer, CancelToken, DecodeError, Frame, Marker, Settings, Waveform};
use chrono::Local;
use crossbeam_channel::unbounded;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{error, info, warn};

use crate::config::{AppConfig, OutputConfig};

/// Outcome of decoding one capture file
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub frames: usize,
    pub errors: usize,
    pub bit_rate: u32,
    pub reran: bool,
    pub cancelled: bool,
}

/// JSON layout of a `.frames.json` file
#[derive(Serialize)]
struct FramesFile<'a> {
    source: String,
    sample_rate: u32,
    bit_rate: u32,
    autobaud_rerun: bool,
    cancelled: bool,
    error_count: usize,
    frames: &'a [Frame],
    #[serde(skip_serializing_if = "Option::is_none")]
    markers: Option<&'a [Marker]>,
}

/// Decodes a batch of capture files in parallel
pub struct DecodeSession {
    settings: Settings,
    output: OutputConfig,
    cancel: CancelToken,
}

impl DecodeSession {
    pub fn new(settings: Settings, output: OutputConfig) -> Result<Self> {
        settings.validate().with_context(|| "Invalid decoder settings")?;
        Ok(Self {
            settings,
            output,
            cancel: CancelToken::new(),
        })
    }

    /// Token that stops every worker after its current frame
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Decode every input. Fails only if no capture could be decoded.
    pub fn run(&self, inputs: &[PathBuf]) -> Result<Vec<CaptureReport>> {
        if inputs.is_empty() {
            bail!("No capture files given");
        }
        if !self.output.directory.is_empty() {
            fs::create_dir_all(&self.output.directory)
                .with_context(|| format!("Failed to create output directory: {}", self.output.directory))?;
        }

        let (result_tx, result_rx) = unbounded::<(PathBuf, Result<CaptureReport>)>();
        let mut handles = Vec::with_capacity(inputs.len());

        for input in inputs {
            let result_tx = result_tx.clone();
            let input = input.clone();
            let settings = self.settings.clone();
            let output = self.output.clone();
            let cancel = self.cancel.clone();

            handles.push(thread::spawn(move || {
                let result = decode_capture(&input, settings, &output, &cancel);
                if result_tx.send((input, result)).is_err() {
                    warn!("Session stopped listening before a decode finished");
                }
            }));
        }
        drop(result_tx);

        let mut reports = Vec::new();
        let mut failures = 0;
        for (input, result) in result_rx.iter() {
            match result {
                Ok(report) => {
                    info!(
                        "✅ {}: {} frames ({} with errors) at {} bit/s{}",
                        input.display(),
                        report.frames,
                        report.errors,
                        report.bit_rate,
                        if report.reran { " after autobaud" } else { "" }
                    );
                    reports.push(report);
                }
                Err(e) => {
                    let internal = e
                        .downcast_ref::<DecodeError>()
                        .is_some_and(DecodeError::is_invariant);
                    if internal {
                        error!("❌ {}: internal decoder failure: {:#}", input.display(), e);
                    } else {
                        error!("❌ {}: {:#}", input.display(), e);
                    }
                    failures += 1;
                }
            }
        }

        for handle in handles {
            handle.join().map_err(|_| anyhow!("Decode thread panicked"))?;
        }

        if reports.is_empty() {
            bail!("All {} captures failed to decode", failures);
        }
        reports.sort_by(|a, b| a.input.cmp(&b.input));
        Ok(reports)
    }
}

/// Where the frames of `input` are written
pub fn output_path(input: &Path, directory: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    let file_name = format!("{}.frames.json", stem);

    if directory.is_empty() {
        input.with_file_name(file_name)
    } else {
        Path::new(directory).join(file_name)
    }
}

fn decode_capture(input: &Path, settings: Settings, output: &OutputConfig, cancel: &CancelToken) -> Result<CaptureReport> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read capture: {}", input.display()))?;
    let waveform: Waveform = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse capture: {}", input.display()))?;

    let mut analyzer = AsyncSerialAnalyzer::new(settings)?;
    let analysis = analyzer.analyze(&waveform, cancel)?;

    let log = &analysis.log;
    let file = FramesFile {
        source: input.display().to_string(),
        sample_rate: waveform.sample_rate(),
        bit_rate: analysis.bit_rate,
        autobaud_rerun: analysis.reran,
        cancelled: analysis.report.cancelled,
        error_count: log.error_count(),
        frames: log.frames(),
        markers: output.include_markers.then(|| log.markers()),
    };
    let json = if output.pretty_json {
        serde_json::to_string_pretty(&file)?
    } else {
        serde_json::to_string(&file)?
    };

    let output_path = output_path(input, &output.directory);
    fs::write(&output_path, json)
        .with_context(|| format!("Failed to write frames file: {}", output_path.display()))?;

    Ok(CaptureReport {
        input: input.to_path_buf(),
        output: output_path,
        frames: log.frames().len(),
        errors: log.error_count(),
        bit_rate: analysis.bit_rate,
        reran: analysis.reran,
        cancelled: analysis.report.cancelled,
    })
}

/// Generate a capture into `<output_directory>/<timestamp>/` and return that directory
pub fn run_simulation(config: &AppConfig) -> Result<PathBuf> {
    config.validate()?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let session_dir = Path::new(&config.simulation.output_directory).join(&timestamp);
    fs::create_dir_all(&session_dir)
        .with_context(|| format!("Failed to create simulation directory: {}", session_dir.display()))?;
    info!("📁 Simulation session timestamp: {}", timestamp);

    let analyzer = AsyncSerialAnalyzer::new(config.decoder.clone())?;
    let waveform = analyzer
        .generate_simulation_waveform(config.simulation.sample_rate, config.simulation.samples)?;

    let capture_path = session_dir.join("capture.json");
    fs::write(&capture_path, serde_json::to_string(&waveform)?)
        .with_context(|| format!("Failed to write capture: {}", capture_path.display()))?;
    config.save_to_file(session_dir.join("serialscope.toml"))?;

    info!(
        "💾 Wrote {} samples ({} edges) to {}",
        waveform.len(),
        waveform.edges().len(),
        capture_path.display()
    );
    Ok(session_dir)
}
