//! ALSA capture through an `arecord` child process.
//!
//! For hosts where the library path is unreliable. Devices come from
//! `arecord -l`; capture streams raw little-endian 16-bit PCM from the
//! child's stdout. A cancellation hook sends SIGTERM to the child so a
//! blocked read returns promptly on shutdown.

use std::ffi::OsString;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use mic_recorder_core::cancel::CancellationToken;
use mic_recorder_core::models::device::{Device, StreamFormat};
use mic_recorder_core::models::error::CaptureError;
use mic_recorder_core::traits::capture_backend::{CaptureBackend, InputStream};

/// Rate reported for every ALSA hardware device.
const REPORTED_SAMPLE_RATE: f64 = 44100.0;

/// One `card N: ..., device M: ...` entry from `arecord -l`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareDevice {
    pub card: u32,
    pub device: u32,
    pub card_name: String,
    pub device_name: String,
}

impl HardwareDevice {
    /// ALSA PCM name, e.g. `hw:1,0`.
    pub fn pcm(&self) -> String {
        format!("hw:{},{}", self.card, self.device)
    }

    pub fn display_name(&self) -> String {
        format!("{}: {} ({})", self.card_name, self.device_name, self.pcm())
    }
}

/// Text inside the first `[...]`, or the trimmed input if there is none.
fn long_name(field: &str) -> String {
    match (field.find('['), field.rfind(']')) {
        (Some(open), Some(close)) if open < close => field[open + 1..close].trim().to_string(),
        _ => field.trim().to_string(),
    }
}

fn parse_entry(line: &str) -> Option<HardwareDevice> {
    let rest = line.strip_prefix("card ")?;
    let (card, rest) = rest.split_once(':')?;
    let (card_field, device_part) = rest.split_once(", device ")?;
    let (device, device_field) = device_part.split_once(':')?;

    Some(HardwareDevice {
        card: card.trim().parse().ok()?,
        device: device.trim().parse().ok()?,
        card_name: long_name(card_field),
        device_name: long_name(device_field),
    })
}

/// Parse the capture hardware list printed by `arecord -l`.
///
/// Subdevice lines and headers are skipped.
pub fn parse_device_list(output: &str) -> Vec<HardwareDevice> {
    output
        .lines()
        .filter_map(|line| parse_entry(line.trim_end()))
        .collect()
}

/// Capture backend that shells out to `arecord`.
#[derive(Debug, Clone)]
pub struct ArecordBackend {
    program: OsString,
    leading_args: Vec<OsString>,
    cancel: Option<CancellationToken>,
}

impl ArecordBackend {
    pub fn new() -> Self {
        Self {
            program: "arecord".into(),
            leading_args: Vec::new(),
            cancel: None,
        }
    }

    /// Run `program leading_args... <arecord args>` instead of `arecord`.
    pub fn with_command<I, S>(mut self, program: impl Into<OsString>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.program = program.into();
        self.leading_args = leading_args.into_iter().map(Into::into).collect();
        self
    }

    /// Terminate running capture children when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        cmd
    }

    fn hardware_devices(&self) -> Result<Vec<HardwareDevice>, CaptureError> {
        let output = self
            .command()
            .arg("-l")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                CaptureError::DeviceEnumeration(format!("failed to run arecord -l: {}", e))
            })?;

        if !output.status.success() {
            return Err(CaptureError::DeviceEnumeration(format!(
                "arecord -l exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        log::debug!("ALSA capture devices:\n{}", listing.trim_end());
        Ok(parse_device_list(&listing))
    }
}

impl Default for ArecordBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for ArecordBackend {
    fn devices(&self) -> Result<Vec<Device>, CaptureError> {
        Ok(self
            .hardware_devices()?
            .iter()
            .enumerate()
            .map(|(index, hw)| Device {
                id: index as u32,
                name: hw.display_name(),
                max_input_channels: 1,
                default_sample_rate: REPORTED_SAMPLE_RATE,
            })
            .collect())
    }

    /// ALSA has no designated default capture device here.
    fn default_input_device(&self) -> Result<Option<Device>, CaptureError> {
        Ok(None)
    }

    fn open_stream(
        &self,
        device: &Device,
        format: &StreamFormat,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        let hw = self
            .hardware_devices()?
            .into_iter()
            .nth(device.id as usize)
            .filter(|hw| hw.display_name() == device.name)
            .ok_or_else(|| CaptureError::DeviceNotAvailable {
                id: device.id,
                reason: "no longer listed by arecord -l".into(),
            })?;

        let mut child = self
            .command()
            .args(["-q", "-D"])
            .arg(hw.pcm())
            .args(["-f", "S16_LE", "-t", "raw", "-r"])
            .arg(format.sample_rate.to_string())
            .arg("-c")
            .arg(format.channels.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| {
                CaptureError::StreamOpen(format!("failed to spawn arecord on {}: {}", hw.pcm(), e))
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::StreamOpen("arecord stdout not captured".into()));
        };

        log::info!("arecord capturing from {} (pid {})", hw.pcm(), child.id());

        let hook = self.cancel.as_ref().map(|token| {
            let pid = child.id() as libc::pid_t;
            let id = token.register(move || {
                // SAFETY: kill(2) has no memory-safety preconditions. The hook
                // is unregistered before the child is reaped, so pid is ours.
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
            });
            (token.clone(), id)
        });

        Ok(Box::new(ArecordStream {
            child,
            stdout,
            hook,
            channels: format.channels as usize,
            pcm: hw.pcm(),
        }))
    }
}

struct ArecordStream {
    child: Child,
    stdout: ChildStdout,
    hook: Option<(CancellationToken, u64)>,
    channels: usize,
    pcm: String,
}

impl InputStream for ArecordStream {
    fn read_chunk(&mut self, frames: usize) -> Result<Vec<f32>, CaptureError> {
        let mut bytes = vec![0u8; frames * self.channels * 2];
        if let Err(e) = self.stdout.read_exact(&mut bytes) {
            let status = match self.child.try_wait() {
                Ok(Some(status)) => status.to_string(),
                _ => "still running".to_string(),
            };
            return Err(CaptureError::chunk(
                0,
                format!(
                    "arecord on {} stopped delivering audio ({}): {}",
                    self.pcm, status, e
                ),
            ));
        }

        Ok(bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect())
    }
}

impl Drop for ArecordStream {
    fn drop(&mut self) {
        if let Some((token, id)) = self.hook.take() {
            token.unregister(id);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
