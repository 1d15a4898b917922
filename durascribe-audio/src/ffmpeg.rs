//! ffmpeg/ffprobe-backed implementation of [`AudioToolkit`].
//!
//! Silence gaps come from ffmpeg's `silencedetect` filter, parsed off
//! stderr. Duration probing cascades: ffprobe first, then the WAV header,
//! then a bitrate-based size estimate so segmentation keeps moving even
//! when probing is impossible.

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{AudioToolError, Result};
use crate::{AudioToolkit, SilenceSpan};

/// Bytes per second assumed by the size-based duration estimate (32 kbit/s).
const ESTIMATE_BYTES_PER_SEC: f64 = 4000.0;

/// Floor for size-estimated durations.
const ESTIMATE_MIN_SECS: f64 = 10.0;

/// [`AudioToolkit`] backed by the ffmpeg command-line tools
pub struct FfmpegToolkit {
    ffmpeg: String,
    ffprobe: String,
    silence_start_re: Regex,
    silence_end_re: Regex,
}

impl FfmpegToolkit {
    /// Create a toolkit using `ffmpeg`/`ffprobe` from `PATH`
    pub fn new() -> Result<Self> {
        Self::with_binaries("ffmpeg", "ffprobe")
    }

    /// Create a toolkit with explicit binary names or paths
    pub fn with_binaries<S: Into<String>>(ffmpeg: S, ffprobe: S) -> Result<Self> {
        let silence_start_re = Regex::new(r"silence_start: ([\d.]+)")
            .map_err(|e| AudioToolError::parse(e.to_string()))?;
        let silence_end_re = Regex::new(r"silence_end: ([\d.]+)")
            .map_err(|e| AudioToolError::parse(e.to_string()))?;
        Ok(Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            silence_start_re,
            silence_end_re,
        })
    }

    fn probe_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .map_err(|e| AudioToolError::unavailable(format!("ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(AudioToolError::invocation(format!(
                "ffprobe exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<f64>().map_err(|e| {
            AudioToolError::parse(format!("ffprobe duration {:?}: {e}", stdout.trim()))
        })
    }

    /// Pair `silence_start`/`silence_end` stderr lines into spans. A start
    /// with no matching end means the file ran out inside the gap.
    fn parse_silence_output(&self, output: &str) -> Vec<SilenceSpan> {
        let mut spans = Vec::new();
        let mut current_start: Option<f64> = None;

        for line in output.lines() {
            if let Some(caps) = self.silence_start_re.captures(line) {
                if let Ok(start) = caps[1].parse::<f64>() {
                    current_start = Some(start);
                }
            } else if let Some(caps) = self.silence_end_re.captures(line) {
                if let Ok(end) = caps[1].parse::<f64>() {
                    if let Some(start) = current_start.take() {
                        spans.push(SilenceSpan {
                            start,
                            end: Some(end),
                        });
                    }
                }
            }
        }

        if let Some(start) = current_start {
            spans.push(SilenceSpan { start, end: None });
        }
        spans
    }
}

impl AudioToolkit for FfmpegToolkit {
    fn verify(&self) -> Result<()> {
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .map_err(|e| AudioToolError::unavailable(format!("{}: {e}", self.ffmpeg)))?;
        if !output.status.success() {
            return Err(AudioToolError::unavailable(format!(
                "{} -version exited with {}",
                self.ffmpeg, output.status
            )));
        }
        Ok(())
    }

    fn detect_silences(
        &self,
        path: &Path,
        threshold_db: f64,
        min_silence_s: f64,
    ) -> Result<Vec<SilenceSpan>> {
        let filter = format!("silencedetect=n={threshold_db}dB:d={min_silence_s}");
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(path)
            .args(["-af", &filter, "-f", "null", "-"])
            .output()
            .map_err(|e| AudioToolError::unavailable(format!("ffmpeg silencedetect: {e}")))?;

        if !output.status.success() {
            return Err(AudioToolError::invocation(format!(
                "ffmpeg silencedetect exited with {}",
                output.status
            )));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let spans = self.parse_silence_output(&stderr);
        debug!(
            "silencedetect {}dB/{}s found {} spans in {}",
            threshold_db,
            min_silence_s,
            spans.len(),
            path.display()
        );
        Ok(spans)
    }

    fn duration(&self, path: &Path) -> Result<f64> {
        if !path.exists() {
            return Err(AudioToolError::unsupported_input(format!(
                "no such file: {}",
                path.display()
            )));
        }

        match self.probe_duration(path) {
            Ok(d) if d.is_finite() && d >= 0.0 => return Ok(d),
            Ok(d) => debug!("ffprobe returned unusable duration {d}"),
            Err(e) => debug!("ffprobe duration failed: {e}"),
        }

        if let Some(d) = wav_duration(path) {
            debug!("using wav header duration for {}", path.display());
            return Ok(d);
        }

        let bytes = std::fs::metadata(path)?.len();
        let estimate = (bytes as f64 / ESTIMATE_BYTES_PER_SEC).max(ESTIMATE_MIN_SECS);
        warn!(
            "estimating duration of {} from file size: {:.1}s",
            path.display(),
            estimate
        );
        Ok(estimate)
    }

    fn extract_segment(&self, path: &Path, start_s: f64, duration_s: f64) -> Result<PathBuf> {
        if !start_s.is_finite() || start_s < 0.0 {
            return Err(AudioToolError::unsupported_input(format!(
                "segment start must be non-negative, got {start_s}"
            )));
        }
        if !duration_s.is_finite() || duration_s <= 0.0 {
            return Err(AudioToolError::unsupported_input(format!(
                "segment duration must be positive, got {duration_s}"
            )));
        }

        let scratch = tempfile::Builder::new()
            .prefix("durascribe-seg-")
            .suffix(".wav")
            .tempfile()?;
        let out_path = scratch
            .into_temp_path()
            .keep()
            .map_err(|e| AudioToolError::invocation(format!("keeping scratch file: {e}")))?;

        let status = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-ss", &format!("{start_s:.3}"), "-t", &format!("{duration_s:.3}")])
            .args(["-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y"])
            .arg(&out_path)
            .status()
            .map_err(|e| {
                let _ = std::fs::remove_file(&out_path);
                AudioToolError::unavailable(format!("ffmpeg extract: {e}"))
            })?;

        if !status.success() {
            let _ = std::fs::remove_file(&out_path);
            return Err(AudioToolError::invocation(format!(
                "ffmpeg extract exited with {status}"
            )));
        }

        debug!(
            "extracted {:.2}s+{:.2}s of {} -> {}",
            start_s,
            duration_s,
            path.display(),
            out_path.display()
        );
        Ok(out_path)
    }

    fn cleanup(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove scratch file {}: {}", path.display(), e);
            }
        }
    }
}

fn wav_duration(path: &Path) -> Option<f64> {
    let reader = hound::WavReader::open(path).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(reader.duration() as f64 / spec.sample_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolkit() -> FfmpegToolkit {
        FfmpegToolkit::new().unwrap()
    }

    /// Toolkit whose binaries never resolve, forcing the fallback paths.
    fn broken_toolkit() -> FfmpegToolkit {
        FfmpegToolkit::with_binaries(
            "durascribe-test-no-such-ffmpeg",
            "durascribe-test-no-such-ffprobe",
        )
        .unwrap()
    }

    fn write_test_wav(dir: &Path, name: &str, seconds: f64) -> PathBuf {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = dir.join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..((seconds * 16000.0) as usize) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn parses_paired_silence_lines() {
        let stderr = "\
[silencedetect @ 0x5555] silence_start: 4.59918
[silencedetect @ 0x5555] silence_end: 5.30308 | silence_duration: 0.7039
size=N/A time=00:01:00.00 bitrate=N/A speed= 500x
[silencedetect @ 0x5555] silence_start: 41.2
[silencedetect @ 0x5555] silence_end: 42.05 | silence_duration: 0.85
";
        let spans = toolkit().parse_silence_output(stderr);
        assert_eq!(spans.len(), 2);
        assert!((spans[0].start - 4.59918).abs() < 1e-9);
        assert_eq!(spans[0].end, Some(5.30308));
        assert!((spans[0].detected_duration().unwrap() - 0.7039).abs() < 1e-4);
        assert_eq!(spans[1].start, 41.2);
    }

    #[test]
    fn trailing_open_silence_is_kept() {
        let stderr = "[silencedetect @ 0x1] silence_start: 58.4\n";
        let spans = toolkit().parse_silence_output(stderr);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, None);
        assert_eq!(spans[0].detected_duration(), None);
    }

    #[test]
    fn unrelated_output_yields_no_spans() {
        let stderr = "frame=  100 fps=0.0 q=-0.0 size=N/A time=00:00:04.00\n";
        assert!(toolkit().parse_silence_output(stderr).is_empty());
    }

    #[test]
    fn verify_fails_for_missing_binary() {
        assert!(broken_toolkit().verify().is_err());
    }

    #[test]
    fn duration_falls_back_to_wav_header() {
        let dir = tempfile::tempdir().unwrap();
        let wav = write_test_wav(dir.path(), "one_second.wav", 1.0);
        // ffprobe is unavailable here, so the header must carry it.
        let d = broken_toolkit().duration(&wav).unwrap();
        assert!((d - 1.0).abs() < 1e-3, "expected ~1s, got {d}");
    }

    #[test]
    fn duration_estimates_from_size_as_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opaque.bin");
        std::fs::write(&path, vec![0u8; 2000]).unwrap();
        let d = broken_toolkit().duration(&path).unwrap();
        // 2000 bytes at the assumed bitrate is under the 10s floor.
        assert_eq!(d, ESTIMATE_MIN_SECS);
    }

    #[test]
    fn duration_of_missing_file_is_an_error() {
        let err = broken_toolkit()
            .duration(Path::new("/nonexistent/durascribe.wav"))
            .unwrap_err();
        assert!(matches!(err, AudioToolError::UnsupportedInput(_)));
    }

    #[test]
    fn extract_rejects_bad_ranges() {
        let t = broken_toolkit();
        assert!(matches!(
            t.extract_segment(Path::new("x.wav"), -1.0, 5.0),
            Err(AudioToolError::UnsupportedInput(_))
        ));
        assert!(matches!(
            t.extract_segment(Path::new("x.wav"), 0.0, 0.0),
            Err(AudioToolError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn cleanup_tolerates_missing_files() {
        toolkit().cleanup(Path::new("/nonexistent/durascribe-scratch.wav"));
    }
}
