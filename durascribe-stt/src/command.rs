//! External-command recognizer
//!
//! [`CommandRecognizer`] bridges to any CLI transcriber (whisper.cpp,
//! a Python wrapper, a lab-internal tool) through an argument template.
//! Placeholders are substituted per invocation:
//!
//! | Placeholder      | Replaced with                              |
//! |------------------|--------------------------------------------|
//! | `{input}`        | path of the audio file                     |
//! | `{language}`     | language hint, or `auto`                   |
//! | `{beam_size}`    | beam width                                 |
//! | `{best_of}`      | candidate count                            |
//! | `{temperature}`  | sampling temperature                       |
//! | `{condition}`    | `true`/`false` context conditioning flag   |
//! | `{patience}`     | beam patience factor                       |
//! | `{no_speech}`    | no-speech probability threshold            |
//!
//! The transcript is read from stdout; a non-zero exit is a failure.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{RecognitionError, Result};
use crate::options::TranscribeOptions;
use crate::Recognizer;

/// Recognizer that shells out to an external transcription command
pub struct CommandRecognizer {
    label: String,
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    /// Create a recognizer from a program and argument template
    ///
    /// # Arguments
    /// * `label` - Name used in logs and transcript records
    /// * `program` - Executable to run
    /// * `args` - Argument template, at least one must contain `{input}`
    pub fn new<S: Into<String>>(label: S, program: S, args: Vec<String>) -> Result<Self> {
        let label = label.into();
        let program = program.into();
        if program.trim().is_empty() {
            return Err(RecognitionError::invalid_options(
                "recognizer command must name an executable",
            ));
        }
        if !args.iter().any(|a| a.contains("{input}")) {
            return Err(RecognitionError::invalid_options(
                "recognizer command template must reference {input}",
            ));
        }
        Ok(Self {
            label,
            program,
            args,
        })
    }

    /// Create a recognizer from a whitespace-separated template string
    ///
    /// Quoting is not interpreted; arguments that need spaces should go
    /// through [`CommandRecognizer::new`] instead.
    pub fn from_template<S: Into<String>>(label: S, template: &str) -> Result<Self> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            RecognitionError::invalid_options("recognizer command template is empty")
        })?;
        Self::new(label.into(), program, parts.collect())
    }

    fn render_arg(arg: &str, path: &Path, options: &TranscribeOptions) -> String {
        arg.replace("{input}", &path.to_string_lossy())
            .replace(
                "{language}",
                options.language.as_deref().unwrap_or("auto"),
            )
            .replace("{beam_size}", &options.beam_size.to_string())
            .replace("{best_of}", &options.best_of.to_string())
            .replace("{temperature}", &format!("{:.2}", options.temperature))
            .replace(
                "{condition}",
                if options.condition_on_previous_text {
                    "true"
                } else {
                    "false"
                },
            )
            .replace("{patience}", &format!("{:.1}", options.patience))
            .replace(
                "{no_speech}",
                &format!("{:.2}", options.no_speech_threshold),
            )
    }
}

impl Recognizer for CommandRecognizer {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn transcribe(&self, path: &Path, options: &TranscribeOptions) -> Result<String> {
        options.validate()?;
        let rendered: Vec<String> = self
            .args
            .iter()
            .map(|a| Self::render_arg(a, path, options))
            .collect();
        debug!(
            "Running recognizer '{}': {} {}",
            self.label,
            self.program,
            rendered.join(" ")
        );

        let output = Command::new(&self.program)
            .args(&rendered)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                RecognitionError::unavailable(format!("{}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn healthcheck(&self) -> Result<()> {
        Command::new(&self.program)
            .arg("--help")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| {
                RecognitionError::unavailable(format!("{}: {}", self.program, e))
            })?;
        // Exit status is ignored, some transcribers return non-zero for --help
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn template_must_reference_the_input_file() {
        let missing = CommandRecognizer::from_template("bad", "transcribe --fast");
        assert!(missing.is_err(), "template without {{input}} should fail");

        let empty = CommandRecognizer::from_template("bad", "   ");
        assert!(empty.is_err(), "empty template should fail");

        let ok = CommandRecognizer::from_template("good", "transcribe -f {input}");
        assert!(ok.is_ok());
    }

    #[test]
    fn placeholders_render_from_options() {
        let options = TranscribeOptions::primary().with_language(Some("pt"));
        let path = PathBuf::from("/tmp/seg-000.wav");

        assert_eq!(
            CommandRecognizer::render_arg("-f={input}", &path, &options),
            "-f=/tmp/seg-000.wav"
        );
        assert_eq!(
            CommandRecognizer::render_arg("{language}", &path, &options),
            "pt"
        );
        assert_eq!(
            CommandRecognizer::render_arg("--beam={beam_size}", &path, &options),
            "--beam=5"
        );
        assert_eq!(
            CommandRecognizer::render_arg("{condition}", &path, &options),
            "true"
        );
        assert_eq!(
            CommandRecognizer::render_arg("{temperature}", &path, &options),
            "0.00"
        );
    }

    #[test]
    fn missing_language_renders_as_auto() {
        let options = TranscribeOptions::alternate();
        let path = PathBuf::from("/tmp/a.wav");
        assert_eq!(
            CommandRecognizer::render_arg("--lang {language}", &path, &options),
            "--lang auto"
        );
    }

    #[test]
    fn transcribe_captures_stdout() {
        let recognizer =
            CommandRecognizer::from_template("echo", "echo transcript for {input}").unwrap();
        let text = recognizer
            .transcribe(Path::new("/tmp/seg.wav"), &TranscribeOptions::primary())
            .unwrap();
        assert_eq!(text, "transcript for /tmp/seg.wav");
    }

    #[test]
    fn missing_binary_reports_unavailable() {
        let recognizer = CommandRecognizer::from_template(
            "ghost",
            "durascribe-test-nonexistent-recognizer {input}",
        )
        .unwrap();

        let result = recognizer.transcribe(Path::new("/tmp/seg.wav"), &TranscribeOptions::primary());
        assert!(
            matches!(result, Err(RecognitionError::Unavailable(_))),
            "spawn failure should map to Unavailable, got {:?}",
            result.map(|_| ())
        );
        assert!(recognizer.healthcheck().is_err());
    }

    #[test]
    fn invalid_options_are_rejected_before_spawning() {
        let recognizer = CommandRecognizer::from_template("echo", "echo {input}").unwrap();
        let bad = TranscribeOptions::primary().with_temperature(7.0);
        let result = recognizer.transcribe(Path::new("/tmp/seg.wav"), &bad);
        assert!(matches!(result, Err(RecognitionError::InvalidOptions(_))));
    }
}
