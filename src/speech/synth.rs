//! Speech output sinks
//!
//! `CommandSpeechOutput` hands the text to an external speech program such as
//! `espeak-ng` and reports completion when the program exits. The text follows
//! `--` so a translation such as "-5 Grad" is never read as an option.
//! `PacedSpeechOutput` prints the text and holds the speaker for as long as
//! reading it aloud would take.

use super::{OutputEvents, OutputHandle, SpeechError, SpeechOutput};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shortest time an utterance holds the speaker
const MIN_UTTERANCE_MS: u64 = 400;

/// Output handle backed by a background task
struct TaskOutputHandle {
    task: Option<JoinHandle<()>>,
}

impl OutputHandle for TaskOutputHandle {
    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Speech output cancelled");
        }
    }
}

impl Drop for TaskOutputHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle, SpeechError> {
    tokio::runtime::Handle::try_current()
        .map_err(|e| SpeechError::OutputUnavailable(e.to_string()))
}

/// Speaks through an external program
#[derive(Debug, Clone)]
pub struct CommandSpeechOutput {
    program: PathBuf,
}

impl CommandSpeechOutput {
    /// Resolve `program` on `PATH` (or as a path) and fail if it is missing
    pub fn new(program: &str) -> Result<Self, SpeechError> {
        let program = find_program(program).ok_or_else(|| {
            SpeechError::OutputUnavailable(format!("speech program '{}' not found", program))
        })?;
        tracing::info!("Using speech program {:?}", program);
        Ok(Self { program })
    }

    /// Returns the resolved program path
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl SpeechOutput for CommandSpeechOutput {
    fn speak(
        &self,
        text: &str,
        language: &str,
        events: OutputEvents,
    ) -> Result<Box<dyn OutputHandle>, SpeechError> {
        let runtime = current_runtime()?;
        let _guard = runtime.enter();

        let mut child = tokio::process::Command::new(&self.program)
            .arg("-v")
            .arg(voice_for(language))
            .arg("--")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Device(format!("failed to spawn speech program: {}", e)))?;

        let task = runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => events.finished(),
                Ok(status) => {
                    tracing::error!("Speech program exited with {}", status);
                    events.failed(format!("speech program exited with {}", status));
                }
                Err(e) => {
                    tracing::error!("Failed to wait for speech program: {}", e);
                    events.failed(e.to_string());
                }
            }
        });

        Ok(Box::new(TaskOutputHandle { task: Some(task) }))
    }
}

/// Prints translations and paces them at a speaking rate
#[derive(Debug, Clone)]
pub struct PacedSpeechOutput {
    words_per_minute: u32,
}

impl PacedSpeechOutput {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
        }
    }

    /// How long reading `text` aloud takes at the configured rate
    pub fn duration_for(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as u64;
        let ms = words * 60_000 / u64::from(self.words_per_minute);
        Duration::from_millis(ms.max(MIN_UTTERANCE_MS))
    }
}

impl SpeechOutput for PacedSpeechOutput {
    fn speak(
        &self,
        text: &str,
        language: &str,
        events: OutputEvents,
    ) -> Result<Box<dyn OutputHandle>, SpeechError> {
        let runtime = current_runtime()?;
        let duration = self.duration_for(text);

        println!("[{}] {}", language, text);

        let task = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            events.finished();
        });

        Ok(Box::new(TaskOutputHandle { task: Some(task) }))
    }
}

/// Map a BCP 47 tag to the voice name speech programs expect ("de-DE" -> "de")
fn voice_for(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or(language)
        .to_ascii_lowercase()
}

fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Signal, Ticket};
    use crate::speech::{OutputEvent, Registration};
    use tokio::sync::mpsc;

    fn output_events() -> (OutputEvents, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OutputEvents::new(Ticket::new(3), Registration::new(), tx), rx)
    }

    #[test]
    fn test_voice_for_language_tags() {
        assert_eq!(voice_for("de-DE"), "de");
        assert_eq!(voice_for("es_ES"), "es");
        assert_eq!(voice_for("DE"), "de");
    }

    #[test]
    fn test_paced_duration_scales_with_words() {
        let output = PacedSpeechOutput::new(120);
        assert_eq!(
            output.duration_for("eins zwei drei vier"),
            Duration::from_secs(2)
        );
        assert_eq!(
            output.duration_for(""),
            Duration::from_millis(MIN_UTTERANCE_MS)
        );
    }

    #[test]
    fn test_paced_rate_never_zero() {
        let output = PacedSpeechOutput::new(0);
        assert!(output.duration_for("Hallo") > Duration::ZERO);
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let result = CommandSpeechOutput::new("/nonexistent/bin/espeak-ng");
        assert!(matches!(result, Err(SpeechError::OutputUnavailable(_))));
    }

    /// Stand-in speech program that parses options the way getopt does
    #[cfg(unix)]
    fn option_parsing_program(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("speak");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             while [ $# -gt 0 ]; do\n\
               case \"$1\" in\n\
                 -v) shift 2 ;;\n\
                 --) shift; break ;;\n\
                 -*) exit 2 ;;\n\
                 *) break ;;\n\
               esac\n\
             done\n\
             [ \"$1\" = \"-5 Grad heute\" ] || exit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_leading_dash_text_is_spoken_not_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let program = option_parsing_program(dir.path());
        let output = CommandSpeechOutput::new(program.to_str().unwrap()).unwrap();

        let (events, mut rx) = output_events();
        let _handle = output.speak("-5 Grad heute", "de-DE", events).unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("speech program never exited");
        match signal {
            Some(Signal::Output { event, .. }) => assert_eq!(event, OutputEvent::Finished),
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_output_reports_finished() {
        let (events, mut rx) = output_events();
        let _handle = PacedSpeechOutput::new(160)
            .speak("Hallo, wie geht es dir?", "de-DE", events)
            .unwrap();

        match rx.recv().await {
            Some(Signal::Output { ticket, event }) => {
                assert_eq!(ticket, Ticket::new(3));
                assert_eq!(event, OutputEvent::Finished);
            }
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_output_never_finishes() {
        let (events, mut rx) = output_events();
        let mut handle = PacedSpeechOutput::new(160)
            .speak("Hallo", "de-DE", events)
            .unwrap();

        handle.cancel();
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(rx.try_recv().is_err());
    }
}
