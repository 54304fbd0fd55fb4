use crate::error::{IntoLizError, LizError};
use crate::events::SpeechReporter;
use crate::speech_output::{SpeechBackend, Utterance, Voice};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// A Piper voice model found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct PiperModel {
    pub voice: Voice,
    pub model_path: PathBuf,
    pub sample_rate: u32,
}

#[derive(Deserialize)]
struct ModelConfig {
    audio: Option<AudioConfig>,
}

#[derive(Deserialize)]
struct AudioConfig {
    sample_rate: u32,
}

/// Find every `<name>.onnx` with a matching `<name>.onnx.json` config
///
/// Voice names are the file stems; the locale comes from the leading
/// `xx_YY` part of Piper's naming scheme (e.g. `en_US-lessac-medium`).
pub fn scan_models(voices_dir: &Path) -> Result<Vec<PiperModel>, LizError> {
    let entries = std::fs::read_dir(voices_dir).map_liz_err(|e| {
        LizError::Speech(format!("Failed to read voices directory {:?}: {}", voices_dir, e))
    })?;

    let mut models = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("onnx") {
            continue;
        }

        let config_path = path.with_extension("onnx.json");
        if !config_path.exists() {
            log::warn!("Skipping {:?}: missing {:?}", path, config_path);
            continue;
        }

        let config: ModelConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let locale = name
            .split('-')
            .next()
            .unwrap_or_default()
            .replace('_', "-");

        models.push(PiperModel {
            voice: Voice { name, locale },
            model_path: path,
            sample_rate: config.audio.map(|a| a.sample_rate).unwrap_or(DEFAULT_SAMPLE_RATE),
        });
    }

    models.sort_by(|a, b| a.voice.name.cmp(&b.voice.name));
    Ok(models)
}

/// Offline synthesis through the Piper binary
///
/// Each utterance runs `piper --output-raw` piped into `aplay`. Both child
/// processes are owned by one task and killed when it is aborted, which is
/// how cancellation stops playback mid-sentence.
pub struct PiperSpeech {
    piper_path: PathBuf,
    aplay_path: PathBuf,
    espeak_data_path: Option<PathBuf>,
    models: Vec<PiperModel>,
    playback: Option<JoinHandle<()>>,
}

impl PiperSpeech {
    pub fn new(voices_dir: &Path, espeak_data_path: Option<PathBuf>) -> Result<Self, LizError> {
        log::info!("Initializing Piper speech backend...");

        let piper_path = which::which("piper")
            .map_liz_err(|e| LizError::Speech(format!("Piper binary not found in PATH: {}", e)))?;
        let aplay_path = which::which("aplay")
            .map_liz_err(|e| LizError::Speech(format!("aplay not found in PATH: {}", e)))?;

        if let Some(path) = &espeak_data_path {
            if !path.exists() {
                return Err(LizError::Speech(format!(
                    "eSpeak-NG data directory not found at: {:?}",
                    path
                )));
            }
        }

        let models = scan_models(voices_dir)?;
        if models.is_empty() {
            return Err(LizError::Speech(format!(
                "No Piper voice models (.onnx + .onnx.json) found in {:?}",
                voices_dir
            )));
        }

        log::info!("  Piper binary: {:?}", piper_path);
        log::info!("  Voices: {}", models.len());

        Ok(Self { piper_path, aplay_path, espeak_data_path, models, playback: None })
    }

    fn model_for(&self, voice: Option<&Voice>) -> Option<PiperModel> {
        voice
            .and_then(|v| self.models.iter().find(|m| &m.voice == v))
            .or_else(|| self.models.first())
            .cloned()
    }
}

impl SpeechBackend for PiperSpeech {
    fn voices(&self) -> Vec<Voice> {
        self.models.iter().map(|m| m.voice.clone()).collect()
    }

    fn play(&mut self, utterance: Utterance, reporter: SpeechReporter) {
        self.cancel();

        let Some(model) = self.model_for(utterance.voice.as_ref()) else {
            log::error!("No voice model available; dropping utterance {}", utterance.id);
            return;
        };

        let piper_path = self.piper_path.clone();
        let aplay_path = self.aplay_path.clone();
        let espeak_data_path = self.espeak_data_path.clone();

        self.playback = Some(tokio::spawn(async move {
            let id = utterance.id;
            reporter.started(id);
            if let Err(e) =
                synthesize(&piper_path, &aplay_path, espeak_data_path.as_deref(), &model, &utterance).await
            {
                log::error!("Piper playback failed: {}", e);
            }
            reporter.finished(id);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.playback.take() {
            task.abort();
        }
    }
}

async fn synthesize(
    piper_path: &Path,
    aplay_path: &Path,
    espeak_data_path: Option<&Path>,
    model: &PiperModel,
    utterance: &Utterance,
) -> Result<(), LizError> {
    // Piper has no pitch control; speed maps to the inverse length scale
    let length_scale = 1.0 / utterance.rate.max(0.1);

    log::debug!(
        "Spawning piper for utterance {} (model {:?}, length_scale {:.3})",
        utterance.id,
        model.model_path,
        length_scale
    );

    let mut piper = Command::new(piper_path);
    piper
        .arg("--model")
        .arg(&model.model_path)
        .arg("--output-raw")
        .arg("--length_scale")
        .arg(format!("{:.3}", length_scale));
    if let Some(data) = espeak_data_path {
        piper.arg("--espeak_data").arg(data);
    }

    let mut piper = piper
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_liz_err(|e| LizError::Speech(format!("Failed to spawn piper process: {}", e)))?;

    let mut stdin = piper
        .stdin
        .take()
        .ok_or_else(|| LizError::Speech("Failed to open piper stdin".to_string()))?;
    stdin.write_all(utterance.text.as_bytes()).await?;
    drop(stdin);

    let pcm: Stdio = piper
        .stdout
        .take()
        .ok_or_else(|| LizError::Speech("Failed to open piper stdout".to_string()))?
        .try_into()?;

    let mut aplay = Command::new(aplay_path)
        .args(["-q", "-t", "raw", "-f", "S16_LE", "-c", "1", "-r"])
        .arg(model.sample_rate.to_string())
        .arg("-")
        .stdin(pcm)
        .kill_on_drop(true)
        .spawn()
        .map_liz_err(|e| LizError::Speech(format!("Failed to spawn aplay: {}", e)))?;

    let status = aplay.wait().await?;
    let piper_status = piper.wait().await?;

    if !piper_status.success() {
        return Err(LizError::Speech(format!(
            "Piper exited with code {:?}",
            piper_status.code()
        )));
    }
    if !status.success() {
        return Err(LizError::Speech(format!("aplay exited with code {:?}", status.code())));
    }

    log::debug!("Finished speaking utterance {}", utterance.id);
    Ok(())
}

/// Prints utterances instead of playing them
///
/// Playback time is simulated from the text length so start/end reporting
/// and interruption behave like a real synthesizer.
#[derive(Default)]
pub struct ConsoleSpeech {
    playback: Option<JoinHandle<()>>,
}

impl ConsoleSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    fn simulated_duration(utterance: &Utterance) -> Duration {
        let millis = (utterance.text.chars().count() as f32 * 60.0 / utterance.rate.max(0.1)) as u64;
        Duration::from_millis(millis)
    }
}

impl SpeechBackend for ConsoleSpeech {
    fn voices(&self) -> Vec<Voice> {
        vec![Voice { name: "Console".to_string(), locale: "en-US".to_string() }]
    }

    fn play(&mut self, utterance: Utterance, reporter: SpeechReporter) {
        self.cancel();

        println!("🔊 {}", utterance.text);
        let duration = Self::simulated_duration(&utterance);

        self.playback = Some(tokio::spawn(async move {
            reporter.started(utterance.id);
            tokio::time::sleep(duration).await;
            reporter.finished(utterance.id);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.playback.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn utterance(id: u64, text: &str) -> Utterance {
        Utterance { id, text: text.to_string(), voice: None, pitch: 1.15, rate: 1.1 }
    }

    #[test]
    fn test_scan_models_reads_locale_and_sample_rate() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("en_US-lessac-medium.onnx"), b"").unwrap();
        std::fs::write(
            dir.path().join("en_US-lessac-medium.onnx.json"),
            r#"{"audio": {"sample_rate": 16000}}"#,
        )
        .unwrap();
        // Model without config is skipped
        std::fs::write(dir.path().join("de_DE-thorsten-low.onnx"), b"").unwrap();

        let models = scan_models(dir.path()).unwrap();

        assert_eq!(models.len(), 1);
        assert_eq!(models[0].voice.name, "en_US-lessac-medium");
        assert_eq!(models[0].voice.locale, "en-US");
        assert_eq!(models[0].sample_rate, 16000);
    }

    #[test]
    fn test_scan_models_missing_directory() {
        assert!(scan_models(Path::new("/nonexistent/voices")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_speech_reports_start_and_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut speech = ConsoleSpeech::new();

        speech.play(utterance(7, "Hello"), SpeechReporter::new(tx));

        assert!(matches!(rx.recv().await, Some(Event::SpeechStarted(7))));
        assert!(matches!(rx.recv().await, Some(Event::SpeechEnded(7))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_speech_cancel_suppresses_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut speech = ConsoleSpeech::new();

        speech.play(utterance(1, "A fairly long sentence to read"), SpeechReporter::new(tx.clone()));
        assert!(matches!(rx.recv().await, Some(Event::SpeechStarted(1))));
        speech.cancel();

        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(tx);
        assert!(rx.recv().await.is_none());
    }
}
