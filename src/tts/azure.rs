//! Azure Speech text-to-speech stage
//!
//! # API Reference
//!
//! - Endpoint: `POST https://{region}.tts.speech.microsoft.com/cognitiveservices/v1`
//! - Auth: `Ocp-Apim-Subscription-Key`
//! - Body: SSML
//! - Output: raw 16-bit mono PCM, selected with `X-Microsoft-OutputFormat`

use crate::config::AzureConfig;
use crate::pipeline::{AudioFrame, Frame, FrameProcessor, PipelineError};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("missing Azure Speech setting: {0}")]
    MissingCredentials(&'static str),

    #[error("unsupported output sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("TTS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TTS service returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Azure TTS pipeline stage: `TtsSpeak` in, `OutputAudio` out
pub struct AzureTts {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    voice: String,
    sample_rate: u32,
    output_format: &'static str,
}

impl AzureTts {
    /// Build the stage for a transport expecting `sample_rate` audio
    pub fn new(
        http: reqwest::Client,
        config: &AzureConfig,
        sample_rate: u32,
    ) -> Result<Self, TtsError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(TtsError::MissingCredentials("AZURE_SPEECH_API_KEY"))?;

        let endpoint = match (&config.endpoint, &config.region) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(region)) if !region.is_empty() => format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                region
            ),
            _ => return Err(TtsError::MissingCredentials("AZURE_SPEECH_REGION")),
        };

        Ok(Self {
            http,
            api_key,
            endpoint,
            voice: config.voice.clone(),
            sample_rate,
            output_format: output_format(sample_rate)?,
        })
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Synthesize `text` into a single PCM frame
    pub async fn synthesize(&self, text: &str) -> Result<AudioFrame, TtsError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", self.output_format)
            .header("User-Agent", "voicebot-server")
            .body(build_ssml(&self.voice, text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(AudioFrame::from_le_bytes(&bytes, self.sample_rate, 1))
    }
}

fn output_format(sample_rate: u32) -> Result<&'static str, TtsError> {
    match sample_rate {
        8000 => Ok("raw-8khz-16bit-mono-pcm"),
        16000 => Ok("raw-16khz-16bit-mono-pcm"),
        24000 => Ok("raw-24khz-16bit-mono-pcm"),
        48000 => Ok("raw-48khz-16bit-mono-pcm"),
        other => Err(TtsError::UnsupportedSampleRate(other)),
    }
}

/// SSML document for `voice`; the language is the voice's locale prefix (e.g. `fr-FR`).
pub fn build_ssml(voice: &str, text: &str) -> String {
    let language = voice.splitn(3, '-').take(2).collect::<Vec<_>>().join("-");
    format!(
        "<speak version='1.0' xml:lang='{}' xmlns='http://www.w3.org/2001/10/synthesis'>\
         <voice name='{}'>{}</voice></speak>",
        language,
        voice,
        escape_xml(text)
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl FrameProcessor for AzureTts {
    async fn process(&mut self, frame: Frame) -> Result<Vec<Frame>, PipelineError> {
        let text = match frame {
            Frame::TtsSpeak(text) => text,
            other => return Ok(vec![other]),
        };

        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        info!("Generating TTS [{}]", text);
        match self.synthesize(&text).await {
            Ok(audio) => {
                info!("TTS produced {:.2}s of audio", audio.duration().as_secs_f64());
                Ok(vec![Frame::OutputAudio(audio)])
            }
            Err(e) => {
                // Synthesis failures drop the utterance; the session keeps going
                error!("TTS failed: {}", e);
                Ok(vec![])
            }
        }
    }

    fn name(&self) -> &str {
        "azure-tts"
    }
}
