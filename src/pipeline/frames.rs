use std::time::Duration;

/// Mono/interleaved 16-bit PCM audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Build a frame from little-endian PCM bytes. A trailing odd byte is dropped.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32, channels: u16) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        Self::new(samples, sample_rate, channels)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }

    /// Downsample by decimation. Only integer ratios are supported; anything
    /// else (including upsampling) returns the frame unchanged.
    pub fn downsample(self, target_rate: u32) -> AudioFrame {
        if target_rate == 0 || self.sample_rate == target_rate {
            return self;
        }

        let ratio = self.sample_rate / target_rate;
        if ratio <= 1 || self.sample_rate % target_rate != 0 {
            return self;
        }

        let channels = self.channels.max(1) as usize;
        let samples = self
            .samples
            .chunks_exact(channels)
            .step_by(ratio as usize)
            .flatten()
            .copied()
            .collect();

        AudioFrame::new(samples, target_rate, self.channels)
    }

    /// Mix stereo down to mono by summing channels (clamped)
    pub fn to_mono(&self) -> AudioFrame {
        if self.channels != 2 {
            return self.clone();
        }

        let samples = self
            .samples
            .chunks_exact(2)
            .map(|pair| {
                let sum = pair[0] as i32 + pair[1] as i32;
                sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16
            })
            .collect();

        AudioFrame::new(samples, self.sample_rate, 1)
    }

    /// Split into consecutive frames of at most `chunk` duration
    pub fn chunks(&self, chunk: Duration) -> Vec<AudioFrame> {
        let per_chunk = (self.sample_rate as f64 * chunk.as_secs_f64()) as usize
            * self.channels.max(1) as usize;
        if per_chunk == 0 {
            return vec![self.clone()];
        }

        self.samples
            .chunks(per_chunk)
            .map(|samples| AudioFrame::new(samples.to_vec(), self.sample_rate, self.channels))
            .collect()
    }
}

/// Unit of work flowing through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Pushed once by the task before any queued frame
    Start,
    /// Text the TTS stage should speak
    TtsSpeak(String),
    /// Synthesized audio headed to the transport
    OutputAudio(AudioFrame),
    /// End of session; the task stops once it has crossed every stage
    End,
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Start => "Start",
            Frame::TtsSpeak(_) => "TtsSpeak",
            Frame::OutputAudio(_) => "OutputAudio",
            Frame::End => "End",
        }
    }
}
