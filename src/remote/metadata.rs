//! Typed job metadata
//!
//! The service accepts a metadata object naming the model, the output
//! container and optional model-specific settings. Every recognized field
//! and its legal values are enumerated here and checked by
//! [`JobMetadata::validate`] before any request is issued.

use crate::error::{Result, StemflowError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separation / analysis models offered by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    Vocals,
    Instrumental,
    Drums,
    Bass,
    Strings,
    Piano,
    Guitar,
    Other,
    Dialogue,
    MusicEffects,
    MusicRemoval,
    MultiVoice,
    Transcription,
    Alignment,
    MusicDetection,
}

impl Model {
    pub const ALL: [Model; 15] = [
        Model::Vocals,
        Model::Instrumental,
        Model::Drums,
        Model::Bass,
        Model::Strings,
        Model::Piano,
        Model::Guitar,
        Model::Other,
        Model::Dialogue,
        Model::MusicEffects,
        Model::MusicRemoval,
        Model::MultiVoice,
        Model::Transcription,
        Model::Alignment,
        Model::MusicDetection,
    ];

    /// Wire name, e.g. `music_effects`
    pub fn as_str(self) -> &'static str {
        match self {
            Model::Vocals => "vocals",
            Model::Instrumental => "instrumental",
            Model::Drums => "drums",
            Model::Bass => "bass",
            Model::Strings => "strings",
            Model::Piano => "piano",
            Model::Guitar => "guitar",
            Model::Other => "other",
            Model::Dialogue => "dialogue",
            Model::MusicEffects => "music_effects",
            Model::MusicRemoval => "music_removal",
            Model::MultiVoice => "multi_voice",
            Model::Transcription => "transcription",
            Model::Alignment => "alignment",
            Model::MusicDetection => "music_detection",
        }
    }

    /// Models whose output is text/data rather than audio
    pub fn produces_text(self) -> bool {
        matches!(
            self,
            Model::Transcription | Model::Alignment | Model::MusicDetection
        )
    }

    /// Variants this model accepts
    pub fn variants(self) -> &'static [Variant] {
        match self {
            Model::Vocals | Model::Instrumental => &[Variant::HighQuality],
            Model::MultiVoice => &[Variant::TwoSpeaker, Variant::NSpeaker],
            _ => &[],
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = StemflowError;

    fn from_str(s: &str) -> Result<Self> {
        Model::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                StemflowError::InvalidMetadata(format!(
                    "Unknown model '{}'. Expected one of: {}",
                    s,
                    Model::ALL.map(Model::as_str).join(", ")
                ))
            })
    }
}

/// Output containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Wav,
    Flac,
    Mp3,
    Aiff,
    Mp4,
    Json,
    Txt,
    Srt,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 8] = [
        OutputFormat::Wav,
        OutputFormat::Flac,
        OutputFormat::Mp3,
        OutputFormat::Aiff,
        OutputFormat::Mp4,
        OutputFormat::Json,
        OutputFormat::Txt,
        OutputFormat::Srt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Flac => "flac",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Aiff => "aiff",
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Json => "json",
            OutputFormat::Txt => "txt",
            OutputFormat::Srt => "srt",
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Txt | OutputFormat::Srt)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = StemflowError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == lower)
            .ok_or_else(|| {
                StemflowError::InvalidMetadata(format!(
                    "Unknown format '{}'. Expected one of: {}",
                    s,
                    OutputFormat::ALL.map(OutputFormat::as_str).join(", ")
                ))
            })
    }
}

/// Model sub-variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    HighQuality,
    TwoSpeaker,
    NSpeaker,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::HighQuality => "high_quality",
            Variant::TwoSpeaker => "two_speaker",
            Variant::NSpeaker => "n_speaker",
        }
    }
}

impl FromStr for Variant {
    type Err = StemflowError;

    fn from_str(s: &str) -> Result<Self> {
        [Variant::HighQuality, Variant::TwoSpeaker, Variant::NSpeaker]
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| StemflowError::InvalidMetadata(format!("Unknown variant '{}'", s)))
    }
}

/// Metadata descriptor submitted with every job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Model to run
    pub name: Model,
    /// Output container
    pub format: OutputFormat,
    /// Model sub-variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// Also return the residual (mixture minus target)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub residual: bool,
}

impl JobMetadata {
    pub fn new(name: Model, format: OutputFormat) -> Self {
        Self {
            name,
            format,
            variant: None,
            residual: false,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_residual(mut self, residual: bool) -> Self {
        self.residual = residual;
        self
    }

    /// Check the combination of fields is one the service accepts
    pub fn validate(&self) -> Result<()> {
        if self.name.produces_text() != self.format.is_text() {
            let expected = if self.name.produces_text() {
                "a text format (json, txt, srt)"
            } else {
                "an audio format (wav, flac, mp3, aiff, mp4)"
            };
            return Err(StemflowError::InvalidMetadata(format!(
                "Model '{}' requires {}, got '{}'",
                self.name, expected, self.format
            )));
        }

        if let Some(variant) = self.variant {
            if !self.name.variants().contains(&variant) {
                return Err(StemflowError::InvalidMetadata(format!(
                    "Model '{}' does not offer variant '{}'",
                    self.name,
                    variant.as_str()
                )));
            }
        }

        if self.residual && self.name.produces_text() {
            return Err(StemflowError::InvalidMetadata(format!(
                "Model '{}' has no residual output",
                self.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_wire_shape() {
        let meta = JobMetadata::new(Model::MusicRemoval, OutputFormat::Mp3).with_residual(true);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "music_removal", "format": "mp3", "residual": true})
        );

        let plain = serde_json::to_value(JobMetadata::new(Model::Vocals, OutputFormat::Wav)).unwrap();
        assert_eq!(plain, serde_json::json!({"name": "vocals", "format": "wav"}));
    }

    #[test]
    fn test_parse_catalogs() {
        assert_eq!("multi_voice".parse::<Model>().unwrap(), Model::MultiVoice);
        assert_eq!("FLAC".parse::<OutputFormat>().unwrap(), OutputFormat::Flac);
        assert!("kazoo".parse::<Model>().is_err());
        assert!("ogg".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_validate_accepts_documented_combinations() {
        JobMetadata::new(Model::Guitar, OutputFormat::Mp3).with_residual(true).validate().unwrap();
        JobMetadata::new(Model::Instrumental, OutputFormat::Mp3)
            .with_variant(Variant::HighQuality)
            .validate()
            .unwrap();
        JobMetadata::new(Model::MultiVoice, OutputFormat::Mp3)
            .with_variant(Variant::TwoSpeaker)
            .validate()
            .unwrap();
        JobMetadata::new(Model::MusicDetection, OutputFormat::Json).validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_illegal_combinations() {
        assert!(JobMetadata::new(Model::Vocals, OutputFormat::Srt).validate().is_err());
        assert!(JobMetadata::new(Model::Transcription, OutputFormat::Wav).validate().is_err());
        assert!(JobMetadata::new(Model::Drums, OutputFormat::Wav)
            .with_variant(Variant::TwoSpeaker)
            .validate()
            .is_err());
        assert!(JobMetadata::new(Model::Alignment, OutputFormat::Json)
            .with_residual(true)
            .validate()
            .is_err());
    }
}
