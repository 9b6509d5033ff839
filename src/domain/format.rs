//! Format identifiers
//!
//! A [`FormatId`] is a MIME-like `type/subtype[;param=value...]` string
//! describing how audio bytes are laid out. [`TargetFormat`] is the fixed
//! set of container/codec pairs the transcoding entry point can produce.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{ConversionError, InvalidFormatId};

/// Normalized MIME-like format identifier.
///
/// Type, subtype and parameter names are lowercased and whitespace around
/// separators is dropped, so `Audio/WebM; codecs=opus` and
/// `audio/webm;codecs=opus` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatId {
    normalized: String,
    essence_len: usize,
}

impl FormatId {
    /// Parse a format identifier
    pub fn parse(input: &str) -> Result<Self, InvalidFormatId> {
        let invalid = || InvalidFormatId {
            input: input.to_string(),
        };

        let mut parts = input.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();

        let (kind, subtype) = essence.split_once('/').ok_or_else(invalid)?;
        if !is_token(kind) || !is_token(subtype) {
            return Err(invalid());
        }

        let mut normalized = essence.clone();
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (name, value) = param.split_once('=').ok_or_else(invalid)?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if !is_token(&name) || value.is_empty() {
                return Err(invalid());
            }
            normalized.push(';');
            normalized.push_str(&name);
            normalized.push('=');
            normalized.push_str(value);
        }

        Ok(Self {
            essence_len: essence.len(),
            normalized,
        })
    }

    /// Full normalized identifier
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// `type/subtype` without parameters
    pub fn essence(&self) -> &str {
        &self.normalized[..self.essence_len]
    }

    /// Look up a parameter value by (case-insensitive) name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.normalized[self.essence_len..]
            .split(';')
            .filter_map(|p| p.split_once('='))
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim_matches('"'))
    }

    /// The `codecs` parameter, if present
    pub fn codecs(&self) -> Option<&str> {
        self.param("codecs")
    }

    /// Conventional file extension for this format
    pub fn extension(&self) -> &'static str {
        match self.essence() {
            "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
            "audio/l16" => "pcm",
            "audio/webm" | "video/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/mp4" | "audio/aac" | "audio/x-m4a" => "m4a",
            "audio/flac" | "audio/x-flac" => "flac",
            _ => "bin",
        }
    }

    /// Guess a format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        let mime = match ext.to_ascii_lowercase().as_str() {
            "wav" | "wave" => "audio/wav",
            "webm" => "audio/webm",
            "ogg" | "opus" => "audio/ogg",
            "mp3" => "audio/mpeg",
            "m4a" | "mp4" | "aac" => "audio/mp4",
            "flac" => "audio/flac",
            _ => return None,
        };
        Self::parse(mime).ok()
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
}

impl FromStr for FormatId {
    type Err = InvalidFormatId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FormatId {
    type Error = InvalidFormatId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FormatId> for String {
    fn from(format: FormatId) -> Self {
        format.normalized
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Formats the transcoding entry point can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Webm,
    Ogg,
    Wav,
    Mp3,
    M4a,
    Flac,
}

impl TargetFormat {
    /// All supported targets
    pub const ALL: [TargetFormat; 6] = [
        Self::Webm,
        Self::Ogg,
        Self::Wav,
        Self::Mp3,
        Self::M4a,
        Self::Flac,
    ];

    /// Short name used on the command line and in config files
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Ogg => "ogg",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Flac => "flac",
        }
    }

    /// MIME string tagged onto converted artifacts
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Webm => "audio/webm;codecs=opus",
            Self::Ogg => "audio/ogg;codecs=opus",
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Flac => "audio/flac",
        }
    }

    /// File extension
    pub const fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Whether the codec is lossless (bitrate does not apply)
    pub const fn is_lossless(&self) -> bool {
        matches!(self, Self::Wav | Self::Flac)
    }

    /// Format identifier for artifacts of this target
    pub fn format_id(&self) -> FormatId {
        FormatId {
            normalized: self.mime().to_string(),
            essence_len: self.mime().find(';').unwrap_or(self.mime().len()),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(Self::Webm),
            "ogg" | "opus" => Ok(Self::Ogg),
            "wav" | "wave" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            "m4a" | "mp4" | "aac" => Ok(Self::M4a),
            "flac" => Ok(Self::Flac),
            _ => Err(ConversionError::UnknownTarget(s.to_string())),
        }
    }
}
