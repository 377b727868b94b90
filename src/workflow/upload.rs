//! Uploaded recordings and the audio formats we accept.

use crate::error::SummaryError;
use std::fmt;

/// Audio containers the summary endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    M4a,
    Aac,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::M4a => "m4a",
            AudioFormat::Aac => "aac",
        }
    }

    /// MIME type announced to the remote API.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Aac => "audio/aac",
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "wav" => Ok(AudioFormat::Wav),
            "m4a" => Ok(AudioFormat::M4a),
            "aac" => Ok(AudioFormat::Aac),
            _ => Err(SummaryError::InvalidUpload(format!(
                "unsupported audio format '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// One uploaded recording, owned by a single workflow run.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl AudioUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Text after the last dot of the file name, if any.
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }

    /// Resolve the audio format, rejecting extensions outside `allowed`.
    pub fn format(&self, allowed: &[String]) -> Result<AudioFormat, SummaryError> {
        let extension = self.extension().ok_or_else(|| {
            SummaryError::InvalidUpload(format!("'{}' has no file extension", self.file_name))
        })?;

        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(extension)) {
            return Err(SummaryError::InvalidUpload(format!(
                "'.{}' files are not accepted (allowed: {})",
                extension,
                allowed.join(", ")
            )));
        }

        extension.parse()
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}
