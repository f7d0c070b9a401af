//! Positional song codes
//!
//! Keypad and remote input address a track as `DD-DD`: a 1-based album index
//! followed by a 1-based track index within that album (`03-07`). Parsing here
//! is structural only; bounds are checked against the live library by the node.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Exact length of a positional code
pub const CODE_LENGTH: usize = 5;

/// Rejection reasons for positional codes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("code must be {CODE_LENGTH} characters, got {0}")]
    WrongLength(usize),

    #[error("code must have '-' at position 2")]
    MissingSeparator,

    #[error("'{0}' is not a non-negative integer")]
    NotANumber(String),

    #[error("album {album} / track {track} is outside the library")]
    OutOfRange { album: usize, track: usize },
}

/// Parsed `DD-DD` code (both indexes 1-based as typed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SongCode {
    album: usize,
    track: usize,
}

impl SongCode {
    pub fn new(album: usize, track: usize) -> Self {
        Self { album, track }
    }

    /// 1-based album index as typed
    pub fn album(&self) -> usize {
        self.album
    }

    /// 1-based track index as typed
    pub fn track(&self) -> usize {
        self.track
    }

    /// Zero-based (album, track) indexes, or `OutOfRange` for a zero index
    pub fn zero_based(&self) -> Result<(usize, usize), CodeError> {
        if self.album == 0 || self.track == 0 {
            return Err(self.out_of_range());
        }
        Ok((self.album - 1, self.track - 1))
    }

    pub fn out_of_range(&self) -> CodeError {
        CodeError::OutOfRange {
            album: self.album,
            track: self.track,
        }
    }
}

fn parse_half(half: &str) -> Result<usize, CodeError> {
    // str::parse would accept a leading '+'
    if half.is_empty() || !half.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodeError::NotANumber(half.to_string()));
    }
    half.parse::<usize>()
        .map_err(|_| CodeError::NotANumber(half.to_string()))
}

impl FromStr for SongCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars = s.chars().count();
        if chars != CODE_LENGTH || s.len() != CODE_LENGTH {
            return Err(CodeError::WrongLength(chars));
        }
        if s.as_bytes()[2] != b'-' {
            return Err(CodeError::MissingSeparator);
        }
        Ok(Self {
            album: parse_half(&s[..2])?,
            track: parse_half(&s[3..])?,
        })
    }
}

impl fmt::Display for SongCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.album, self.track)
    }
}
