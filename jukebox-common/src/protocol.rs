//! Master/slave control-channel protocol
//!
//! Frames are UTF-8 text, one command per line, tokens joined with `|`,
//! command first:
//!
//! ```text
//! PING[|echo]            -> PONG|HUB_ONLINE[|echo]
//! HEARTBEAT[|echo]       -> PONG|HUB_ONLINE[|echo]
//! AUTH|user|pass            (captured, never enforced)
//! ADD_SONG|03-07[|185]
//! PAUSE_RESUME
//! NEXT_SONG
//! PREVIOUS_SONG
//! SONG_LENGTH|185
//! ```
//!
//! Line terminators (`\n` or `\r\n`) and surrounding whitespace are ignored.

use crate::code::{CodeError, SongCode};
use std::fmt;
use thiserror::Error;

/// Token separator inside a frame
pub const SEPARATOR: char = '|';

/// Fixed status token carried by every PONG
pub const HUB_ONLINE: &str = "HUB_ONLINE";

/// Protocol-level rejections; the connection stays open after any of these
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("{command} requires {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: '{value}' is not a valid number of seconds")]
    InvalidNumber { command: &'static str, value: String },

    #[error("ADD_SONG: {0}")]
    InvalidCode(#[from] CodeError),
}

/// One decoded control-channel command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Ping { echo: Option<String> },
    Heartbeat { echo: Option<String> },
    Pong { echo: Option<String> },
    Auth { user: String, password: String },
    AddSong { code: SongCode, length: Option<u32> },
    PauseResume,
    NextSong,
    PreviousSong,
    SongLength(u32),
}

impl ControlCommand {
    /// Decode one frame
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let frame = frame.trim();
        if frame.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut tokens = frame.split(SEPARATOR).map(str::trim);
        let command = tokens.next().unwrap_or_default();

        match command {
            "PING" => Ok(ControlCommand::Ping {
                echo: optional(tokens.next()),
            }),
            "HEARTBEAT" => Ok(ControlCommand::Heartbeat {
                echo: optional(tokens.next()),
            }),
            "PONG" => {
                // PONG|HUB_ONLINE[|echo]
                let _status = tokens.next();
                Ok(ControlCommand::Pong {
                    echo: optional(tokens.next()),
                })
            }
            "AUTH" => {
                let user = required(tokens.next(), "AUTH", "a user name")?;
                let password = tokens.next().unwrap_or_default().to_string();
                Ok(ControlCommand::Auth {
                    user: user.to_string(),
                    password,
                })
            }
            "ADD_SONG" => {
                let code = required(tokens.next(), "ADD_SONG", "a song code")?;
                let code: SongCode = code.parse()?;
                let length = match optional(tokens.next()) {
                    Some(value) => Some(seconds("ADD_SONG", &value)?),
                    None => None,
                };
                Ok(ControlCommand::AddSong { code, length })
            }
            "PAUSE_RESUME" => Ok(ControlCommand::PauseResume),
            "NEXT_SONG" => Ok(ControlCommand::NextSong),
            "PREVIOUS_SONG" => Ok(ControlCommand::PreviousSong),
            "SONG_LENGTH" => {
                let value = required(tokens.next(), "SONG_LENGTH", "a length in seconds")?;
                Ok(ControlCommand::SongLength(seconds("SONG_LENGTH", value)?))
            }
            other => Err(ProtocolError::Unknown(other.to_string())),
        }
    }

    /// Reply to a PING or HEARTBEAT
    pub fn pong(echo: Option<String>) -> Self {
        ControlCommand::Pong { echo }
    }

    /// Liveness probes are answered on the connection and never reach the coordinator
    pub fn is_liveness(&self) -> bool {
        matches!(
            self,
            ControlCommand::Ping { .. } | ControlCommand::Heartbeat { .. } | ControlCommand::Pong { .. }
        )
    }

    /// Encode to a frame (without line terminator)
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Ping { echo } => write_with_echo(f, "PING", echo),
            ControlCommand::Heartbeat { echo } => write_with_echo(f, "HEARTBEAT", echo),
            ControlCommand::Pong { echo } => {
                write!(f, "PONG{}{}", SEPARATOR, HUB_ONLINE)?;
                if let Some(echo) = echo {
                    write!(f, "{}{}", SEPARATOR, echo)?;
                }
                Ok(())
            }
            ControlCommand::Auth { user, password } => {
                write!(f, "AUTH{0}{1}{0}{2}", SEPARATOR, user, password)
            }
            ControlCommand::AddSong { code, length } => {
                write!(f, "ADD_SONG{}{}", SEPARATOR, code)?;
                if let Some(length) = length {
                    write!(f, "{}{}", SEPARATOR, length)?;
                }
                Ok(())
            }
            ControlCommand::PauseResume => f.write_str("PAUSE_RESUME"),
            ControlCommand::NextSong => f.write_str("NEXT_SONG"),
            ControlCommand::PreviousSong => f.write_str("PREVIOUS_SONG"),
            ControlCommand::SongLength(seconds) => write!(f, "SONG_LENGTH{}{}", SEPARATOR, seconds),
        }
    }
}

fn write_with_echo(f: &mut fmt::Formatter<'_>, command: &str, echo: &Option<String>) -> fmt::Result {
    f.write_str(command)?;
    if let Some(echo) = echo {
        write!(f, "{}{}", SEPARATOR, echo)?;
    }
    Ok(())
}

fn optional(token: Option<&str>) -> Option<String> {
    token.filter(|t| !t.is_empty()).map(str::to_string)
}

fn required<'a>(
    token: Option<&'a str>,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, ProtocolError> {
    token
        .filter(|t| !t.is_empty())
        .ok_or(ProtocolError::MissingArgument { command, argument })
}

fn seconds(command: &'static str, value: &str) -> Result<u32, ProtocolError> {
    value.parse::<u32>().map_err(|_| ProtocolError::InvalidNumber {
        command,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_song_with_length() {
        let cmd = ControlCommand::parse("ADD_SONG|03-07|185\r\n").unwrap();
        assert_eq!(
            cmd,
            ControlCommand::AddSong {
                code: SongCode::new(3, 7),
                length: Some(185)
            }
        );
        assert_eq!(cmd.encode(), "ADD_SONG|03-07|185");
    }

    #[test]
    fn test_parse_add_song_without_length() {
        let cmd = ControlCommand::parse("ADD_SONG|12-01").unwrap();
        assert_eq!(
            cmd,
            ControlCommand::AddSong {
                code: SongCode::new(12, 1),
                length: None
            }
        );
    }

    #[test]
    fn test_add_song_rejects_malformed_code() {
        assert!(matches!(
            ControlCommand::parse("ADD_SONG|3-07"),
            Err(ProtocolError::InvalidCode(CodeError::WrongLength(4)))
        ));
        assert!(matches!(
            ControlCommand::parse("ADD_SONG"),
            Err(ProtocolError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_ping_and_heartbeat_echo() {
        assert_eq!(
            ControlCommand::parse("PING").unwrap(),
            ControlCommand::Ping { echo: None }
        );
        assert_eq!(
            ControlCommand::parse("HEARTBEAT|42").unwrap(),
            ControlCommand::Heartbeat {
                echo: Some("42".to_string())
            }
        );
        assert_eq!(ControlCommand::pong(None).encode(), "PONG|HUB_ONLINE");
        assert_eq!(
            ControlCommand::pong(Some("42".to_string())).encode(),
            "PONG|HUB_ONLINE|42"
        );
        assert_eq!(
            ControlCommand::parse("PONG|HUB_ONLINE|42").unwrap(),
            ControlCommand::Pong {
                echo: Some("42".to_string())
            }
        );
    }

    #[test]
    fn test_auth_captures_credentials() {
        assert_eq!(
            ControlCommand::parse("AUTH|remote|hunter2").unwrap(),
            ControlCommand::Auth {
                user: "remote".to_string(),
                password: "hunter2".to_string()
            }
        );
    }

    #[test]
    fn test_transport_commands() {
        assert_eq!(ControlCommand::parse("PAUSE_RESUME").unwrap(), ControlCommand::PauseResume);
        assert_eq!(ControlCommand::parse(" NEXT_SONG ").unwrap(), ControlCommand::NextSong);
        assert_eq!(ControlCommand::parse("PREVIOUS_SONG").unwrap(), ControlCommand::PreviousSong);
        assert_eq!(ControlCommand::parse("SONG_LENGTH|240").unwrap(), ControlCommand::SongLength(240));
    }

    #[test]
    fn test_song_length_rejects_garbage() {
        assert!(matches!(
            ControlCommand::parse("SONG_LENGTH|abc"),
            Err(ProtocolError::InvalidNumber { .. })
        ));
        assert!(matches!(
            ControlCommand::parse("SONG_LENGTH|-5"),
            Err(ProtocolError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_unknown_and_empty_frames() {
        assert_eq!(
            ControlCommand::parse("SELF_DESTRUCT|now"),
            Err(ProtocolError::Unknown("SELF_DESTRUCT".to_string()))
        );
        assert_eq!(ControlCommand::parse("   \n"), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_liveness_classification() {
        assert!(ControlCommand::Ping { echo: None }.is_liveness());
        assert!(ControlCommand::Heartbeat { echo: None }.is_liveness());
        assert!(!ControlCommand::NextSong.is_liveness());
    }
}
