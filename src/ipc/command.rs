//! The controller command table.
//!
//! Every command the controller understands is a variant of [`Command`]. The
//! verb, argument rendering, expected response shape and whether the command
//! changes controller state are all defined here, so call sites and tests
//! share one contract.
//!
//! | verb            | arguments                          | response          |
//! |-----------------|------------------------------------|-------------------|
//! | `status`        | none                               | status object     |
//! | `statuswait`    | wait bound in milliseconds         | status object     |
//! | `hwinfo`        | none                               | hardware info     |
//! | `getpattern`    | raw flag                           | binary PNG        |
//! | `setpattern`    | x, y, merge flag, body length      | acknowledgement   |
//! | `editpattern`   | `clr` / `trim` / `center`          | acknowledgement   |
//! | `setrow`        | row index                          | acknowledgement   |
//! | `setoffset`     | needle offset                      | acknowledgement   |
//! | `setknitmode`   | knitting enabled flag              | acknowledgement   |
//! | `setrepeatmode` | `oneshot` / `repeat` / `manual`    | acknowledgement   |
//! | `hwmock`        | event name, integer value          | acknowledgement   |

use std::fmt;
use std::str::FromStr;

/// Discriminator announcing that raw bytes follow the header line.
pub const BINDATA_TAG: &str = "bindata";

/// Shape of the controller's answer to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// One JSON line.
    Parsed,
    /// A JSON header tagged with the given discriminator, then raw bytes.
    Binary(&'static str),
}

/// Pattern edit operations accepted by `editpattern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    /// Clear the loaded pattern
    Clear,
    /// Trim empty rows and columns
    Trim,
    /// Center the pattern on the needle bed
    Center,
}

/// Repeat behavior once the last pattern row has been knitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    OneShot,
    Repeat,
    Manual,
}

/// Simulated hardware events (debug builds of the controller only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    /// Move the simulated carriage to an absolute position
    SetPosition,
}

macro_rules! token_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $token:literal),+ $(,)? }) => {
        impl $ty {
            /// Wire token for this value.
            pub fn as_token(&self) -> &'static str {
                match self {
                    $($ty::$variant => $token,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_token())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($token => Ok($ty::$variant),)+
                    other => Err(format!(
                        "invalid {} {:?}, expected one of: {}",
                        $what,
                        other,
                        [$($token),+].join(", ")
                    )),
                }
            }
        }
    };
}

token_enum!(EditMode, "edit mode", {
    Clear => "clr",
    Trim => "trim",
    Center => "center",
});

token_enum!(RepeatMode, "repeat mode", {
    OneShot => "oneshot",
    Repeat => "repeat",
    Manual => "manual",
});

token_enum!(MockEvent, "mock event", {
    SetPosition => "setpos",
});

/// A single controller command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    StatusWait { timeout_ms: u64 },
    HardwareInfo,
    GetPattern { raw: bool },
    /// Upload a PNG; its length is the last argument and the bytes follow
    /// the command line.
    SetPattern { x: i32, y: i32, merge: bool, png: Vec<u8> },
    EditPattern(EditMode),
    SetRow(i32),
    SetOffset(i32),
    SetKnitMode(bool),
    SetRepeatMode(RepeatMode),
    HardwareMock { event: MockEvent, value: i64 },
}

impl Command {
    /// Leading token of the command line.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Status => "status",
            Command::StatusWait { .. } => "statuswait",
            Command::HardwareInfo => "hwinfo",
            Command::GetPattern { .. } => "getpattern",
            Command::SetPattern { .. } => "setpattern",
            Command::EditPattern(_) => "editpattern",
            Command::SetRow(_) => "setrow",
            Command::SetOffset(_) => "setoffset",
            Command::SetKnitMode(_) => "setknitmode",
            Command::SetRepeatMode(_) => "setrepeatmode",
            Command::HardwareMock { .. } => "hwmock",
        }
    }

    /// Arguments following the verb, already rendered to wire tokens.
    pub fn args(&self) -> Vec<String> {
        match self {
            Command::Status | Command::HardwareInfo => Vec::new(),
            Command::StatusWait { timeout_ms } => vec![timeout_ms.to_string()],
            Command::GetPattern { raw } => vec![bool_token(*raw).to_string()],
            Command::SetPattern { x, y, merge, png } => vec![
                x.to_string(),
                y.to_string(),
                bool_token(*merge).to_string(),
                png.len().to_string(),
            ],
            Command::EditPattern(mode) => vec![mode.as_token().to_string()],
            Command::SetRow(row) => vec![row.to_string()],
            Command::SetOffset(offset) => vec![offset.to_string()],
            Command::SetKnitMode(enabled) => vec![bool_token(*enabled).to_string()],
            Command::SetRepeatMode(mode) => vec![mode.as_token().to_string()],
            Command::HardwareMock { event, value } => {
                vec![event.as_token().to_string(), value.to_string()]
            }
        }
    }

    /// What the controller sends back.
    pub fn response_kind(&self) -> ResponseKind {
        match self {
            Command::GetPattern { .. } => ResponseKind::Binary(BINDATA_TAG),
            _ => ResponseKind::Parsed,
        }
    }

    /// Raw bytes sent after the command line, if any.
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Command::SetPattern { png, .. } => Some(png),
            _ => None,
        }
    }

    /// Whether the command changes controller state.
    ///
    /// Successful mutating commands wake any pending status long-poll.
    pub fn is_mutating(&self) -> bool {
        match self {
            Command::Status
            | Command::StatusWait { .. }
            | Command::HardwareInfo
            | Command::GetPattern { .. } => false,
            Command::SetPattern { .. }
            | Command::EditPattern(_)
            | Command::SetRow(_)
            | Command::SetOffset(_)
            | Command::SetKnitMode(_)
            | Command::SetRepeatMode(_)
            | Command::HardwareMock { .. } => true,
        }
    }

    /// Render the command line without terminator.
    pub fn to_line(&self) -> String {
        let mut line = self.verb().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

fn bool_token(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_lines() {
        assert_eq!(Command::Status.to_line(), "status");
        assert_eq!(
            Command::StatusWait { timeout_ms: 1000 }.to_line(),
            "statuswait 1000"
        );
        assert_eq!(Command::HardwareInfo.to_line(), "hwinfo");
        assert_eq!(Command::GetPattern { raw: true }.to_line(), "getpattern True");
        assert_eq!(
            Command::SetPattern { x: 10, y: 20, merge: false, png: b"foobar".to_vec() }.to_line(),
            "setpattern 10 20 False 6"
        );
        assert_eq!(
            Command::EditPattern(EditMode::Center).to_line(),
            "editpattern center"
        );
        assert_eq!(Command::SetRow(-1).to_line(), "setrow -1");
        assert_eq!(Command::SetOffset(12).to_line(), "setoffset 12");
        assert_eq!(Command::SetKnitMode(true).to_line(), "setknitmode True");
        assert_eq!(
            Command::SetRepeatMode(RepeatMode::OneShot).to_line(),
            "setrepeatmode oneshot"
        );
        assert_eq!(
            Command::HardwareMock { event: MockEvent::SetPosition, value: 73 }.to_line(),
            "hwmock setpos 73"
        );
    }

    #[test]
    fn test_response_kinds() {
        assert_eq!(
            Command::GetPattern { raw: false }.response_kind(),
            ResponseKind::Binary("bindata")
        );
        assert_eq!(Command::Status.response_kind(), ResponseKind::Parsed);
        assert_eq!(
            Command::SetPattern { x: 0, y: 0, merge: true, png: Vec::new() }.response_kind(),
            ResponseKind::Parsed
        );
    }

    #[test]
    fn test_mutating_commands() {
        assert!(!Command::Status.is_mutating());
        assert!(!Command::StatusWait { timeout_ms: 0 }.is_mutating());
        assert!(!Command::GetPattern { raw: true }.is_mutating());
        assert!(Command::SetRow(3).is_mutating());
        assert!(Command::EditPattern(EditMode::Clear).is_mutating());

        let upload = Command::SetPattern { x: 0, y: 0, merge: false, png: b"\x89PNG".to_vec() };
        assert_eq!(upload.body(), Some(&b"\x89PNG"[..]));
        assert_eq!(Command::SetRow(3).body(), None);
    }

    #[test]
    fn test_token_parsing() {
        assert_eq!("trim".parse::<EditMode>(), Ok(EditMode::Trim));
        assert_eq!("manual".parse::<RepeatMode>(), Ok(RepeatMode::Manual));
        assert_eq!("setpos".parse::<MockEvent>(), Ok(MockEvent::SetPosition));

        let err = "sideways".parse::<RepeatMode>().unwrap_err();
        assert!(err.contains("oneshot, repeat, manual"), "got: {}", err);
    }
}
