//! FTP Response handling
//!
//! Defines reply codes, the static code-to-text table and reply formatting.

use std::fmt;

pub const ABOUT_TO_OPEN: u16 = 150;
pub const OK: u16 = 200;
pub const SYSTEM_STATUS: u16 = 211;
pub const FILE_STATUS: u16 = 213;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const CLOSING: u16 = 221;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const PASSIVE_MODE: u16 = 227;
pub const LOGIN_SUCCESS: u16 = 230;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATHNAME: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const NEED_ACCOUNT: u16 = 332;
pub const SERVICE_UNAVAILABLE: u16 = 421;
pub const CANT_OPEN_DATA: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 426;
pub const LOCAL_ERROR: u16 = 451;
pub const SYNTAX_ERROR: u16 = 500;
pub const NOT_IMPLEMENTED: u16 = 502;
pub const PARAM_NOT_IMPLEMENTED: u16 = 504;
pub const NOT_LOGGED_IN: u16 = 530;
pub const FILE_UNAVAILABLE: u16 = 550;
pub const NAME_NOT_ALLOWED: u16 = 553;

/// Standard text for a reply code.
pub fn reply_text(code: u16) -> &'static str {
    match code {
        110 => "Restart marker reply.",
        120 => "Service ready in nnn minutes.",
        125 => "Data connection already open; transfer starting.",
        150 => "File status okay; about to open data connection.",
        200 => "Command okay.",
        202 => "Command not implemented, superfluous at this site.",
        211 => "System status, or system help reply.",
        212 => "Directory status.",
        213 => "File status.",
        214 => "Help message.",
        215 => "NAME system type.",
        220 => "Service ready for new user.",
        221 => "Service closing control connection.",
        225 => "Data connection open; no transfer in progress.",
        226 => "Closing data connection.",
        227 => "Entering Passive Mode.",
        230 => "User logged in, proceed.",
        250 => "Requested file action okay, completed.",
        257 => "\"PATHNAME\" created.",
        331 => "User name okay, need password.",
        332 => "Need account for login.",
        350 => "Requested file action pending further information.",
        421 => "Service not available, closing control connection.",
        425 => "Can't open data connection.",
        426 => "Connection closed; transfer aborted.",
        450 => "Requested file action not taken.",
        451 => "Requested action aborted. Local error in processing.",
        452 => "Requested action not taken. Insufficient storage space in system.",
        500 => "Syntax error, command unrecognized.",
        501 => "Syntax error in parameters or arguments.",
        502 => "Command not implemented.",
        503 => "Bad sequence of commands.",
        504 => "Command not implemented for that parameter.",
        530 => "Not logged in.",
        532 => "Need account for storing files.",
        550 => "Requested action not taken. File unavailable.",
        551 => "Requested action aborted. Page type unknown.",
        552 => "Requested file action aborted. Exceeded storage allocation.",
        553 => "Requested action not taken. File name not allowed.",
        _ => "Unknown reply.",
    }
}

/// A reply line (or block) sent on the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    pub fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Reply carrying the standard table text.
    pub fn standard(code: u16) -> Self {
        Self::new(code, reply_text(code))
    }

    /// Multi-line reply: the first and last lines carry the code, the middle
    /// lines are sent as given.
    pub fn multiline(code: u16, lines: &[&str]) -> Self {
        Self::new(code, lines.join("\n"))
    }

    /// Wire form, CRLF terminated.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<&str> = self.text.split('\n').collect();
        match lines.as_slice() {
            [first, middle @ .., last] => {
                write!(f, "{}-{}\r\n", self.code, first)?;
                for line in middle {
                    write!(f, "{}\r\n", line)?;
                }
                write!(f, "{} {}\r\n", self.code, last)
            }
            _ => write!(f, "{} {}\r\n", self.code, self.text),
        }
    }
}
