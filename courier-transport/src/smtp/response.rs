//! SMTP reply parsing.

use crate::TransportError;

/// A complete (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All reply text joined with newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 2xx: the command completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: the server wants more input (354 after DATA, 334 during AUTH).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Does the server's EHLO reply advertise a capability keyword.
    #[must_use]
    pub fn advertises(&self, capability: &str) -> bool {
        let needle = capability.to_ascii_uppercase();
        self.lines
            .iter()
            .any(|line| line.to_ascii_uppercase().contains(&needle))
    }

    /// Convert an error reply into a typed error; callers use this after
    /// checking `is_success`.
    #[must_use]
    pub fn into_error(self) -> TransportError {
        TransportError::Smtp {
            code: self.code,
            message: self.message(),
        }
    }

    /// Try to parse one complete reply from the head of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None` when the
    /// buffer does not yet hold a complete reply (caller reads more).
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>, TransportError> {
        let text = std::str::from_utf8(buffer)
            .map_err(|e| TransportError::Parse(format!("reply is not UTF-8: {e}")))?;

        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut code = None;

        loop {
            let rest = &text[consumed..];
            let Some(line_end) = rest.find('\n') else {
                return Ok(None); // incomplete line
            };

            let raw_line = rest[..line_end].trim_end_matches('\r');
            consumed += line_end + 1;

            if raw_line.is_empty() {
                continue;
            }

            let (line_code, is_last, message) = Self::split_line(raw_line)?;

            match code {
                None => code = Some(line_code),
                Some(expected) if expected != line_code => {
                    return Err(TransportError::Parse(format!(
                        "code mismatch in multi-line reply: {expected} then {line_code}"
                    )));
                }
                Some(_) => {}
            }

            lines.push(message.to_string());

            if is_last {
                let code = code.unwrap_or(line_code);
                return Ok(Some((Self::new(code, lines), consumed)));
            }
        }
    }

    /// Split one reply line into (code, is-last, text). A space after the
    /// code terminates the reply; a dash continues it.
    fn split_line(line: &str) -> Result<(u16, bool, &str), TransportError> {
        if line.len() < 3 {
            return Err(TransportError::Parse(format!("reply line too short: '{line}'")));
        }

        let code = line[..3]
            .parse::<u16>()
            .map_err(|_| TransportError::Parse(format!("invalid reply code in '{line}'")))?;

        match line.as_bytes().get(3) {
            None => Ok((code, true, "")),
            Some(b' ') => Ok((code, true, &line[4..])),
            Some(b'-') => Ok((code, false, &line[4..])),
            Some(c) => Err(TransportError::Parse(format!(
                "invalid separator '{}' after reply code",
                *c as char
            ))),
        }
    }
}
