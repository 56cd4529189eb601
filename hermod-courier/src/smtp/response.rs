use super::error::{ClientError, Result};

/// A complete, possibly multi-line, SMTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

/// One line of a reply: `250-first`, `250 last`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ResponseLine {
    pub code: u16,
    pub is_last: bool,
    pub message: String,
}

impl Response {
    /// The reply text, lines joined with spaces
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Parse a single reply line, without its line ending
    pub(super) fn parse_line(line: &str) -> Result<ResponseLine> {
        let code = line
            .get(..3)
            .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| ClientError::Parse(format!("Invalid status code: '{line}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(_) => {
                return Err(ClientError::Parse(format!(
                    "Invalid separator character in '{line}'"
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }
}
