use std::time::Duration;

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Longest reply line we are prepared to buffer
const MAX_LINE_LENGTH: usize = 4096;

/// Escape a message for the DATA phase and append the terminator.
///
/// Lines starting with `.` get a second one, bare LF becomes CRLF, and the
/// body is closed with `.` on a line of its own.
#[must_use]
pub fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64 + 5);
    let mut at_line_start = true;
    let mut previous = 0u8;

    for &byte in data {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);

        at_line_start = byte == b'\n';
        previous = byte;
    }

    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");

    out
}

/// A client session over any byte stream
///
/// Each read of a reply is bounded by the command timeout.
#[derive(Debug)]
pub struct SmtpClient<S> {
    stream: BufReader<S>,
    command_timeout: Duration,
}

impl SmtpClient<TcpStream> {
    /// Connect to `host:port`, bounded by `connect_timeout`
    ///
    /// # Errors
    /// If the connection cannot be established in time
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ClientError::Timeout("connection"))??;

        Ok(Self::new(stream, command_timeout))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpClient<S> {
    pub fn new(stream: S, command_timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            command_timeout,
        }
    }

    /// Read the 220 banner
    ///
    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn greeting(&mut self) -> Result<Response> {
        self.read_response("greeting").await
    }

    /// Send one command line and read its reply
    ///
    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.stream
            .write_all(format!("{command}\r\n").as_bytes())
            .await?;
        self.stream.flush().await?;

        self.read_response("reply").await
    }

    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Send the message body and read the final reply
    ///
    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn send_data(&mut self, data: &[u8]) -> Result<Response> {
        self.stream.write_all(&dot_stuff(data)).await?;
        self.stream.flush().await?;

        self.read_response("end of data").await
    }

    /// # Errors
    /// On transport failure or an unparseable reply
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn read_response(&mut self, waiting_for: &'static str) -> Result<Response> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(
                self.command_timeout,
                (&mut self.stream)
                    .take(MAX_LINE_LENGTH as u64)
                    .read_line(&mut line),
            )
            .await
            .map_err(|_| ClientError::Timeout(waiting_for))??;

            if read == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            if !line.ends_with('\n') {
                return Err(ClientError::Parse(format!(
                    "Reply line too long or truncated: '{}'",
                    line.trim_end()
                )));
            }

            let parsed = Response::parse_line(line.trim_end_matches(['\r', '\n']))?;
            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(Response {
                    code: parsed.code,
                    lines,
                });
            }
        }
    }
}
