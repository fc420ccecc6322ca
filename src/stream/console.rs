use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::{model::ChatMessage, stream::ChatSource, Result};

/// Chat typed into a terminal, one message per line. `name: text` sets the author.
pub struct ConsoleChat<R = BufReader<Stdin>> {
    platform: String,
    lines: Lines<R>,
}

impl ConsoleChat {
    pub fn stdin(platform: impl Into<String>) -> Self {
        Self::new(platform, BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleChat<R> {
    pub fn new(platform: impl Into<String>, reader: R) -> Self {
        Self {
            platform: platform.into(),
            lines: reader.lines(),
        }
    }
}

fn parse_line(line: &str, platform: &str) -> Option<ChatMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (author, message) = match line.split_once(':') {
        Some((author, message)) if !author.trim().is_empty() && !author.contains(' ') => {
            (author.trim(), message.trim())
        }
        _ => ("console", line),
    };

    Some(ChatMessage::new(author, message, platform))
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ChatSource for ConsoleChat<R> {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<ChatMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Some(message) = parse_line(&line, &self.platform) {
                return Ok(Some(message));
            }
        }

        Ok(None)
    }
}
