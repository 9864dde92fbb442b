//! IRC wire format: line parsing and chat-event extraction.
//!
//! Twitch chat speaks plain IRC. Inbound lines look like
//! `:alice!alice@alice.tmi.twitch.tv PRIVMSG #chan :hello world`; this module
//! splits them into prefix/command/params and classifies user chat posts.

use crate::event::ChatEvent;

/// A parsed IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender prefix without the leading `:` (e.g. `alice!alice@host`).
    pub prefix: Option<String>,
    /// Command or numeric (`PRIVMSG`, `PING`, `001`, ...), uppercased.
    pub command: String,
    /// Positional parameters; a trailing `:`-parameter is the last entry.
    pub params: Vec<String>,
}

impl Message {
    /// Parse a raw line. Returns `None` for blank lines; otherwise never
    /// fails — unrecognized shapes still yield a command and params.
    pub fn parse(line: &str) -> Option<Message> {
        let mut rest = line.trim_end_matches(['\r', '\n']).trim_start();

        // IRCv3 message tags may be present even though we never request
        // them; skip the whole `@key=value;...` token.
        if rest.starts_with('@') {
            let (_, after) = rest.split_once(' ')?;
            rest = after.trim_start();
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, after) = stripped.split_once(' ')?;
            rest = after.trim_start();
            Some(prefix.to_string())
        } else {
            None
        };

        let mut params = Vec::new();
        let command = match rest.split_once(' ') {
            Some((cmd, mut after)) => {
                loop {
                    after = after.trim_start();
                    if after.is_empty() {
                        break;
                    }
                    if let Some(trailing) = after.strip_prefix(':') {
                        params.push(trailing.to_string());
                        break;
                    }
                    match after.split_once(' ') {
                        Some((param, next)) => {
                            params.push(param.to_string());
                            after = next;
                        }
                        None => {
                            params.push(after.to_string());
                            break;
                        }
                    }
                }
                cmd
            }
            None => rest,
        };

        if command.is_empty() {
            return None;
        }

        Some(Message {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick portion of the prefix (the part before `!`), if any.
    pub fn sender_nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split('!').next().unwrap_or("");
        if nick.is_empty() {
            None
        } else {
            Some(nick)
        }
    }
}

/// Classify a raw line as a user chat post and extract its content.
///
/// Returns `None` unless `message_type` is `PRIVMSG` and a non-empty sender
/// nick is present. Content is everything after the **last** colon when the
/// line carries the PRIVMSG marker (the sender prefix itself starts with a
/// colon, so the first colon is never the body). Lines without a trailing
/// colon are kept verbatim rather than rejected.
pub fn chat_event(raw: &str, message_type: &str, sender_nick: Option<&str>) -> Option<ChatEvent> {
    if message_type != "PRIVMSG" {
        return None;
    }
    let username = sender_nick.map(str::trim).filter(|n| !n.is_empty())?;

    let raw = raw.trim_end_matches(['\r', '\n']);
    let content = if raw.contains("PRIVMSG") {
        match raw.rfind(':') {
            Some(idx) => &raw[idx + 1..],
            None => raw,
        }
    } else {
        raw
    };

    Some(ChatEvent::new(username, content))
}
