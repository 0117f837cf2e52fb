// ABOUTME: Minimal IRCv3 line codec for Twitch chat (tags, prefix, command, params)
// ABOUTME: Parses inbound lines and formats the outbound commands the transport sends

use std::collections::HashMap;

/// One parsed IRC line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    /// Source prefix without the leading ':' (e.g. "nick!nick@nick.tmi.twitch.tv")
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single line (without the trailing CRLF)
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return None;
        }

        let mut tags = HashMap::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, after) = stripped.split_once(' ')?;
            for pair in raw_tags.split(';').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                tags.insert(key.to_string(), unescape_tag(value));
            }
            rest = after.trim_start();
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (source, after) = stripped.split_once(' ')?;
            prefix = Some(source.to_string());
            rest = after.trim_start();
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_string(),
            params,
        })
    }

    /// Nickname part of the prefix
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split('!').next().unwrap_or(prefix);
        // Server prefixes ("tmi.twitch.tv") carry no nickname
        if nick.is_empty() || (nick.contains('.') && !prefix.contains('!')) {
            None
        } else {
            Some(nick)
        }
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Unwrap a CTCP ACTION ("/me") body, if the text is one
pub fn strip_action(text: &str) -> Option<&str> {
    text.strip_prefix("\u{1}ACTION ")
        .map(|t| t.strip_suffix('\u{1}').unwrap_or(t))
}

/// Channel name as it appears on the wire ("#name", lowercase)
pub fn channel_target(channel: &str) -> String {
    format!("#{}", channel.trim().trim_start_matches('#').to_lowercase())
}

// ─── Outbound commands ──────────────────────────────────────────

pub fn pass(token: &str) -> String {
    format!("PASS {token}")
}

pub fn nick(username: &str) -> String {
    format!("NICK {}", username.to_lowercase())
}

pub fn cap_request() -> String {
    "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string()
}

pub fn join(channel: &str) -> String {
    format!("JOIN {}", channel_target(channel))
}

pub fn pong(payload: Option<&str>) -> String {
    match payload {
        Some(payload) => format!("PONG :{payload}"),
        None => "PONG".to_string(),
    }
}

/// PRIVMSG with line breaks flattened so one call is one IRC line
pub fn privmsg(channel: &str, text: &str) -> String {
    let text = text.replace(['\r', '\n'], " ");
    format!("PRIVMSG {} :{}", channel_target(channel), text)
}
