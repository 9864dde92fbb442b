//! Bridge configuration and the enabled/disabled predicate.

/// Default Twitch chat ingress endpoint.
pub const TWITCH_IRC_ADDR: &str = "irc.chat.twitch.tv:6667";

/// Configuration for the chat bridge.
///
/// Both `channel` and `auth_token` are optional: the bridge runs in
/// **disabled mode** until both are present and non-blank. The config is
/// re-evaluated at every connect attempt and every send, so credentials
/// supplied after startup (via [`crate::bridge::ChatBridge::update_config`])
/// take effect without a restart.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Channel to join (without the leading `#`).
    pub channel: Option<String>,
    /// OAuth token, sent as `PASS oauth:<token>`.
    pub auth_token: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_addr: TWITCH_IRC_ADDR.to_string(),
            channel: None,
            auth_token: None,
        }
    }
}

impl BridgeConfig {
    /// True iff both channel and token are present and non-blank.
    pub fn enabled(&self) -> bool {
        self.credentials().is_some()
    }

    /// The `(channel, token)` pair when the bridge is enabled.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let channel = self.channel.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        let token = self.auth_token.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        Some((channel, token))
    }
}
