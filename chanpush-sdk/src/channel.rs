//! Channel identifiers and the server's channel directory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// A named broadcast topic a client can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Channel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Channel {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Body of `GET /channels/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelList {
    pub channels: Vec<Channel>,
}

/// HTTP client for the server's channel list.
#[derive(Debug, Clone)]
pub struct ChannelDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl ChannelDirectory {
    /// `base_url` is the server's HTTP origin, e.g. `http://localhost:8000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the ordered channel list.
    ///
    /// Any transport error, non-success status or undecodable body maps to
    /// [`ClientError::ChannelListUnavailable`].
    pub async fn list_channels(&self) -> Result<Vec<Channel>, ClientError> {
        let url = format!("{}/channels/", self.base_url);
        tracing::debug!(%url, "fetching channel list");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::ChannelListUnavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::ChannelListUnavailable(format!(
                "GET {url} returned {status}"
            )));
        }
        let list: ChannelList = resp
            .json()
            .await
            .map_err(|e| ClientError::ChannelListUnavailable(format!("bad channel list: {e}")))?;
        tracing::info!(count = list.channels.len(), "channel list loaded");
        Ok(list.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_list_decodes_in_order() {
        let list: ChannelList =
            serde_json::from_str(r#"{"channels":["general","sports","news","tech"]}"#).unwrap();
        let names: Vec<&str> = list.channels.iter().map(Channel::as_str).collect();
        assert_eq!(names, ["general", "sports", "news", "tech"]);
    }

    #[tokio::test]
    async fn unreachable_server_is_channel_list_unavailable() {
        // Port 9 (discard) on loopback is closed on any sane test host.
        let dir = ChannelDirectory::new("http://127.0.0.1:9/");
        let err = dir.list_channels().await.unwrap_err();
        assert!(matches!(err, ClientError::ChannelListUnavailable(_)));
    }
}
