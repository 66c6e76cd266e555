use async_trait::async_trait;
use relay_common::types::NodeAddress;
use serde::Serialize;
use thiserror::Error;

/// Events a node pushes over the interactive channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A chunk of command output.
    Show(String),
    End,
    Error(String),
    Disconnect,
}

/// Messages sent to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Starts a shell inside the application container.
    Exec {
        app: String,
        auth: String,
        shell: String,
    },
    /// Raw input written to the shell.
    Cmd { data: String },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// A persistent bidirectional event channel to one node.
#[async_trait]
pub trait ExecChannel: Send {
    async fn send(&mut self, message: ControlMessage) -> Result<(), ChannelError>;

    /// `None` once the channel has gone away.
    ///
    /// Must be cancel-safe: the session drops this future whenever a timer
    /// fires first, so an event must stay queued until a call returns it.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn close(&mut self);
}

#[async_trait]
pub trait ExecConnector: Send + Sync {
    type Channel: ExecChannel;

    async fn connect(&self, node: &NodeAddress) -> Result<Self::Channel, ChannelError>;
}
