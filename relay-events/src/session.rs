//! Interactive command execution as an explicit state machine.
//!
//! ```text
//! Connecting --open--> ShellStarting --settle--> CommandSent --chunk--> Draining
//! CommandSent --output already buffered--> Draining
//! Draining --idle with output | end--> Done
//! any --error/disconnect--> Done (output buffered) | Failed (no output)
//! any --deadline--> Done (output buffered) | Failed (no output)
//! ```
//!
//! When several things are ready at once the hard deadline is checked first,
//! then channel events, then the idle timer.

use crate::channel::{ChannelEvent, ControlMessage, ExecChannel, ExecConnector};
use relay_common::config::ExecConfig;
use relay_common::types::NodeAddress;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

/// Appended so the remote shell exits once the command finishes.
const EXIT_SENTINEL: &str = " && exit 0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Connecting,
    ShellStarting,
    CommandSent,
    Draining,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Done { output: String },
    Failed { reason: String },
}

impl ExecOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ExecOutcome::Done { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Wire name of the application or component.
    pub app: String,
    /// Credential header value.
    pub auth: String,
    pub command: String,
}

pub struct ExecSession {
    state: ExecState,
    output_buffer: String,
    last_chunk_at: Option<Instant>,
    deadline: Instant,
    settle: Duration,
    idle: Duration,
}

impl ExecSession {
    pub fn new(config: &ExecConfig) -> Self {
        Self {
            state: ExecState::Connecting,
            output_buffer: String::new(),
            last_chunk_at: None,
            deadline: Instant::now() + config.deadline(),
            settle: config.settle(),
            idle: config.idle(),
        }
    }

    /// Runs one execution to completion. The channel is closed on every
    /// path that opened it.
    pub async fn run<C: ExecConnector>(
        mut self,
        connector: &C,
        node: &NodeAddress,
        request: &ExecRequest,
    ) -> ExecOutcome {
        let connect = tokio::select! {
            biased;
            _ = sleep_until(self.deadline) => {
                return self.settle_terminal("deadline reached while connecting");
            }
            res = connector.connect(node) => res,
        };

        let mut channel = match connect {
            Ok(channel) => channel,
            Err(e) => return self.settle_terminal(&e.to_string()),
        };

        let outcome = self.drive(&mut channel, request).await;
        channel.close().await;
        outcome
    }

    async fn drive<Ch: ExecChannel>(
        &mut self,
        channel: &mut Ch,
        request: &ExecRequest,
    ) -> ExecOutcome {
        let bootstrap = ControlMessage::Exec {
            app: request.app.clone(),
            auth: request.auth.clone(),
            shell: "sh".into(),
        };
        if let Err(e) = channel.send(bootstrap).await {
            return self.settle_terminal(&e.to_string());
        }
        self.transition(ExecState::ShellStarting);

        let settle = sleep(self.settle);
        tokio::pin!(settle);
        loop {
            tokio::select! {
                biased;
                _ = sleep_until(self.deadline) => {
                    return self.settle_terminal("deadline reached while starting shell");
                }
                event = channel.next_event() => {
                    if let Some(outcome) = self.on_event(event) {
                        return outcome;
                    }
                }
                _ = &mut settle => break,
            }
        }

        let input = ControlMessage::Cmd {
            data: format!("{}{}\n", request.command, EXIT_SENTINEL),
        };
        if let Err(e) = channel.send(input).await {
            return self.settle_terminal(&e.to_string());
        }
        self.transition(ExecState::CommandSent);
        if !self.output_buffer.is_empty() {
            // prompt or banner printed while the shell started; the idle
            // window runs from the moment the command went out
            self.last_chunk_at = Some(Instant::now());
            self.transition(ExecState::Draining);
        }

        loop {
            let idle_at = match (self.state, self.last_chunk_at) {
                (ExecState::Draining, Some(last)) => Some(last + self.idle),
                _ => None,
            };

            tokio::select! {
                biased;
                _ = sleep_until(self.deadline) => {
                    return self.settle_terminal("deadline reached");
                }
                event = channel.next_event() => {
                    if let Some(outcome) = self.on_event(event) {
                        return outcome;
                    }
                }
                _ = sleep_until(idle_at.unwrap_or(self.deadline)), if idle_at.is_some() => {
                    if !self.output_buffer.is_empty() {
                        return self.complete();
                    }
                }
            }
        }
    }

    fn on_event(&mut self, event: Option<ChannelEvent>) -> Option<ExecOutcome> {
        match event {
            Some(ChannelEvent::Show(chunk)) => {
                self.output_buffer.push_str(&chunk);
                self.last_chunk_at = Some(Instant::now());
                if self.state == ExecState::CommandSent {
                    self.transition(ExecState::Draining);
                }
                None
            }
            Some(ChannelEvent::End)
                if matches!(self.state, ExecState::CommandSent | ExecState::Draining) =>
            {
                Some(self.complete())
            }
            Some(ChannelEvent::End) => Some(self.settle_terminal("shell ended before the command ran")),
            Some(ChannelEvent::Error(message)) => Some(self.settle_terminal(&message)),
            Some(ChannelEvent::Disconnect) | None => Some(self.settle_terminal("channel disconnected")),
        }
    }

    fn complete(&mut self) -> ExecOutcome {
        self.transition(ExecState::Done);
        ExecOutcome::Done {
            output: std::mem::take(&mut self.output_buffer),
        }
    }

    /// Buffered output is never discarded: with output the session is done,
    /// without it the session failed.
    fn settle_terminal(&mut self, reason: &str) -> ExecOutcome {
        if self.output_buffer.is_empty() {
            warn!(state = ?self.state, "exec session failed: {}", reason);
            self.transition(ExecState::Failed);
            ExecOutcome::Failed {
                reason: reason.to_string(),
            }
        } else {
            debug!(state = ?self.state, "exec session ended with partial output: {}", reason);
            self.complete()
        }
    }

    fn transition(&mut self, next: ExecState) {
        debug!(from = ?self.state, to = ?next, "exec session transition");
        self.state = next;
    }
}
