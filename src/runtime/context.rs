// src/runtime/context.rs
//! What the hosted program can reach
//!
//! `ProgramContext` is handed to the entry point. Everything a program does
//! to the outside world goes through it: console, input, content writes and
//! uploads, and graphical messages for the client.

use crate::exception::{ExceptionKey, ExceptionRecord};
use crate::protocol::message::ClientMessage;
use crate::protocol::sink::SafeSender;
use crate::runtime::content::ContentGateway;
use crate::runtime::input::InputRedirector;
use crate::runtime::output::Console;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ProgramContext {
    session_id: String,
    console: Console,
    input: InputRedirector,
    content: ContentGateway,
    interrupt: CancellationToken,
    sender: Arc<SafeSender>,
    /// Non-code project files, by name
    resources: Arc<HashMap<String, String>>,
}

impl ProgramContext {
    pub fn new(
        session_id: impl Into<String>,
        console: Console,
        input: InputRedirector,
        content: ContentGateway,
        interrupt: CancellationToken,
        sender: Arc<SafeSender>,
        resources: Arc<HashMap<String, String>>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            console,
            input,
            content,
            interrupt,
            sender,
            resources,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn input(&mut self) -> &mut InputRedirector {
        &mut self.input
    }

    pub fn content(&self) -> &ContentGateway {
        &self.content
    }

    /// Contents of a project file that was not compiled
    pub fn resource(&self, name: &str) -> Option<&str> {
        self.resources.get(name).map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    /// Cooperative cancellation point for long-running programs
    pub fn check_cancelled(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            return Err(ExceptionRecord::user(ExceptionKey::ProgramInterrupted).into());
        }
        Ok(())
    }

    /// Send a message to the client, after any pending console output
    ///
    /// Fails only when the session has been cancelled; transport problems
    /// are absorbed by the sender.
    pub fn emit(&self, message: impl Into<ClientMessage>) -> anyhow::Result<()> {
        self.check_cancelled()?;
        self.console.flush();
        self.sender.send(message);
        Ok(())
    }
}
