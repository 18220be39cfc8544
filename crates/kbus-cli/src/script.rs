//! Scripted bus sessions.
//!
//! A script is a TOML document with an optional `device` index and a list of
//! `[[step]]` tables, each naming an operation (`op`) and the ksock it runs
//! on:
//!
//! ```toml
//! [[step]]
//! op = "open"
//! ksock = "server"
//!
//! [[step]]
//! op = "bind"
//! ksock = "server"
//! pattern = "$.Time"
//! role = "replier"
//! ```
//!
//! Steps run in order against one fresh [`Kbus`].  A failing step is
//! reported and the session carries on.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use anyhow::{Context, Result, anyhow, bail};
use kbus_kernel::{Kbus, KbusConfig, Ksock, Message, QueuedMessage, Role};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Script format
// ---------------------------------------------------------------------------

/// A parsed script.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Device index every ksock is opened on.
    #[serde(default)]
    pub device: usize,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse script")
    }
}

/// One operation in a script.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    /// Open a new ksock under a name.
    Open {
        ksock: String,
        #[serde(default = "default_mode")]
        mode: String,
    },
    Close {
        ksock: String,
    },
    Bind {
        ksock: String,
        pattern: String,
        #[serde(default = "default_role")]
        role: Role,
        #[serde(default)]
        guaranteed: bool,
    },
    Unbind {
        ksock: String,
        pattern: String,
        #[serde(default = "default_role")]
        role: Role,
    },
    /// Send an announcement.
    Send {
        ksock: String,
        name: String,
        #[serde(default)]
        data: String,
    },
    Request {
        ksock: String,
        name: String,
        #[serde(default)]
        data: String,
    },
    /// Answer the last request this ksock read with `should_reply` set.
    Reply {
        ksock: String,
        #[serde(default)]
        data: String,
    },
    /// Read one copy, or every queued copy with `all = true`.
    Read {
        ksock: String,
        #[serde(default)]
        all: bool,
    },
    /// Print the device's bindings.
    Bindings,
}

fn default_mode() -> String {
    "rw".to_string()
}

fn default_role() -> Role {
    Role::Listener
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { ksock, mode } => write!(f, "open {ksock} ({mode})"),
            Self::Close { ksock } => write!(f, "close {ksock}"),
            Self::Bind {
                ksock,
                pattern,
                role,
                guaranteed,
            } => {
                write!(f, "bind {ksock} {role} {pattern}")?;
                if *guaranteed {
                    f.write_str(" (guaranteed)")?;
                }
                Ok(())
            }
            Self::Unbind {
                ksock,
                pattern,
                role,
            } => write!(f, "unbind {ksock} {role} {pattern}"),
            Self::Send { ksock, name, .. } => write!(f, "send {ksock} {name}"),
            Self::Request { ksock, name, .. } => write!(f, "request {ksock} {name}"),
            Self::Reply { ksock, .. } => write!(f, "reply {ksock}"),
            Self::Read { ksock, all: false } => write!(f, "read {ksock}"),
            Self::Read { ksock, all: true } => write!(f, "read {ksock} (all)"),
            Self::Bindings => f.write_str("bindings"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Live state of a running script.
pub struct Session {
    bus: Kbus,
    device: usize,
    ksocks: HashMap<String, Ksock>,
    /// Per ksock, the last request it was asked to answer.
    to_answer: HashMap<String, QueuedMessage>,
}

impl Session {
    pub fn new(config: KbusConfig, device: usize) -> Self {
        Self {
            bus: Kbus::new(config),
            device,
            ksocks: HashMap::new(),
            to_answer: HashMap::new(),
        }
    }

    fn ksock(&self, name: &str) -> Result<&Ksock> {
        self.ksocks
            .get(name)
            .ok_or_else(|| anyhow!("no open ksock named '{name}'"))
    }

    /// Execute one step, returning the lines it prints.
    pub fn execute(&mut self, step: &Step) -> Result<Vec<String>> {
        match step {
            Step::Open { ksock, mode } => {
                if self.ksocks.contains_key(ksock) {
                    bail!("ksock '{ksock}' is already open");
                }
                let opened = self.bus.open_str(self.device, mode)?;
                let line = format!("endpoint {}", opened.id());
                self.ksocks.insert(ksock.clone(), opened);
                Ok(vec![line])
            }
            Step::Close { ksock } => {
                let closed = self
                    .ksocks
                    .remove(ksock)
                    .ok_or_else(|| anyhow!("no open ksock named '{ksock}'"))?;
                self.to_answer.remove(ksock);
                let line = format!("endpoint {} closed", closed.id());
                closed.close();
                Ok(vec![line])
            }
            Step::Bind {
                ksock,
                pattern,
                role,
                guaranteed,
            } => {
                self.ksock(ksock)?.bind(pattern, *role, *guaranteed)?;
                Ok(vec!["ok".to_string()])
            }
            Step::Unbind {
                ksock,
                pattern,
                role,
            } => {
                self.ksock(ksock)?.unbind(pattern, *role)?;
                Ok(vec!["ok".to_string()])
            }
            Step::Send { ksock, name, data } => {
                let id = self.ksock(ksock)?.send(Message::new(name.as_str(), data.as_str()))?;
                Ok(vec![format!("id {id}")])
            }
            Step::Request { ksock, name, data } => {
                let id = self
                    .ksock(ksock)?
                    .send(Message::request(name.as_str(), data.as_str()))?;
                Ok(vec![format!("id {id}")])
            }
            Step::Reply { ksock, data } => {
                let request = self
                    .to_answer
                    .get(ksock)
                    .ok_or_else(|| anyhow!("'{ksock}' has no request to answer"))?;
                let reply = request
                    .reply(data.as_str())
                    .ok_or_else(|| anyhow!("request copy has no id or sender"))?;
                let id = self.ksock(ksock)?.send(reply)?;
                self.to_answer.remove(ksock);
                Ok(vec![format!("id {id}")])
            }
            Step::Read { ksock, all } => {
                let copies: Vec<QueuedMessage> = {
                    let handle = self.ksock(ksock)?;
                    if *all {
                        handle.messages().collect()
                    } else {
                        handle.read_next().into_iter().collect()
                    }
                };
                if copies.is_empty() {
                    return Ok(vec!["nothing to read".to_string()]);
                }
                let lines = copies.iter().map(describe_copy).collect();
                if let Some(last) = copies.into_iter().rev().find(|c| c.should_reply()) {
                    self.to_answer.insert(ksock.clone(), last);
                }
                Ok(lines)
            }
            Step::Bindings => {
                let Some(device) = self.bus.device(self.device) else {
                    return Ok(vec!["no endpoints open".to_string()]);
                };
                let rendered = device.render_bindings();
                if rendered.is_empty() {
                    return Ok(vec!["no bindings".to_string()]);
                }
                Ok(rendered.lines().map(str::to_string).collect())
            }
        }
    }
}

/// One-line description of a received copy.
pub fn describe_copy(copy: &QueuedMessage) -> String {
    let id = copy.id().map_or_else(|| "-".to_string(), |id| id.to_string());
    let from = copy.from().map_or_else(|| "-".to_string(), |from| from.to_string());
    let mut line = format!(
        "#{id} {} from {from} {:?}",
        copy.name(),
        String::from_utf8_lossy(copy.data())
    );
    if let Some(request) = copy.in_reply_to() {
        line.push_str(&format!(" [reply to #{request}]"));
    } else if copy.should_reply() {
        line.push_str(" [request, should reply]");
    } else if copy.is_request() {
        line.push_str(" [request]");
    }
    line
}

/// Run every step of `script`, writing a transcript to `out`.
///
/// Returns how many steps failed.
pub fn run_script(script: &Script, config: KbusConfig, out: &mut impl Write) -> Result<usize> {
    let mut session = Session::new(config, script.device);
    let mut failures = 0;

    for (index, step) in script.steps.iter().enumerate() {
        let number = index + 1;
        match session.execute(step) {
            Ok(lines) => {
                for line in lines {
                    writeln!(out, "{number:>3} {step}: {line}")?;
                }
            }
            Err(e) => {
                failures += 1;
                tracing::debug!(step = number, error = %e, "script step failed");
                writeln!(out, "{number:>3} {step}: error: {e}")?;
            }
        }
    }

    Ok(failures)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
