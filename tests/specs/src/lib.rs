// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `canopy` binary as a subprocess and exercises it over
//! HTTP and WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `canopy` binary.
pub fn canopy_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("canopy")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `canopy` process, killed on drop.
pub struct CanopyProcess {
    child: Child,
    pub port: u16,
    pub auth_token: Option<String>,
}

/// Builder for a [`CanopyProcess`].
#[derive(Default)]
pub struct CanopyBuilder {
    auth_token: Option<String>,
}

impl CanopyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the bearer-token gate with a fixed token.
    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    pub fn spawn(self) -> anyhow::Result<CanopyProcess> {
        let port = free_port()?;
        let mut command = Command::new(canopy_binary());
        command
            .arg("--port")
            .arg(port.to_string())
            .arg("--log-level")
            .arg("warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(ref token) = self.auth_token {
            command.arg("--remote").arg("--auth-token").arg(token);
        }
        let child = command.spawn()?;
        Ok(CanopyProcess { child, port, auth_token: self.auth_token })
    }
}

impl CanopyProcess {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self, session: &str) -> String {
        let token = match &self.auth_token {
            Some(token) => format!("&token={token}"),
            None => String::new(),
        };
        format!("ws://127.0.0.1:{}/ws?session={session}{token}", self.port)
    }

    /// Poll the health endpoint until the server answers.
    pub async fn wait_ready(&self) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/api/v1/health", self.base_url());
        for _ in 0..100 {
            if let Ok(response) = client.get(&url).send().await {
                if response.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("canopy did not become ready on port {}", self.port)
    }
}

impl Drop for CanopyProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
