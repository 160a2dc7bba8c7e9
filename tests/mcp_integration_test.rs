//! MCP Server Integration Tests
//!
//! These tests spawn the server binary and talk JSON-RPC to it over stdio.

#![allow(deprecated)] // Allow deprecated cargo_bin for now

use assert_cmd::cargo::CommandCargoExt;
use assert_cmd::Command as AssertCommand;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// MCP Test Client that communicates with the server via stdio
struct McpTestClient {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    request_id: i64,
}

impl McpTestClient {
    /// Spawn the server with quiet periodic notifiers, running in `dir`.
    fn spawn(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Self::spawn_with(dir, &[])
    }

    fn spawn_with(dir: &Path, extra: &[&str]) -> Result<Self, Box<dyn std::error::Error>> {
        let mut child = Command::cargo_bin("mcp-everything")?
            .current_dir(dir)
            .env_remove("MCP_EVERYTHING_NAME")
            .env_remove("MCP_EVERYTHING_METRICS_FILE")
            .arg("--log-interval")
            .arg("3600")
            .arg("--subscription-interval")
            .arg("3600")
            .args(extra)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdin = child.stdin.take().expect("Failed to get stdin");
        let stdout = BufReader::new(child.stdout.take().expect("Failed to get stdout"));

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
            request_id: 0,
        })
    }

    /// Send a JSON-RPC request and wait for its response, skipping any
    /// notifications that arrive first.
    fn request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<Value, Box<dyn std::error::Error>> {
        self.request_id += 1;
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.request_id,
            "method": method,
            "params": params
        });

        let stdin = self.stdin.as_mut().ok_or("stdin already closed")?;
        writeln!(stdin, "{}", serde_json::to_string(&request)?)?;
        stdin.flush()?;

        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err("server closed stdout".into());
            }
            let frame: Value = serde_json::from_str(&line)?;
            if frame["id"] == json!(self.request_id) {
                return Ok(frame);
            }
        }
    }

    fn initialize(&mut self) -> Result<Value, Box<dyn std::error::Error>> {
        let response = self.request(
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }),
        )?;

        let stdin = self.stdin.as_mut().ok_or("stdin already closed")?;
        writeln!(
            stdin,
            "{}",
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        )?;
        stdin.flush()?;
        Ok(response)
    }

    /// Close stdin and wait for the server to exit on its own.
    fn finish(&mut self) -> Result<ExitStatus, Box<dyn std::error::Error>> {
        drop(self.stdin.take());
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() > deadline {
                return Err("server did not exit after stdin closed".into());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for McpTestClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn test_binary_help() {
    let mut cmd = AssertCommand::cargo_bin("mcp-everything").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MCP server"))
        .stdout(predicate::str::contains("--page-size"));
}

#[test]
fn test_binary_version() {
    let mut cmd = AssertCommand::cargo_bin("mcp-everything").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mcp-everything"));
}

#[test]
fn test_binary_rejects_zero_page_size() {
    let dir = TempDir::new().unwrap();
    let mut cmd = AssertCommand::cargo_bin("mcp-everything").unwrap();
    cmd.current_dir(dir.path())
        .arg("--page-size")
        .arg("0")
        .write_stdin("")
        .assert()
        .failure();
}

#[test]
fn test_mcp_initialize_and_exit_on_eof() {
    let dir = TempDir::new().unwrap();
    let mut client = McpTestClient::spawn(dir.path()).unwrap();

    let response = client.initialize().unwrap();
    assert_eq!(response["jsonrpc"], "2.0");
    assert_eq!(response["result"]["serverInfo"]["name"], "mcp-everything");
    assert_eq!(
        response["result"]["capabilities"]["resources"]["subscribe"],
        true
    );

    let tools = client.request("tools/list", json!({})).unwrap();
    assert_eq!(tools["result"]["tools"].as_array().unwrap().len(), 7);

    let status = client.finish().unwrap();
    assert!(status.success());
}

#[test]
fn test_mcp_tool_call_over_stdio() {
    let dir = TempDir::new().unwrap();
    let mut client = McpTestClient::spawn(dir.path()).unwrap();
    client.initialize().unwrap();

    let response = client
        .request(
            "tools/call",
            json!({"name": "echo", "arguments": {"message": "over the pipe"}}),
        )
        .unwrap();
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Echo: over the pipe"
    );

    let invalid = client
        .request(
            "tools/call",
            json!({"name": "nonexistent_tool", "arguments": {}}),
        )
        .unwrap();
    assert_eq!(invalid["error"]["code"], json!(-32601));
}

#[test]
fn test_malformed_line_is_skipped() {
    let dir = TempDir::new().unwrap();
    let mut client = McpTestClient::spawn(dir.path()).unwrap();

    let stdin = client.stdin.as_mut().unwrap();
    writeln!(stdin, "this is not json").unwrap();
    stdin.flush().unwrap();

    let response = client.request("ping", json!({})).unwrap();
    assert_eq!(response["result"], json!({}));
}

#[test]
fn test_server_name_from_dotenv() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "MCP_EVERYTHING_NAME=from-dotenv\n",
    )
    .unwrap();

    let mut client = McpTestClient::spawn(dir.path()).unwrap();
    let response = client.initialize().unwrap();
    assert_eq!(response["result"]["serverInfo"]["name"], "from-dotenv");
}

#[test]
fn test_metrics_file_written_on_exit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.prom");
    let mut client =
        McpTestClient::spawn_with(dir.path(), &["--metrics-file", path.to_str().unwrap()]).unwrap();

    client.initialize().unwrap();
    client.request("ping", json!({})).unwrap();
    assert!(client.finish().unwrap().success());

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("mcp_everything_requests_total 2"));
    assert!(text.contains("mcp_everything_requests_failed 0"));
}
