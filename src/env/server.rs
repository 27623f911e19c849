use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::client::{Env, EnvOpts};
use super::transport::{EnvTransport, HttpTransport};
use crate::config::JsonConfig;
use crate::error::{GymkitError, Result};

/// How to reach, or launch, an environment server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the server RPC.
    pub address: String,
    /// Program and arguments that start a local server, if none is running.
    pub command: Option<Vec<String>>,
    pub retries: usize,
    pub retry_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "http://localhost:50051".to_string(),
            command: None,
            retries: 10,
            retry_interval_ms: 1000,
        }
    }
}

impl JsonConfig for ServerConfig {}

impl ServerConfig {
    pub fn address<S: Into<String>>(mut self, address: S) -> Self {
        self.address = address.into();
        self
    }

    pub fn command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn retry_interval_ms(mut self, retry_interval_ms: u64) -> Self {
        self.retry_interval_ms = retry_interval_ms;
        self
    }
}

type SharedChild = Arc<Mutex<Option<Child>>>;

fn kill_child(child: &SharedChild) {
    let mut guard = child.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(mut process) = guard.take() {
        info!("stopping local env server (pid {})", process.id());
        if let Err(e) = process.kill() {
            warn!("failed to kill env server: {}", e);
        }
        let _ = process.wait();
    }
}

/// Connection to an environment server, optionally owning the local process.
#[derive(Debug)]
pub struct Server {
    name: String,
    transport: Arc<HttpTransport>,
    child: SharedChild,
}

impl Server {
    /// Connect to a running server, verifying it answers `info`.
    pub fn connect(address: &str) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(address)?);
        let info = transport.info()?;
        info!("connected to env server {} at {}", info.server_name, address);
        Ok(Server {
            name: info.server_name,
            transport,
            child: Arc::new(Mutex::new(None)),
        })
    }

    /// Connect to a server at the configured address, launching the configured
    /// command first if nothing answers.
    pub fn find_or_create(config: &ServerConfig) -> Result<Self> {
        match Self::connect(&config.address) {
            Ok(server) => return Ok(server),
            Err(e) => debug!("no env server at {}: {}", config.address, e),
        }

        let command = config.command.as_ref().ok_or_else(|| {
            GymkitError::Container(format!("no server at {} and no launch command", config.address))
        })?;
        let (program, args) = command
            .split_first()
            .ok_or_else(|| GymkitError::Container("empty launch command".to_string()))?;

        info!("launching env server: {}", command.join(" "));
        let process = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| GymkitError::Container(format!("failed to launch {}: {}", program, e)))?;
        let child: SharedChild = Arc::new(Mutex::new(Some(process)));
        let transport = Arc::new(HttpTransport::new(&config.address)?);

        let interval = Duration::from_millis(config.retry_interval_ms);
        for attempt in 1..=config.retries {
            match transport.info() {
                Ok(info) => {
                    info!("env server {} ready after {} attempt(s)", info.server_name, attempt);
                    return Ok(Server { name: info.server_name, transport, child });
                }
                Err(e) => {
                    debug!("env server not ready (attempt {}/{}): {}", attempt, config.retries, e);
                    thread::sleep(interval);
                }
            }
        }

        kill_child(&child);
        Err(GymkitError::Container(format!(
            "env server at {} did not answer after {} attempts",
            config.address, config.retries
        )))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owns_process(&self) -> bool {
        self.child.lock().map(|c| c.is_some()).unwrap_or(false)
    }

    pub fn transport(&self) -> Arc<dyn EnvTransport> {
        self.transport.clone()
    }

    /// Create an environment on this server.
    pub fn make(&self, model_name: &str, opts: EnvOpts) -> Result<Env> {
        Env::make(self.transport(), model_name, opts)
    }

    /// Kill the launched server on SIGINT or SIGTERM, then exit.
    ///
    /// Only one handler can be installed per process.
    pub fn cleanup_on_signal(&self) -> Result<()> {
        let child = Arc::clone(&self.child);
        ctrlc::set_handler(move || {
            warn!("signal received, removing local env server");
            kill_child(&child);
            std::process::exit(130);
        })
        .map_err(|e| GymkitError::Container(format!("failed to install signal handler: {}", e)))
    }

    /// Stop the launched server, if any.
    pub fn close(&self) {
        kill_child(&self.child);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        kill_child(&self.child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_or_create_without_command_fails() {
        let config = ServerConfig::default().address("http://127.0.0.1:9").retries(1);
        assert!(matches!(Server::find_or_create(&config), Err(GymkitError::Container(_))));
    }

    #[test]
    fn test_find_or_create_gives_up_after_retries() {
        let config = ServerConfig::default()
            .address("http://127.0.0.1:9")
            .command(vec!["sleep".to_string(), "5".to_string()])
            .retries(2)
            .retry_interval_ms(10);
        match Server::find_or_create(&config) {
            Err(GymkitError::Container(msg)) => assert!(msg.contains("2 attempts")),
            other => panic!("expected Container error, got {:?}", other.map(|s| s.name().to_string())),
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.retries, 10);
        assert_eq!(config.retry_interval_ms, 1000);
    }
}
