//! In-process stand-ins for the engine and the oracle, used by unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::services::engine::{EngineError, EngineOutput, Invocation, ScanEngine};
use crate::services::oracle::{OracleError, TemplateOracle};

#[derive(Debug)]
pub enum Behaviour {
    Output(EngineOutput),
    TimeOut,
    SpawnFails,
}

/// Engine that records every invocation and answers from a script.
#[derive(Debug)]
pub struct RecordingEngine {
    behaviour: Behaviour,
    invocations: Mutex<Vec<Invocation>>,
}

impl RecordingEngine {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn printing(stdout: &str, stderr: &str, exit_code: i32) -> Arc<Self> {
        Self::new(Behaviour::Output(EngineOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }))
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanEngine for RecordingEngine {
    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<EngineOutput, EngineError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        match &self.behaviour {
            Behaviour::Output(output) => Ok(output.clone()),
            Behaviour::TimeOut => Err(EngineError::TimedOut(timeout)),
            Behaviour::SpawnFails => Err(EngineError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            ))),
        }
    }

    async fn version(&self) -> Result<String, EngineError> {
        Ok("stub-engine v0".to_string())
    }
}

/// Oracle returning a fixed reply, or a transient failure when it has none.
#[derive(Debug)]
pub struct ScriptedOracle {
    reply: Option<String>,
    prompts: Mutex<Vec<(String, u32)>>,
}

impl ScriptedOracle {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Prompts received so far, with the token budget of each call.
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TemplateOracle for ScriptedOracle {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, OracleError> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), max_tokens));
        self.reply.clone().ok_or(OracleError::Transient {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}
