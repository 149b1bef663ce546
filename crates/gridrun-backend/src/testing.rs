//! Scripted command runner for backend tests.

use crate::runner::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type Scripted = (String, Result<CommandOutput, String>);

/// Answers commands from a fixed script, in order, and records every call.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, program: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        self.script.lock().unwrap().push_back((
            program.to_string(),
            Ok(CommandOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        ));
        self
    }

    /// The next call to `program` fails to spawn.
    pub(crate) fn unavailable(self, program: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back((program.to_string(), Err(format!("{}: not found", program))));
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));

        let (expected, response) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| std::io::Error::other(format!("unscripted call to {}", program)))?;

        assert_eq!(expected, program, "unexpected command order");
        response.map_err(std::io::Error::other)
    }
}
