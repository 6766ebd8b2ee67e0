//! In-memory process runner fake (testing only)
//!
//! `ScriptedRunner` satisfies the [`ProcessRunner`] contract without spawning
//! anything: it records every command, answers with scripted exit codes and
//! captured output, and can run a side effect (for example, creating the
//! directory a `git clone` would have produced).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::process::{CommandOutput, CommandSpec, ProcessRunner};

type Effect = Box<dyn Fn(&CommandSpec) + Send + Sync>;

struct StatusRule {
    prefix: String,
    code: i32,
}

struct OutputRule {
    prefix: String,
    replies: VecDeque<CommandOutput>,
}

struct EffectRule {
    prefix: String,
    effect: Effect,
}

/// Records commands and replies from a script keyed by command-line prefix.
///
/// Rules match against the rendered command (`program arg1 arg2 ...`); the
/// first matching rule wins. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    statuses: Vec<StatusRule>,
    outputs: Mutex<Vec<OutputRule>>,
    effects: Vec<EffectRule>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code for `status` calls whose command starts with `prefix`.
    pub fn with_status(mut self, prefix: &str, code: i32) -> Self {
        self.statuses.push(StatusRule {
            prefix: prefix.to_string(),
            code,
        });
        self
    }

    /// Stdout for `output` calls whose command starts with `prefix`.
    pub fn with_output(self, prefix: &str, stdout: &str) -> Self {
        self.with_output_sequence(prefix, &[stdout])
    }

    /// Successive stdout replies; the last one repeats once the rest are used.
    pub fn with_output_sequence(self, prefix: &str, stdouts: &[&str]) -> Self {
        let replies = stdouts
            .iter()
            .map(|s| CommandOutput {
                exit_code: 0,
                stdout: s.to_string(),
                stderr: String::new(),
            })
            .collect();
        self.outputs.lock().unwrap().push(OutputRule {
            prefix: prefix.to_string(),
            replies,
        });
        self
    }

    /// Side effect performed when a matching command runs.
    pub fn with_effect<F>(mut self, prefix: &str, effect: F) -> Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.effects.push(EffectRule {
            prefix: prefix.to_string(),
            effect: Box::new(effect),
        });
        self
    }

    /// Every command seen so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines seen so far, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    /// Whether any recorded command starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.command_lines().iter().any(|c| c.starts_with(prefix))
    }

    fn record(&self, cmd: &CommandSpec) -> String {
        let line = cmd.to_string();
        self.calls.lock().unwrap().push(cmd.clone());
        for rule in &self.effects {
            if line.starts_with(&rule.prefix) {
                (rule.effect)(cmd);
            }
        }
        line
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn status(&self, cmd: &CommandSpec) -> Result<i32> {
        let line = self.record(cmd);
        Ok(self
            .statuses
            .iter()
            .find(|rule| line.starts_with(&rule.prefix))
            .map(|rule| rule.code)
            .unwrap_or(0))
    }

    async fn output(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        let line = self.record(cmd);
        let mut outputs = self.outputs.lock().unwrap();
        let reply = outputs
            .iter_mut()
            .find(|rule| line.starts_with(&rule.prefix))
            .and_then(|rule| {
                if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                }
            });
        Ok(reply.unwrap_or_default())
    }
}
