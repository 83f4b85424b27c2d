// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered multi-step setpoint sequences.
//!
//! Steps run strictly in order. The first failing step ends the sequence;
//! steps that already succeeded stay applied, since each one was committed
//! to the device and to the state store on its own.
//!
//! # Examples
//!
//! ```
//! use psu_bridge::sequence::SequenceStep;
//!
//! let step = SequenceStep::from_value(&serde_json::json!({
//!     "voltage": 54.0, "max_current": 6.0, "delay": 30
//! })).unwrap();
//! assert_eq!(step.delay().as_secs(), 10);
//! ```

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::bridge::Bridge;
use crate::command::{CommandRequest, DevicePayload, parse_number};
use crate::error::{ErrorKind, Result, ValueError};
use crate::state::DeviceState;

/// Maximum number of steps in one sequence.
pub const MAX_STEPS: usize = 10;

/// Longest pause allowed after a step.
pub const MAX_STEP_DELAY: Duration = Duration::from_secs(10);

/// One parsed step: a command and the pause that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceStep {
    command: CommandRequest,
    delay: Duration,
}

impl SequenceStep {
    /// Creates a step; `delay` is capped at [`MAX_STEP_DELAY`].
    #[must_use]
    pub fn new(command: CommandRequest, delay: Duration) -> Self {
        Self {
            command,
            delay: delay.min(MAX_STEP_DELAY),
        }
    }

    /// Parses a step from a JSON object with `voltage`, `max_current` and
    /// optional `access` and `delay` (seconds).
    ///
    /// # Errors
    ///
    /// Returns `ValueError` for a non-object step, missing or non-numeric
    /// setpoints, or a negative delay.
    pub fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        let object = value.as_object().ok_or(ValueError::MalformedStep)?;
        let command = CommandRequest::from_fields(
            object.get("voltage"),
            object.get("max_current"),
            object.get("access"),
        )?;

        let seconds = match object.get("delay") {
            None | Some(Value::Null) => 0.0,
            Some(raw) => parse_number("delay", raw)?,
        };
        if seconds.is_nan() {
            return Err(ValueError::NotANumber {
                field: "delay",
                value: seconds.to_string(),
            });
        }
        if seconds < 0.0 {
            return Err(ValueError::NegativeDelay(seconds));
        }
        let delay = Duration::from_secs_f64(seconds.min(MAX_STEP_DELAY.as_secs_f64()));

        Ok(Self::new(command, delay))
    }

    /// The command of this step.
    #[must_use]
    pub fn command(&self) -> &CommandRequest {
        &self.command
    }

    /// The pause after this step, already capped.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    /// 1-based step number.
    pub step: usize,
    /// Whether the step was applied.
    pub ok: bool,
    /// Payload sent or attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<DevicePayload>,
    /// Device acknowledgement for a successful step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psu_response: Option<String>,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Per-step trace plus the state after the sequence stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceReport {
    /// One entry per attempted step; at most one failure, always last.
    pub results: Vec<StepResult>,
    /// Last recorded state. If it could not be read back, the state of the
    /// last applied step, or the default record.
    pub state: DeviceState,
    /// Why `state` could not be read back from the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_error: Option<String>,
}

impl SequenceReport {
    /// Returns `true` if every attempted step succeeded.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.results.iter().all(|r| r.ok)
    }
}

/// Runs sequences against a [`Bridge`].
#[derive(Debug, Clone, Copy)]
pub struct SequenceExecutor<'a> {
    bridge: &'a Bridge,
}

impl<'a> SequenceExecutor<'a> {
    /// Creates an executor.
    #[must_use]
    pub fn new(bridge: &'a Bridge) -> Self {
        Self { bridge }
    }

    /// Checks the step count before anything runs.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::TooManySteps` above [`MAX_STEPS`].
    pub fn check_len(len: usize) -> std::result::Result<(), ValueError> {
        if len > MAX_STEPS {
            return Err(ValueError::TooManySteps {
                max: MAX_STEPS,
                actual: len,
            });
        }
        Ok(())
    }

    /// Executes raw JSON steps in order, stopping at the first failure.
    ///
    /// Each step is parsed only when its turn comes, so a malformed step
    /// after valid ones fails at its own position.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` for more than [`MAX_STEPS`] steps; nothing is
    /// executed then. Step failures and a failed read of the final state are
    /// reported in the returned trace instead.
    pub async fn run(&self, steps: &[Value]) -> Result<SequenceReport> {
        Self::check_len(steps.len())?;

        let total = steps.len();
        let mut results = Vec::with_capacity(total);
        let mut last_applied = None;

        for (idx, raw) in steps.iter().enumerate() {
            let number = idx + 1;
            let step = match SequenceStep::from_value(raw) {
                Ok(step) => step,
                Err(e) => {
                    tracing::error!(step = number, error = %e, "Sequence step rejected");
                    results.push(StepResult {
                        step: number,
                        ok: false,
                        sent: None,
                        psu_response: None,
                        error: Some(e.to_string()),
                        error_kind: Some(ErrorKind::Validation),
                    });
                    break;
                }
            };

            tracing::info!(step = number, total, "Running sequence step");
            match self.bridge.apply(step.command()).await {
                Ok(applied) => {
                    last_applied = Some(applied.state);
                    results.push(StepResult {
                        step: number,
                        ok: true,
                        sent: Some(applied.sent),
                        psu_response: Some(applied.psu_response),
                        error: None,
                        error_kind: None,
                    });
                }
                Err(failure) => {
                    tracing::error!(step = number, error = %failure, "Sequence step failed");
                    results.push(StepResult {
                        step: number,
                        ok: false,
                        error_kind: Some(failure.kind()),
                        error: Some(failure.to_string()),
                        sent: failure.sent,
                        psu_response: None,
                    });
                    break;
                }
            }

            if !step.delay().is_zero() {
                tokio::time::sleep(step.delay()).await;
            }
        }

        let (state, state_error) = match self.bridge.load_state().await {
            Ok(state) => (state, None),
            Err(e) => {
                tracing::error!(error = %e, "Could not read state after sequence");
                (last_applied.unwrap_or_default(), Some(e.to_string()))
            }
        };
        Ok(SequenceReport {
            results,
            state,
            state_error,
        })
    }
}
