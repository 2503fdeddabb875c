use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use chrono::{DateTime, Local, Timelike};
use log::{info, warn};
use serde_json::{Value, json};
use crate::errors::{ActuatorError, ConfigError};
use crate::manager_sensibo::ThermostatLink;

/// Thermostat targets the appliance accepts
const MIN_TARGET: i64 = 10;
const MAX_TARGET: i64 = 30;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Heat,
    Fan,
}

impl Mode {
    fn api_value(&self) -> &'static str {
        match self {
            Mode::Heat => "heat",
            Mode::Fan => "fan",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FanLevel {
    Medium,
    MediumHigh,
    High,
}

impl FanLevel {
    fn api_value(&self) -> &'static str {
        match self {
            FanLevel::Medium => "medium",
            FanLevel::MediumHigh => "medium_high",
            FanLevel::High => "high",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Swing {
    FixedTop,
    FixedMiddle,
}

impl Swing {
    fn api_value(&self) -> &'static str {
        match self {
            Swing::FixedTop => "fixedTop",
            Swing::FixedMiddle => "fixedMiddle",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HorizontalSwing {
    FixedLeft,
    FixedCenterLeft,
    FixedCenterRight,
}

impl HorizontalSwing {
    fn api_value(&self) -> &'static str {
        match self {
            HorizontalSwing::FixedLeft => "fixedLeft",
            HorizontalSwing::FixedCenterLeft => "fixedCenterLeft",
            HorizontalSwing::FixedCenterRight => "fixedCenterRight",
        }
    }
}

/// One complete thermostat state, validated at construction.
/// Instances are transient, one per decision point.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ThermostatCommand {
    target_temperature: i64,
    mode: Mode,
    fan_level: FanLevel,
    swing: Swing,
    horizontal_swing: HorizontalSwing,
}

impl ThermostatCommand {
    pub fn new(target_temperature: i64, mode: Mode, fan_level: FanLevel,
               swing: Swing, horizontal_swing: HorizontalSwing) -> Result<ThermostatCommand, ConfigError> {
        if !(MIN_TARGET..=MAX_TARGET).contains(&target_temperature) {
            return Err(ConfigError::Invalid(
                format!("target temperature {} outside {}-{}", target_temperature, MIN_TARGET, MAX_TARGET)));
        }

        Ok(ThermostatCommand { target_temperature, mode, fan_level, swing, horizontal_swing })
    }

    pub fn target_temperature(&self) -> i64 {
        self.target_temperature
    }

    /// Same command with the target temperature offset, clamped to the
    /// appliance's accepted range
    pub fn with_offset(&self, offset: i64) -> ThermostatCommand {
        self.with_target(self.target_temperature + offset)
    }

    /// Same command with a new target temperature, clamped to the
    /// appliance's accepted range
    pub fn with_target(&self, target: i64) -> ThermostatCommand {
        let mut command = *self;
        command.target_temperature = target.clamp(MIN_TARGET, MAX_TARGET);
        command
    }

    pub fn with_mode(&self, mode: Mode) -> ThermostatCommand {
        let mut command = *self;
        command.mode = mode;
        command
    }

    pub fn with_fan(&self, fan_level: FanLevel) -> ThermostatCommand {
        let mut command = *self;
        command.fan_level = fan_level;
        command
    }

    pub fn with_horizontal_swing(&self, horizontal_swing: HorizontalSwing) -> ThermostatCommand {
        let mut command = *self;
        command.horizontal_swing = horizontal_swing;
        command
    }

    /// The command as ordered named attributes, the shape the actuator
    /// transport consumes
    fn fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("on", json!(true)),
            ("mode", json!(self.mode.api_value())),
            ("horizontalSwing", json!(self.horizontal_swing.api_value())),
            ("swing", json!(self.swing.api_value())),
            ("fanLevel", json!(self.fan_level.api_value())),
            ("targetTemperature", json!(self.target_temperature)),
        ]
    }
}

/// Idempotent wrapper around the actuator transport.
///
/// Owns the last applied state and only actuates fields that differ from
/// it, paced by a short delay between individual field updates. There is
/// no retry here: a failed actuation surfaces to the tick and the next
/// control loop tick re-attempts with a fresh command.
pub struct Controller<L: ThermostatLink> {
    link: L,
    command_delay: Duration,
    last_applied: HashMap<&'static str, Value>,
    had_contact: bool,
}

impl<L: ThermostatLink> Controller<L> {
    /// Returns a Controller owning the given transport
    ///
    /// # Arguments
    ///
    /// * 'link' - the actuator transport
    /// * 'command_delay' - pause between individual field updates
    pub fn new(link: L, command_delay: Duration) -> Controller<L> {
        Controller {
            link,
            command_delay,
            last_applied: HashMap::new(),
            had_contact: false,
        }
    }

    /// The most recently requested target temperature, if any field has
    /// been applied since start or the last force
    pub fn last_requested_target(&self) -> Option<i64> {
        self.last_applied.get("targetTemperature").and_then(|v| v.as_i64())
    }

    /// Clears the cached state so the next apply resends every field.
    /// Used after a suspected appliance power cycle.
    pub fn force(&mut self) {
        self.last_applied.clear();
    }

    /// Applies a command, actuating only the fields that differ from the
    /// last applied state.
    ///
    /// Commands carrying a valid_hour are dropped if the wall clock has
    /// already passed that hour before first contact with the appliance,
    /// which guards against acting on stale decisions after a long
    /// sleep or backoff.
    ///
    /// A transport error is returned as-is. Fields are cached only after
    /// a successful send, so a half applied command is completed on the
    /// next attempt.
    ///
    /// # Arguments
    ///
    /// * 'command' - the command to apply
    /// * 'now' - current local time
    /// * 'valid_hour' - hour the command must be applied within, if any
    pub fn apply(&mut self, command: &ThermostatCommand, now: DateTime<Local>,
                 valid_hour: Option<u32>) -> Result<(), ActuatorError> {
        if let Some(hour) = valid_hour {
            if !self.had_contact && now.hour() > hour {
                warn!("dropping stale command for hour {} at {}", hour, now.format("%H:%M"));
                return Ok(());
            }
        }

        let mut first = true;
        for (name, value) in command.fields() {
            if self.last_applied.get(name) != Some(&value) {
                if !first {
                    thread::sleep(self.command_delay);
                }
                self.link.set_property(name, &value)?;
                self.last_applied.insert(name, value);
                first = false;
            }
        }

        if !first {
            info!("applied target {} {:?}", command.target_temperature, command.mode);
        }
        self.had_contact = true;

        Ok(())
    }
}
