//! Sampling parameters sent along with every completion request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TEMPERATURE_MIN: f32 = 0.0;
pub const TEMPERATURE_MAX: f32 = 1.5;
pub const TEMPERATURE_DEFAULT: f32 = 0.7;

pub const MAX_TOKENS_MIN: u32 = 256;
pub const MAX_TOKENS_MAX: u32 = 2048;
pub const MAX_TOKENS_DEFAULT: u32 = 512;
pub const MAX_TOKENS_STEP: u32 = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("temperature {0} is outside {min}..={max}", min = TEMPERATURE_MIN, max = TEMPERATURE_MAX)]
    Temperature(f32),
    #[error("max output tokens {0} is outside {min}..={max}", min = MAX_TOKENS_MIN, max = MAX_TOKENS_MAX)]
    MaxOutputTokens(u32),
}

/// Temperature and output length bound for one request.
///
/// Only constructible through [`GenerationConfig::new`] (or deserialization,
/// which goes through the same check), so a value in hand is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGenerationConfig")]
pub struct GenerationConfig {
    pub(crate) temperature: f32,
    pub(crate) max_output_tokens: u32,
}

#[derive(Deserialize)]
struct RawGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl TryFrom<RawGenerationConfig> for GenerationConfig {
    type Error = GenerationError;

    fn try_from(raw: RawGenerationConfig) -> Result<Self, Self::Error> {
        Self::new(raw.temperature, raw.max_output_tokens)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: TEMPERATURE_DEFAULT,
            max_output_tokens: MAX_TOKENS_DEFAULT,
        }
    }
}

impl GenerationConfig {
    pub fn new(temperature: f32, max_output_tokens: u32) -> Result<Self, GenerationError> {
        let config = Self {
            temperature,
            max_output_tokens,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    /// Range check shared by construction and the completion clients.
    pub fn validate(&self) -> Result<(), GenerationError> {
        // NaN fails the range check as well
        if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&self.temperature) {
            return Err(GenerationError::Temperature(self.temperature));
        }
        if !(MAX_TOKENS_MIN..=MAX_TOKENS_MAX).contains(&self.max_output_tokens) {
            return Err(GenerationError::MaxOutputTokens(self.max_output_tokens));
        }
        Ok(())
    }

    pub fn with_temperature(self, temperature: f32) -> Result<Self, GenerationError> {
        Self::new(temperature, self.max_output_tokens)
    }

    pub fn with_max_output_tokens(self, max_output_tokens: u32) -> Result<Self, GenerationError> {
        Self::new(self.temperature, max_output_tokens)
    }

    /// Step the temperature by `steps` increments of 0.1, clamped to the valid range.
    pub fn nudge_temperature(self, steps: i32) -> Self {
        let tenths = (self.temperature * 10.0).round() as i32 + steps;
        let temperature = (tenths as f32 / 10.0).clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);
        Self { temperature, ..self }
    }

    /// Step the token bound by `steps` increments of 64, clamped to the valid range.
    pub fn nudge_max_output_tokens(self, steps: i32) -> Self {
        let delta = steps.saturating_mul(MAX_TOKENS_STEP as i32) as i64;
        let max_output_tokens = (self.max_output_tokens as i64 + delta)
            .clamp(MAX_TOKENS_MIN as i64, MAX_TOKENS_MAX as i64) as u32;
        Self {
            max_output_tokens,
            ..self
        }
    }
}
