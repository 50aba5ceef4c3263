use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SamplingError;

/// Per-request generation controls. Unset fields leave the model default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

impl SamplingParams {
    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), SamplingError> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        if let Some(top_p) = self.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(SamplingError::OutOfRange {
                    field: "top_p",
                    value: top_p.to_string(),
                });
            }
        }
        if self.max_tokens == Some(0) {
            return Err(SamplingError::OutOfRange {
                field: "max_tokens",
                value: "0".to_string(),
            });
        }
        if self.stop.iter().any(String::is_empty) {
            return Err(SamplingError::OutOfRange {
                field: "stop",
                value: "\"\"".to_string(),
            });
        }
        Ok(())
    }
}

fn check_range(field: &'static str, value: Option<f32>, min: f32, max: f32) -> Result<(), SamplingError> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(SamplingError::OutOfRange {
            field,
            value: v.to_string(),
        }),
        _ => Ok(()),
    }
}

/// `stop` is either a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl From<StopSequences> for Vec<String> {
    fn from(stop: StopSequences) -> Self {
        match stop {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }
    }
}

/// OpenAI style sampling fields as they arrive on a request body.
///
/// Fields the studio cannot honour are accepted here so they can be
/// rejected with a precise error instead of being silently dropped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplingRequest {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Option<StopSequences>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub n: Option<u32>,
    pub logprobs: Option<Value>,
    pub tools: Option<Value>,
    pub tool_choice: Option<Value>,
    pub functions: Option<Value>,
    pub function_call: Option<Value>,
}

impl SamplingRequest {
    pub fn into_params(self) -> Result<SamplingParams, SamplingError> {
        if let Some(n) = self.n.filter(|&n| n != 1) {
            return Err(SamplingError::MultipleCompletions(n));
        }
        if self.logprobs.is_some() {
            return Err(SamplingError::Unsupported("logprobs"));
        }
        let tool_fields = [
            ("tools", &self.tools),
            ("tool_choice", &self.tool_choice),
            ("functions", &self.functions),
            ("function_call", &self.function_call),
        ];
        if let Some((field, _)) = tool_fields.iter().find(|(_, v)| v.is_some()) {
            return Err(SamplingError::Unsupported(field));
        }

        let params = SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stop: self.stop.map(Vec::from).unwrap_or_default(),
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        };
        params.validate()?;
        Ok(params)
    }
}
