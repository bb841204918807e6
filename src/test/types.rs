use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

use crate::config::ConfigError;
use crate::traits::LaHelper;

/// Request fixture. Candidacy is carried on the request itself so tests can
/// exercise both policy branches with one helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub id:        String,
    pub cacheable: bool,
}

impl EchoRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id:        id.into(),
            cacheable: true,
        }
    }

    pub fn uncacheable(id: impl Into<String>) -> Self {
        Self {
            id:        id.into(),
            cacheable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoReply {
    pub body: String,
}

impl EchoReply {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoError(pub String);

impl Display for EchoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for EchoError {}

/// Deterministic helper: the logical key is the request id.
#[derive(Debug)]
pub struct EchoHelper {
    name: String,
}

impl EchoHelper {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl LaHelper for EchoHelper {
    type Reply = EchoReply;
    type Request = EchoRequest;

    fn from_config(config: Option<&Value>) -> Result<Self, ConfigError> {
        let name = config
            .and_then(|cfg| cfg.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("echo")
            .to_string();
        Ok(Self { name })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn cache_candidate(&self, req: &EchoRequest) -> bool {
        req.cacheable
    }

    fn build_key(&self, req: &EchoRequest) -> String {
        req.id.clone()
    }
}
