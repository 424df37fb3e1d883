//! Regular expression filter
//!
//! Accepts messages whose payload matches `FilterExpression` and does
//! not match `FilterExpressionNot`. Payloads are matched as raw bytes,
//! so binary traffic never trips a UTF-8 error on the hot path.

use regex::bytes::Regex;

use weir_bus::Filter;
use weir_config::{ConfigError, PluginConfig};
use weir_message::Message;

/// Filter accepting messages by regular expression
///
/// Configuration:
///
/// ```yaml
/// - "stream.Route":
///     Stream: "ingest"
///     Filter: ["filter.RegExp"]
///     FilterExpression: "ERROR|WARN"
///     FilterExpressionNot: "healthcheck"
/// ```
///
/// Both expressions are optional; an unset expression does not
/// constrain the message.
#[derive(Debug, Default)]
pub struct RegExpFilter {
    expression: Option<Regex>,
    expression_not: Option<Regex>,
}

impl RegExpFilter {
    /// Create an unconfigured filter (accepts everything)
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(
        conf: &mut PluginConfig,
        key: &'static str,
    ) -> Result<Option<Regex>, ConfigError> {
        let plugin = conf.id().to_string();
        let pattern = conf.get_string(key, "")?;
        if pattern.is_empty() {
            return Ok(None);
        }

        Regex::new(&pattern)
            .map(Some)
            .map_err(|err| ConfigError::invalid_value(plugin, key, err.to_string()))
    }
}

impl Filter for RegExpFilter {
    fn configure(&mut self, conf: &mut PluginConfig) -> Result<(), ConfigError> {
        self.expression = Self::compile(conf, "FilterExpression")?;
        self.expression_not = Self::compile(conf, "FilterExpressionNot")?;
        Ok(())
    }

    fn accepts(&self, msg: &Message) -> bool {
        if let Some(expression) = &self.expression {
            if !expression.is_match(msg.payload()) {
                return false;
            }
        }
        if let Some(expression_not) = &self.expression_not {
            if expression_not.is_match(msg.payload()) {
                return false;
            }
        }
        true
    }

    fn name(&self) -> &'static str {
        "filter.RegExp"
    }
}
