//! Voice-agent session configuration payload

use crate::domain::event::AudioEncoding;
use crate::domain::handler::HandlerRegistry;
use crate::domain::shared::{BridgeError, Result};
use crate::infrastructure::transport::WireMessage;
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

/// Telephony audio sample rate
const SAMPLE_RATE: u32 = 8000;

/// The `Settings` document sent as the first message on every agent connection.
///
/// Persona instructions and provider choices come from the settings file. If
/// the file declares no functions, the registry's schemas are injected so the
/// agent can only call what the bridge can dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    document: Value,
}

impl AgentSettings {
    /// Load the settings file from disk
    pub fn load(
        path: impl AsRef<Path>,
        registry: &HandlerRegistry,
        encoding: AudioEncoding,
    ) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let document: Value = serde_json::from_str(&raw).map_err(|e| {
            BridgeError::Configuration(format!("invalid JSON in {}: {}", path.display(), e))
        })?;
        info!("Loaded agent settings from {}", path.display());
        Self::from_value(document, registry, encoding)
    }

    pub fn from_value(
        document: Value,
        registry: &HandlerRegistry,
        encoding: AudioEncoding,
    ) -> Result<Self> {
        let Value::Object(mut root) = document else {
            return Err(BridgeError::Configuration(
                "agent settings must be a JSON object".to_string(),
            ));
        };

        root.entry("type")
            .or_insert_with(|| Value::String("Settings".to_string()));
        apply_audio(&mut root, encoding)?;
        inject_functions(&mut root, registry)?;

        Ok(Self {
            document: Value::Object(root),
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Names of the functions the agent is told about
    pub fn function_names(&self) -> Vec<&str> {
        self.document
            .pointer("/agent/think/functions")
            .and_then(Value::as_array)
            .map(|functions| {
                functions
                    .iter()
                    .filter_map(|f| f.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn to_message(&self) -> WireMessage {
        WireMessage::Text(self.document.to_string())
    }
}

fn object_entry<'a>(parent: &'a mut Map<String, Value>, key: &str) -> Result<&'a mut Map<String, Value>> {
    parent
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| BridgeError::Configuration(format!("agent settings: '{}' must be an object", key)))
}

/// Both audio directions use the configured agent encoding at 8 kHz
fn apply_audio(root: &mut Map<String, Value>, encoding: AudioEncoding) -> Result<()> {
    let audio = object_entry(root, "audio")?;

    let input = object_entry(audio, "input")?;
    input.insert("encoding".into(), json!(encoding.as_str()));
    input.insert("sample_rate".into(), json!(SAMPLE_RATE));

    let output = object_entry(audio, "output")?;
    output.insert("encoding".into(), json!(encoding.as_str()));
    output.insert("sample_rate".into(), json!(SAMPLE_RATE));
    output
        .entry("container")
        .or_insert_with(|| Value::String("none".to_string()));
    Ok(())
}

fn inject_functions(root: &mut Map<String, Value>, registry: &HandlerRegistry) -> Result<()> {
    let agent = object_entry(root, "agent")?;
    let think = object_entry(agent, "think")?;
    let declared = think
        .get("functions")
        .and_then(Value::as_array)
        .is_some_and(|functions| !functions.is_empty());

    if !declared {
        think.insert("functions".into(), Value::Array(registry.definitions()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::handler::{Arguments, FieldKind, FieldSpec, HandlerResult, InputSchema};

    fn registry() -> HandlerRegistry {
        let mut builder = HandlerRegistry::builder();
        builder
            .register(
                "get_visa_info",
                "Describe a visa service",
                InputSchema::new().field(FieldSpec::required("visa_type", FieldKind::String)),
                |_: &Arguments| -> HandlerResult { Ok(Map::new()) },
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_functions_are_injected_when_absent() {
        let settings = AgentSettings::from_value(
            json!({"agent": {"think": {"prompt": "You are a visa assistant"}}}),
            &registry(),
            AudioEncoding::Mulaw,
        )
        .unwrap();

        assert_eq!(settings.function_names(), vec!["get_visa_info"]);
        assert_eq!(settings.document()["type"], "Settings");
        assert_eq!(settings.document()["agent"]["think"]["prompt"], "You are a visa assistant");
        assert_eq!(settings.document()["audio"]["input"]["encoding"], "mulaw");
        assert_eq!(settings.document()["audio"]["output"]["sample_rate"], 8000);
    }

    #[test]
    fn test_declared_functions_are_kept() {
        let settings = AgentSettings::from_value(
            json!({"agent": {"think": {"functions": [{"name": "custom"}]}}}),
            &registry(),
            AudioEncoding::Linear16,
        )
        .unwrap();
        assert_eq!(settings.function_names(), vec!["custom"]);
        assert_eq!(settings.document()["audio"]["output"]["encoding"], "linear16");
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        let err = AgentSettings::from_value(json!([1, 2]), &registry(), AudioEncoding::Mulaw)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = AgentSettings::load("/nonexistent/config.json", &registry(), AudioEncoding::Mulaw)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }
}
