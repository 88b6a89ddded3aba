pub mod json;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{MqError, MqResult};
use crate::types::payload::Payload;

pub use json::{JsonSerializer, JsonSerializerOptions};

/// Format-tagged payload codec
///
/// Concrete non-JSON codecs (Avro, protobuf, ...) plug in through this
/// trait; the core ships JSON only.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// Short format tag carried in message metadata, e.g. "json"
    fn format(&self) -> &'static str;

    /// MIME type reported to backends that carry one
    fn content_type(&self) -> &'static str;

    fn serialize(&self, payload: &Payload) -> MqResult<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> MqResult<Payload>;
}

/// Registry of codecs keyed by format tag, JSON preregistered as default
pub struct SerializerRegistry {
    serializers: HashMap<String, Arc<dyn Serializer>>,
    default_format: String,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            serializers: HashMap::new(),
            default_format: "json".to_string(),
        };
        registry.register(Arc::new(JsonSerializer::default()));
        registry
    }

    pub fn register(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers
            .insert(serializer.format().to_string(), serializer);
    }

    pub fn get(&self, format: &str) -> MqResult<Arc<dyn Serializer>> {
        self.serializers.get(format).cloned().ok_or_else(|| {
            MqError::serialization(format!("no serializer registered for format: {format}"))
        })
    }

    pub fn default_serializer(&self) -> MqResult<Arc<dyn Serializer>> {
        self.get(&self.default_format)
    }

    pub fn set_default(&mut self, format: &str) -> MqResult<()> {
        if self.serializers.contains_key(format) {
            self.default_format = format.to_string();
            Ok(())
        } else {
            Err(MqError::serialization(format!(
                "no serializer registered for format: {format}"
            )))
        }
    }

    pub fn available_formats(&self) -> Vec<String> {
        self.serializers.keys().cloned().collect()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SerializerRegistry {
    fn clone(&self) -> Self {
        Self {
            serializers: self.serializers.clone(),
            default_format: self.default_format.clone(),
        }
    }
}
