//! The serialization capability: turning templates into data dictionaries and back.
//!
//! Templates serialize to [`serde_json::Value`] dictionaries tagged with the variant's
//! [`type_identifier`](crate::template::PulseTemplate::type_identifier). Named subtemplates are
//! stored once and referenced by identifier; anonymous ones are inlined. All reference
//! resolution goes through an explicit, caller-owned context object — there is no process-wide
//! registry. [`InMemoryStore`] is the concrete context; resolving a reference it has seen before
//! yields the stored object itself, so shared subtemplates and declarations keep their identity
//! across a round trip.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::expression::Expression;
use crate::parameter::{Bound, DeclarationError, ParameterDeclaration};
use crate::parser::ParseError;
use crate::template::{
    FunctionPulseTemplate, RepetitionCount, RepetitionPulseTemplate, TemplatePtr,
};
use crate::validation::{validate_identifier, IdentifierValidationError};

/// The ways serialized data can fail to describe a template.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("missing field `{0}` in serialized data")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type, expected {expected}")]
    UnexpectedType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown template type tag `{0}`")]
    UnknownType(String),

    #[error("no stored data for the reference `{0}`")]
    UnresolvedReference(String),

    #[error("the reference `{0}` refers back to itself")]
    CyclicReference(String),

    #[error(transparent)]
    Identifier(#[from] IdentifierValidationError),

    #[error(transparent)]
    Expression(#[from] ParseError),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

/// The writer half of the capability, passed to
/// [`serialization_data`](crate::template::PulseTemplate::serialization_data) so templates can
/// write their children through it.
pub trait SerializationContext {
    /// Serialize a subtemplate: named templates are stored and referenced by identifier,
    /// anonymous ones are inlined.
    fn serialize_template(&mut self, template: &TemplatePtr) -> Result<Value, SerializationError>;

    /// Serialize a declaration, registering it so later references resolve to the same object.
    fn serialize_declaration(
        &mut self,
        declaration: &ParameterDeclaration,
    ) -> Result<Value, SerializationError>;

    /// Serialize an expression as its parseable text form.
    fn serialize_expression(&self, expression: &Expression) -> Value;
}

/// The reader half: resolves the values a [`SerializationContext`] wrote.
pub trait DeserializationContext {
    fn resolve_template(&mut self, data: &Value) -> Result<TemplatePtr, SerializationError>;

    fn resolve_declaration(
        &mut self,
        data: &Value,
    ) -> Result<ParameterDeclaration, SerializationError>;

    fn resolve_expression(&self, data: &Value) -> Result<Expression, SerializationError>;
}

/// An in-memory serialization context.
///
/// Keeps serialized dictionaries keyed by identifier alongside a live-object cache, so a
/// reference resolved on the same store returns the very object that was serialized.
#[derive(Default)]
pub struct InMemoryStore {
    data: HashMap<String, Value>,
    templates: HashMap<String, TemplatePtr>,
    declarations: HashMap<String, ParameterDeclaration>,
    /// References currently being resolved, to catch cyclic stored data.
    resolving: HashSet<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize a template to its full data dictionary, storing it under its identifier when
    /// it has one.
    pub fn serialize(&mut self, template: &TemplatePtr) -> Result<Value, SerializationError> {
        let mut data = into_dictionary(template.serialization_data(self)?)?;
        data.insert("type".to_string(), json!(template.type_identifier()));
        if let Some(identifier) = template.identifier() {
            validate_identifier(identifier)?;
            data.insert("identifier".to_string(), json!(identifier));
            self.data
                .insert(identifier.to_string(), Value::Object(data.clone()));
            self.templates
                .insert(identifier.to_string(), template.clone());
        }
        Ok(Value::Object(data))
    }

    /// Reconstruct a template from a data dictionary or an identifier reference.
    pub fn deserialize(&mut self, data: &Value) -> Result<TemplatePtr, SerializationError> {
        self.resolve_template(data)
    }

    /// Seed the store with a serialized dictionary, e.g. one produced by another store.
    pub fn put(&mut self, identifier: impl Into<String>, data: Value) {
        self.data.insert(identifier.into(), data);
    }

    pub fn get(&self, identifier: &str) -> Option<&Value> {
        self.data.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.data.contains_key(identifier)
    }

    fn bound_to_value(&mut self, bound: &Bound) -> Result<Value, SerializationError> {
        Ok(match bound {
            Bound::Unbounded => Value::Null,
            Bound::Constant(value) => json!(value),
            Bound::Declaration(declaration) => {
                json!({ "declaration": self.serialize_declaration(declaration)? })
            }
        })
    }

    fn bound_from_value(&mut self, data: &Value) -> Result<Option<Bound>, SerializationError> {
        match data {
            Value::Null => Ok(None),
            Value::Number(number) => match number.as_f64() {
                Some(value) => Ok(Some(Bound::Constant(value))),
                None => Err(SerializationError::UnexpectedType {
                    field: "min/max",
                    expected: "a finite number",
                }),
            },
            Value::Object(map) => {
                let reference = map
                    .get("declaration")
                    .ok_or(SerializationError::MissingField("declaration"))?;
                let declaration = self.resolve_declaration(reference)?;
                Ok(Some(declaration.into()))
            }
            _ => Err(SerializationError::UnexpectedType {
                field: "min/max",
                expected: "null, a number, or a declaration",
            }),
        }
    }

    fn deserialize_function_pulse(
        &mut self,
        data: &Map<String, Value>,
    ) -> Result<FunctionPulseTemplate, SerializationError> {
        let expression = self.resolve_expression(require(data, "expression")?)?;
        let duration_expression =
            self.resolve_expression(require(data, "duration_expression")?)?;
        let channel = as_str(require(data, "channel")?, "channel")?;
        let mut template = FunctionPulseTemplate::new(expression, duration_expression, channel);
        if let Some(measurement) = data.get("measurement") {
            if as_bool(measurement, "measurement")? {
                template = template.with_measurement();
            }
        }
        Ok(template)
    }

    fn deserialize_repetition_pulse(
        &mut self,
        data: &Map<String, Value>,
    ) -> Result<RepetitionPulseTemplate, SerializationError> {
        let body = self.resolve_template(require(data, "body")?)?;
        let repetition_count = match require(data, "repetition_count")? {
            Value::Number(number) => match number.as_u64() {
                Some(count) => RepetitionCount::Constant(count),
                None => {
                    return Err(SerializationError::UnexpectedType {
                        field: "repetition_count",
                        expected: "a non-negative integer or a declaration",
                    })
                }
            },
            reference => RepetitionCount::Declaration(self.resolve_declaration(reference)?),
        };
        Ok(RepetitionPulseTemplate::new(body, repetition_count))
    }
}

impl SerializationContext for InMemoryStore {
    fn serialize_template(&mut self, template: &TemplatePtr) -> Result<Value, SerializationError> {
        match template.identifier() {
            Some(identifier) => {
                self.serialize(template)?;
                Ok(Value::String(identifier.to_string()))
            }
            None => self.serialize(template),
        }
    }

    fn serialize_declaration(
        &mut self,
        declaration: &ParameterDeclaration,
    ) -> Result<Value, SerializationError> {
        validate_identifier(declaration.name())?;
        let min = self.bound_to_value(declaration.min())?;
        let max = self.bound_to_value(declaration.max())?;
        self.declarations
            .insert(declaration.name().to_string(), declaration.clone());
        Ok(json!({
            "name": declaration.name(),
            "min": min,
            "max": max,
            "default": declaration.default(),
        }))
    }

    fn serialize_expression(&self, expression: &Expression) -> Value {
        Value::String(expression.to_string())
    }
}

impl DeserializationContext for InMemoryStore {
    fn resolve_template(&mut self, data: &Value) -> Result<TemplatePtr, SerializationError> {
        match data {
            Value::String(reference) => {
                if let Some(template) = self.templates.get(reference) {
                    return Ok(template.clone());
                }
                let stored = self
                    .data
                    .get(reference)
                    .cloned()
                    .ok_or_else(|| SerializationError::UnresolvedReference(reference.clone()))?;
                if !self.resolving.insert(reference.clone()) {
                    return Err(SerializationError::CyclicReference(reference.clone()));
                }
                let resolved = self.resolve_template(&stored);
                self.resolving.remove(reference);
                resolved
            }
            Value::Object(map) => {
                let type_tag = as_str(require(map, "type")?, "type")?;
                let template: TemplatePtr = match type_tag.as_str() {
                    "function_pulse" => {
                        let mut template = self.deserialize_function_pulse(map)?;
                        if let Some(identifier) = optional_identifier(map)? {
                            template = template.with_identifier(identifier);
                        }
                        Arc::new(template)
                    }
                    "repetition_pulse" => {
                        let mut template = self.deserialize_repetition_pulse(map)?;
                        if let Some(identifier) = optional_identifier(map)? {
                            template = template.with_identifier(identifier);
                        }
                        Arc::new(template)
                    }
                    unknown => return Err(SerializationError::UnknownType(unknown.to_string())),
                };
                if let Some(identifier) = template.identifier() {
                    self.templates
                        .insert(identifier.to_string(), template.clone());
                }
                Ok(template)
            }
            _ => Err(SerializationError::UnexpectedType {
                field: "template",
                expected: "a dictionary or an identifier reference",
            }),
        }
    }

    fn resolve_declaration(
        &mut self,
        data: &Value,
    ) -> Result<ParameterDeclaration, SerializationError> {
        let map = match data {
            Value::String(name) => {
                return self
                    .declarations
                    .get(name)
                    .cloned()
                    .ok_or_else(|| SerializationError::UnresolvedReference(name.clone()))
            }
            Value::Object(map) => map,
            _ => {
                return Err(SerializationError::UnexpectedType {
                    field: "declaration",
                    expected: "a dictionary or a name reference",
                })
            }
        };
        let name = as_str(require(map, "name")?, "name")?;
        validate_identifier(&name)?;
        if let Some(declaration) = self.declarations.get(&name) {
            return Ok(declaration.clone());
        }

        let mut declaration = ParameterDeclaration::new(name.clone());
        if let Some(min) = map.get("min").map(|min| self.bound_from_value(min)).transpose()?.flatten() {
            declaration = declaration.with_min(min)?;
        }
        if let Some(max) = map.get("max").map(|max| self.bound_from_value(max)).transpose()?.flatten() {
            declaration = declaration.with_max(max)?;
        }
        if let Some(default) = map.get("default").filter(|default| !default.is_null()) {
            let default = default
                .as_f64()
                .ok_or(SerializationError::UnexpectedType {
                    field: "default",
                    expected: "a number",
                })?;
            declaration = declaration.with_default(default)?;
        }
        self.declarations.insert(name, declaration.clone());
        Ok(declaration)
    }

    fn resolve_expression(&self, data: &Value) -> Result<Expression, SerializationError> {
        let text = as_str(data, "expression")?;
        Ok(text.parse()?)
    }
}

fn into_dictionary(data: Value) -> Result<Map<String, Value>, SerializationError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(SerializationError::UnexpectedType {
            field: "data",
            expected: "a dictionary",
        }),
    }
}

fn require<'a>(
    map: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a Value, SerializationError> {
    map.get(field).ok_or(SerializationError::MissingField(field))
}

fn as_str(value: &Value, field: &'static str) -> Result<String, SerializationError> {
    value
        .as_str()
        .map(String::from)
        .ok_or(SerializationError::UnexpectedType {
            field,
            expected: "a string",
        })
}

fn as_bool(value: &Value, field: &'static str) -> Result<bool, SerializationError> {
    value.as_bool().ok_or(SerializationError::UnexpectedType {
        field,
        expected: "a boolean",
    })
}

fn optional_identifier(map: &Map<String, Value>) -> Result<Option<String>, SerializationError> {
    match map.get("identifier") {
        None => Ok(None),
        Some(value) => {
            let identifier = as_str(value, "identifier")?;
            validate_identifier(&identifier)?;
            Ok(Some(identifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn leaf(identifier: Option<&str>) -> TemplatePtr {
        let template = FunctionPulseTemplate::new(
            "a*t".parse().unwrap(),
            "b".parse().unwrap(),
            "out",
        );
        match identifier {
            Some(identifier) => Arc::new(template.with_identifier(identifier)),
            None => Arc::new(template),
        }
    }

    #[test]
    fn function_pulse_round_trips() {
        let mut store = InMemoryStore::new();
        let template = leaf(None);
        let data = store.serialize(&template).unwrap();
        assert_eq!(data["type"], json!("function_pulse"));
        assert_eq!(data["expression"], json!("a*t"));
        assert_eq!(data["channel"], json!("out"));

        let mut fresh = InMemoryStore::new();
        let restored = fresh.deserialize(&data).unwrap();
        assert_eq!(restored.parameter_names(), template.parameter_names());
        assert_eq!(restored.defined_channels(), template.defined_channels());
    }

    #[test]
    fn constant_count_repetition_round_trips() {
        let mut store = InMemoryStore::new();
        let body = leaf(Some("body"));
        let template: TemplatePtr =
            Arc::new(RepetitionPulseTemplate::new(body.clone(), 3u64));
        let data = store.serialize(&template).unwrap();
        assert_eq!(data["repetition_count"], json!(3));
        // The named body is stored once and referenced by identifier.
        assert_eq!(data["body"], json!("body"));
        assert!(store.contains("body"));

        let map = into_dictionary(data).unwrap();
        let repetition = store.deserialize_repetition_pulse(&map).unwrap();
        match repetition.repetition_count() {
            RepetitionCount::Constant(count) => assert_eq!(*count, 3),
            other => panic!("expected a constant count, got {other}"),
        }
        // Resolving the body reference on the same store yields the original object.
        assert!(Arc::ptr_eq(repetition.body(), &body));
    }

    #[test]
    fn declared_count_repetition_preserves_the_declaration() {
        let mut store = InMemoryStore::new();
        let declaration = ParameterDeclaration::new("foo")
            .with_min(0.0)
            .unwrap()
            .with_max(5.0)
            .unwrap();
        let template: TemplatePtr = Arc::new(RepetitionPulseTemplate::new(
            leaf(None),
            declaration.clone(),
        ));
        let data = store.serialize(&template).unwrap();

        let map = into_dictionary(data).unwrap();
        let repetition = store.deserialize_repetition_pulse(&map).unwrap();
        match repetition.repetition_count() {
            RepetitionCount::Declaration(restored) => {
                assert_eq!(restored, &declaration);
                assert_eq!(restored.min(), declaration.min());
                assert_eq!(restored.max(), declaration.max());
            }
            other => panic!("expected a declared count, got {other}"),
        }
    }

    #[test]
    fn an_unknown_type_tag_is_rejected() {
        let mut store = InMemoryStore::new();
        let error = store
            .deserialize(&json!({ "type": "branch_pulse" }))
            .unwrap_err();
        assert!(matches!(error, SerializationError::UnknownType(tag) if tag == "branch_pulse"));
    }

    #[test]
    fn a_self_referential_entry_is_rejected() {
        let mut store = InMemoryStore::new();
        store.put("a", json!("a"));
        let error = store.deserialize(&json!("a")).unwrap_err();
        assert!(matches!(error, SerializationError::CyclicReference(name) if name == "a"));
    }

    #[test]
    fn mutually_referential_entries_are_rejected() {
        let mut store = InMemoryStore::new();
        store.put("a", json!("b"));
        store.put("b", json!("a"));
        let error = store.deserialize(&json!("a")).unwrap_err();
        assert!(matches!(error, SerializationError::CyclicReference(name) if name == "a"));
    }

    #[test]
    fn a_dangling_reference_is_rejected() {
        let mut store = InMemoryStore::new();
        let error = store.deserialize(&json!("missing")).unwrap_err();
        assert!(
            matches!(error, SerializationError::UnresolvedReference(name) if name == "missing")
        );
    }

    #[test]
    fn an_invalid_identifier_is_rejected() {
        let mut store = InMemoryStore::new();
        let template = leaf(Some("not valid"));
        assert!(matches!(
            store.serialize(&template),
            Err(SerializationError::Identifier(_))
        ));
    }

    #[test]
    fn stores_can_be_seeded_from_another_store() {
        let mut source = InMemoryStore::new();
        let template = leaf(Some("pulse_a"));
        source.serialize(&template).unwrap();

        let mut destination = InMemoryStore::new();
        let stored = source.get("pulse_a").cloned().unwrap();
        destination.put("pulse_a", stored);
        let restored = destination.deserialize(&json!("pulse_a")).unwrap();
        assert_eq!(restored.identifier(), Some("pulse_a"));
        // Distinct stores reconstruct a distinct object.
        assert!(!Arc::ptr_eq(&restored, &template));
    }
}
