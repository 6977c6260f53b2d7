//! Declarative tool schemas.
//!
//! A [`ToolSchema`] describes a callable's name, purpose, and parameters in the
//! small type vocabulary models understand (string, integer, number, boolean,
//! array). Schemas are either filled in explicitly or derived from a declared
//! signature (see `swarmflow_tools::bridge`).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::ToolDefinition;

/// Primitive parameter types understood by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
        }
    }

    /// Map a Rust type as written in a signature to a schema type.
    ///
    /// `Option<T>` maps to `T`; optionality comes from a declared default,
    /// not from the type.
    pub fn from_type_name(type_name: &str) -> Option<ParamType> {
        let ty: String = type_name.chars().filter(|c| !c.is_whitespace()).collect();
        let ty = ty.as_str();

        if let Some(inner) = ty.strip_prefix("Option<").and_then(|t| t.strip_suffix('>')) {
            return ParamType::from_type_name(inner);
        }
        if ty.starts_with("Vec<") || ty.starts_with("&[") || ty.starts_with('[') {
            return Some(ParamType::Array);
        }

        match ty {
            "String" | "str" | "&str" | "&'staticstr" | "char" | "Cow<str>"
            | "Cow<'_,str>" | "PathBuf" => Some(ParamType::String),
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" => Some(ParamType::Integer),
            "f32" | "f64" => Some(ParamType::Number),
            "bool" => Some(ParamType::Boolean),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compile-time mapping from a Rust type to its schema type.
pub trait SchemaType {
    const PARAM_TYPE: ParamType;
}

macro_rules! schema_type {
    ($param:expr => $($ty:ty),+ $(,)?) => {
        $(impl SchemaType for $ty {
            const PARAM_TYPE: ParamType = $param;
        })+
    };
}

schema_type!(ParamType::String => String, &str, char);
schema_type!(ParamType::Integer => i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
schema_type!(ParamType::Number => f32, f64);
schema_type!(ParamType::Boolean => bool);

impl<T> SchemaType for Vec<T> {
    const PARAM_TYPE: ParamType = ParamType::Array;
}

impl<T: SchemaType> SchemaType for Option<T> {
    const PARAM_TYPE: ParamType = T::PARAM_TYPE;
}

/// One parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value substituted when an optional argument is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// Declarative description of a callable offered to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: vec![],
        }
    }

    /// Add a required parameter.
    pub fn required(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            ty,
            required: true,
            description: Some(description.into()),
            default: None,
        });
        self
    }

    /// Add an optional parameter with the value used when it is omitted.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
        default: serde_json::Value,
    ) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            ty,
            required: false,
            description: Some(description.into()),
            default: Some(default),
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&ToolParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Names of the required parameters, in declaration order.
    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// JSON Schema object for the parameters.
    pub fn input_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for p in &self.params {
            let mut prop = json!({ "type": p.ty.as_str() });
            // OpenAI rejects array schemas without `items`
            if p.ty == ParamType::Array {
                prop["items"] = json!({});
            }
            if let Some(ref desc) = p.description {
                prop["description"] = json!(desc);
            }
            properties.insert(p.name.clone(), prop);
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required_names(),
        })
    }

    /// Definition sent to the model alongside a request.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_map_to_schema_types() {
        assert_eq!(ParamType::from_type_name("String"), Some(ParamType::String));
        assert_eq!(ParamType::from_type_name("&str"), Some(ParamType::String));
        assert_eq!(ParamType::from_type_name("i64"), Some(ParamType::Integer));
        assert_eq!(ParamType::from_type_name("usize"), Some(ParamType::Integer));
        assert_eq!(ParamType::from_type_name("f64"), Some(ParamType::Number));
        assert_eq!(ParamType::from_type_name("bool"), Some(ParamType::Boolean));
        assert_eq!(ParamType::from_type_name("Vec<String>"), Some(ParamType::Array));
        assert_eq!(ParamType::from_type_name("&[u8]"), Some(ParamType::Array));
        assert_eq!(ParamType::from_type_name("Option<u32>"), Some(ParamType::Integer));
        assert_eq!(ParamType::from_type_name("HashMap<String, String>"), None);
    }

    #[test]
    fn schema_type_trait_matches_names() {
        assert_eq!(<String as SchemaType>::PARAM_TYPE, ParamType::String);
        assert_eq!(<u8 as SchemaType>::PARAM_TYPE, ParamType::Integer);
        assert_eq!(<Vec<f64> as SchemaType>::PARAM_TYPE, ParamType::Array);
        assert_eq!(<Option<bool> as SchemaType>::PARAM_TYPE, ParamType::Boolean);
    }

    #[test]
    fn array_params_carry_items() {
        let schema = ToolSchema::new("tag", "Tag a document.")
            .required("labels", ParamType::Array, "Labels to apply");
        let js = schema.input_schema();
        assert_eq!(js["properties"]["labels"]["type"], "array");
        assert_eq!(js["properties"]["labels"]["items"], json!({}));
    }

    #[test]
    fn input_schema_lists_required_only() {
        let schema = ToolSchema::new("search", "Search for information.")
            .required("query", ParamType::String, "The search query")
            .optional("limit", ParamType::Integer, "Maximum results", json!(10));

        let js = schema.input_schema();
        assert_eq!(js["type"], "object");
        assert_eq!(js["properties"]["query"]["type"], "string");
        assert_eq!(js["properties"]["limit"]["type"], "integer");
        assert_eq!(js["required"], json!(["query"]));

        let def = schema.definition();
        assert_eq!(def.name, "search");
        assert_eq!(def.description, "Search for information.");
    }
}
