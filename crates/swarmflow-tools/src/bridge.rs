//! Function-to-tool bridge.
//!
//! Rust has no runtime reflection over function signatures, so a callable is
//! described once with a [`Signature`] (identifier, doc string, declared
//! parameters) and [`function_to_schema`] derives the [`ToolSchema`] from it.
//! [`FunctionTool`] then wraps a sync or async closure behind the [`Tool`]
//! trait:
//!
//! ```ignore
//! let sig = Signature::new("search")
//!     .doc("Search for information.\n\nquery: The search query\nlimit: Maximum results")
//!     .param("query", "String")
//!     .param_with_default("limit", "i64", 10);
//!
//! let tool = FunctionTool::new(sig, |args: ToolArgs| {
//!     let query: String = args.get("query")?;
//!     let limit: i64 = args.get("limit")?;
//!     Ok::<_, SwarmError>(format!("{} results for {}", limit, query))
//! })?;
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use swarmflow_core::error::{Result, SwarmError};
use swarmflow_core::schema::{ParamType, SchemaType, ToolParam, ToolSchema};
use swarmflow_core::traits::Tool;

#[derive(Debug, Clone, PartialEq)]
enum DeclaredType {
    Named(String),
    Known(ParamType),
}

/// One declared parameter of a function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredParam {
    pub name: String,
    ty: DeclaredType,
    pub default: Option<Value>,
}

impl DeclaredParam {
    /// Parameter declared by its Rust type name, e.g. `"Vec<String>"`.
    pub fn named(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: DeclaredType::Named(type_name.into()),
            default: None,
        }
    }

    /// Parameter whose schema type comes from a [`SchemaType`] implementation.
    pub fn typed<T: SchemaType>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: DeclaredType::Known(T::PARAM_TYPE),
            default: None,
        }
    }

    /// Make the parameter optional with this default.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn param_type(&self) -> Option<ParamType> {
        match &self.ty {
            DeclaredType::Known(ty) => Some(*ty),
            DeclaredType::Named(name) => ParamType::from_type_name(name),
        }
    }

    fn type_name(&self) -> String {
        match &self.ty {
            DeclaredType::Known(ty) => ty.to_string(),
            DeclaredType::Named(name) => name.clone(),
        }
    }
}

/// Declarative description of a function: what reflection would provide.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub doc: Option<String>,
    pub params: Vec<DeclaredParam>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            params: vec![],
        }
    }

    /// Doc string. The first line is the tool description; lines of the form
    /// `name: text` describe parameters.
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Required parameter declared by type name.
    pub fn param(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.params.push(DeclaredParam::named(name, type_name));
        self
    }

    /// Optional parameter declared by type name.
    pub fn param_with_default(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        self.params
            .push(DeclaredParam::named(name, type_name).with_default(default));
        self
    }

    /// Required parameter typed at compile time.
    pub fn typed<T: SchemaType>(mut self, name: impl Into<String>) -> Self {
        self.params.push(DeclaredParam::typed::<T>(name));
        self
    }

    pub fn declare(mut self, param: DeclaredParam) -> Self {
        self.params.push(param);
        self
    }
}

/// Derive a tool schema from a declared signature.
pub fn function_to_schema(signature: &Signature) -> Result<ToolSchema> {
    let doc_lines: Vec<&str> = signature
        .doc
        .as_deref()
        .map(|d| d.lines().map(str::trim).collect())
        .unwrap_or_default();

    let description = doc_lines
        .iter()
        .find(|l| !l.is_empty())
        .map(|l| l.to_string())
        .unwrap_or_else(|| signature.name.clone());

    let mut schema = ToolSchema::new(&signature.name, description);

    for declared in &signature.params {
        if schema.param(&declared.name).is_some() {
            return Err(SwarmError::Schema {
                tool: signature.name.clone(),
                param: Some(declared.name.clone()),
                message: format!("parameter '{}': declared twice", declared.name),
            });
        }

        let ty = declared.param_type().ok_or_else(|| SwarmError::Schema {
            tool: signature.name.clone(),
            param: Some(declared.name.clone()),
            message: format!(
                "parameter '{}': unsupported type '{}'",
                declared.name,
                declared.type_name()
            ),
        })?;

        schema.params.push(ToolParam {
            name: declared.name.clone(),
            ty,
            required: declared.default.is_none(),
            description: param_description(&doc_lines, &declared.name),
            default: declared.default.clone(),
        });
    }

    Ok(schema)
}

fn param_description(doc_lines: &[&str], param: &str) -> Option<String> {
    doc_lines.iter().skip(1).find_map(|line| {
        let (key, text) = line.split_once(':')?;
        let text = text.trim();
        (key.trim() == param && !text.is_empty()).then(|| text.to_string())
    })
}

/// Named arguments handed to a bridged function, defaults already applied.
#[derive(Debug, Clone)]
pub struct ToolArgs(Map<String, Value>);

impl ToolArgs {
    /// Deserialize one argument.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| SwarmError::ToolValidation(format!("missing argument '{}'", name)))?;
        serde_json::from_value(value.clone()).map_err(|e| {
            SwarmError::ToolValidation(format!("argument '{}': {}", name, e))
        })
    }

}

type HandlerFuture = BoxFuture<'static, std::result::Result<Value, String>>;
type Handler = Arc<dyn Fn(ToolArgs) -> HandlerFuture + Send + Sync>;

/// A plain function exposed to the model as a tool.
pub struct FunctionTool {
    schema: ToolSchema,
    handler: Handler,
    timeout_secs: u64,
}

impl FunctionTool {
    /// Wrap a synchronous function.
    pub fn new<F, R, E>(signature: Signature, f: F) -> Result<Self>
    where
        F: Fn(ToolArgs) -> std::result::Result<R, E> + Send + Sync + 'static,
        R: Serialize,
        E: std::fmt::Display,
    {
        let handler: Handler = Arc::new(move |args: ToolArgs| -> HandlerFuture {
            let out = f(args)
                .map_err(|e| e.to_string())
                .and_then(|r| serde_json::to_value(r).map_err(|e| e.to_string()));
            Box::pin(futures::future::ready(out))
        });
        Ok(Self {
            schema: function_to_schema(&signature)?,
            handler,
            timeout_secs: 30,
        })
    }

    /// Wrap an asynchronous function.
    pub fn from_async<F, Fut, R, E>(signature: Signature, f: F) -> Result<Self>
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
        R: Serialize + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args: ToolArgs| -> HandlerFuture {
            let fut = f(args);
            Box::pin(async move {
                let r = fut.await.map_err(|e| e.to_string())?;
                serde_json::to_value(r).map_err(|e| e.to_string())
            })
        });
        Ok(Self {
            schema: function_to_schema(&signature)?,
            handler,
            timeout_secs: 30,
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn bind(&self, mut args: Map<String, Value>) -> Result<ToolArgs> {
        if let Some(unexpected) = args.keys().find(|k| self.schema.param(k).is_none()) {
            return Err(SwarmError::ToolValidation(format!(
                "unexpected argument '{}'",
                unexpected
            )));
        }
        for param in &self.schema.params {
            if args.contains_key(&param.name) {
                continue;
            }
            match &param.default {
                Some(default) => {
                    args.insert(param.name.clone(), default.clone());
                }
                None => {
                    return Err(SwarmError::ToolValidation(format!(
                        "missing required argument '{}'",
                        param.name
                    )))
                }
            }
        }
        Ok(ToolArgs(args))
    }
}

impl Tool for FunctionTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn execute(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let args = self.bind(args)?;
            let value = (self.handler)(args)
                .await
                .map_err(|message| SwarmError::ToolExecution {
                    tool: self.schema.name.clone(),
                    message,
                })?;
            Ok(stringify(value))
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }
}

/// Render a return value as model-facing text.
fn stringify(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
