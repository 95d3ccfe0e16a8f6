//! # Tool definitions and registry
//!
//! A tool is how the agent loop lets a model reach outside the conversation:
//! the model names a tool and supplies arguments, the registry looks the
//! tool up by name, and its handler runs and returns a JSON result that
//! becomes the next turn's tool message. This module owns two concerns that
//! are deliberately kept separate:
//!
//! 1. **Definition** - a [`Tool`] bundles a name, a description, a JSON
//!    Schema describing its arguments, and an async handler. Schemas accept
//!    three input shapes (see [`convert_schema_to_json_schema`]) so callers
//!    can write `.param("units", "string")` instead of hand-rolling JSON
//!    Schema for the common case.
//! 2. **Storage and dispatch** - a [`ToolRegistry`] is a concurrent,
//!    case-insensitive map from name to `Tool`, built for a client that may
//!    be cloned and shared across tasks (see "Why `Arc<RwLock<...>>>`?"
//!    below).
//!
//! ## Why `Arc<RwLock<HashMap<...>>>`?
//!
//! A [`ToolRegistry`] is cloned whenever a [`crate::client::Client`] is
//! cloned, and both clones need to see the same underlying set of tools -
//! registering a tool through one handle must be visible through the other.
//! `Arc` gives cheap, shared ownership of one map; `std::sync::RwLock`
//! guards it for concurrent reads (`get`/`has`/`dispatch`) against the rare
//! write (`add`/`remove`). The lock is synchronous rather than
//! `tokio::sync::RwLock` because every critical section here is a plain
//! `HashMap` operation - no `.await` is ever taken while holding it, so
//! there's no risk of blocking an executor thread.
//!
//! ## Handler shape
//!
//! [`ToolHandler`] is `Arc<dyn Fn(Value) -> Pin<Box<dyn Future<...>>> + Send + Sync>`.
//! Each piece of that type does one job:
//!
//! - `Arc` - the same handler is called repeatedly (once per invocation) and
//!   shared across every clone of the owning `Tool`; reference counting
//!   avoids re-allocating or re-closing over captured state each time.
//! - `Pin<Box<dyn Future<...>>>` - handlers are arbitrary async closures with
//!   distinct, unnameable concrete future types; boxing erases the type so
//!   they can live in one field, and pinning is required because the boxed
//!   future may (in principle) be self-referential once polled.
//! - `Send + Sync` - a handler can be dispatched from whatever task is
//!   currently driving the agent loop, which may not be the task that
//!   registered it.

use crate::error::{Error, Result};
use crate::wire::ToolDescriptor;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// A tool handler: JSON arguments in, a JSON result or error out.
///
/// Built from any `Fn(Value) -> Fut` where `Fut: Future<Output = Result<Value>>
/// + Send` via [`Tool::new`] or [`ToolBuilder::build`] - callers essentially
/// never name this type directly, they just write an async closure.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// A callable tool: identity, input schema, and implementation.
///
/// Cloning is cheap - `name`/`description`/`input_schema` clone their
/// owned data, `handler` is an `Arc` clone sharing the same implementation.
/// Tools are immutable once built: there is no setter for any field, so a
/// `Tool` pulled out of a registry mid-dispatch can't change shape under the
/// caller.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
}

impl Tool {
    /// Builds a tool from a name, description, schema, and async handler.
    ///
    /// `input_schema` is run through [`convert_schema_to_json_schema`]
    /// before being stored, so any of the three accepted shapes (simple
    /// type notation, extended per-parameter schema, or a full JSON Schema
    /// passthrough) works here exactly as it does through [`ToolBuilder`].
    ///
    /// Most callers reach for the [`tool()`] builder instead of calling this
    /// directly; `new` is the lower-level entry point for when the schema is
    /// already a single `Value` built elsewhere.
    ///
    /// ```
    /// use agentcore::Tool;
    /// use serde_json::json;
    ///
    /// let add = Tool::new(
    ///     "add",
    ///     "Add two numbers",
    ///     json!({"a": "number", "b": "number"}),
    ///     |args| Box::pin(async move {
    ///         let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
    ///         Ok(json!({"result": sum}))
    ///     }),
    /// );
    /// assert_eq!(add.name(), "add");
    /// ```
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let input_schema = convert_schema_to_json_schema(input_schema);
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Invokes the handler with the given arguments and awaits its result.
    /// An `Err` from the handler propagates to the caller unchanged - it's
    /// [`crate::react::ReAct`]'s job to decide whether that becomes a failed
    /// turn or a tool-result message reporting the failure.
    ///
    /// ```
    /// # use agentcore::tool;
    /// # use serde_json::json;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let add = tool("add", "Add numbers").build(|args| async move {
    ///     Ok(json!({"result": args["a"].as_f64().unwrap() + args["b"].as_f64().unwrap()}))
    /// });
    /// let result = add.execute(json!({"a": 5.0, "b": 3.0})).await.unwrap();
    /// assert_eq!(result["result"], 8.0);
    /// # }
    /// ```
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }

    /// Converts this tool to the provider-neutral [`ToolDescriptor`] carried
    /// on a [`crate::wire::ChatRequest`]. Each `Provider` translates the
    /// descriptor into its own wire shape (OpenAI-style `tools[]`, Gemini's
    /// `functionDeclarations`, ...); `Tool` itself never speaks a wire
    /// format.
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            // handler is a boxed closure with no useful Debug representation
            .finish()
    }
}

/// Normalizes simple type notation (`{"x": "string"}`) and extended
/// property schemas (`{"x": {"type": "string", "optional": true}}`) to a
/// full JSON Schema object. A value that already looks like a full schema
/// (has both `type` and `properties`) passes through unchanged.
///
/// Per-parameter requiredness, for the extended form, follows this order:
/// 1. an explicit `"required": true` wins outright;
/// 2. an explicit `"required": false` or `"optional": true` excludes it;
/// 3. a `"default"` value excludes it (a default makes the parameter
///    optional even if nothing says so explicitly);
/// 4. otherwise it's required.
///
/// The `"optional"`/`"required"` keys themselves are stripped from the
/// per-parameter schema before insertion - they aren't part of JSON Schema,
/// only the top-level `required` array is.
fn convert_schema_to_json_schema(schema: Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return serde_json::json!({"type": "object", "properties": {}, "required": []});
    };
    if obj.contains_key("type") && obj.contains_key("properties") {
        return schema;
    }

    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        if let Some(type_str) = param_type.as_str() {
            properties.insert(param_name.clone(), type_to_json_schema(type_str));
            required.push(param_name.clone());
        } else if param_type.is_object() {
            let mut prop = param_type.clone();
            let prop_obj = prop.as_object_mut().expect("checked is_object above");

            let is_optional = prop_obj
                .remove("optional")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let is_required = prop_obj.remove("required").and_then(|v| v.as_bool());
            let has_default = prop_obj.contains_key("default");

            properties.insert(param_name.clone(), prop);

            if is_required == Some(true) {
                required.push(param_name.clone());
            } else if is_optional || is_required == Some(false) || has_default {
                // explicitly optional, or a default makes it so
            } else {
                required.push(param_name.clone());
            }
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Maps a friendly type name to its JSON Schema `"type"` value, accepting
/// a handful of Rust- and Python-flavored aliases (`"i64"`, `"dict"`, ...) on
/// top of the JSON Schema vocabulary itself. Anything unrecognized falls
/// back to `"string"` rather than failing tool construction over a typo.
fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };
    serde_json::json!({ "type": json_type })
}

/// Fluent builder returned by [`tool`]. Accumulates a name, description, and
/// schema, then hands them to [`Tool::new`] once a handler is supplied.
///
/// Use either `.param()` (repeatable, always-required, simple types) or a
/// single `.schema()` call (full control, including optional parameters);
/// mixing the two means whichever is called last wins, since `.schema()`
/// replaces the schema outright and `.param()` resets a non-object schema
/// before inserting into it.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({}),
        }
    }

    /// Replaces the schema wholesale. Overrides any `.param()` calls made
    /// so far - use this for schemas that need optional parameters or
    /// nested structure, where `.param()`'s simple-type-notation shorthand
    /// doesn't reach.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Adds one required parameter in simple type notation.
    ///
    /// ```
    /// use agentcore::tool;
    /// use serde_json::json;
    ///
    /// let weather = tool("get_weather", "Get current weather for a location")
    ///     .param("location", "string")
    ///     .param("units", "string")
    ///     .build(|args| async move {
    ///         Ok(json!({"location": args["location"], "temperature": 22}))
    ///     });
    /// assert_eq!(weather.input_schema()["required"], json!(["location", "units"]));
    /// ```
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = serde_json::json!({});
        }
        let obj = self.schema.as_object_mut().expect("set to object above");
        obj.insert(name.to_string(), Value::String(type_str.to_string()));
        self
    }

    /// Consumes the builder, pairing the accumulated name/description/schema
    /// with `handler` to produce a finished [`Tool`].
    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

/// Starts building a tool with the given name and description. The
/// recommended entry point for defining tools - see [`ToolBuilder::param`]
/// and [`ToolBuilder::schema`] for the two ways to describe arguments.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// A case-insensitive, concurrently accessible collection of tools. Lookup,
/// dispatch, and merge all key on the lowercased name so a client built
/// from several independently-authored tool sets never silently shadows a
/// tool over a casing difference.
///
/// Cloning a `ToolRegistry` is cheap and shares the underlying map - see
/// the module-level "Why `Arc<RwLock<HashMap<...>>>`?" section for why that
/// shape was chosen.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    inner: Arc<RwLock<HashMap<String, Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry pre-populated from an iterator of tools. Later
    /// entries win on a name collision, same as repeated [`ToolRegistry::add`]
    /// calls would.
    pub fn from_tools(tools: impl IntoIterator<Item = Tool>) -> Self {
        let registry = Self::new();
        for t in tools {
            registry.add(t);
        }
        registry
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    /// Inserts or replaces a tool by (case-insensitive) name.
    pub fn add(&self, tool: Tool) {
        let key = Self::key(tool.name());
        self.inner.write().expect("tool registry lock poisoned").insert(key, tool);
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.inner
            .read()
            .expect("tool registry lock poisoned")
            .get(&Self::key(name))
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner
            .read()
            .expect("tool registry lock poisoned")
            .contains_key(&Self::key(name))
    }

    pub fn remove(&self, name: &str) -> Option<Tool> {
        self.inner
            .write()
            .expect("tool registry lock poisoned")
            .remove(&Self::key(name))
    }

    pub fn clear(&self) {
        self.inner.write().expect("tool registry lock poisoned").clear();
    }

    pub fn size(&self) -> usize {
        self.inner.read().expect("tool registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Merges `other`'s tools into this registry. On a name collision,
    /// `other`'s tool wins - the same last-write-wins rule as [`ToolRegistry::add`].
    pub fn merge(&self, other: &ToolRegistry) {
        for tool in other.snapshot() {
            self.add(tool);
        }
    }

    /// A point-in-time copy of every registered tool, in arbitrary order.
    /// Taken under a single read lock so the snapshot is internally
    /// consistent even if another task is concurrently mutating the
    /// registry.
    pub fn snapshot(&self) -> Vec<Tool> {
        self.inner
            .read()
            .expect("tool registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Descriptors for every registered tool, suitable for a [`crate::wire::ChatRequest`].
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.snapshot().iter().map(Tool::descriptor).collect()
    }

    /// Dispatches to a registered tool by name. Returns a tool-layer error
    /// if no tool with that name (case-insensitively) is registered, rather
    /// than panicking - an unrecognized tool call from a model is an
    /// expected failure mode, not a bug.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::tool(format!("no tool registered with name '{name}'")))?;
        tool.execute(arguments).await
    }
}
