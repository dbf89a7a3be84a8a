use serde::{Deserialize, Serialize};

/// Definition of a function the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool type (currently always "function")
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Raw JSON Schema for the function parameters
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
    /// Ask the vendor for strict schema adherence where supported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl Tool {
    /// Function tool with the given parameter schema
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            tool_type: function_type(),
            name: name.into(),
            description: description.into(),
            parameters,
            strict: None,
        }
    }

    /// Request strict schema adherence
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Parameter schema after array `items` normalization
    pub fn normalized_parameters(&self) -> serde_json::Value {
        crate::schema::normalized(self.parameters.clone())
    }
}

fn function_type() -> String {
    "function".to_owned()
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// How the model should select tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    #[default]
    Auto,
    /// Model will not call any tools
    None,
    /// Model must call at least one tool
    Required,
    /// Model must call exactly this function
    Function(String),
}

impl ToolChoice {
    /// Constraint sentence used when describing the choice to a model in prose
    pub fn describe(&self) -> String {
        match self {
            Self::Auto => "Call a tool only if it is needed to answer the user.".to_owned(),
            Self::None => "Do not call any tool.".to_owned(),
            Self::Required => "You must call at least one tool.".to_owned(),
            Self::Function(name) => format!("You must call exactly one tool, named \"{name}\"."),
        }
    }
}
