use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_calculated: bool,
}

/// `cardtypes/<name>.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardType {
    pub name: String,
    pub workflow: String,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    #[serde(default)]
    pub always_visible_fields: Vec<String>,
    #[serde(default)]
    pub optionally_visible_fields: Vec<String>,
}

impl CardType {
    pub fn new(name: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workflow: workflow.into(),
            custom_fields: Vec::new(),
            always_visible_fields: Vec::new(),
            optionally_visible_fields: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumValue {
    pub enum_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_display_value: Option<String>,
}

/// `fieldtypes/<name>.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<EnumValue>>,
}

/// `linktypes/<name>.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkType {
    pub name: String,
    pub outbound_display_name: String,
    pub inbound_display_name: String,
    #[serde(default)]
    pub source_card_types: Vec<String>,
    #[serde(default)]
    pub destination_card_types: Vec<String>,
    #[serde(default)]
    pub enable_link_description: bool,
}

impl LinkType {
    /// Default content for a link type created by name only.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outbound_display_name: name.to_string(),
            inbound_display_name: name.to_string(),
            source_card_types: Vec::new(),
            destination_card_types: Vec::new(),
            enable_link_description: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum StateCategory {
    Initial,
    Active,
    Closed,
    #[default]
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub name: String,
    #[serde(default)]
    pub category: StateCategory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTransition {
    pub name: String,
    pub from_state: Vec<String>,
    pub to_state: String,
}

/// `workflows/<name>.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub states: Vec<WorkflowState>,
    pub transitions: Vec<WorkflowTransition>,
}

impl Workflow {
    /// Draft → Approved → Archived, used when a workflow is created without content.
    pub fn default_named(name: &str) -> Self {
        let state = |name: &str, category| WorkflowState {
            name: name.to_string(),
            category,
        };
        let transition = |name: &str, from: &[&str], to: &str| WorkflowTransition {
            name: name.to_string(),
            from_state: from.iter().map(|s| s.to_string()).collect(),
            to_state: to.to_string(),
        };
        Self {
            name: name.to_string(),
            states: vec![
                state("Draft", StateCategory::Initial),
                state("Approved", StateCategory::Closed),
                state("Archived", StateCategory::Closed),
            ],
            transitions: vec![
                transition("Create", &[""], "Draft"),
                transition("Approve", &["Draft"], "Approved"),
                transition("Archive", &["*"], "Archived"),
            ],
        }
    }

    /// State a freshly created card starts in.
    ///
    /// Prefers the `initial` category, then the target of a transition from
    /// the empty state, then the first declared state.
    pub fn initial_state(&self) -> Result<&str, StoreError> {
        if let Some(state) = self
            .states
            .iter()
            .find(|state| state.category == StateCategory::Initial)
        {
            return Ok(&state.name);
        }
        if let Some(transition) = self
            .transitions
            .iter()
            .find(|t| t.from_state.iter().any(String::is_empty))
        {
            return Ok(&transition.to_state);
        }
        self.states
            .first()
            .map(|state| state.name.as_str())
            .ok_or_else(|| {
                StoreError::InvalidInput(format!("workflow '{}' declares no states", self.name))
            })
    }
}

/// `templates/<name>/template.json`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDescriptor {
    pub button_label: String,
    pub name_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Default for TemplateDescriptor {
    fn default() -> Self {
        Self {
            button_label: "Button".to_string(),
            name_prompt: "Prompt".to_string(),
            display_name: None,
            description: None,
            category: None,
        }
    }
}
