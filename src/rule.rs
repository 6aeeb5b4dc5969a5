//! Monitoring rules.

use serde::{Deserialize, Serialize};

use crate::selection::Filters;

/// What fires a rule's condition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger type, e.g. `static`.
    pub name: String,
    /// Trigger arguments, e.g. `["gt", 100]`.
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

impl Trigger {
    /// Create a trigger.
    pub fn new(name: impl Into<String>, arguments: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Narrows which values a condition considers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Inclusion operation, e.g. `and`.
    #[serde(rename = "operation")]
    pub inclusion: String,
    /// Filter type.
    #[serde(rename = "type")]
    pub filter_type: String,
    /// Filter arguments.
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

/// A trigger together with its value filters.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// Filters combined conjunctively.
    pub filters: Vec<Filter>,
    /// Trigger evaluated on filtered values.
    pub trigger: Trigger,
}

/// Where a rule's alerts go.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Action {
    /// POST to a URL.
    Webhook {
        /// Target URL.
        url: String,
    },
    /// Send an email.
    Email {
        /// Recipient address.
        address: String,
    },
}

/// A monitoring rule evaluated by the server as data is written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RuleWire", into = "RuleWire")]
pub struct Rule {
    /// Display name.
    pub name: String,
    /// Unique key, assigned by the server when absent.
    pub key: Option<String>,
    /// Alert grouping mode, e.g. `any` or `separate`.
    pub alert_by: Option<String>,
    /// Devices and sensors the rule watches.
    pub filters: Filters,
    /// Conditions that raise the alert.
    pub conditions: Vec<Condition>,
    /// Alert destination.
    pub action: Option<Action>,
    /// `active` unless the rule was disabled.
    pub status: String,
}

impl Rule {
    /// Create an active rule with no conditions.
    pub fn new(name: impl Into<String>, filters: Filters) -> Self {
        Self {
            name: name.into(),
            key: None,
            alert_by: None,
            filters,
            conditions: Vec::new(),
            action: None,
            status: "active".to_string(),
        }
    }

    /// Set the rule key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the alert grouping mode.
    pub fn with_alert_by(mut self, alert_by: impl Into<String>) -> Self {
        self.alert_by = Some(alert_by.into());
        self
    }

    /// Add a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Set the alert destination.
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

#[derive(Serialize, Deserialize)]
struct RuleWire {
    rule: RuleBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alerts: Option<String>,
    search: SearchWire,
}

#[derive(Serialize, Deserialize)]
struct RuleBody {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default)]
    actions: Vec<Action>,
    #[serde(default)]
    conditions: Vec<ConditionWire>,
    #[serde(default = "default_status")]
    status: String,
}

#[derive(Serialize, Deserialize)]
struct ConditionWire {
    trigger: Trigger,
    filter: FilterClause,
}

#[derive(Serialize, Deserialize)]
struct FilterClause {
    #[serde(rename = "and", default)]
    filters: Vec<Filter>,
}

#[derive(Serialize, Deserialize)]
struct SearchWire {
    filters: Filters,
}

fn default_status() -> String {
    "active".to_string()
}

impl From<RuleWire> for Rule {
    fn from(wire: RuleWire) -> Self {
        Self {
            name: wire.rule.name,
            key: wire.rule.key,
            alert_by: wire.alerts,
            filters: wire.search.filters,
            conditions: wire
                .rule
                .conditions
                .into_iter()
                .map(|c| Condition {
                    filters: c.filter.filters,
                    trigger: c.trigger,
                })
                .collect(),
            action: wire.rule.actions.into_iter().next(),
            status: wire.rule.status,
        }
    }
}

impl From<Rule> for RuleWire {
    fn from(rule: Rule) -> Self {
        Self {
            rule: RuleBody {
                name: rule.name,
                key: rule.key,
                actions: rule.action.into_iter().collect(),
                conditions: rule
                    .conditions
                    .into_iter()
                    .map(|c| ConditionWire {
                        trigger: c.trigger,
                        filter: FilterClause { filters: c.filters },
                    })
                    .collect(),
                status: rule.status,
            },
            alerts: rule.alert_by,
            search: SearchWire {
                filters: rule.filters,
            },
        }
    }
}
