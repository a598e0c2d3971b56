use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::violation::{Category, Severity};

/// Identifier of a built-in rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    MissingId,
    DuplicateId,
    UnknownElement,
    MissingFlowRef,
    MissingAttachment,
    MissingSignalRef,
    MissingStartEvent,
    MissingEndEvent,
    DanglingFlowRef,
    CrossScopeFlow,
    BoundaryAttachment,
    BoundaryCancelFlag,
    BoundaryDefinition,
    SignalReference,
    UnusedSignal,
    GatewayCondition,
    DefaultFlowCondition,
    DefaultFlowRef,
    GatewayDirection,
    EventDefinitionPlacement,
    EventDefinitionKind,
    DisallowedAttribute,
}

impl RuleId {
    pub const ALL: [RuleId; 22] = [
        RuleId::MissingId,
        RuleId::DuplicateId,
        RuleId::UnknownElement,
        RuleId::MissingFlowRef,
        RuleId::MissingAttachment,
        RuleId::MissingSignalRef,
        RuleId::MissingStartEvent,
        RuleId::MissingEndEvent,
        RuleId::DanglingFlowRef,
        RuleId::CrossScopeFlow,
        RuleId::BoundaryAttachment,
        RuleId::BoundaryCancelFlag,
        RuleId::BoundaryDefinition,
        RuleId::SignalReference,
        RuleId::UnusedSignal,
        RuleId::GatewayCondition,
        RuleId::DefaultFlowCondition,
        RuleId::DefaultFlowRef,
        RuleId::GatewayDirection,
        RuleId::EventDefinitionPlacement,
        RuleId::EventDefinitionKind,
        RuleId::DisallowedAttribute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleId::MissingId => "missing-id",
            RuleId::DuplicateId => "duplicate-id",
            RuleId::UnknownElement => "unknown-element",
            RuleId::MissingFlowRef => "missing-flow-ref",
            RuleId::MissingAttachment => "missing-attachment",
            RuleId::MissingSignalRef => "missing-signal-ref",
            RuleId::MissingStartEvent => "missing-start-event",
            RuleId::MissingEndEvent => "missing-end-event",
            RuleId::DanglingFlowRef => "dangling-flow-ref",
            RuleId::CrossScopeFlow => "cross-scope-flow",
            RuleId::BoundaryAttachment => "boundary-attachment",
            RuleId::BoundaryCancelFlag => "boundary-cancel-flag",
            RuleId::BoundaryDefinition => "boundary-definition",
            RuleId::SignalReference => "signal-reference",
            RuleId::UnusedSignal => "unused-signal",
            RuleId::GatewayCondition => "gateway-condition",
            RuleId::DefaultFlowCondition => "default-flow-condition",
            RuleId::DefaultFlowRef => "default-flow-ref",
            RuleId::GatewayDirection => "gateway-direction",
            RuleId::EventDefinitionPlacement => "event-definition-placement",
            RuleId::EventDefinitionKind => "event-definition-kind",
            RuleId::DisallowedAttribute => "disallowed-attribute",
        }
    }

    /// Category the rule's violations fall into. `boundary-attachment`
    /// reports an unknown target as a reference violation and a target that
    /// is not an activity as a semantic one; this is its usual category.
    pub fn category(self) -> Category {
        match self {
            RuleId::MissingId
            | RuleId::DuplicateId
            | RuleId::UnknownElement
            | RuleId::MissingFlowRef
            | RuleId::MissingAttachment
            | RuleId::MissingSignalRef
            | RuleId::MissingStartEvent
            | RuleId::MissingEndEvent => Category::Schema,
            RuleId::DanglingFlowRef
            | RuleId::CrossScopeFlow
            | RuleId::BoundaryAttachment
            | RuleId::SignalReference
            | RuleId::UnusedSignal
            | RuleId::DefaultFlowRef => Category::Reference,
            RuleId::BoundaryCancelFlag
            | RuleId::BoundaryDefinition
            | RuleId::GatewayCondition
            | RuleId::DefaultFlowCondition
            | RuleId::GatewayDirection
            | RuleId::EventDefinitionPlacement
            | RuleId::EventDefinitionKind
            | RuleId::DisallowedAttribute => Category::Semantic,
        }
    }

    pub fn default_severity(self) -> Severity {
        match self {
            RuleId::MissingSignalRef
            | RuleId::MissingStartEvent
            | RuleId::MissingEndEvent
            | RuleId::BoundaryCancelFlag
            | RuleId::DefaultFlowCondition
            | RuleId::GatewayDirection
            | RuleId::EventDefinitionKind
            | RuleId::DisallowedAttribute => Severity::Warning,
            RuleId::UnusedSignal => Severity::Info,
            _ => Severity::Error,
        }
    }

    /// Schema rules run first, then reference rules, then semantic ones.
    pub fn default_priority(self) -> u32 {
        match self.category() {
            Category::Schema => 10,
            Category::Reference => 20,
            Category::Semantic => 30,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RuleId::MissingId => "every element, flow and signal declares an id",
            RuleId::DuplicateId => "ids are unique across the whole document",
            RuleId::UnknownElement => "flow elements have a recognised BPMN type",
            RuleId::MissingFlowRef => "sequence flows declare sourceRef and targetRef",
            RuleId::MissingAttachment => "boundary events declare attachedToRef",
            RuleId::MissingSignalRef => "signal event definitions declare signalRef",
            RuleId::MissingStartEvent => "the process body contains a start event",
            RuleId::MissingEndEvent => "the process body contains an end event",
            RuleId::DanglingFlowRef => "sequence flow endpoints resolve to declared elements",
            RuleId::CrossScopeFlow => "sequence flows stay inside the scope that declares them",
            RuleId::BoundaryAttachment => {
                "boundary events attach to a task or sub-process of their scope"
            }
            RuleId::BoundaryCancelFlag => {
                "boundary events declare cancelActivity; error boundaries interrupt"
            }
            RuleId::BoundaryDefinition => "boundary events carry an event definition",
            RuleId::SignalReference => "signalRef points at a signal declared at the root",
            RuleId::UnusedSignal => "declared signals are referenced by some event",
            RuleId::GatewayCondition => {
                "conditions only on flows leaving exclusive, inclusive or complex gateways"
            }
            RuleId::DefaultFlowCondition => "a gateway's default flow carries no condition",
            RuleId::DefaultFlowRef => "a gateway's default flow is one of its outgoing flows",
            RuleId::GatewayDirection => "declared gateway direction matches its flow counts",
            RuleId::EventDefinitionPlacement => {
                "event definitions only appear on events"
            }
            RuleId::EventDefinitionKind => {
                "event definition kinds are allowed on the event type carrying them"
            }
            RuleId::DisallowedAttribute => "elements carry no disallowed attributes",
        }
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleId {
    type Err = RuleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        RuleId::ALL
            .into_iter()
            .find(|id| id.as_str() == raw)
            .ok_or_else(|| RuleError::UnknownRule { id: raw.to_string() })
    }
}

/// Effective definition of a rule inside a [`crate::RuleEngine`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Rule {
    pub id: RuleId,
    pub description: String,
    /// Ordering priority. Lower numbers are evaluated first.
    pub priority: u32,
    pub enabled: bool,
    pub severity: Severity,
    pub category: Category,
    /// Additional labels for reporting / filtering.
    pub labels: Vec<String>,
}

impl Rule {
    pub fn builtin(id: RuleId) -> Self {
        Self {
            id,
            description: id.description().to_string(),
            priority: id.default_priority(),
            enabled: true,
            severity: id.default_severity(),
            category: id.category(),
            labels: Vec::new(),
        }
    }

    /// Every built-in rule with its defaults.
    pub fn catalogue() -> Vec<Rule> {
        RuleId::ALL.into_iter().map(Rule::builtin).collect()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Applies the overrides of a settings entry.
    pub fn apply(&mut self, setting: &RuleSetting) {
        if let Some(description) = &setting.description {
            self.description = description.clone();
        }
        if let Some(priority) = setting.priority {
            self.priority = priority;
        }
        if let Some(severity) = setting.severity {
            self.severity = severity;
        }
        self.enabled = setting.enabled;
        self.labels = setting.labels.clone();
    }
}

/// Per-rule entry of a rule settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSetting {
    /// Built-in rule id, e.g. `gateway-condition`.
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default = "RuleSetting::default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl RuleSetting {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            priority: None,
            enabled: true,
            severity: None,
            labels: Vec::new(),
        }
    }

    pub fn default_enabled() -> bool {
        true
    }
}

/// Attributes reported by `disallowed-attribute` unless configured otherwise.
pub const DEFAULT_DISALLOWED_ATTRIBUTES: [&str; 2] = ["documentation", "description"];

/// Options shared by all rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    pub disallowed_attributes: Vec<String>,
    /// Report every attribute the model does not interpret.
    pub strict_attributes: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            disallowed_attributes: DEFAULT_DISALLOWED_ATTRIBUTES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            strict_attributes: false,
        }
    }
}

impl CheckOptions {
    pub fn is_disallowed(&self, attribute: &str) -> bool {
        self.strict_attributes
            || self
                .disallowed_attributes
                .iter()
                .any(|name| name == attribute)
    }
}

/// A complete rule settings document as loaded from YAML or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSettings {
    #[serde(default)]
    pub rules: Vec<RuleSetting>,
    #[serde(default)]
    pub disallowed_attributes: Option<Vec<String>>,
    #[serde(default)]
    pub strict_attributes: Option<bool>,
}

impl RuleSettings {
    /// Folds `other` into `self`: rule entries are appended, attribute lists
    /// are unioned and strict mode is enabled if either side enables it.
    pub fn merge(&mut self, other: RuleSettings) {
        self.rules.extend(other.rules);
        if let Some(extra) = other.disallowed_attributes {
            let list = self.disallowed_attributes.get_or_insert_with(Vec::new);
            for name in extra {
                if !list.contains(&name) {
                    list.push(name);
                }
            }
        }
        if let Some(strict) = other.strict_attributes {
            self.strict_attributes = Some(self.strict_attributes.unwrap_or(false) || strict);
        }
    }

    pub fn options(&self) -> CheckOptions {
        let defaults = CheckOptions::default();
        CheckOptions {
            disallowed_attributes: self
                .disallowed_attributes
                .clone()
                .unwrap_or(defaults.disallowed_attributes),
            strict_attributes: self.strict_attributes.unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RuleId::MissingFlowRef, Category::Schema, Severity::Error)]
    #[test_case(RuleId::UnusedSignal, Category::Reference, Severity::Info)]
    #[test_case(RuleId::GatewayCondition, Category::Semantic, Severity::Error)]
    #[test_case(RuleId::DisallowedAttribute, Category::Semantic, Severity::Warning)]
    #[test_case(RuleId::MissingStartEvent, Category::Schema, Severity::Warning)]
    fn catalogue_defaults(id: RuleId, category: Category, severity: Severity) {
        let rule = Rule::builtin(id);
        assert_eq!(rule.category, category);
        assert_eq!(rule.severity, severity);
        assert!(rule.enabled);
    }

    #[test]
    fn ids_parse_back() {
        for id in RuleId::ALL {
            assert_eq!(id.as_str().parse::<RuleId>().expect("known id"), id);
        }
        assert!(matches!(
            "no-such-rule".parse::<RuleId>(),
            Err(RuleError::UnknownRule { .. })
        ));
    }

    #[test]
    fn serde_names_match_ids() {
        let json = serde_json::to_string(&RuleId::EventDefinitionPlacement).expect("serialize");
        assert_eq!(json, "\"event-definition-placement\"");
    }

    #[test]
    fn settings_override_rule() {
        let mut rule = Rule::builtin(RuleId::GatewayDirection);
        let setting = RuleSetting {
            severity: Some(Severity::Error),
            priority: Some(1),
            enabled: false,
            labels: vec!["layout".into()],
            ..RuleSetting::new("gateway-direction")
        };
        rule.apply(&setting);

        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.priority, 1);
        assert!(!rule.is_enabled());
        assert_eq!(rule.labels, vec!["layout".to_string()]);
    }

    #[test]
    fn merged_settings_union_attributes() {
        let mut base = RuleSettings {
            disallowed_attributes: Some(vec!["documentation".into()]),
            ..RuleSettings::default()
        };
        base.merge(RuleSettings {
            disallowed_attributes: Some(vec!["documentation".into(), "color".into()]),
            strict_attributes: Some(true),
            ..RuleSettings::default()
        });

        let options = base.options();
        assert_eq!(options.disallowed_attributes, vec!["documentation", "color"]);
        assert!(options.strict_attributes);
        assert!(CheckOptions::default().is_disallowed("description"));
        assert!(!CheckOptions::default().is_disallowed("color"));
    }
}
