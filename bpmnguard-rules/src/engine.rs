use std::path::Path;

use bpmnguard_core::CoreConfig;
use bpmnguard_model::{ModelIndex, ProcessModel};
use tracing::debug;

use crate::checks::{self, CheckContext};
use crate::error::RuleError;
use crate::loader::load_settings;
use crate::outcome::ValidationReport;
use crate::rule::{CheckOptions, Rule, RuleId, RuleSettings};
use crate::violation::Violation;

/// Runtime executor that checks process models against a set of rules.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    options: CheckOptions,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleEngine {
    /// Construct an engine from the provided rules, sorting them by priority
    /// and then by id.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Self {
            rules,
            options: CheckOptions::default(),
        }
    }

    /// Every built-in rule with its default settings.
    pub fn builtin() -> Self {
        Self::new(Rule::catalogue())
    }

    /// The built-in catalogue with `settings` applied on top.
    pub fn with_settings(settings: &RuleSettings) -> Result<Self, RuleError> {
        let mut rules = Rule::catalogue();
        for setting in &settings.rules {
            let id: RuleId = setting.id.parse()?;
            if let Some(rule) = rules.iter_mut().find(|rule| rule.id == id) {
                rule.apply(setting);
            }
        }
        Ok(Self::new(rules).with_options(settings.options()))
    }

    /// Loads rule settings from the given path (file or directory).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let settings = load_settings(path)?;
        Self::with_settings(&settings)
    }

    /// Uses the configured rule settings path, or the built-in defaults.
    pub fn from_config(config: &CoreConfig) -> Result<Self, RuleError> {
        match config.rules_path() {
            Some(path) => Self::from_path(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    /// Reports every attribute the model does not interpret.
    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict_attributes = strict;
        self
    }

    /// Borrow the underlying rule set, in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// Whether the engine contains no enabled rules.
    pub fn is_empty(&self) -> bool {
        !self.rules.iter().any(Rule::is_enabled)
    }

    /// Check a model against every enabled rule.
    pub fn validate(&self, model: &ProcessModel) -> ValidationReport {
        let index = ModelIndex::new(model);
        let ctx = CheckContext {
            model,
            index: &index,
            options: &self.options,
        };
        let mut report = ValidationReport::new(model.id.clone());

        for rule in &self.rules {
            if !rule.is_enabled() {
                continue;
            }

            report.record_rule(rule.id);
            for finding in checks::run(rule.id, &ctx) {
                debug!(
                    rule_id = %rule.id,
                    element_id = %finding.element_id,
                    "rule matched element"
                );
                report.push(Violation {
                    rule_id: rule.id,
                    element_id: finding.element_id,
                    scope: finding.scope,
                    severity: rule.severity,
                    category: finding.category.unwrap_or(rule.category),
                    message: finding.message,
                });
            }
        }

        debug!(
            process_id = %model.id,
            violations = report.violations.len(),
            verdict = %report.verdict,
            "validated process"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Verdict;
    use crate::rule::RuleSetting;
    use crate::violation::{Category, Severity};
    use bpmnguard_model::{
        BoundaryEvent, ElementKind, EventDefinition, EventDefinitionKind, FlowElement, GatewayKind,
        Scope, SequenceFlow, SignalDefinition,
    };
    use test_case::test_case;

    fn base() -> ProcessModel {
        ProcessModel::new("Process_1")
            .with_element(FlowElement::new("start", ElementKind::StartEvent))
            .with_element(FlowElement::task("work"))
            .with_element(FlowElement::new("end", ElementKind::EndEvent))
            .with_flow(SequenceFlow::new("f1", "start", "work"))
            .with_flow(SequenceFlow::new("f2", "work", "end"))
    }

    fn rule_ids(report: &ValidationReport) -> Vec<RuleId> {
        report.violations.iter().map(|v| v.rule_id).collect()
    }

    #[test]
    fn clean_model_is_valid() {
        let report = RuleEngine::builtin().validate(&base());
        assert!(report.is_empty(), "{:?}", report.violations);
        assert_eq!(report.verdict, Verdict::Valid);
        assert_eq!(report.applied_rules.len(), RuleId::ALL.len());
    }

    #[test]
    fn flags_condition_on_parallel_gateway() {
        let model = ProcessModel::new("P")
            .with_element(FlowElement::new("start", ElementKind::StartEvent))
            .with_element(FlowElement::gateway("fork", GatewayKind::Parallel))
            .with_element(FlowElement::new("end", ElementKind::EndEvent))
            .with_flow(SequenceFlow::new("f1", "start", "fork"))
            .with_flow(SequenceFlow::new("f2", "fork", "end").with_condition("${x}"));

        let report = RuleEngine::builtin().validate(&model);
        assert_eq!(rule_ids(&report), vec![RuleId::GatewayCondition]);
        assert_eq!(report.violations[0].element_id, "f2");
        assert_eq!(report.violations[0].category, Category::Semantic);
        assert_eq!(report.verdict, Verdict::Repairable);
    }

    #[test]
    fn flags_definition_on_task() {
        let mut model = base();
        model.body.elements[1]
            .event_definitions
            .push(EventDefinition::new(EventDefinitionKind::Timer));

        let report = RuleEngine::builtin().validate(&model);
        assert_eq!(rule_ids(&report), vec![RuleId::EventDefinitionPlacement]);
    }

    #[test]
    fn boundary_attachment_category_depends_on_target() {
        let model = base()
            .with_element(
                FlowElement::boundary("b1", "nowhere")
                    .with_definition(EventDefinition::new(EventDefinitionKind::Timer)),
            )
            .with_element(
                FlowElement::boundary("b2", "end")
                    .with_definition(EventDefinition::new(EventDefinitionKind::Timer)),
            );

        let report = RuleEngine::builtin().validate(&model);
        let categories: Vec<(String, Category)> = report
            .violations
            .iter()
            .filter(|v| v.rule_id == RuleId::BoundaryAttachment)
            .map(|v| (v.element_id.clone(), v.category))
            .collect();
        assert_eq!(
            categories,
            vec![
                ("b1".to_string(), Category::Reference),
                ("b2".to_string(), Category::Semantic)
            ]
        );
    }

    #[test]
    fn schema_violations_make_the_model_invalid() {
        let mut model = base();
        model.body.flows[0].target_ref = None;
        model.body.elements.push(FlowElement::task("work"));

        let report = RuleEngine::builtin().validate(&model);
        assert_eq!(
            rule_ids(&report),
            vec![RuleId::DuplicateId, RuleId::MissingFlowRef]
        );
        assert_eq!(report.verdict, Verdict::Invalid);
    }

    #[test]
    fn signals_are_checked_against_root_declarations() {
        let model = base()
            .with_signal(SignalDefinition::new("Signal_unused"))
            .with_element(
                FlowElement::new("catch", ElementKind::IntermediateEvent { throwing: false })
                    .with_definition(EventDefinition::signal("Signal_missing")),
            );

        let report = RuleEngine::builtin().validate(&model);
        assert_eq!(
            rule_ids(&report),
            vec![RuleId::SignalReference, RuleId::UnusedSignal]
        );
        assert_eq!(report.count(Severity::Info), 1);
    }

    #[test]
    fn nested_flows_must_stay_in_scope() {
        let inner = Scope::new()
            .with_element(FlowElement::new("inner_start", ElementKind::StartEvent))
            .with_flow(SequenceFlow::new("leak", "inner_start", "end"));
        let model = base().with_element(FlowElement::sub_process("sub", inner));

        let report = RuleEngine::builtin().validate(&model);
        assert_eq!(rule_ids(&report), vec![RuleId::CrossScopeFlow]);
        assert_eq!(report.violations[0].scope, vec!["sub".to_string()]);
    }

    #[test_case(None, false, 1 ; "missing flag")]
    #[test_case(Some(false), false, 0 ; "non interrupting timer")]
    #[test_case(Some(false), true, 1 ; "non interrupting error")]
    #[test_case(Some(true), true, 0 ; "interrupting error")]
    fn cancel_flag_rules(cancel: Option<bool>, error: bool, expected: usize) {
        let kind = if error {
            EventDefinitionKind::Error
        } else {
            EventDefinitionKind::Timer
        };
        let boundary = FlowElement::new(
            "b",
            ElementKind::BoundaryEvent(BoundaryEvent {
                attached_to_ref: Some("work".into()),
                cancel_activity: cancel,
            }),
        )
        .with_definition(EventDefinition::new(kind));
        let report = RuleEngine::builtin().validate(&base().with_element(boundary));

        let found = report
            .violations
            .iter()
            .filter(|v| v.rule_id == RuleId::BoundaryCancelFlag)
            .count();
        assert_eq!(found, expected);
    }

    #[test]
    fn settings_disable_and_override_rules() {
        let settings = RuleSettings {
            rules: vec![
                RuleSetting {
                    enabled: false,
                    ..RuleSetting::new("missing-end-event")
                },
                RuleSetting {
                    severity: Some(Severity::Error),
                    priority: Some(1),
                    ..RuleSetting::new("disallowed-attribute")
                },
            ],
            disallowed_attributes: Some(vec!["color".into()]),
            strict_attributes: None,
        };
        let engine = RuleEngine::with_settings(&settings).expect("engine");
        assert_eq!(engine.rules()[0].id, RuleId::DisallowedAttribute);

        let mut model = base();
        model.body.elements.pop();
        model.body.flows.pop();
        model.body.elements[1] = FlowElement::task("work")
            .with_attribute("color", "red")
            .with_attribute("documentation", "kept");

        let report = engine.validate(&model);
        assert_eq!(rule_ids(&report), vec![RuleId::DisallowedAttribute]);
        assert_eq!(report.violations[0].severity, Severity::Error);
    }

    #[test]
    fn strict_mode_reports_every_extra_attribute() {
        let mut model = base();
        model.body.elements[1] = FlowElement::task("work").with_attribute("color", "red");

        assert!(RuleEngine::builtin().validate(&model).is_empty());
        let report = RuleEngine::builtin().strict(true).validate(&model);
        assert_eq!(rule_ids(&report), vec![RuleId::DisallowedAttribute]);
    }

    #[test]
    fn output_is_deterministic() {
        let mut model = base()
            .with_signal(SignalDefinition::new("s"))
            .with_flow(SequenceFlow::new("f3", "work", "ghost").with_condition("x"));
        model.body.elements[0]
            .extra
            .insert("documentation".into(), "doc".into());

        let engine = RuleEngine::builtin();
        assert_eq!(engine.validate(&model), engine.validate(&model.clone()));
    }
}
