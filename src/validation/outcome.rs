//! Rendering validation results as FHIR `OperationOutcome` resources.

use serde_json::{Map, Value, json};

use super::{IssueKind, ValidationIssue, ValidationResult, ValidationSeverity};

impl IssueKind {
    /// The `OperationOutcome.issue.code` (IssueType) reported for this kind of issue.
    pub fn issue_type(&self) -> &'static str {
        match self {
            IssueKind::Cardinality
            | IssueKind::MultipleChoiceValues
            | IssueKind::UnknownElement
            | IssueKind::InvalidChoiceType
            | IssueKind::TypeMismatch => "structure",
            IssueKind::InvalidCode | IssueKind::NonConformantCode => "code-invalid",
            IssueKind::ReferenceTarget => "invalid",
            IssueKind::UnresolvedReference => "not-found",
            IssueKind::PrimitiveFormat => "value",
            IssueKind::DepthLimit => "too-costly",
        }
    }
}

impl ValidationIssue {
    pub fn to_outcome_issue(&self) -> Value {
        let mut issue = Map::new();
        issue.insert("severity".into(), json!(self.severity.as_str()));
        issue.insert("code".into(), json!(self.kind.issue_type()));
        issue.insert("diagnostics".into(), json!(self.message));
        if let Some(path) = &self.path {
            issue.insert("expression".into(), json!([path]));
        }
        Value::Object(issue)
    }
}

impl ValidationResult {
    /// An `OperationOutcome` listing every issue; a clean result yields a single
    /// informational "All OK" issue, since the resource requires at least one.
    pub fn to_operation_outcome(&self) -> Value {
        let issues: Vec<Value> = if self.issues.is_empty() {
            vec![json!({
                "severity": ValidationSeverity::Information.as_str(),
                "code": "informational",
                "diagnostics": "All OK",
            })]
        } else {
            self.issues.iter().map(ValidationIssue::to_outcome_issue).collect()
        };

        json!({
            "resourceType": "OperationOutcome",
            "issue": issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_lists_issues() {
        let result = ValidationResult::from_issues(vec![
            ValidationIssue::error(IssueKind::Cardinality, "Coverage.beneficiary requires 1")
                .with_path("Coverage.beneficiary"),
            ValidationIssue::warning(IssueKind::NonConformantCode, "not in value set"),
        ]);
        let outcome = result.to_operation_outcome();

        assert_eq!(outcome["resourceType"], "OperationOutcome");
        assert_eq!(outcome["issue"].as_array().map(Vec::len), Some(2));
        assert_eq!(outcome["issue"][0]["severity"], "error");
        assert_eq!(outcome["issue"][0]["code"], "structure");
        assert_eq!(outcome["issue"][0]["expression"], json!(["Coverage.beneficiary"]));
        assert_eq!(outcome["issue"][1]["code"], "code-invalid");
        assert!(outcome["issue"][1].get("expression").is_none());
    }

    #[test]
    fn test_clean_outcome() {
        let outcome = ValidationResult::success().to_operation_outcome();
        assert_eq!(outcome["issue"][0]["diagnostics"], "All OK");
        assert_eq!(outcome["issue"][0]["severity"], "information");
    }
}
