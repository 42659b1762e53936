use serde::Serialize;
use serde_json::Value;

/// Extracted values, keyed by capture id. serde_json's `preserve_order`
/// feature keeps insertion order, so keys appear in step execution order and
/// re-captured ids keep their value overwritten in place.
pub type ExtractedValues = serde_json::Map<String, Value>;

/// Where and why a run stopped early.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepFailure {
    pub step_index: usize,
    pub message: String,
}

/// Final structured outcome of one plan execution. Built incrementally by
/// the interpreter and finalized once after the step loop.
///
/// Field order is part of the wire contract: goal, extracted, error — and
/// `error` is omitted entirely (not null) on success, so consumers can do
/// strict structural comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub goal: String,
    pub extracted: ExtractedValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
}

impl ExecutionReport {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            extracted: ExtractedValues::new(),
            error: None,
        }
    }
}

/// Render a report for the caller. Deterministic: the same report value
/// always yields byte-identical output.
pub fn render(report: &ExecutionReport) -> String {
    // Serialize on a derive never fails for this shape.
    serde_json::to_string_pretty(report).expect("report serialization is infallible")
}

/// Substitute `{id}` placeholders in a plan's final_report template with
/// extracted values. An id absent from the mapping formats as an empty
/// string rather than failing the report. `{{` and `}}` escape literal
/// braces.
pub fn format_final_report(template: &str, extracted: &ExtractedValues) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                for k in chars.by_ref() {
                    if k == '}' {
                        break;
                    }
                    key.push(k);
                }
                if let Some(v) = extracted.get(&key) {
                    match v {
                        Value::String(s) => out.push_str(s),
                        other => out.push_str(&other.to_string()),
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_extracted() -> ExtractedValues {
        let mut m = ExtractedValues::new();
        m.insert("name".into(), json!("Sauce Labs Backpack"));
        m.insert("price".into(), json!("$29.99"));
        m
    }

    #[test]
    fn render_is_idempotent() {
        let report = ExecutionReport {
            goal: "G".into(),
            extracted: sample_extracted(),
            error: None,
        };
        assert_eq!(render(&report), render(&report));
    }

    #[test]
    fn error_key_omitted_when_absent() {
        let report = ExecutionReport::new("G");
        let rendered = render(&report);
        assert!(!rendered.contains("\"error\""));
        assert!(rendered.contains("\"goal\""));
        assert!(rendered.contains("\"extracted\""));
    }

    #[test]
    fn error_key_present_on_failure() {
        let mut report = ExecutionReport::new("G");
        report.error = Some(StepFailure {
            step_index: 1,
            message: "timed out".into(),
        });
        let value: Value = serde_json::from_str(&render(&report)).unwrap();
        assert_eq!(value["error"]["step_index"], 1);
        assert_eq!(value["error"]["message"], "timed out");
    }

    #[test]
    fn field_order_is_goal_extracted_error() {
        let mut report = ExecutionReport::new("G");
        report.error = Some(StepFailure {
            step_index: 0,
            message: "x".into(),
        });
        let rendered = render(&report);
        let goal_at = rendered.find("\"goal\"").unwrap();
        let extracted_at = rendered.find("\"extracted\"").unwrap();
        let error_at = rendered.find("\"error\"").unwrap();
        assert!(goal_at < extracted_at && extracted_at < error_at);
    }

    #[test]
    fn extracted_preserves_insertion_order() {
        let report = ExecutionReport {
            goal: "G".into(),
            extracted: sample_extracted(),
            error: None,
        };
        let rendered = render(&report);
        assert!(rendered.find("\"name\"").unwrap() < rendered.find("\"price\"").unwrap());
    }

    #[test]
    fn final_report_substitutes_known_keys() {
        let out = format_final_report("Found {name} at {price}.", &sample_extracted());
        assert_eq!(out, "Found Sauce Labs Backpack at $29.99.");
    }

    #[test]
    fn final_report_missing_key_is_empty_not_a_crash() {
        let out = format_final_report("price={price} stock={stock}!", &sample_extracted());
        assert_eq!(out, "price=$29.99 stock=!");
    }

    #[test]
    fn final_report_escaped_braces() {
        let out = format_final_report("{{literal}} {price}", &sample_extracted());
        assert_eq!(out, "{literal} $29.99");
    }
}
