//! Prompt construction for code analysis.

/// Example of the JSON structure the model must return.
const RESPONSE_SCHEMA: &str = r#"{
  "analysis": {
    "summary": "Brief summary of what this code does and overall quality assessment",
    "strengths": ["specific strength 1", "specific strength 2", "specific strength 3"],
    "improvements": ["specific improvement 1", "specific improvement 2", "specific improvement 3"],
    "categories": {
      "performance": {"score": 7, "issues": 1, "suggestions": 2},
      "security": {"score": 8, "issues": 0, "suggestions": 1},
      "maintainability": {"score": 6, "issues": 2, "suggestions": 2},
      "style": {"score": 9, "issues": 0, "suggestions": 1}
    }
  },
  "metrics": {
    "score": 85,
    "complexity": 3.2,
    "maintainability_index": 75.5,
    "cyclomatic_complexity": 5,
    "cognitive_complexity": 8,
    "duplicated_lines": 0,
    "test_coverage": 0.0
  },
  "issues": [
    {
      "type": "performance",
      "severity": "medium",
      "line": 10,
      "column": 5,
      "title": "Inefficient algorithm detected",
      "message": "The current implementation uses a nested loop which results in O(n^2) complexity.",
      "suggestion": "Use a hash set for O(1) lookups instead of nested iteration",
      "code_snippet": "for i in items:\n    for j in other_items:\n        if i == j:",
      "fixed_code": "item_set = set(items)\nfor j in other_items:\n    if j in item_set:"
    }
  ]
}"#;

/// Build the analysis prompt for a piece of source code.
pub fn build_analysis_prompt(language: &str, code: &str) -> String {
    format!(
        r#"Analyze the following {language} code and provide a structured analysis.

## Code to Analyze

```{language}
{code}
```

## Instructions

- Return ONLY a valid JSON object with NO explanatory text
- Do NOT wrap the JSON in markdown code fences
- Ensure the JSON is properly formed with no syntax errors

## Required JSON Structure

{schema}

## Requirements

- Provide 2-3 specific, actionable issues in the "issues" array
- Issues must relate to actual problems in the code, with realistic line numbers
- Include code snippets and suggested fixes when possible

## Guidelines

- "score" is 0-100 based on overall code quality
- "complexity" is 1-10 (1 = simple, 10 = very complex)
- "maintainability_index" is 0-100 (higher is better)
- Category scores are 0-10
- "severity" is one of: "high", "medium", "low"
- "type" is one of: "performance", "security", "maintainability", "style", "bug", "logic"
"#,
        language = language,
        code = code,
        schema = RESPONSE_SCHEMA,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_code_and_language() {
        let prompt = build_analysis_prompt("rust", "fn main() {}");
        assert!(prompt.contains("```rust\nfn main() {}\n```"));
        assert!(prompt.contains("Analyze the following rust code"));
    }

    #[test]
    fn prompt_requests_schema() {
        let prompt = build_analysis_prompt("python", "pass");
        for key in ["\"analysis\"", "\"metrics\"", "\"issues\"", "maintainability_index"] {
            assert!(prompt.contains(key), "missing {}", key);
        }
    }

    #[test]
    fn schema_example_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(RESPONSE_SCHEMA).unwrap();
        assert!(value["analysis"]["categories"].is_object());
    }
}
