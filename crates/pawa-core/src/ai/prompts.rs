//! Fixed request templates for the editor code actions.

fn fenced(code: &str, language: &str) -> String {
    format!("```{language}\n{code}\n```")
}

pub fn generate_code(description: &str, language: &str) -> String {
    format!("Generate {language} code for: {description}")
}

pub fn refactor_code(code: &str, language: &str) -> String {
    format!(
        "Refactor this {language} code to improve readability and performance:\n\n{}",
        fenced(code, language)
    )
}

pub fn fix_bug(code: &str, language: &str, bug_description: Option<&str>) -> String {
    match bug_description.filter(|d| !d.trim().is_empty()) {
        Some(description) => format!(
            "Fix this bug in {language} code: {description}\n\n{}",
            fenced(code, language)
        ),
        None => format!(
            "Find and fix bugs in this {language} code:\n\n{}",
            fenced(code, language)
        ),
    }
}

pub fn add_comments(code: &str, language: &str) -> String {
    format!(
        "Add clear, helpful comments to this {language} code:\n\n{}",
        fenced(code, language)
    )
}

pub fn generate_tests(code: &str, language: &str, test_framework: Option<&str>) -> String {
    let framework = test_framework.unwrap_or_else(|| detect_test_framework(language));
    format!(
        "Generate {framework} unit tests for this {language} code:\n\n{}",
        fenced(code, language)
    )
}

/// Message posted to the chat panel when explaining a selection.
pub fn explain_in_chat(code: &str, language: &str) -> String {
    format!("Explain this code:\n{}", fenced(code, language))
}

pub fn detect_test_framework(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "typescript" | "javascript" => "Jest",
        "python" => "pytest",
        "java" => "JUnit",
        "csharp" => "xUnit",
        "go" => "testing",
        "rust" => "built-in test",
        "ruby" => "RSpec",
        "php" => "PHPUnit",
        _ => "appropriate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_bug_with_and_without_description() {
        assert!(fix_bug("f()", "rust", Some("panics on empty input"))
            .starts_with("Fix this bug in rust code: panics on empty input\n\n```rust"));
        assert!(fix_bug("f()", "rust", Some("  ")).starts_with("Find and fix bugs in this rust code:"));
        assert!(fix_bug("f()", "rust", None).starts_with("Find and fix bugs"));
    }

    #[test]
    fn test_framework_detection() {
        assert_eq!(detect_test_framework("TypeScript"), "Jest");
        assert_eq!(detect_test_framework("rust"), "built-in test");
        assert_eq!(detect_test_framework("cobol"), "appropriate");
        assert!(generate_tests("def f(): pass", "python", None).starts_with("Generate pytest unit tests"));
    }
}
