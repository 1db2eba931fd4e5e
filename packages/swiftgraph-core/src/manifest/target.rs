//! Target metadata and classification (`spec.md` §4.2).

/// A nested `.Tests(...)` target declared inside a `.Target(...)` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestTargetMetadata {
    pub tests_type: String,
    pub sources: Vec<String>,
    pub dependencies: Vec<String>,
}

/// One `.Target(...)` call inside a `.Module(...)` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TargetMetadata {
    pub name: String,
    pub target_type: String,
    pub sources: Vec<String>,
    pub tests: Vec<TestTargetMetadata>,
    pub product: Option<String>,
}

/// The module-level declaration parsed from one `Project.swift`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectMetadata {
    pub name: String,
    pub targets: Vec<TargetMetadata>,
}

/// Classify a target from its declared name and product (`spec.md` §4.2):
///
/// - product containing "test" → `test`
/// - name ends with "mock" → `mock`
/// - name ends with "IO" / "Interface" / "Interfaces" → `interface`
/// - name ends with "Tests" → `test`
/// - else → `app`
pub fn classify_target(name: &str, product: Option<&str>) -> &'static str {
    let lowered = name.to_lowercase();
    if let Some(product) = product {
        if product.to_lowercase().contains("test") {
            return "test";
        }
    }
    if lowered.ends_with("mock") {
        return "mock";
    }
    if lowered.ends_with("io") || lowered.ends_with("interface") || lowered.ends_with("interfaces")
    {
        return "interface";
    }
    if lowered.ends_with("tests") {
        return "test";
    }
    "app"
}

/// Synthetic target name for a nested test target: `<base><TestsType-Capitalized>Tests`.
pub fn test_target_name(base_name: &str, tests_type: &str) -> String {
    let mut chars = tests_type.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    format!("{base_name}{capitalized}Tests")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_test_wins_first() {
        assert_eq!(classify_target("PresenterMock", Some("unit-test")), "test");
    }

    #[test]
    fn mock_suffix() {
        assert_eq!(classify_target("PresenterMock", None), "mock");
    }

    #[test]
    fn interface_suffixes() {
        assert_eq!(classify_target("NetworkingIO", None), "interface");
        assert_eq!(classify_target("NetworkingInterface", None), "interface");
        assert_eq!(classify_target("NetworkingInterfaces", None), "interface");
    }

    #[test]
    fn tests_suffix() {
        assert_eq!(classify_target("PresenterTests", None), "test");
    }

    #[test]
    fn default_app() {
        assert_eq!(classify_target("Presenter", Some("framework")), "app");
    }

    #[test]
    fn synthetic_test_target_name_capitalizes_tests_type() {
        assert_eq!(test_target_name("Presenter", "unit"), "PresenterUnitTests");
        assert_eq!(test_target_name("Presenter", "ui"), "PresenterUiTests");
    }
}
