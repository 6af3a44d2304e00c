use super::types::{TestFile, TestFileInput};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Parse a YAML test file
pub fn parse_test_file(path: &Path) -> Result<TestFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_yaml_content(&content)
        .with_context(|| format!("Failed to parse test file: {}", path.display()))
}

/// Parse YAML content into a TestFile. Accepts either a mapping with a
/// `tests` list or a bare list of cases.
pub fn parse_yaml_content(content: &str) -> Result<TestFile> {
    if content.trim().is_empty() {
        return Ok(TestFileInput::Cases(Vec::new()).into_inner());
    }

    let input: TestFileInput = serde_yaml::from_str(content)?;
    let file = input.into_inner();

    let mut seen = HashSet::new();
    for case in &file.tests {
        if case.name.trim().is_empty() {
            anyhow::bail!("Test case with empty name");
        }
        if !seen.insert(case.name.as_str()) {
            anyhow::bail!("Duplicate test case name: {}", case.name);
        }
        case.request
            .method
            .parse::<reqwest::Method>()
            .map_err(|_| anyhow::anyhow!("Invalid HTTP method: {}", case.request.method))?;
    }

    Ok(file)
}
