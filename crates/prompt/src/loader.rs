//! Prompt loader for built-in and workspace YAML prompt definitions.

use crate::types::{PromptDefinition, PromptOrigin};
use shelf_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Identifier of the question-rewriting prompt.
pub const REWRITE_PROMPT_ID: &str = "shelf.rewrite";

/// Identifier of the relevance-scoring prompt.
pub const RERANK_PROMPT_ID: &str = "shelf.rerank";

/// Identifier of the answer prompt.
pub const ANSWER_PROMPT_ID: &str = "shelf.answer";

const BUILTIN_PROMPTS: [(&str, &str); 3] = [
    (
        REWRITE_PROMPT_ID,
        include_str!("../prompts/shelf.rewrite.yml"),
    ),
    (RERANK_PROMPT_ID, include_str!("../prompts/shelf.rerank.yml")),
    (ANSWER_PROMPT_ID, include_str!("../prompts/shelf.answer.yml")),
];

/// Directory holding workspace prompt overrides.
pub fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".shelf").join("prompts")
}

/// Load a prompt definition by ID.
///
/// A file named `<id>.yml` in `.shelf/prompts/` overrides the built-in
/// definition of the same ID.
///
/// # Example
/// ```no_run
/// use shelf_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "shelf.answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        let definition = parse_prompt(&contents, &format!("{:?}", prompt_file))?;
        tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);
        return Ok(definition);
    }

    load_builtin(prompt_id)
}

/// Load a built-in prompt definition.
pub fn load_builtin(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// List all available prompt IDs with their origin.
///
/// Workspace overrides shadow built-ins of the same ID.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<(String, PromptOrigin)>> {
    let mut prompts: Vec<(String, PromptOrigin)> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| (id.to_string(), PromptOrigin::Builtin))
        .collect();

    let dir = prompts_dir(workspace_path);
    if !dir.exists() {
        return Ok(prompts);
    }

    for entry in walkdir::WalkDir::new(&dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                match prompts.iter_mut().find(|(id, _)| id == stem) {
                    Some(existing) => existing.1 = PromptOrigin::Workspace,
                    None => prompts.push((stem.to_string(), PromptOrigin::Workspace)),
                }
            }
        }
    }

    prompts.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(prompts)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_override(dir: &Path, id: &str, valid: bool) {
        let prompts = prompts_dir(dir);
        fs::create_dir_all(&prompts).unwrap();

        let content = if valid {
            format!(
                r#"
id: {}
title: "Override"
apiVersion: "1.0"
behavior:
  tone: neutral
  style: terse
template: "Custom: {{{{question}}}}"
output:
  format: text
"#,
                id
            )
        } else {
            "invalid: yaml: content:".to_string()
        };

        fs::write(prompts.join(format!("{}.yml", id)), content).unwrap();
    }

    #[test]
    fn test_builtins_parse() {
        for id in [REWRITE_PROMPT_ID, RERANK_PROMPT_ID, ANSWER_PROMPT_ID] {
            let def = load_builtin(id).unwrap();
            assert_eq!(def.id, id);
        }
    }

    #[test]
    fn test_load_falls_back_to_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = load_prompt(temp_dir.path(), ANSWER_PROMPT_ID).unwrap();
        assert_eq!(prompt.title, "Book companion answer");
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), RERANK_PROMPT_ID, true);

        let prompt = load_prompt(temp_dir.path(), RERANK_PROMPT_ID).unwrap();
        assert_eq!(prompt.title, "Override");
    }

    #[test]
    fn test_load_unknown_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "shelf.answer", false);
        assert!(load_prompt(temp_dir.path(), "shelf.answer").is_err());
    }

    #[test]
    fn test_list_prompts_marks_overrides() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), REWRITE_PROMPT_ID, true);
        write_override(temp_dir.path(), "custom.extra", true);

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts.len(), 4);
        assert!(prompts.contains(&(REWRITE_PROMPT_ID.to_string(), PromptOrigin::Workspace)));
        assert!(prompts.contains(&(ANSWER_PROMPT_ID.to_string(), PromptOrigin::Builtin)));
        assert!(prompts.contains(&("custom.extra".to_string(), PromptOrigin::Workspace)));
    }
}
