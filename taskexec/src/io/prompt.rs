//! Prompt rendering for the edit loop and single completions.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::Message;

const EDIT_TEMPLATE: &str = include_str!("prompts/edit.md");
const COMPLETION_TEMPLATE: &str = include_str!("prompts/completion.md");

/// A target file as shown to the model.
#[derive(Debug, Clone, Serialize)]
pub struct PromptFile {
    pub path: String,
    pub content: String,
    pub exists: bool,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("edit", EDIT_TEMPLATE)
            .expect("edit template should be valid");
        env.add_template("completion", COMPLETION_TEMPLATE)
            .expect("completion template should be valid");
        Self { env }
    }

    /// Prompt for one edit-loop iteration.
    ///
    /// `failure` carries the previous iteration's test output, already truncated.
    pub fn render_edit(&self, task: &str, files: &[PromptFile], failure: Option<&str>) -> Result<String> {
        let template = self.env.get_template("edit")?;
        let rendered = template.render(context! {
            task => task.trim(),
            files => files,
            failure => failure.map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered)
    }

    /// Prompt for a single completion: conversation tail, context, then the task.
    pub fn render_completion(&self, task: &str, context_block: &str, conversation: &[Message]) -> Result<String> {
        let template = self.env.get_template("completion")?;
        let rendered = template.render(context! {
            conversation => conversation,
            context => (!context_block.trim().is_empty()).then(|| context_block.trim()),
            task => task.trim(),
        })?;
        Ok(rendered.trim_start().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_prompt_lists_files_and_failure() {
        let engine = PromptEngine::new();
        let files = vec![
            PromptFile {
                path: "calc.py".to_string(),
                content: "return a - b".to_string(),
                exists: true,
            },
            PromptFile {
                path: "new.py".to_string(),
                content: String::new(),
                exists: false,
            },
        ];

        let first = engine.render_edit("fix add", &files, None).expect("render");
        assert!(first.contains("### calc.py"));
        assert!(first.contains("return a - b"));
        assert!(first.contains("does not exist yet"));
        assert!(!first.contains("Previous attempt failed"));

        let second = engine
            .render_edit("fix add", &files, Some("AssertionError: 1 != 3"))
            .expect("render");
        assert!(second.contains("Previous attempt failed"));
        assert!(second.contains("AssertionError: 1 != 3"));
    }

    #[test]
    fn completion_prompt_orders_sections() {
        let engine = PromptEngine::new();
        let conversation = vec![Message::user("hi"), Message::assistant("hello")];
        let prompt = engine
            .render_completion("what is 6*7", "### notes.md\n```\nx\n```", &conversation)
            .expect("render");

        let convo_at = prompt.find("[user] hi").expect("conversation");
        let context_at = prompt.find("## Context").expect("context");
        let task_at = prompt.find("what is 6*7").expect("task");
        assert!(convo_at < context_at && context_at < task_at);
    }

    #[test]
    fn completion_prompt_omits_empty_sections() {
        let engine = PromptEngine::new();
        let prompt = engine.render_completion("just this", "  ", &[]).expect("render");
        assert!(prompt.starts_with("## Task"));
        assert!(!prompt.contains("## Context"));
    }
}
