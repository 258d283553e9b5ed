use dialoguer::{Confirm, Select};

use crate::error::{HelperError, Result};

/// Presentation layer for the interactive parts of a run.
pub trait Prompter {
    /// Single choice; returns the 0-based index into `items`.
    fn select(&mut self, prompt: &str, items: &[String]) -> Result<usize>;
    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select(&mut self, prompt: &str, items: &[String]) -> Result<usize> {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()
            .map_err(|e| HelperError::Prompt(e.to_string()))
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .map_err(|e| HelperError::Prompt(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;

    use super::*;

    /// Answers from a queue; records every prompt it was asked.
    #[derive(Debug, Default)]
    pub struct ScriptedPrompter {
        selections: VecDeque<usize>,
        confirms: VecDeque<bool>,
        pub asked: Vec<String>,
    }

    impl ScriptedPrompter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn then_select(mut self, index: usize) -> Self {
            self.selections.push_back(index);
            self
        }

        pub fn then_confirm(mut self, answer: bool) -> Self {
            self.confirms.push_back(answer);
            self
        }
    }

    impl Prompter for ScriptedPrompter {
        fn select(&mut self, prompt: &str, _items: &[String]) -> Result<usize> {
            self.asked.push(prompt.to_string());
            self.selections
                .pop_front()
                .ok_or_else(|| HelperError::Prompt(format!("unexpected menu: {prompt}")))
        }

        fn confirm(&mut self, prompt: &str, _default: bool) -> Result<bool> {
            self.asked.push(prompt.to_string());
            self.confirms
                .pop_front()
                .ok_or_else(|| HelperError::Prompt(format!("unexpected prompt: {prompt}")))
        }
    }
}
