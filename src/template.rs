//! # Prompt templates
//!
//! The wording sent to the chat model lives in a [`PromptTemplate`]: a system
//! prompt plus the pieces the user message is assembled from. The built-in
//! [`Default`] answers questions about the 2022 Winter Olympics; other wording
//! can be dropped into the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! ## YAML example
//!
//! ```yaml
//! system_prompt: "You answer questions about the 2022 Winter Olympics."
//! instructions: "Use the below articles to answer the subsequent question."
//! context_heading: "Wikipedia article section:"
//! question_prefix: "Question: "
//! ```
//!
//! ## Rendering
//!
//! [`PromptTemplate::render`] lays the user message out as the instructions,
//! one `heading + passage` block per match in rank order, then the question:
//!
//! ```rust
//! use olympiq::template::PromptTemplate;
//!
//! let message = PromptTemplate::default().render(["Curling passage"], "Who won?");
//! assert!(message.ends_with("\nQuestion: Who won?"));
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::Path};

/// Wording used to build one chat request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PromptTemplate {
    /// Sent as the system message.
    pub system_prompt: String,

    /// Opening paragraph of the user message.
    pub instructions: String,

    /// Line placed above every retrieved passage.
    pub context_heading: String,

    /// Prepended to the question on the final line.
    pub question_prefix: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prompt: "You answer questions about the 2022 Winter Olympics.".to_string(),
            instructions: "Use the below articles on the 2022 Winter Olympics to answer the \
                           subsequent question. If the answer cannot be found in the articles, \
                           write 'I could not find an answer.'"
                .to_string(),
            context_heading: "Wikipedia article section:".to_string(),
            question_prefix: "Question: ".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Assemble the user message from ranked passages and the question.
    pub fn render<I, S>(&self, passages: I, question: &str) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut message = format!("{}\n", self.instructions);
        for passage in passages {
            message.push_str(&format!(
                "\n\n{}\n{}\n",
                self.context_heading,
                passage.as_ref()
            ));
        }
        message.push('\n');
        message.push_str(&self.question_prefix);
        message.push_str(question);
        message
    }
}

/// Load a template by name from `<config_dir>/templates/<name>.yaml`.
pub async fn load_template(name: &str) -> Result<PromptTemplate, Box<dyn Error>> {
    let path = crate::config_dir()?.join("templates").join(format!("{name}.yaml"));
    load_template_from(&path)
}

/// Load a template from an explicit path. Missing keys take the built-in wording.
pub fn load_template_from(path: &Path) -> Result<PromptTemplate, Box<dyn Error>> {
    tracing::info!("Loading template: {}", path.display());

    let content = fs::read_to_string(path)?;
    let template: PromptTemplate = serde_yaml::from_str(&content)?;
    Ok(template)
}
