//! Prompt templates.

use tandem_core::AgentId;

const QA_PROMPT: &str = "You're a retrieve augmented chatbot. You answer user's questions based on your own \
knowledge and the context provided by the user.
If you can't answer the question with or without the current context, you should reply exactly `UPDATE CONTEXT`.
You must give as short an answer as possible.

User's question is: {input_question}

Context is: {input_context}
";

const CODE_PROMPT: &str = "You're a retrieve augmented coding assistant. You answer user's questions based on \
your own knowledge and the context provided by the user.
If you can't answer the question with or without the current context, you should reply exactly `UPDATE CONTEXT`.
For code generation, you must obey the following rules:
Rule 1. You MUST NOT install any packages because all the packages needed are already installed.
Rule 2. You must follow the formats below to write your code:
```language
# your code
```

User's question is: {input_question}

Context is: {input_context}
";

const DEFAULT_PROMPT: &str = "You're a retrieve augmented chatbot. You answer user's questions based on your own \
knowledge and the context provided by the user. You should follow the following steps to answer a question:
Step 1, you estimate the user's intent based on the question and context. The intent can be a code generation \
task or a question answering task.
Step 2, you reply based on the intent.
If you can't answer the question with or without the current context, you should reply exactly `UPDATE CONTEXT`.
If user's intent is code generation, you must obey the following rules:
Rule 1. You MUST NOT install any packages because all the packages needed are already installed.
Rule 2. You must follow the formats below to write your code:
```language
# your code
```

If user's intent is question answering, you must give as short an answer as possible.

User's question is: {input_question}

Context is: {input_context}
";

/// Which retrieval prompt wraps the passages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalTask {
    Qa,
    Code,
    Default,
}

impl RetrievalTask {
    pub fn parse(task: &str) -> Option<Self> {
        match task {
            "qa" => Some(Self::Qa),
            "code" => Some(Self::Code),
            "default" => Some(Self::Default),
            _ => None,
        }
    }

    /// Render the prompt for a question and its context.
    pub fn render(&self, question: &str, context: &str) -> String {
        let template = match self {
            Self::Qa => QA_PROMPT,
            Self::Code => CODE_PROMPT,
            Self::Default => DEFAULT_PROMPT,
        };
        fill(template, question, context)
    }
}

/// Substitute both placeholders in one pass, so text inside the question
/// or context is never expanded.
fn fill(template: &str, question: &str, context: &str) -> String {
    let mut out = String::with_capacity(template.len() + question.len() + context.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{input_question}") {
            out.push_str(question);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{input_context}") {
            out.push_str(context);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

pub fn feedback_prompt(sender: &AgentId) -> String {
    format!(
        "Please give feedback to {sender}. Press enter or type 'exit' to stop the conversation: "
    )
}

pub fn always_prompt(sender: &AgentId) -> String {
    format!(
        "Provide feedback to {sender}. Press enter to skip and use auto-reply, \
         or type 'exit' to end the conversation: "
    )
}
