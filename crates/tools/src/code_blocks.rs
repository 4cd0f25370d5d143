//! Fenced code block extraction.

use std::sync::LazyLock;

use regex_lite::Regex;
use tandem_core::execution::CodeBlock;

static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([\w+-]+)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```")
        .expect("code block pattern is valid")
});

/// Leading words that mark an untagged block as a shell script.
const SHELL_PREFIXES: &[&str] = &[
    "python ", "python3 ", "pip ", "pip3 ", "sh ", "bash ", "ls", "cd ", "echo ", "mkdir ",
    "cat ", "export ", "apt ", "apt-get ", "brew ",
];

/// Every fenced code block in `text`, in order.
///
/// Blocks without a language tag get one inferred from their content.
/// Text without fences yields no blocks.
pub fn extract_code(text: &str) -> Vec<CodeBlock> {
    CODE_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let code = caps.get(2)?.as_str();
            let language = match caps.get(1) {
                Some(tag) => tag.as_str().to_ascii_lowercase(),
                None => infer_language(code).to_string(),
            };
            Some(CodeBlock::new(language, code))
        })
        .collect()
}

/// Guess the language of an untagged block.
pub fn infer_language(code: &str) -> &'static str {
    let trimmed = code.trim_start();
    if trimmed.starts_with("#!/bin/sh") || trimmed.starts_with("#!/bin/bash") {
        return "sh";
    }
    if SHELL_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        "sh"
    } else {
        "python"
    }
}

/// The file name requested by a leading `# filename: <name>` comment.
pub fn requested_filename(code: &str) -> Option<&str> {
    let first_line = code.lines().next()?.trim();
    let rest = first_line.strip_prefix('#')?.trim_start();
    let name = rest.strip_prefix("filename:")?.trim();
    (!name.is_empty()).then_some(name)
}
