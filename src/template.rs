use std::collections::HashMap;

/// Prompt template used when the caller supplies none.
pub const DEFAULT_TEMPLATE: &str = "Please provide unit tests for the file {fileName} using {techs}
{instructions}

Please begin your response with ``` and end it with ``` directly.

Here is the file content:
```{content}```";

/// Substituted for `{techs}` when no technology is configured.
pub const SAME_TECHS: &str = "same techs as the file";

const LINE_BREAK: &str = "\r\n";

/// Renders `template`, replacing each `{name}` placeholder with
/// `variables[name]`.
///
/// Names are runs of ASCII letters, digits and underscores. Placeholders
/// without a matching variable render as empty text. Substituted values are
/// not scanned again, so content containing braces is inserted verbatim.
#[must_use]
pub fn render(template: &str, variables: &HashMap<&str, String>) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut pos = 0;

    while let Some(offset) = memchr::memchr(b'{', &bytes[pos..]) {
        let open = pos + offset;
        out.push_str(&template[pos..open]);

        let name_start = open + 1;
        let name_len = bytes[name_start..]
            .iter()
            .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
            .count();
        let close = name_start + name_len;

        if name_len > 0 && bytes.get(close) == Some(&b'}') {
            let name = &template[name_start..close];
            if let Some(value) = variables.get(name) {
                out.push_str(value);
            }
            pos = close + 1;
        } else {
            out.push('{');
            pos = name_start;
        }
    }

    out.push_str(&template[pos..]);
    out
}

/// Inputs for building one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptArgs<'a> {
    /// Source code under test
    pub content: &'a str,
    /// Name of the file under test, as shown to the model
    pub file_name: &'a str,
    /// Technologies, rendered as a numbered list
    pub technologies: &'a [String],
    /// Instructions, one per line
    pub instructions: &'a [String],
    /// Template override
    pub template: Option<&'a str>,
}

impl<'a> PromptArgs<'a> {
    /// Returns a copy describing a different file.
    #[must_use]
    pub const fn for_file(self, content: &'a str, file_name: &'a str) -> Self {
        Self {
            content,
            file_name,
            ..self
        }
    }
}

/// Builds the prompt for one file from its template.
#[must_use]
pub fn build_prompt(args: &PromptArgs<'_>) -> String {
    let techs = if args.technologies.is_empty() {
        SAME_TECHS.to_string()
    } else {
        numbered_list(args.technologies)
    };

    let variables = HashMap::from([
        ("content", args.content.to_string()),
        ("fileName", args.file_name.to_string()),
        ("techs", techs),
        ("instructions", args.instructions.join(LINE_BREAK)),
    ]);

    render(args.template.unwrap_or(DEFAULT_TEMPLATE), &variables)
}

fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join(LINE_BREAK)
}
