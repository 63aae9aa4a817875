//! Prompt composition for generation calls
//!
//! The system prompt is embedded at compile time. The user prompt is a
//! handlebars template filled from the session request.

use std::sync::LazyLock;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;

use crate::session::SessionRequest;

/// System prompt sent with every generation call
pub const SYSTEM_PROMPT: &str = r#"You are an expert software architect who turns requirements into diagrams.

Given a natural-language requirement, produce exactly one diagram that captures it.

Rules:
- Output a single fenced code block containing only the diagram source.
- Start with the diagram type declaration line (for example `flowchart TD` or `sequenceDiagram`).
- Give every node a short unique identifier and a human-readable label.
- Connect related nodes; never leave a node isolated when more than one exists.
- Do not write prose or markdown outside the code block.
"#;

/// User prompt template (handlebars)
const USER_TEMPLATE: &str = r#"Create a diagram for the following requirement.

Requirement:
{{{requirement}}}
{{#if product_type}}
Product type: {{{product_type}}}
{{/if}}
{{#if implement_type}}
Implementation style: {{{implement_type}}}
{{/if}}
{{#if diagram_type}}
The diagram must be a {{diagram_type}} diagram.
{{else}}
Choose the diagram type that fits the requirement best.
{{/if}}"#;

static HBS: LazyLock<Handlebars<'static>> = LazyLock::new(|| Handlebars::new());

/// Context for rendering the user template
#[derive(Debug, Clone, Serialize)]
struct PromptContext<'a> {
    requirement: &'a str,
    product_type: Option<&'a str>,
    implement_type: Option<&'a str>,
    diagram_type: Option<String>,
}

/// Build the (system, user) prompt pair for a request
pub fn compose(request: &SessionRequest) -> Result<(String, String)> {
    let context = PromptContext {
        requirement: request.requirement.trim(),
        product_type: request.product_type.as_deref(),
        implement_type: request.implement_type.as_deref(),
        diagram_type: request.options.diagram_type.map(|t| t.to_string()),
    };

    let user = HBS
        .render_template(USER_TEMPLATE, &context)
        .map_err(|e| eyre!("Failed to render user prompt: {}", e))?;

    Ok((SYSTEM_PROMPT.to_string(), user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagramscript::types::DiagramType;

    #[test]
    fn test_compose_minimal_request() {
        let request = SessionRequest::new("User login flow");
        let (system, user) = compose(&request).unwrap();

        assert!(system.contains("fenced code block"));
        assert!(user.contains("User login flow"));
        assert!(user.contains("Choose the diagram type"));
        assert!(!user.contains("Product type:"));
    }

    #[test]
    fn test_compose_full_request() {
        let mut request = SessionRequest::new("Order checkout with payment");
        request.product_type = Some("web-app".to_string());
        request.implement_type = Some("microservices".to_string());
        request.options.diagram_type = Some(DiagramType::Sequence);

        let (_, user) = compose(&request).unwrap();
        assert!(user.contains("Product type: web-app"));
        assert!(user.contains("Implementation style: microservices"));
        assert!(user.contains("must be a sequence diagram"));
        assert!(!user.contains("Choose the diagram type"));
    }

    #[test]
    fn test_compose_does_not_escape_requirement() {
        let request = SessionRequest::new("Flow where A -> B & C are \"linked\"");
        let (_, user) = compose(&request).unwrap();
        assert!(user.contains("A -> B & C are \"linked\""));
    }

    #[test]
    fn test_compose_handles_non_ascii() {
        let request = SessionRequest::new("用户登录后查看订单列表");
        let (_, user) = compose(&request).unwrap();
        assert!(user.contains("用户登录后查看订单列表"));
    }
}
