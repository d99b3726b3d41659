use crate::protocol::{
    GetPromptResult, PromptDescriptor, PromptMessage, ServerError, ServerResult, ToolContent,
};

struct Prompt {
    name: &'static str,
    description: &'static str,
    text: &'static str,
}

const PROMPTS: &[Prompt] = &[
    Prompt {
        name: "population_data_guidance",
        description: "Which tools answer population questions and how to handle missing years",
        text: include_str!("../prompts/population_data_guidance.md"),
    },
    Prompt {
        name: "hdx_usage_instructions",
        description: "Working with disaggregated HDX data: admin levels, pagination and parameters",
        text: include_str!("../prompts/hdx_usage_instructions.md"),
    },
    Prompt {
        name: "data_coverage_guidance",
        description: "Verifying data coverage with metadata_data_availability_get before querying",
        text: include_str!("../prompts/data_coverage_guidance.md"),
    },
];

pub fn list_prompts() -> Vec<PromptDescriptor> {
    PROMPTS
        .iter()
        .map(|prompt| PromptDescriptor {
            name: prompt.name,
            description: prompt.description,
            arguments: Vec::new(),
        })
        .collect()
}

pub fn get_prompt(name: &str) -> ServerResult<GetPromptResult> {
    let prompt = PROMPTS
        .iter()
        .find(|prompt| prompt.name == name)
        .ok_or_else(|| ServerError::InvalidParams(format!("Unknown prompt: {name}")))?;

    Ok(GetPromptResult {
        description: prompt.description,
        messages: vec![PromptMessage {
            role: "user",
            content: ToolContent::Text {
                text: prompt.text.to_string(),
            },
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_prompts_resolve() {
        let names: Vec<_> = list_prompts().iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            ["population_data_guidance", "hdx_usage_instructions", "data_coverage_guidance"]
        );
        for name in names {
            let prompt = get_prompt(name).unwrap();
            assert_eq!(prompt.messages.len(), 1);
        }
    }

    #[test]
    fn coverage_prompt_points_at_availability_tool() {
        let prompt = get_prompt("data_coverage_guidance").unwrap();
        let ToolContent::Text { text } = &prompt.messages[0].content;
        assert!(text.contains("metadata_data_availability_get"));
    }

    #[test]
    fn unknown_prompt_is_invalid_params() {
        assert!(matches!(
            get_prompt("nope"),
            Err(ServerError::InvalidParams(_))
        ));
    }
}
