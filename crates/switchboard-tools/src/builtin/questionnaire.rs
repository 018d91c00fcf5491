use futures::future::BoxFuture;
use serde::Deserialize;

use switchboard_core::error::{Result, SwitchboardError};
use switchboard_core::traits::Tool;
use switchboard_core::types::{ToolContext, ToolResult};

use super::parse_input;

const QUESTION_BANK: &[(&str, &[&str])] = &[
    (
        "Insurance History",
        &[
            "Do you currently have any business insurance policies?",
            "What types of insurance coverage do you currently have?",
            "Have you ever had a business insurance claim? If so, what was the nature of the claim?",
            "When was the last time you reviewed or updated your insurance policies?",
            "Have you ever had an insurance policy canceled or non-renewed?",
        ],
    ),
    (
        "Business Operations",
        &[
            "What are your business hours?",
            "Do you have any vehicles used for business purposes?",
            "Does your business own or lease its premises?",
            "Do you store any hazardous materials on-site?",
            "Do you offer any warranties or guarantees on your products/services?",
            "Do you subcontract work to other businesses?",
            "Are there any seasonal variations in your business operations?",
            "Do you have a written safety policy?",
            "What is the average tenure of your employees?",
            "Do you provide any professional services or advice?",
        ],
    ),
    (
        "Property and Assets",
        &[
            "What is the total value of your business property and assets?",
            "Do you own any specialized equipment or tools?",
            "Do you have security systems in place at your business location?",
            "Is your property located in a flood or earthquake-prone area?",
            "What measures do you have in place to protect your assets from theft or damage?",
        ],
    ),
];

pub struct GetQuestionnaireTool;

#[derive(Deserialize)]
struct QuestionnaireInput {
    #[serde(default)]
    categories: Vec<String>,
}

/// Render the bank, keeping the global numbering when filtering by category.
pub(crate) fn render(categories: &[String]) -> Result<String> {
    let wanted: Vec<String> = categories.iter().map(|c| c.trim().to_lowercase()).collect();
    let mut out = Vec::new();
    let mut number = 0;
    for (category, questions) in QUESTION_BANK {
        let selected = wanted.is_empty() || wanted.iter().any(|w| *w == category.to_lowercase());
        if !selected {
            number += questions.len();
            continue;
        }
        out.push(format!("{}:", category));
        for q in questions.iter() {
            number += 1;
            out.push(format!("{}. {}", number, q));
        }
    }
    if out.is_empty() {
        let known: Vec<&str> = QUESTION_BANK.iter().map(|(c, _)| *c).collect();
        return Err(SwitchboardError::ToolValidation(format!(
            "unknown categories {:?}; expected any of {:?}",
            categories, known
        )));
    }
    Ok(out.join("\n"))
}

impl Tool for GetQuestionnaireTool {
    fn name(&self) -> &str {
        "get_questionnaire"
    }
    fn description(&self) -> &str {
        "Retrieve the business insurance questionnaire. Optionally restrict it to categories: \
         Insurance History, Business Operations, Property and Assets."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "categories": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Categories to include (default: all)"
                }
            }
        })
    }
    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: QuestionnaireInput = parse_input(input)?;
            Ok(ToolResult::success(render(&p.categories)?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_bank_has_twenty_questions() {
        let text = render(&[]).unwrap();
        assert!(text.starts_with("Insurance History:\n1. "));
        assert!(text.contains("\n20. What measures"));
    }

    #[test]
    fn filter_keeps_numbering() {
        let text = render(&["property and assets".into()]).unwrap();
        assert!(text.starts_with("Property and Assets:\n16. "));
        assert!(!text.contains("Insurance History"));
    }

    #[test]
    fn unknown_category_is_error() {
        assert!(render(&["Cyber".into()]).is_err());
    }
}
