//! Prompt assembly and output-contract checks shared by the worker backends

use crate::capability::{UnitInputs, WorkerError, WorkerResult};
use rivalscope_core::{contracts, Capability, WorkUnit};
use serde_json::Value;

/// Fields a structured output must carry for each known contract.
pub fn required_fields(contract: &str) -> &'static [&'static str] {
    match contract {
        contracts::RESEARCH_BRIEF => &["summary", "key_facts"],
        contracts::ANALYSIS_FINDINGS => &["findings"],
        contracts::TARGET_REPORT => &["summary", "confidence_score"],
        _ => &[],
    }
}

/// Check a structured output against a contract.
pub fn check_contract(contract: &str, content: &Value) -> WorkerResult<()> {
    let Some(object) = content.as_object() else {
        return Err(WorkerError::contract(contract, "output is not a JSON object"));
    };
    for field in required_fields(contract) {
        if !object.contains_key(*field) {
            return Err(WorkerError::contract(
                contract,
                format!("missing field '{}'", field),
            ));
        }
    }
    if contract == contracts::TARGET_REPORT {
        let score = object.get("confidence_score").and_then(Value::as_f64);
        if !matches!(score, Some(s) if (0.0..=1.0).contains(&s)) {
            return Err(WorkerError::contract(
                contract,
                "confidence_score must be a number between 0 and 1",
            ));
        }
    }
    Ok(())
}

pub fn system_prompt(capability: Capability) -> &'static str {
    match capability {
        Capability::Research => {
            "You are a market researcher. Gather verifiable facts about the named \
             competitor: offering, pricing, positioning, customers, recent moves. \
             Cite where each fact comes from. Do not speculate."
        }
        Capability::Analysis => {
            "You are a strategy analyst. Work only from the research you are given. \
             Be specific about gaps, advantages and risks; say when evidence is thin."
        }
        Capability::Synthesis => {
            "You are a competitive-intelligence lead. Combine the analyses you are \
             given into one assessment of the competitor and state how confident you \
             are in it, from 0 (guesswork) to 1 (well evidenced)."
        }
    }
}

/// User message: task, then dependency outputs in unit-id order, then the contract.
pub fn user_prompt(unit: &WorkUnit, inputs: &UnitInputs) -> String {
    let mut prompt = format!("Target: {}\n\nTask: {}\n", unit.target, unit.description);

    for (id, output) in inputs {
        let rendered = serde_json::to_string_pretty(&output.content).unwrap_or_default();
        prompt.push_str(&format!("\n### {} output:\n{}\n", id, rendered));
    }

    if let Some(contract) = &unit.expected_output {
        let fields = required_fields(contract);
        prompt.push_str(&format!(
            "\nRespond with a single JSON object ({}) containing at least: {}.\n",
            contract,
            fields.join(", ")
        ));
    }
    prompt
}

/// Pull the outermost JSON object out of free text (models like to wrap JSON in prose).
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
