//! Prompt construction
//!
//! Every function here is pure: same context in, same [`PromptSpec`] out. That
//! keeps cache keys stable across runs and makes prompts testable without a
//! generation service.

use crate::generation::{GenerationOptions, GenerationRequest, PromptSpec};
use crate::models::ItemDescriptor;
use crate::validators::{CategoryRules, PROFILE_MIN_LENGTHS};

use super::context::StageContext;

pub const GATE_OPERATION: &str = "gate";
pub const RESEARCH_OPERATION: &str = "stage.research";
pub const PROFILE_OPERATION: &str = "stage.profile";
pub const APPLICATION_OPERATION: &str = "stage.application";
pub const FALLBACK_OPERATION: &str = "fallback";

pub const GATE_TEMPERATURE: f32 = 0.1;
pub const STAGE_TEMPERATURE: f32 = 0.3;
pub const FALLBACK_TEMPERATURE: f32 = 0.5;

const SOMMELIER_SYSTEM: &str = "You are a Master Sommelier writing concise, factual wine-list \
    notes. Answer with a single JSON object and nothing else. Never invent awards, scores from \
    named critics, or production figures.";

/// Sub-steps of the deep analysis stage, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Classification,
    DeepMining,
    Narrative,
}

impl AnalysisPhase {
    pub const ALL: [AnalysisPhase; 3] = [
        AnalysisPhase::Classification,
        AnalysisPhase::DeepMining,
        AnalysisPhase::Narrative,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AnalysisPhase::Classification => "classification",
            AnalysisPhase::DeepMining => "deep_mining",
            AnalysisPhase::Narrative => "narrative",
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            AnalysisPhase::Classification => "stage.analysis.classification",
            AnalysisPhase::DeepMining => "stage.analysis.deep_mining",
            AnalysisPhase::Narrative => "stage.analysis.narrative",
        }
    }
}

/// Descriptor block shared by every prompt
pub fn describe_item(descriptor: &ItemDescriptor) -> String {
    let unknown = "unknown";
    let vintage = descriptor
        .vintage
        .map(|v| v.to_string())
        .unwrap_or_else(|| "non-vintage or unknown".to_string());

    format!(
        "Wine: {}\nProducer: {}\nRegion: {}\nCountry: {}\nGrape(s): {}\nCategory: {}\nVintage: {}",
        descriptor.name,
        descriptor.producer.as_deref().unwrap_or(unknown),
        descriptor.region.as_deref().unwrap_or(unknown),
        descriptor.country.as_deref().unwrap_or(unknown),
        descriptor.grape.as_deref().unwrap_or(unknown),
        descriptor.category,
        vintage,
    )
}

fn with_prior(ctx: &StageContext, body: String) -> String {
    if ctx.prior().is_empty() {
        format!("{}\n\n{}", describe_item(&ctx.descriptor), body)
    } else {
        format!(
            "{}\n\nFindings from earlier research (build on these, do not contradict them):\n{}\n\n{}",
            describe_item(&ctx.descriptor),
            ctx.prior_json(),
            body
        )
    }
}

fn spec(operation: &str, prompt: String, temperature: f32) -> PromptSpec {
    PromptSpec {
        request: GenerationRequest::new(operation, SOMMELIER_SYSTEM, prompt),
        options: GenerationOptions::json(temperature),
    }
}

/// Self-assessment asked before any enrichment
pub fn gate_prompt(descriptor: &ItemDescriptor) -> PromptSpec {
    let prompt = format!(
        "{}\n\nBefore describing this wine, assess honestly how much you actually know about \
         this specific bottling.\nReturn JSON with exactly these keys:\n\
         - knowledge_exists: true if you have specific knowledge of this wine\n\
         - confidence: one of \"high\", \"medium\", \"low\", \"none\"\n\
         - hallucination_risk: true if a description would require guessing\n\
         - recommendation: one of \"use_generated\", \"seek_other_sources\", \"insufficient_info\"\n\
         - concerns: short free text, or null",
        describe_item(descriptor)
    );
    spec(GATE_OPERATION, prompt, GATE_TEMPERATURE)
}

/// S1: headline facts
pub fn research_prompt(ctx: &StageContext) -> PromptSpec {
    let body = "Return JSON with keys:\n\
        - rating: integer critic-style score from 85 to 100\n\
        - summary: two sentences a guest can read on a wine list\n\
        - style: short style description (for example \"structured, traditional Nebbiolo\")\n\
        - producer_profile: two or three sentences on the producer"
        .to_string();
    spec(RESEARCH_OPERATION, with_prior(ctx, body), STAGE_TEMPERATURE)
}

/// S2 phase prompt; `ctx` already contains S1 and `phase_fields` the earlier phases
pub fn analysis_phase_prompt(
    ctx: &StageContext,
    phase: AnalysisPhase,
    phase_fields: &serde_json::Map<String, serde_json::Value>,
) -> PromptSpec {
    let keys = match phase {
        AnalysisPhase::Classification => {
            "- style_classification: the wine's style family within its category\n\
             - quality_tier: one of \"entry\", \"premium\", \"fine\", \"icon\""
        }
        AnalysisPhase::DeepMining => {
            "- terroir: vineyard sites, soils and climate in two or three sentences\n\
             - winemaking: fermentation, aging vessels and duration"
        }
        AnalysisPhase::Narrative => {
            "- vintage_character: how the growing season shaped this wine\n\
             - narrative: one paragraph tying producer, place and vintage together"
        }
    };

    let earlier = if phase_fields.is_empty() {
        String::new()
    } else {
        format!(
            "Earlier analysis of this wine:\n{}\n\n",
            serde_json::to_string_pretty(phase_fields).unwrap_or_default()
        )
    };

    let body = format!("{}Return JSON with keys:\n{}", earlier, keys);
    spec(phase.operation(), with_prior(ctx, body), STAGE_TEMPERATURE)
}

/// Tasting-profile field list shared by S3 and the fallback
fn profile_keys(descriptor: &ItemDescriptor) -> String {
    let rules = CategoryRules::for_category(descriptor.category);
    let families = rules
        .flavor_families
        .map(|f| f.join(", "))
        .unwrap_or_else(|| "any descriptive family".to_string());

    let mut keys = String::new();
    for rule in PROFILE_MIN_LENGTHS {
        keys.push_str(&format!("- {}: at least {} characters\n", rule.field, rule.min_chars));
    }
    keys.push_str(&format!(
        "- tannin: description, or null if tannin does not apply to {} wine\n\
         - flavor_families: array chosen only from: {}",
        descriptor.category, families
    ));
    keys
}

/// S3: detailed tasting profile
pub fn profile_prompt(ctx: &StageContext) -> PromptSpec {
    let body = format!("Return JSON with keys:\n{}", profile_keys(&ctx.descriptor));
    spec(PROFILE_OPERATION, with_prior(ctx, body), STAGE_TEMPERATURE)
}

/// S4: service recommendations
pub fn application_prompt(ctx: &StageContext) -> PromptSpec {
    let body = "Return JSON with keys:\n\
        - food_pairings: array of 3 to 6 dishes\n\
        - serving_temperature: range in Celsius and Fahrenheit\n\
        - decanting: recommendation with duration, or \"not needed\"\n\
        - drinking_window: years, for example \"2024-2035\""
        .to_string();
    spec(APPLICATION_OPERATION, with_prior(ctx, body), STAGE_TEMPERATURE)
}

/// Single-call theoretical profile for items the gate rejected
pub fn fallback_prompt(descriptor: &ItemDescriptor) -> PromptSpec {
    let prompt = format!(
        "{}\n\nLittle verified information exists for this wine. Write a plausible profile \
         inferred from its producer, region, grape and category, phrased as typical \
         characteristics rather than tasting facts.\nReturn JSON with keys:\n\
         - rating: integer from 85 to 100\n\
         - summary, style, producer_profile, terroir, vintage_character: short text\n\
         {}\n\
         - food_pairings: array of dishes\n\
         - serving_temperature, decanting, drinking_window: short text",
        describe_item(descriptor),
        profile_keys(descriptor)
    );
    spec(FALLBACK_OPERATION, prompt, FALLBACK_TEMPERATURE)
}
