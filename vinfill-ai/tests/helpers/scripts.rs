//! Scripted model replies
//!
//! Replies are valid for a red wine: the profile lists red families and a
//! tannin description, and every text field clears its minimum length.

use serde_json::{json, Value};
use vinfill_ai::generation::ScriptedGenerationClient;
use vinfill_ai::models::{ItemDescriptor, WineCategory};
use vinfill_ai::workflow::prompts::{
    AnalysisPhase, APPLICATION_OPERATION, FALLBACK_OPERATION, GATE_OPERATION, PROFILE_OPERATION,
    RESEARCH_OPERATION,
};

/// Well-documented red wine; `name` keeps prompts (and cache keys) distinct
pub fn descriptor(name: &str) -> ItemDescriptor {
    ItemDescriptor::new(name, WineCategory::Red)
        .with_producer("Giacomo Brezza")
        .with_region("Piedmont")
        .with_country("Italy")
        .with_grape("Nebbiolo")
        .with_vintage(2016)
}

pub fn gate_reply(confidence: &str, hallucination_risk: bool) -> Value {
    json!({
        "knowledge_exists": confidence != "none",
        "confidence": confidence,
        "hallucination_risk": hallucination_risk,
        "recommendation": if confidence == "high" { "use_generated" } else { "seek_other_sources" },
        "concerns": null
    })
}

pub fn high_confidence() -> Value {
    gate_reply("high", false)
}

pub fn low_confidence() -> Value {
    gate_reply("low", false)
}

pub fn research_reply() -> Value {
    json!({
        "rating": 94,
        "summary": "A classic, age-worthy Barolo from the Cannubi hill.",
        "style": "Traditional Barolo",
        "producer_profile": "Family estate in the village of Barolo since 1885."
    })
}

pub fn red_profile() -> Value {
    json!({
        "appearance": "Pale garnet with an orange rim",
        "aroma": "Dried rose, sour cherry, tar and a hint of licorice",
        "palate": "Firm and savory with red cherry, leather and fine grip",
        "finish": "Long and gently drying",
        "body": "Full",
        "acidity": "High",
        "tannin": "Firm, fine-grained",
        "flavor_families": ["red fruit", "floral", "earth"]
    })
}

pub fn application_reply() -> Value {
    json!({
        "food_pairings": ["braised beef", "truffle risotto"],
        "serving_temperature": "16-18 C",
        "decanting": "Two hours",
        "drinking_window": "2024-2040"
    })
}

pub fn fallback_reply() -> Value {
    let mut reply = research_reply();
    let object = reply.as_object_mut().expect("object");
    object.insert("rating".to_string(), json!(88));
    object.extend(red_profile().as_object().expect("object").clone());
    object.extend(application_reply().as_object().expect("object").clone());
    reply
}

/// Client with a valid default reply for every operation
pub fn full_script(gate: Value) -> ScriptedGenerationClient {
    let mut client = ScriptedGenerationClient::new()
        .respond(GATE_OPERATION, gate)
        .respond(RESEARCH_OPERATION, research_reply())
        .respond(PROFILE_OPERATION, red_profile())
        .respond(APPLICATION_OPERATION, application_reply())
        .respond(FALLBACK_OPERATION, fallback_reply());

    for phase in AnalysisPhase::ALL {
        let reply = match phase {
            AnalysisPhase::Classification => json!({
                "style_classification": "Traditional, long-macerated",
                "quality_tier": "benchmark"
            }),
            AnalysisPhase::DeepMining => json!({
                "terroir": "Calcareous marl on a south-facing amphitheatre",
                "winemaking": "Long maceration, large Slavonian oak casks"
            }),
            AnalysisPhase::Narrative => json!({
                "vintage_character": "Cool, long season with excellent acidity",
                "narrative": "Benchmark Cannubi, built for decades."
            }),
        };
        client = client.respond(phase.operation(), reply);
    }
    client
}
