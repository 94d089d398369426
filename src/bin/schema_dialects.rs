//! Print the OpenAI, Anthropic and Gemini compilations of a response schema.
//!
//! Usage: `unichat-schema <schema.json|schema.yaml> [openai|anthropic|gemini]`

use anyhow::{bail, Context};
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;
use unichat::dialect::{anthropic, gemini, openai};
use unichat::ResponseSchema;

fn load(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("parsing {} as YAML", path.display()))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("parsing {} as JSON", path.display()))?
    };
    Ok(value)
}

fn main() -> anyhow::Result<()> {
    unichat::init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: unichat-schema <schema.json|schema.yaml> [openai|anthropic|gemini]");
    };
    let only = args.next();

    let schema = ResponseSchema::from_value(load(Path::new(&path))?)?;
    debug!(kind = ?schema.input().kind(), "schema classified");

    let node = schema.node();
    let openai = openai::compile(node);
    let compiled = match only.as_deref() {
        None => json!({
            "openai": { "schema": openai.schema, "optional_paths": openai.optional_paths },
            "anthropic": anthropic::compile(node),
            "gemini": gemini::compile(node),
        }),
        Some("openai") => json!({ "schema": openai.schema, "optional_paths": openai.optional_paths }),
        Some("anthropic") => anthropic::compile(node),
        Some("gemini") => gemini::compile(node),
        Some(other) => bail!("unknown dialect '{}'", other),
    };

    println!("{}", serde_json::to_string_pretty(&compiled)?);
    Ok(())
}
