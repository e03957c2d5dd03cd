use clap::Parser;

use crate::error::{BunnyError, BunnyResult};

/// Takes a JSON string containing an RQuest query and solves it.
#[derive(Parser, Debug)]
#[command(name = "bunny", about = "Solves a single RQuest query against an OMOP database")]
pub struct Cli {
    /// The JSON file containing the query
    #[arg(long, conflicts_with = "body_json", required_unless_present = "body_json")]
    pub body: Option<String>,

    /// The JSON query as an inline string
    #[arg(long = "body-json", required_unless_present = "body")]
    pub body_json: Option<String>,

    /// The path to the output file
    #[arg(short, long, default_value = "output.json")]
    pub output: String,

    /// The results modifiers, as a JSON array
    #[arg(short, long, default_value = "[]")]
    pub modifiers: String,

    /// Skip base64-encoding file payloads in the output
    #[arg(long = "no-encode")]
    pub no_encode: bool,
}

impl Cli {
    /// Loads the query payload from `--body` (a file path) or `--body-json`
    /// (an inline string), whichever was supplied.
    pub fn load_query(&self) -> BunnyResult<serde_json::Value> {
        let raw = match (&self.body, &self.body_json) {
            (Some(path), None) => std::fs::read_to_string(path)?,
            (None, Some(inline)) => inline.clone(),
            _ => {
                return Err(BunnyError::Configuration(
                    "exactly one of --body or --body-json is required".to_string(),
                ));
            }
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn parse_modifiers(&self) -> BunnyResult<Vec<crate::disclosure::ResultModifier>> {
        let value: serde_json::Value = serde_json::from_str(&self.modifiers)?;
        Ok(crate::disclosure::parse_modifiers(&value))
    }

    /// Validates the `--output` path ends in `.json`, matching the upstream
    /// parser's implicit contract with its own writer.
    pub fn validate_output_path(&self) -> BunnyResult<()> {
        if !self.output.ends_with(".json") {
            return Err(BunnyError::Configuration(format!(
                "--output must end with .json, got {}",
                self.output
            )));
        }
        Ok(())
    }
}
