//! Runs text through the configured redactor.
//!
//! JSON input is redacted by key as well as by pattern; anything else gets
//! the pattern pass only.

use std::io::Read;

use devpanel_core::AgentConfig;

pub fn run(config: &AgentConfig, text: Option<String>) -> Result<(), String> {
    let input = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            buffer
        }
    };
    let redactor = config.build_redactor()?;
    println!("{}", redactor.redact_json_text(input.trim_end()));
    Ok(())
}
