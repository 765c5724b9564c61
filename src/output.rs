//! Result formatting for terminal and machine consumption.

use colored::Colorize;

use crate::evaluator::{BatchResponse, CheckResponse, HealthReport, ReloadReport, RulesListing, Status};

/// Output format for rendered results.
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml
}

/// Rendering options shared by all formatters.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub format:  OutputFormat,
    pub colored: bool
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format:  OutputFormat::Text,
            colored: true
        }
    }
}

/// Render a single check response.
pub fn format_check_response(response: &CheckResponse, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(response).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(response).unwrap_or_default(),
        OutputFormat::Text => check_response_text(response, opts)
    }
}

/// Render a batch response.
pub fn format_batch_response(response: &BatchResponse, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(response).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(response).unwrap_or_default(),
        OutputFormat::Text => {
            let mut out = String::new();
            out.push_str(&format!(
                "Batch {} ({} items, {}ms)\n",
                response.batch_id, response.total_items, response.processing_time_ms
            ));
            for (idx, result) in response.results.iter().enumerate() {
                out.push_str(&format!(
                    "\n--- item {} ---\n{}",
                    idx,
                    check_response_text(result, opts)
                ));
            }
            out
        }
    }
}

/// Render the rules listing.
pub fn format_rules_listing(listing: &RulesListing, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(listing).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(listing).unwrap_or_default(),
        OutputFormat::Text => {
            let mut out = format!("{} rules loaded\n", listing.total);
            for rule in &listing.rules {
                out.push_str(&format!(
                    "  {} [{}] {}\n",
                    rule.id, rule.category, rule.description
                ));
            }
            out
        }
    }
}

/// Render the health report.
pub fn format_health_report(report: &HealthReport, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(report).unwrap_or_default(),
        OutputFormat::Text => format!(
            "Status: {}\nVersion: {}\nRules: {}\nServer: {}\nCache: {}\nClassifier: {}\nEmbedding: {}\n",
            report.status,
            report.version,
            report.rule_count,
            report.server,
            report.services.cache,
            report.services.classifier,
            report.services.embedding
        )
    }
}

/// Render the reload report.
pub fn format_reload_report(report: &ReloadReport, opts: &OutputOptions) -> String {
    match opts.format {
        OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
        OutputFormat::Yaml => serde_yaml::to_string(report).unwrap_or_default(),
        OutputFormat::Text => report.message.clone()
    }
}

fn check_response_text(response: &CheckResponse, opts: &OutputOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Status: {}\n",
        status_label(response.status, opts.colored)
    ));
    out.push_str(&format!("Message: {}\n", response.message));
    out.push_str(&format!("Request: {}\n", response.request_id));

    if let Some(violations) = &response.violations {
        out.push_str("Violations:\n");
        for (idx, violation) in violations.iter().enumerate() {
            let category = violation
                .category
                .as_ref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default();
            out.push_str(&format!(
                "  {}. [{}] {} '{}' confidence {:.2}{}\n",
                idx + 1,
                violation.rule_id,
                violation.kind,
                violation.matched,
                violation.confidence,
                category
            ));
            if let Some(details) = &violation.details {
                if let Some(original) = &details.original {
                    out.push_str(&format!("     original token: {}\n", original));
                }
                if let Some(original_keyword) = &details.original_keyword {
                    out.push_str(&format!("     expanded from: {}\n", original_keyword));
                }
                if let Some(example) = &details.matched_example {
                    out.push_str(&format!("     closest example: {}\n", example));
                }
            }
        }
    }

    if let Some(rule_details) = &response.rule_details {
        out.push_str("Rule details:\n");
        for (rule_id, details) in rule_details {
            out.push_str(&format!("  {}: {}\n", rule_id, details.response));
        }
    }

    if let Some(metadata) = &response.metadata {
        if let Some(scores) = &metadata.toxicity_scores {
            out.push_str(&format!(
                "Toxicity: toxic={:.2} severe_toxic={:.2} obscene={:.2} threat={:.2} insult={:.2} identity_hate={:.2}\n",
                scores.toxic,
                scores.severe_toxic,
                scores.obscene,
                scores.threat,
                scores.insult,
                scores.identity_hate
            ));
        }
        if let Some(error) = &metadata.error {
            out.push_str(&format!("Error: {}\n", error));
        }
        if let Some(ms) = metadata.processing_time_ms {
            out.push_str(&format!("Processing time: {}ms\n", ms));
        }
    }
    out
}

fn status_label(status: Status, colored: bool) -> String {
    let label = status.to_string().to_uppercase();
    if !colored {
        return label;
    }
    match status {
        Status::Safe => label.as_str().green().to_string(),
        Status::Warning | Status::Invalid => label.as_str().yellow().to_string(),
        Status::Violation | Status::Unsafe | Status::Error => label.as_str().red().to_string()
    }
}
