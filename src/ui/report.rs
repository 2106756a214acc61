use colored::{ColoredString, Colorize};

use crate::errors::AnalysisError;
use crate::models::analysis::AnalysisResult;

const STRONG_MATCH: u8 = 75;
const PARTIAL_MATCH: u8 = 50;

pub fn render(result: &AnalysisResult) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "\n{} {}\n",
        "Match Score:".bold(),
        score_label(result.match_score())
    ));
    out.push_str(&format!("\n{}\n", "Executive Summary".cyan().bold()));
    out.push_str(&format!("  \"{}\"\n", result.executive_summary().italic()));

    let sections: [(&str, &[String]); 6] = [
        ("Keywords Found", result.keywords_found()),
        ("Keywords Missing", result.keywords_missing()),
        ("Strengths", result.strengths()),
        ("Gaps", result.gaps()),
        ("Suggestions", result.suggestions()),
        ("Interview Prep", result.interview_prep()),
    ];

    for (title, items) in sections {
        out.push_str(&format!("\n{}\n", title.cyan().bold()));
        if items.is_empty() {
            out.push_str(&format!("  {}\n", "none".dimmed()));
        }
        for item in items {
            out.push_str(&format!("  • {}\n", item));
        }
    }

    out
}

pub fn render_json(result: &AnalysisResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(result)
}

pub fn render_error(err: &AnalysisError) -> String {
    format!("{} {}", format!("{}:", err.kind().headline()).red().bold(), err)
}

fn score_label(score: u8) -> ColoredString {
    let label = format!("{}%", score);
    match score {
        s if s >= STRONG_MATCH => label.green().bold(),
        s if s >= PARTIAL_MATCH => label.yellow().bold(),
        _ => label.red().bold(),
    }
}
