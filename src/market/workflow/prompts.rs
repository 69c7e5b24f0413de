// SPDX-License-Identifier: MIT

//! Prompt templates for the workflow stages
//!
//! Each builder takes only the state fields its stage reads.

use super::review::{APPROVAL_MARKER, REJECTION_MARKER};

/// Search query for the researcher; feedback narrows the search
pub fn research_query(topic: &str, feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) => format!("market research for {} focusing on: {}", topic, feedback),
        None => format!("latest market trends and news for {} last 12 months", topic),
    }
}

pub const ANALYST_INSTRUCTION: &str =
    "You are a senior market analyst. Ground every claim in the supplied research.";

/// Analysis prompt over the accumulated research
pub fn analysis_prompt(topic: &str, research: &[String], feedback: Option<&str>) -> String {
    let mut prompt = format!(
        r#"Analyze the following market data about {topic}:
{data}

Identify the top 3 trends, potential opportunities, and major risks.
Also extract any numerical data that could be visualized (e.g., market growth, percentages).
"#,
        topic = topic,
        data = research.join("\n")
    );

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\nIMPORTANT: The previous analysis was rejected. Please address this feedback: {}\n",
            feedback
        ));
    }

    prompt
}

pub const REVIEWER_INSTRUCTION: &str =
    "You are a demanding research editor. Judge analyses strictly and answer in the requested format.";

/// Review prompt asking for an approval or rejection marker
pub fn review_prompt(topic: &str, analysis: &str) -> String {
    format!(
        r#"Review the following market analysis for {topic}:
{analysis}

Is this analysis comprehensive, data-backed, and insightful?
If YES, respond with "{approved}".
If NO, respond with "{rejected}" followed by specific feedback on what is missing or needs improvement (e.g., "Missing specific market size data", "Too generic", "Needs more focus on risks").
"#,
        topic = topic,
        analysis = analysis,
        approved = APPROVAL_MARKER,
        rejected = REJECTION_MARKER
    )
}

pub const CHART_INSTRUCTION: &str =
    "You write self-contained matplotlib scripts. Reply with Python code only.";

/// Chart-code prompt
pub fn chart_prompt(analysis: &str) -> String {
    format!(
        r#"Based on the following analysis, generate Python code using matplotlib to create MULTIPLE relevant charts (bar charts, pie charts, or line charts) if the data allows.

Analysis:
{analysis}

Requirements:
1. Use matplotlib.pyplot; numpy, math, random, datetime and statistics are also available. Import nothing else.
2. The code must be self-contained (import matplotlib.pyplot as plt, etc.).
3. Define the data directly in the code based on the analysis (estimate values if necessary but keep them realistic).
4. Create as many distinct charts as relevant (at least 1, up to 3).
5. Save the plots to files named 'chart_1.png', 'chart_2.png', etc. in the current directory using plt.savefig().
6. Clear the figure between plots using plt.clf() or plt.figure().
7. Use a modern, professional style (e.g., plt.style.use('ggplot') or custom colors).
8. Do NOT use plt.show(), and do not read or write any other files.
9. Return ONLY the python code, no markdown formatting like ```python.
"#,
        analysis = analysis
    )
}

pub const WRITER_INSTRUCTION: &str =
    "You are a professional market research writer producing polished Markdown reports.";

/// Report prompt; every chart file must be embedded inline
pub fn report_prompt(topic: &str, analysis: &str, chart_files: &[String]) -> String {
    let charts = if chart_files.is_empty() {
        "No chart images were generated for this report; do not include any images.".to_string()
    } else {
        format!(
            r#"IMPORTANT: The following chart images have been generated: {files}
You MUST embed these charts inline within the relevant sections of your report using markdown image syntax: ![Description](filename)

For example:
- Place market trend charts in the "Key Trends" section
- Place opportunity/risk charts in their respective sections
- Distribute the charts throughout the report where they best support your analysis

DO NOT create a separate "Visualizations" section at the end. Instead, embed each chart directly in the section where it's most relevant.
Each chart should have a descriptive caption that explains what it shows."#,
            files = chart_files.join(", ")
        )
    };

    format!(
        r#"Write a comprehensive market research report on {topic} based on the following analysis:
{analysis}

The report must be in Markdown format with sections for Executive Summary, Key Trends, Opportunities, Risks, and Conclusion.

{charts}
"#,
        topic = topic,
        analysis = analysis,
        charts = charts
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_query_with_and_without_feedback() {
        assert_eq!(
            research_query("Renewable Energy", None),
            "latest market trends and news for Renewable Energy last 12 months"
        );
        assert_eq!(
            research_query("Renewable Energy", Some("storage costs")),
            "market research for Renewable Energy focusing on: storage costs"
        );
    }

    #[test]
    fn test_analysis_prompt_appends_feedback() {
        let research = vec!["solar up".to_string(), "wind flat".to_string()];
        let plain = analysis_prompt("Energy", &research, None);
        assert!(plain.contains("solar up\nwind flat"));
        assert!(!plain.contains("IMPORTANT"));

        let revised = analysis_prompt("Energy", &research, Some("Too generic"));
        assert!(revised.contains("Please address this feedback: Too generic"));
    }

    #[test]
    fn test_review_prompt_names_markers() {
        let prompt = review_prompt("Energy", "analysis body");
        assert!(prompt.contains("respond with \"APPROVED\""));
        assert!(prompt.contains("respond with \"REJECTED\""));
        assert!(prompt.contains("analysis body"));
    }

    #[test]
    fn test_report_prompt_lists_charts() {
        let files = vec!["chart_1.png".to_string(), "chart_2.png".to_string()];
        let prompt = report_prompt("Energy", "a", &files);
        assert!(prompt.contains("chart_1.png, chart_2.png"));
        assert!(prompt.contains("![Description](filename)"));

        let none = report_prompt("Energy", "a", &[]);
        assert!(none.contains("No chart images"));
    }
}
