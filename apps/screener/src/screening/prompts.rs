// Screening LLM prompt templates.
// Placeholders in braces are substituted before the call.

pub const SUMMARY_SYSTEM: &str = "\
You are an experienced technical recruiter. \
Summarize résumés faithfully and concisely. \
Never invent experience, employers, dates or skills that are not in the text.";

pub const SUMMARY_PROMPT: &str = r#"Summarize the résumé below for a recruiter in at most 200 words.
Cover: professional headline, years of experience, main skills, education and languages.

RÉSUMÉ:
{resume}"#;

pub const OPINION_SYSTEM: &str = "\
You are an experienced technical recruiter giving a candid, fair assessment \
of a candidate against a specific job opening. \
Base every statement on the résumé text. Do not speculate about personal traits.";

pub const OPINION_PROMPT: &str = r#"Give your opinion of this candidate for the job "{job_name}".
Point out strengths, gaps and risks in at most 150 words.

JOB COMPETENCES:
{competence}

JOB STRATEGIES:
{strategies}

JOB QUALIFICATIONS:
{qualifications}

RÉSUMÉ:
{resume}"#;

pub const OVERALL_SCORE_PROMPT: &str = r#"Rate how well this résumé fits the job "{job_name}" on a scale from 0 to 10.

JOB COMPETENCES:
{competence}

JOB STRATEGIES:
{strategies}

JOB QUALIFICATIONS:
{qualifications}

RÉSUMÉ:
{resume}

Return exactly: {"score": <number between 0 and 10>}"#;

pub const CRITERIA_SCORE_PROMPT: &str = r#"Rate how well this résumé covers the requirements below on a scale from 0 to 10.

REQUIREMENTS:
{criteria}

RÉSUMÉ:
{resume}

Return exactly: {"score": <number between 0 and 10>, "explanation": "<one or two sentences>"}"#;

/// Renders a requirement list as markdown bullets.
pub fn format_list(items: &[String]) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| format!("- {item}"))
        .collect();
    if lines.is_empty() {
        "(none specified)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_list_bullets_each_item() {
        let items = vec!["IoT".to_string(), " Python ".to_string()];
        assert_eq!(format_list(&items), "- IoT\n- Python");
    }

    #[test]
    fn test_format_list_empty_is_explicit() {
        assert_eq!(format_list(&[]), "(none specified)");
        assert_eq!(format_list(&["  ".to_string()]), "(none specified)");
    }
}
