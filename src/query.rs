//! Query expansion: flattens an [`Intent`] into the text that gets embedded.

use crate::intent::Intent;

/// Joins the non-empty intent lists into labelled clauses. Seniority is not part of the output.
pub fn build_expanded_query(intent: &Intent) -> String {
    let sections = [
        ("Technical skills", &intent.technical_skills),
        ("Behavioral skills", &intent.behavioral_skills),
        ("Job role", &intent.role_keywords),
    ];
    sections
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(label, values)| format!("{label}: {}", values.join(", ")))
        .collect::<Vec<_>>()
        .join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Seniority;

    #[test]
    fn joins_all_sections_in_order() {
        let intent = Intent {
            technical_skills: vec!["Java".into(), "SQL".into()],
            behavioral_skills: vec!["collaboration".into()],
            role_keywords: vec!["developer".into()],
            seniority: Seniority::Senior,
        };
        assert_eq!(
            build_expanded_query(&intent),
            "Technical skills: Java, SQL. Behavioral skills: collaboration. Job role: developer"
        );
    }

    #[test]
    fn skips_empty_sections() {
        let intent = Intent {
            role_keywords: vec!["analyst".into()],
            ..Intent::default()
        };
        assert_eq!(build_expanded_query(&intent), "Job role: analyst");
        assert_eq!(build_expanded_query(&Intent::fallback()), "");
    }
}
