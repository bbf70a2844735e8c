use serde::Deserialize;

use crate::schedule::Questions;

/// Identity handed over by the credentials provider
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub cpf: String,
}

#[derive(Debug, Deserialize)]
pub struct DateRequest {
    pub occurrence: usize,
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct SlotRequest {
    pub slot_id: String,
}

/// Answers from the questions step; absent fields are sent empty
#[derive(Debug, Default, Deserialize)]
pub struct QuestionsRequest {
    pub social_network: Option<String>,
    pub main_topic: Option<String>,
    pub specific_questions: Option<String>,
}

impl From<QuestionsRequest> for Questions {
    fn from(req: QuestionsRequest) -> Self {
        Questions {
            social_network: req.social_network.unwrap_or_default().trim().to_string(),
            main_topic: req.main_topic.unwrap_or_default().trim().to_string(),
            specific_questions: req.specific_questions.unwrap_or_default().trim().to_string(),
        }
    }
}

/// Strips punctuation and checks an 11-digit CPF
pub fn validate_cpf(raw: &str) -> Result<String, String> {
    let cpf: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '.' && *c != '-')
        .collect();

    if cpf.is_empty() {
        return Err("CPF is required".to_string());
    }
    if !cpf.chars().all(|c| c.is_ascii_digit()) {
        return Err("CPF must contain only digits".to_string());
    }
    if cpf.len() != 11 {
        return Err(format!("CPF must have 11 digits, got {}", cpf.len()));
    }
    Ok(cpf)
}

impl DateRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.occurrence == 0 {
            return Err("Occurrence numbers start at 1".to_string());
        }
        if self.date.trim().is_empty() {
            return Err("Date is required".to_string());
        }
        Ok(())
    }
}

impl SlotRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.slot_id.trim().is_empty() {
            return Err("Slot is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cpf_accepts_formatted_input() {
        assert_eq!(validate_cpf("123.456.789-00").unwrap(), "12345678900");
        assert_eq!(validate_cpf(" 12345678900 ").unwrap(), "12345678900");
    }

    #[test]
    fn cpf_rejects_bad_input() {
        assert!(validate_cpf("").is_err());
        assert!(validate_cpf("1234567890a").is_err());
        assert!(validate_cpf("1234").is_err());
    }

    #[test]
    fn missing_answers_become_empty_strings() {
        let questions: Questions = QuestionsRequest {
            main_topic: Some("  Carreira ".to_string()),
            ..QuestionsRequest::default()
        }
        .into();
        assert_eq!(
            questions,
            Questions {
                social_network: String::new(),
                main_topic: "Carreira".to_string(),
                specific_questions: String::new(),
            }
        );
    }

    #[test]
    fn date_request_needs_occurrence_and_date() {
        assert!(DateRequest { occurrence: 0, date: "2025-09-01".to_string() }.validate().is_err());
        assert!(DateRequest { occurrence: 1, date: " ".to_string() }.validate().is_err());
        assert!(DateRequest { occurrence: 1, date: "2025-09-01".to_string() }.validate().is_ok());
    }
}
