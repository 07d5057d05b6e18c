use chrono::{DateTime, Datelike, Utc};

use crate::error::ValidationError;
use crate::model::Questionnaire;

/// Структурная проверка record'а до любого удалённого вызова.
///
/// Чистая функция: без I/O, всегда завершается либо `Ok`, либо
/// ровно одной ошибкой (побеждает первое нарушенное правило).
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require<T>(value: &Option<T>, field: &'static str) -> Result<(), ValidationError> {
    match value {
        Some(_) => Ok(()),
        None => Err(ValidationError { field }),
    }
}

/// Нулевая дата (`0001-01-01T00:00:00Z`) равносильна отсутствию.
fn require_date(value: &Option<DateTime<Utc>>, field: &'static str) -> Result<(), ValidationError> {
    match value {
        Some(date) if date.year() > 1 => Ok(()),
        _ => Err(ValidationError { field }),
    }
}

impl Validate for Questionnaire {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.form_id, "form_id")?;
        require(&self.question_id, "question_id")?;
        require(&self.question_title, "question_title")?;
        require(&self.answer_id, "answer_id")?;
        if self.answer.is_none() && self.selected_answer_option.is_none() {
            return Err(ValidationError { field: "answer(s)" });
        }
        require(&self.respondent_id, "respondent_id")?;
        require(&self.respondent_email, "respondent_email")?;
        require(&self.org_id, "org_id")?;
        require_date(&self.form_start_date, "form_start_date")?;
        require_date(&self.created_at, "created_at")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn valid() -> Questionnaire {
        Questionnaire {
            form_id: Some("F1".into()),
            question_id: Some("Q1".into()),
            question_title: Some("Color?".into()),
            answer: Some("Blue".into()),
            answer_id: Some("A1".into()),
            respondent_id: Some("R1".into()),
            respondent_email: Some("r@x.com".into()),
            org_id: Some("O1".into()),
            form_start_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn complete_record_passes() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn each_missing_required_field_is_reported() {
        type Clear = fn(&mut Questionnaire);
        let cases: [(&str, Clear); 9] = [
            ("form_id", |q| q.form_id = None),
            ("question_id", |q| q.question_id = None),
            ("question_title", |q| q.question_title = None),
            ("answer_id", |q| q.answer_id = None),
            ("respondent_id", |q| q.respondent_id = None),
            ("respondent_email", |q| q.respondent_email = None),
            ("org_id", |q| q.org_id = None),
            ("form_start_date", |q| q.form_start_date = None),
            ("created_at", |q| q.created_at = None),
        ];
        for (field, clear) in cases {
            let mut q = valid();
            clear(&mut q);
            assert_eq!(q.validate(), Err(ValidationError { field }), "field {field}");
        }
    }

    #[test]
    fn both_answers_absent_is_rejected() {
        let mut q = valid();
        q.answer = None;
        q.selected_answer_option = None;
        assert_eq!(q.validate(), Err(ValidationError { field: "answer(s)" }));
    }

    #[test]
    fn selected_option_alone_is_enough() {
        let mut q = valid();
        q.answer = None;
        q.selected_answer_option = Some("opt-2".into());
        assert_eq!(q.validate(), Ok(()));
    }

    #[test]
    fn first_violated_rule_wins() {
        let mut q = valid();
        q.org_id = None;
        q.question_id = None;
        assert_eq!(q.validate(), Err(ValidationError { field: "question_id" }));
    }

    #[test]
    fn zero_date_counts_as_missing() {
        let mut q = valid();
        q.created_at = Some(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(q.validate(), Err(ValidationError { field: "created_at" }));
    }

    #[test]
    fn empty_record_reports_form_id() {
        assert_eq!(
            Questionnaire::default().validate(),
            Err(ValidationError { field: "form_id" })
        );
    }
}
