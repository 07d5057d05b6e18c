use std::cmp::Ordering;
use std::sync::LazyLock;

use serde::Serialize;
use serde_json::Value;

use crate::error::ProjectionError;
use crate::model::Questionnaire;

/// Разделитель элементов списка внутри одной ячейки.
const LIST_SEPARATOR: &str = ", ";

/// Единственный компаратор колонок: и заголовки, и значения строк
/// упорядочиваются им, иначе колонки разъедутся.
fn column_order(a: &&'static str, b: &&'static str) -> Ordering {
    a.cmp(b)
}

// ════════════════════════════════════════════════════════════════
//  RecordShape
// ════════════════════════════════════════════════════════════════

/// Форма record'а: объявленный список полей в том виде, в каком
/// они появляются в сериализованном JSON.
pub trait RecordShape: Serialize {
    /// Имя формы (для логов и ошибок).
    const SHAPE: &'static str;
    /// Все поля record'а, порядок не важен.
    const FIELDS: &'static [&'static str];

    /// Проекция формы, вычисленная один раз на процесс.
    fn projection() -> &'static Projection;
}

static QUESTIONNAIRE_PROJECTION: LazyLock<Projection> =
    LazyLock::new(|| Projection::new(Questionnaire::FIELDS));

impl RecordShape for Questionnaire {
    const SHAPE: &'static str = "questionnaire";
    const FIELDS: &'static [&'static str] = &[
        "form_id",
        "question_id",
        "rule_id",
        "question_title",
        "question_rule",
        "is_required",
        "option_id",
        "options",
        "question_creation_date",
        "answer",
        "selected_answer_option",
        "answered_on",
        "respondent_id",
        "respondent_email",
        "respondent_phone_number",
        "org_id",
        "answer_id",
        "form_start_date",
        "form_end_date",
        "created_at",
        "updated_at",
    ];

    fn projection() -> &'static Projection {
        &QUESTIONNAIRE_PROJECTION
    }
}

// ════════════════════════════════════════════════════════════════
//  Projection
// ════════════════════════════════════════════════════════════════

/// Детерминированное отображение имя поля → номер колонки.
#[derive(Debug, Clone)]
pub struct Projection {
    columns: Vec<&'static str>,
}

impl Projection {
    pub fn new(fields: &[&'static str]) -> Self {
        let mut columns = fields.to_vec();
        columns.sort_by(column_order);
        columns.dedup();
        Self { columns }
    }

    /// Имена полей в порядке колонок.
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Строка заголовков: имена полей в upper case.
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.to_uppercase()).collect()
    }

    /// Значения ячеек record'а в порядке колонок.
    pub fn row<T: RecordShape>(&self, record: &T) -> Result<Vec<Value>, ProjectionError> {
        let value = serde_json::to_value(record)?;
        let Value::Object(mut fields) = value else {
            return Err(ProjectionError::NotAnObject(T::SHAPE));
        };
        Ok(self
            .columns
            .iter()
            .map(|column| cell(fields.remove(*column).unwrap_or(Value::Null)))
            .collect())
    }
}

/// Привести JSON значение к виду, допустимому в ячейке.
fn cell(value: Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::Array(items) => Value::String(
            items
                .into_iter()
                .filter(|item| !item.is_null())
                .map(|item| match cell(item) {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        ),
        Value::Object(_) => Value::String(value.to_string()),
        scalar => scalar,
    }
}

/// Заголовки формы `T`.
pub fn headers<T: RecordShape>() -> Vec<String> {
    T::projection().headers()
}

/// Строка значений record'а в порядке заголовков формы.
pub fn row<T: RecordShape>(record: &T) -> Result<Vec<Value>, ProjectionError> {
    T::projection().row(record)
}
