/*!
Grades. A student may hold several grades for the same subject and year,
one per term.
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::subject::SubjectSummary;
use crate::user::UserSummary;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub teacher_id: i64,
    pub score: f64,
    pub term: String,
    pub academic_year: String,
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A grade with whatever neighbors the requesting view wants joined in:
/// students see the subject and the grading teacher; teachers see the
/// student.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeDetail {
    #[serde(flatten)]
    pub grade: Grade,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<UserSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn grade_wire_format() {
        let g = Grade {
            id: 11,
            student_id: 4,
            subject_id: 2,
            teacher_id: 9,
            score: 8.5,
            term: "Term 1".to_owned(),
            academic_year: "2023-2024".to_owned(),
            comment: None,
            created_at: datetime!(2024-01-15 09:30 UTC),
        };

        let v = serde_json::to_value(&g).unwrap();
        assert_eq!(v["studentId"], 4);
        assert_eq!(v["academicYear"], "2023-2024");
        assert_eq!(v["createdAt"], "2024-01-15T09:30:00Z");
    }
}
