/*!
Subjects, teacher-subject assignments, and student enrollments.
*/
use serde::{Deserialize, Serialize};

use crate::user::UserSummary;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub credits: i32,
}

/// Embedded form used inside grade and registration responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub credits: i32,
}

impl From<&Subject> for SubjectSummary {
    fn from(s: &Subject) -> SubjectSummary {
        SubjectSummary {
            id: s.id,
            name: s.name.clone(),
            code: s.code.clone(),
            credits: s.credits,
        }
    }
}

/// A subject not yet in the catalog, as consumed by the bulk insert the
/// `seed` binary drives.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub credits: i32,
}

/// At most one teacher teaches a subject in a given academic year; writing
/// a new assignment for an already-assigned (subject, year) replaces the
/// teacher on the existing row.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: i64,
    pub teacher_id: i64,
    pub subject_id: i64,
    pub academic_year: String,
}

/// An `Assignment` with its teacher attached, as embedded in the
/// subject-listing response.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub teacher: Option<UserSummary>,
}

/// A subject together with its teacher assignments.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectWithTeachers {
    #[serde(flatten)]
    pub subject: Subject,
    pub teacher_assignments: Vec<AssignmentDetail>,
}

/// What a teacher sees when asking "what do I teach": the subject record
/// tagged with the year of the assignment.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaughtSubject {
    #[serde(flatten)]
    pub subject: Subject,
    pub academic_year: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: i64,
    pub academic_year: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDetail {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<UserSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taught_subject_flattens() {
        let t = TaughtSubject {
            subject: Subject {
                id: 3,
                name: "Linear Algebra".to_owned(),
                code: "MATH201".to_owned(),
                description: None,
                credits: 4,
            },
            academic_year: "2023-2024".to_owned(),
        };

        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["code"], "MATH201");
        assert_eq!(v["academicYear"], "2023-2024");
    }
}
