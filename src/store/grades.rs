/*
`Store` methods et. al. for grade entry and the filtered grade reports.

```sql
CREATE TABLE grades (
    id            BIGSERIAL PRIMARY KEY,
    student_id    BIGINT REFERENCES users(id),
    subject_id    BIGINT REFERENCES subjects(id),
    teacher_id    BIGINT REFERENCES users(id),
    score         DOUBLE PRECISION NOT NULL,
    term          TEXT NOT NULL,
    academic_year TEXT NOT NULL,
    comment       TEXT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);
```
*/
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::grade::{Grade, GradeDetail};
use crate::subject::SubjectSummary;
use crate::user::UserSummary;

fn grade_from_row(row: &Row) -> Result<Grade, DbError> {
    Ok(Grade {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        teacher_id: row.try_get("teacher_id")?,
        score: row.try_get("score")?,
        term: row.try_get("term")?,
        academic_year: row.try_get("academic_year")?,
        comment: row.try_get("comment")?,
        created_at: row.try_get("created_at")?,
    })
}

impl Store {
    pub async fn insert_grade(
        &self,
        student_id: i64,
        subject_id: i64,
        teacher_id: i64,
        score: f64,
        term: &str,
        academic_year: &str,
        comment: Option<&str>,
    ) -> Result<Grade, DbError> {
        log::trace!(
            "Store::insert_grade( {}, {}, {}, {}, {:?}, {:?}, {:?} ) called.",
            &student_id, &subject_id, &teacher_id, &score, term,
            academic_year, &comment
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO grades
                (student_id, subject_id, teacher_id, score, term,
                 academic_year, comment)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *",
            &[
                &student_id, &subject_id, &teacher_id, &score, &term,
                &academic_year, &comment,
            ]
        ).await?;

        grade_from_row(&row)
    }

    pub async fn get_grade_by_id(&self, id: i64) -> Result<Option<Grade>, DbError> {
        log::trace!("Store::get_grade_by_id( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM grades WHERE id = $1", &[&id]
        ).await? {
            Some(row) => Ok(Some(grade_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Update whichever fields are supplied; the rest keep their current
    /// values. Returns `None` if there is no such grade.
    pub async fn update_grade(
        &self,
        id: i64,
        teacher_id: Option<i64>,
        score: Option<f64>,
        term: Option<&str>,
        academic_year: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Option<Grade>, DbError> {
        log::trace!(
            "Store::update_grade( {}, {:?}, {:?}, {:?}, {:?}, {:?} ) called.",
            &id, &teacher_id, &score, &term, &academic_year, &comment
        );

        let client = self.connect().await?;
        match client.query_opt(
            "UPDATE grades SET
                teacher_id    = COALESCE($2, teacher_id),
                score         = COALESCE($3, score),
                term          = COALESCE($4, term),
                academic_year = COALESCE($5, academic_year),
                comment       = COALESCE($6, comment)
            WHERE id = $1
            RETURNING *",
            &[&id, &teacher_id, &score, &term, &academic_year, &comment]
        ).await? {
            Some(row) => Ok(Some(grade_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_grade(&self, id: i64) -> Result<u64, DbError> {
        log::trace!("Store::delete_grade( {} ) called.", &id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM grades WHERE id = $1", &[&id]
        ).await?;

        Ok(n)
    }

    /**
    A student's grades with subject and teacher attached, newest first
    within each subject.

    `subject_id`, `academic_year`, and `term` narrow the report when
    supplied.
    */
    pub async fn get_student_grades(
        &self,
        student_id: i64,
        subject_id: Option<i64>,
        academic_year: Option<&str>,
        term: Option<&str>,
    ) -> Result<Vec<GradeDetail>, DbError> {
        log::trace!(
            "Store::get_student_grades( {}, {:?}, {:?}, {:?} ) called.",
            &student_id, &subject_id, &academic_year, &term
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT
                g.id, g.student_id, g.subject_id, g.teacher_id, g.score,
                g.term, g.academic_year, g.comment, g.created_at,
                s.name AS subject_name, s.code AS subject_code,
                s.credits AS subject_credits,
                u.name AS teacher_name, u.email AS teacher_email,
                u.role AS teacher_role
            FROM
                grades g
                INNER JOIN subjects s ON s.id = g.subject_id
                INNER JOIN users u ON u.id = g.teacher_id
            WHERE
                g.student_id = $1
                AND ($2::BIGINT IS NULL OR g.subject_id = $2)
                AND ($3::TEXT IS NULL OR g.academic_year = $3)
                AND ($4::TEXT IS NULL OR g.term = $4)
            ORDER BY g.subject_id ASC, g.created_at DESC",
            &[&student_id, &subject_id, &academic_year, &term]
        ).await?;

        let mut grades: Vec<GradeDetail> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let grade = grade_from_row(row)?;
            let subject = SubjectSummary {
                id: grade.subject_id,
                name: row.try_get("subject_name")?,
                code: row.try_get("subject_code")?,
                credits: row.try_get("subject_credits")?,
            };
            let role_str: &str = row.try_get("teacher_role")?;
            let teacher = UserSummary {
                id: grade.teacher_id,
                name: row.try_get("teacher_name")?,
                email: row.try_get("teacher_email")?,
                role: role_str.parse()?,
            };
            grades.push(GradeDetail {
                grade,
                subject: Some(subject),
                teacher: Some(teacher),
                student: None,
            });
        }

        Ok(grades)
    }

    /// The grades a teacher has entered for one subject, student attached,
    /// newest first within each student.
    pub async fn get_teacher_subject_grades(
        &self,
        teacher_id: i64,
        subject_id: i64,
        academic_year: Option<&str>,
        term: Option<&str>,
    ) -> Result<Vec<GradeDetail>, DbError> {
        log::trace!(
            "Store::get_teacher_subject_grades( {}, {}, {:?}, {:?} ) called.",
            &teacher_id, &subject_id, &academic_year, &term
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT
                g.id, g.student_id, g.subject_id, g.teacher_id, g.score,
                g.term, g.academic_year, g.comment, g.created_at,
                s.name AS subject_name, s.code AS subject_code,
                s.credits AS subject_credits,
                u.name AS student_name, u.email AS student_email,
                u.role AS student_role
            FROM
                grades g
                INNER JOIN subjects s ON s.id = g.subject_id
                INNER JOIN users u ON u.id = g.student_id
            WHERE
                g.teacher_id = $1
                AND g.subject_id = $2
                AND ($3::TEXT IS NULL OR g.academic_year = $3)
                AND ($4::TEXT IS NULL OR g.term = $4)
            ORDER BY g.student_id ASC, g.created_at DESC",
            &[&teacher_id, &subject_id, &academic_year, &term]
        ).await?;

        let mut grades: Vec<GradeDetail> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let grade = grade_from_row(row)?;
            let subject = SubjectSummary {
                id: grade.subject_id,
                name: row.try_get("subject_name")?,
                code: row.try_get("subject_code")?,
                credits: row.try_get("subject_credits")?,
            };
            let role_str: &str = row.try_get("student_role")?;
            let student = UserSummary {
                id: grade.student_id,
                name: row.try_get("student_name")?,
                email: row.try_get("student_email")?,
                role: role_str.parse()?,
            };
            grades.push(GradeDetail {
                grade,
                subject: Some(subject),
                teacher: None,
                student: Some(student),
            });
        }

        Ok(grades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use float_cmp::approx_eq;
    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;
    use crate::user::Role;

    struct Fixture {
        teacher: crate::user::User,
        student: crate::user::User,
        subject: crate::subject::Subject,
    }

    async fn fixture(db: &Store) -> Fixture {
        let teacher = db.insert_user(
            "t-berro", "Mr Berro", "berro@gradeview.test", Role::Teacher
        ).await.unwrap();
        let student = db.insert_user(
            "s-jsmith", "John Smith", "jsmith@gradeview.test", Role::Student
        ).await.unwrap();
        let subject = db.insert_subject("Algebra", "MATH101", None, 3)
            .await.unwrap();
        db.insert_assignment(teacher.id, subject.id, "2023-2024")
            .await.unwrap();

        Fixture { teacher, student, subject }
    }

    #[tokio::test]
    #[serial]
    async fn grade_crud() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let fx = fixture(&db).await;

        let g = db.insert_grade(
            fx.student.id, fx.subject.id, fx.teacher.id,
            7.5, "Term 1", "2023-2024", Some("Solid work.")
        ).await.unwrap();
        assert!(approx_eq!(f64, g.score, 7.5));

        let fetched = db.get_grade_by_id(g.id).await.unwrap().unwrap();
        assert_eq!(fetched.comment.as_deref(), Some("Solid work."));

        let updated = db.update_grade(g.id, None, Some(8.0), None, None, None)
            .await.unwrap().unwrap();
        assert!(approx_eq!(f64, updated.score, 8.0));
        assert_eq!(updated.term, "Term 1");

        assert_eq!(db.delete_grade(g.id).await.unwrap(), 1);
        assert_eq!(db.delete_grade(g.id).await.unwrap(), 0);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn grade_reports_filter() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let fx = fixture(&db).await;

        for (score, term, year) in [
            (6.0, "Term 1", "2023-2024"),
            (7.0, "Term 2", "2023-2024"),
            (9.0, "Term 1", "2024-2025"),
        ] {
            db.insert_grade(
                fx.student.id, fx.subject.id, fx.teacher.id,
                score, term, year, None
            ).await.unwrap();
        }

        let all = db.get_student_grades(fx.student.id, None, None, None)
            .await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(
            all[0].subject.as_ref().unwrap().code,
            "MATH101"
        );
        assert_eq!(
            all[0].teacher.as_ref().unwrap().email,
            "berro@gradeview.test"
        );

        let this_year = db.get_student_grades(
            fx.student.id, None, Some("2023-2024"), None
        ).await.unwrap();
        assert_eq!(this_year.len(), 2);

        let term_one = db.get_student_grades(
            fx.student.id, Some(fx.subject.id), Some("2023-2024"), Some("Term 1")
        ).await.unwrap();
        assert_eq!(term_one.len(), 1);
        assert!(approx_eq!(f64, term_one[0].grade.score, 6.0));

        let entered = db.get_teacher_subject_grades(
            fx.teacher.id, fx.subject.id, None, None
        ).await.unwrap();
        assert_eq!(entered.len(), 3);
        assert_eq!(
            entered[0].student.as_ref().unwrap().name,
            "John Smith"
        );

        db.nuke_database().await.unwrap();
    }
}
