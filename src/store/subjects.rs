/*
`Store` methods et. al. for the subject catalog, teacher-subject
assignments, and student enrollments.

```sql
CREATE TABLE subjects (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    code        TEXT UNIQUE NOT NULL,
    description TEXT,
    credits     INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE teacher_subject_assignments (
    id            BIGSERIAL PRIMARY KEY,
    teacher_id    BIGINT REFERENCES users(id),
    subject_id    BIGINT REFERENCES subjects(id),
    academic_year TEXT NOT NULL
);

CREATE TABLE student_enrollments (
    id            BIGSERIAL PRIMARY KEY,
    student_id    BIGINT REFERENCES users(id),
    subject_id    BIGINT REFERENCES subjects(id),
    academic_year TEXT NOT NULL
);
```
*/
use std::collections::HashMap;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::{ToSql, Type}};

use super::{DbError, Store};
use crate::subject::{
    Assignment, AssignmentDetail, Enrollment, EnrollmentDetail, NewSubject,
    Subject, SubjectWithTeachers, TaughtSubject,
};
use crate::user::UserSummary;

pub(crate) fn subject_from_row(row: &Row) -> Result<Subject, DbError> {
    Ok(Subject {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        description: row.try_get("description")?,
        credits: row.try_get("credits")?,
    })
}

fn assignment_from_row(row: &Row) -> Result<Assignment, DbError> {
    Ok(Assignment {
        id: row.try_get("id")?,
        teacher_id: row.try_get("teacher_id")?,
        subject_id: row.try_get("subject_id")?,
        academic_year: row.try_get("academic_year")?,
    })
}

fn enrollment_from_row(row: &Row) -> Result<Enrollment, DbError> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        academic_year: row.try_get("academic_year")?,
    })
}

impl Store {
    pub async fn insert_subject(
        &self,
        name: &str,
        code: &str,
        description: Option<&str>,
        credits: i32,
    ) -> Result<Subject, DbError> {
        log::trace!(
            "Store::insert_subject( {:?}, {:?}, {:?}, {} ) called.",
            name, code, description, credits
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO subjects (name, code, description, credits)
                VALUES ($1, $2, $3, $4)
                RETURNING *",
            &[&name, &code, &description, &credits]
        ).await?;

        subject_from_row(&row)
    }

    /// Bulk-insert a subject catalog in one transaction. Used by the
    /// `seed` binary.
    pub async fn insert_subjects(
        &self,
        subjects: &[NewSubject],
    ) -> Result<usize, DbError> {
        log::trace!(
            "Store::insert_subjects( [ {} subjects ] ) called.",
            subjects.len()
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let insert_stmt = t.prepare_typed(
            "INSERT INTO subjects (name, code, description, credits)
                VALUES ($1, $2, $3, $4)",
            &[Type::TEXT, Type::TEXT, Type::TEXT, Type::INT4]
        ).await?;

        let pvec: Vec<[&(dyn ToSql + Sync); 4]> = subjects.iter()
            .map(|s| {
                let p: [&(dyn ToSql + Sync); 4] =
                    [&s.name, &s.code, &s.description, &s.credits];
                p
            }).collect();

        let mut n_inserted: u64 = 0;
        {
            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(
                    t.execute(&insert_stmt, params)
                );
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(_) => { n_inserted += 1; },
                    Err(e) => {
                        let estr = format!(
                            "Error inserting subject into database: {}", &e
                        );
                        return Err(DbError(estr));
                    },
                }
            }
        }

        t.commit().await?;

        Ok(n_inserted as usize)
    }

    pub async fn get_subjects(&self) -> Result<Vec<Subject>, DbError> {
        log::trace!("Store::get_subjects() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM subjects ORDER BY id", &[]
        ).await?;

        let mut subjects: Vec<Subject> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            subjects.push(subject_from_row(row)?);
        }

        Ok(subjects)
    }

    /// The full catalog, each subject carrying its teacher assignments
    /// (teacher attached).
    pub async fn get_subjects_with_teachers(
        &self,
    ) -> Result<Vec<SubjectWithTeachers>, DbError> {
        log::trace!("Store::get_subjects_with_teachers() called.");

        let client = self.connect().await?;

        let subject_rows = client.query(
            "SELECT * FROM subjects ORDER BY id", &[]
        ).await?;
        let assignment_rows = client.query(
            "SELECT
                a.id, a.teacher_id, a.subject_id, a.academic_year,
                u.name AS teacher_name, u.email AS teacher_email,
                u.role AS teacher_role
            FROM
                teacher_subject_assignments a
                INNER JOIN users u ON u.id = a.teacher_id
            ORDER BY a.id",
            &[]
        ).await?;

        let mut by_subject: HashMap<i64, Vec<AssignmentDetail>> =
            HashMap::with_capacity(assignment_rows.len());
        for row in assignment_rows.iter() {
            let assignment = assignment_from_row(row)?;
            let role_str: &str = row.try_get("teacher_role")?;
            let teacher = UserSummary {
                id: assignment.teacher_id,
                name: row.try_get("teacher_name")?,
                email: row.try_get("teacher_email")?,
                role: role_str.parse()?,
            };
            by_subject.entry(assignment.subject_id)
                .or_default()
                .push(AssignmentDetail {
                    assignment,
                    teacher: Some(teacher),
                });
        }

        let mut subjects: Vec<SubjectWithTeachers> =
            Vec::with_capacity(subject_rows.len());
        for row in subject_rows.iter() {
            let subject = subject_from_row(row)?;
            let teacher_assignments = by_subject.remove(&subject.id)
                .unwrap_or_default();
            subjects.push(SubjectWithTeachers { subject, teacher_assignments });
        }

        Ok(subjects)
    }

    pub async fn get_subject_by_id(
        &self,
        id: i64,
    ) -> Result<Option<Subject>, DbError> {
        log::trace!("Store::get_subject_by_id( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM subjects WHERE id = $1", &[&id]
        ).await? {
            Some(row) => Ok(Some(subject_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_subject_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Subject>, DbError> {
        log::trace!("Store::get_subject_by_code( {:?} ) called.", code);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM subjects WHERE code = $1", &[&code]
        ).await? {
            Some(row) => Ok(Some(subject_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Update whichever fields are supplied; the rest keep their current
    /// values. Returns `None` if there is no such subject.
    pub async fn update_subject(
        &self,
        id: i64,
        name: Option<&str>,
        code: Option<&str>,
        description: Option<&str>,
        credits: Option<i32>,
    ) -> Result<Option<Subject>, DbError> {
        log::trace!(
            "Store::update_subject( {}, {:?}, {:?}, {:?}, {:?} ) called.",
            &id, &name, &code, &description, &credits
        );

        let client = self.connect().await?;
        match client.query_opt(
            "UPDATE subjects SET
                name        = COALESCE($2, name),
                code        = COALESCE($3, code),
                description = COALESCE($4, description),
                credits     = COALESCE($5, credits)
            WHERE id = $1
            RETURNING *",
            &[&id, &name, &code, &description, &credits]
        ).await? {
            Some(row) => Ok(Some(subject_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_subject(&self, id: i64) -> Result<u64, DbError> {
        log::trace!("Store::delete_subject( {} ) called.", &id);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM subjects WHERE id = $1", &[&id]
        ).await?;

        Ok(n)
    }

    /// The assignment currently holding a (subject, year) slot, if any.
    pub async fn get_assignment(
        &self,
        subject_id: i64,
        academic_year: &str,
    ) -> Result<Option<Assignment>, DbError> {
        log::trace!(
            "Store::get_assignment( {}, {:?} ) called.",
            &subject_id, academic_year
        );

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM teacher_subject_assignments
                WHERE subject_id = $1 AND academic_year = $2",
            &[&subject_id, &academic_year]
        ).await? {
            Some(row) => Ok(Some(assignment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn insert_assignment(
        &self,
        teacher_id: i64,
        subject_id: i64,
        academic_year: &str,
    ) -> Result<Assignment, DbError> {
        log::trace!(
            "Store::insert_assignment( {}, {}, {:?} ) called.",
            &teacher_id, &subject_id, academic_year
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO teacher_subject_assignments
                (teacher_id, subject_id, academic_year)
                VALUES ($1, $2, $3)
                RETURNING *",
            &[&teacher_id, &subject_id, &academic_year]
        ).await?;

        assignment_from_row(&row)
    }

    /// Replace the teacher on an existing assignment (the "last writer
    /// wins" half of assigning a subject's teacher).
    pub async fn update_assignment_teacher(
        &self,
        id: i64,
        teacher_id: i64,
    ) -> Result<Assignment, DbError> {
        log::trace!(
            "Store::update_assignment_teacher( {}, {} ) called.",
            &id, &teacher_id
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "UPDATE teacher_subject_assignments SET teacher_id = $2
                WHERE id = $1
                RETURNING *",
            &[&id, &teacher_id]
        ).await?;

        assignment_from_row(&row)
    }

    pub async fn delete_assignment(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::delete_assignment( {} ) called.", &id);

        let client = self.connect().await?;
        client.execute(
            "DELETE FROM teacher_subject_assignments WHERE id = $1",
            &[&id]
        ).await?;

        Ok(())
    }

    /// Subjects a teacher teaches, tagged with the assignment year,
    /// optionally restricted to one academic year.
    pub async fn get_assignments_by_teacher(
        &self,
        teacher_id: i64,
        academic_year: Option<&str>,
    ) -> Result<Vec<TaughtSubject>, DbError> {
        log::trace!(
            "Store::get_assignments_by_teacher( {}, {:?} ) called.",
            &teacher_id, &academic_year
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT
                s.id, s.name, s.code, s.description, s.credits,
                a.academic_year
            FROM
                teacher_subject_assignments a
                INNER JOIN subjects s ON s.id = a.subject_id
            WHERE
                a.teacher_id = $1
                AND ($2::TEXT IS NULL OR a.academic_year = $2)
            ORDER BY a.id",
            &[&teacher_id, &academic_year]
        ).await?;

        let mut taught: Vec<TaughtSubject> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            taught.push(TaughtSubject {
                subject: subject_from_row(row)?,
                academic_year: row.try_get("academic_year")?,
            });
        }

        Ok(taught)
    }

    pub async fn get_enrollment(
        &self,
        student_id: i64,
        subject_id: i64,
        academic_year: &str,
    ) -> Result<Option<Enrollment>, DbError> {
        log::trace!(
            "Store::get_enrollment( {}, {}, {:?} ) called.",
            &student_id, &subject_id, academic_year
        );

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM student_enrollments
                WHERE student_id = $1 AND subject_id = $2
                AND academic_year = $3",
            &[&student_id, &subject_id, &academic_year]
        ).await? {
            Some(row) => Ok(Some(enrollment_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn insert_enrollment(
        &self,
        student_id: i64,
        subject_id: i64,
        academic_year: &str,
    ) -> Result<Enrollment, DbError> {
        log::trace!(
            "Store::insert_enrollment( {}, {}, {:?} ) called.",
            &student_id, &subject_id, academic_year
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO student_enrollments
                (student_id, subject_id, academic_year)
                VALUES ($1, $2, $3)
                RETURNING *",
            &[&student_id, &subject_id, &academic_year]
        ).await?;

        enrollment_from_row(&row)
    }

    /// A student's enrollments with the subject attached, optionally
    /// restricted to one academic year.
    pub async fn get_enrollments_by_student(
        &self,
        student_id: i64,
        academic_year: Option<&str>,
    ) -> Result<Vec<EnrollmentDetail>, DbError> {
        log::trace!(
            "Store::get_enrollments_by_student( {}, {:?} ) called.",
            &student_id, &academic_year
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT
                e.id, e.student_id, e.subject_id, e.academic_year,
                s.name AS subject_name, s.code AS subject_code,
                s.description AS subject_description,
                s.credits AS subject_credits,
                u.name AS student_name, u.email AS student_email,
                u.role AS student_role
            FROM
                student_enrollments e
                INNER JOIN subjects s ON s.id = e.subject_id
                INNER JOIN users u ON u.id = e.student_id
            WHERE
                e.student_id = $1
                AND ($2::TEXT IS NULL OR e.academic_year = $2)
            ORDER BY e.id",
            &[&student_id, &academic_year]
        ).await?;

        let mut enrollments: Vec<EnrollmentDetail> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let enrollment = enrollment_from_row(row)?;
            let subject = Subject {
                id: enrollment.subject_id,
                name: row.try_get("subject_name")?,
                code: row.try_get("subject_code")?,
                description: row.try_get("subject_description")?,
                credits: row.try_get("subject_credits")?,
            };
            let role_str: &str = row.try_get("student_role")?;
            let student = UserSummary {
                id: enrollment.student_id,
                name: row.try_get("student_name")?,
                email: row.try_get("student_email")?,
                role: role_str.parse()?,
            };
            enrollments.push(EnrollmentDetail {
                enrollment,
                subject: Some(subject),
                student: Some(student),
            });
        }

        Ok(enrollments)
    }

    /// The students enrolled in a subject, optionally restricted to one
    /// academic year.
    pub async fn get_enrolled_students(
        &self,
        subject_id: i64,
        academic_year: Option<&str>,
    ) -> Result<Vec<UserSummary>, DbError> {
        log::trace!(
            "Store::get_enrolled_students( {}, {:?} ) called.",
            &subject_id, &academic_year
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT u.id, u.name, u.email, u.role
            FROM
                student_enrollments e
                INNER JOIN users u ON u.id = e.student_id
            WHERE
                e.subject_id = $1
                AND ($2::TEXT IS NULL OR e.academic_year = $2)
            ORDER BY u.id",
            &[&subject_id, &academic_year]
        ).await?;

        let mut students: Vec<UserSummary> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let role_str: &str = row.try_get("role")?;
            students.push(UserSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                role: role_str.parse()?,
            });
        }

        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;
    use crate::user::Role;

    #[tokio::test]
    #[serial]
    async fn subject_crud() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let s = db.insert_subject("Algebra", "MATH101", Some("Introductory algebra"), 3)
            .await.unwrap();
        assert_eq!(s.credits, 3);

        // The code column is unique.
        assert!(db.insert_subject("Algebra again", "MATH101", None, 3)
            .await.is_err());

        let fetched = db.get_subject_by_code("MATH101").await.unwrap().unwrap();
        assert_eq!(fetched.id, s.id);

        let updated = db.update_subject(s.id, None, None, None, Some(4))
            .await.unwrap().unwrap();
        assert_eq!(updated.credits, 4);
        assert_eq!(updated.name, "Algebra");

        assert_eq!(db.delete_subject(s.id).await.unwrap(), 1);
        assert_eq!(db.delete_subject(s.id).await.unwrap(), 0);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn bulk_subject_insert() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let catalog: Vec<NewSubject> = [
            ("Algebra", "MATH101", 3),
            ("Literature", "LIT200", 2),
            ("Mechanics", "PHYS110", 4),
        ].iter().map(|(name, code, credits)| NewSubject {
            name: name.to_string(),
            code: code.to_string(),
            description: None,
            credits: *credits,
        }).collect();

        let n = db.insert_subjects(&catalog).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(db.get_subjects().await.unwrap().len(), 3);

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn assignment_lifecycle() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let year = "2023-2024";
        let berro = db.insert_user(
            "t-berro", "Mr Berro", "berro@gradeview.test", Role::Teacher
        ).await.unwrap();
        let jenny = db.insert_user(
            "t-jenny", "Ms Jenny", "jenny@gradeview.test", Role::Teacher
        ).await.unwrap();
        let s = db.insert_subject("Algebra", "MATH101", None, 3).await.unwrap();

        assert!(db.get_assignment(s.id, year).await.unwrap().is_none());

        let a = db.insert_assignment(berro.id, s.id, year).await.unwrap();
        assert_eq!(a.teacher_id, berro.id);

        // Reassignment replaces the teacher on the same row.
        let a2 = db.update_assignment_teacher(a.id, jenny.id).await.unwrap();
        assert_eq!(a2.id, a.id);
        assert_eq!(a2.teacher_id, jenny.id);

        let taught = db.get_assignments_by_teacher(jenny.id, Some(year))
            .await.unwrap();
        assert_eq!(taught.len(), 1);
        assert_eq!(taught[0].subject.code, "MATH101");
        assert!(db.get_assignments_by_teacher(berro.id, None)
            .await.unwrap().is_empty());

        db.delete_assignment(a.id).await.unwrap();
        assert!(db.get_assignment(s.id, year).await.unwrap().is_none());

        let with_teachers = db.get_subjects_with_teachers().await.unwrap();
        assert_eq!(with_teachers.len(), 1);
        assert!(with_teachers[0].teacher_assignments.is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn enrollment_uniqueness() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let year = "2023-2024";
        let stud = db.insert_user(
            "s-jsmith", "John Smith", "jsmith@gradeview.test", Role::Student
        ).await.unwrap();
        let s = db.insert_subject("Algebra", "MATH101", None, 3).await.unwrap();

        db.insert_enrollment(stud.id, s.id, year).await.unwrap();

        // Same subject, same year: the unique triple rejects it.
        assert!(db.insert_enrollment(stud.id, s.id, year).await.is_err());

        // Same subject, different year is fine.
        db.insert_enrollment(stud.id, s.id, "2024-2025").await.unwrap();

        let this_year = db.get_enrollments_by_student(stud.id, Some(year))
            .await.unwrap();
        assert_eq!(this_year.len(), 1);
        assert_eq!(
            this_year[0].subject.as_ref().unwrap().code,
            "MATH101"
        );

        let all = db.get_enrollments_by_student(stud.id, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let students = db.get_enrolled_students(s.id, Some(year)).await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].email, "jsmith@gradeview.test");

        db.nuke_database().await.unwrap();
    }
}
