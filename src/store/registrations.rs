/*
`Store` methods et. al. for subject-registration requests.

```sql
CREATE TABLE registration_requests (
    id            BIGSERIAL PRIMARY KEY,
    student_id    BIGINT REFERENCES users(id),
    subject_id    BIGINT REFERENCES subjects(id),
    academic_year TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    reason        TEXT,
    admin_note    TEXT,
    approved_by   BIGINT REFERENCES users(id),
    requested_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    approved_at   TIMESTAMPTZ
);
```

The "at most one pending request per (student, subject, year)" rule is not
in the schema; callers are expected to check `find_pending()` first.
*/
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::registration::{
    RegistrationDetail, RegistrationRequest, RegistrationStatus,
};
use crate::subject::{Subject, SubjectSummary};
use crate::user::UserSummary;

fn request_from_row(row: &Row) -> Result<RegistrationRequest, DbError> {
    let status_str: &str = row.try_get("status")?;
    Ok(RegistrationRequest {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        subject_id: row.try_get("subject_id")?,
        academic_year: row.try_get("academic_year")?,
        status: status_str.parse()?,
        reason: row.try_get("reason")?,
        admin_note: row.try_get("admin_note")?,
        approved_by: row.try_get("approved_by")?,
        requested_at: row.try_get("requested_at")?,
        approved_at: row.try_get("approved_at")?,
    })
}

impl Store {
    pub async fn insert_request(
        &self,
        student_id: i64,
        subject_id: i64,
        academic_year: &str,
        reason: Option<&str>,
    ) -> Result<RegistrationRequest, DbError> {
        log::trace!(
            "Store::insert_request( {}, {}, {:?}, {:?} ) called.",
            &student_id, &subject_id, academic_year, &reason
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO registration_requests
                (student_id, subject_id, academic_year, reason)
                VALUES ($1, $2, $3, $4)
                RETURNING *",
            &[&student_id, &subject_id, &academic_year, &reason]
        ).await?;

        let req = request_from_row(&row)?;
        log::info!(
            "Registration request {} created for student {} / subject {}.",
            &req.id, &student_id, &subject_id
        );
        Ok(req)
    }

    pub async fn get_request_by_id(
        &self,
        id: i64,
    ) -> Result<Option<RegistrationRequest>, DbError> {
        log::trace!("Store::get_request_by_id( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM registration_requests WHERE id = $1", &[&id]
        ).await? {
            Some(row) => Ok(Some(request_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// The open request holding a (student, subject, year) slot, if any.
    pub async fn find_pending(
        &self,
        student_id: i64,
        subject_id: i64,
        academic_year: &str,
    ) -> Result<Option<RegistrationRequest>, DbError> {
        log::trace!(
            "Store::find_pending( {}, {}, {:?} ) called.",
            &student_id, &subject_id, academic_year
        );

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM registration_requests
                WHERE student_id = $1 AND subject_id = $2
                AND academic_year = $3 AND status = 'pending'",
            &[&student_id, &subject_id, &academic_year]
        ).await? {
            Some(row) => Ok(Some(request_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
    Registration requests, newest first, with student, subject, and
    (where decided) approver attached.

    All three filters are optional: `student_id` narrows to one student's
    requests, `status` and `academic_year` to matching rows.
    */
    pub async fn get_requests(
        &self,
        student_id: Option<i64>,
        status: Option<RegistrationStatus>,
        academic_year: Option<&str>,
    ) -> Result<Vec<RegistrationDetail>, DbError> {
        log::trace!(
            "Store::get_requests( {:?}, {:?}, {:?} ) called.",
            &student_id, &status, &academic_year
        );

        let status_str: Option<String> = status.map(|s| s.to_string());

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT
                r.id, r.student_id, r.subject_id, r.academic_year, r.status,
                r.reason, r.admin_note, r.approved_by, r.requested_at,
                r.approved_at,
                stu.name AS student_name, stu.email AS student_email,
                stu.role AS student_role,
                s.name AS subject_name, s.code AS subject_code,
                s.credits AS subject_credits,
                app.name AS approver_name, app.email AS approver_email,
                app.role AS approver_role
            FROM
                registration_requests r
                INNER JOIN users stu ON stu.id = r.student_id
                INNER JOIN subjects s ON s.id = r.subject_id
                LEFT JOIN users app ON app.id = r.approved_by
            WHERE
                ($1::BIGINT IS NULL OR r.student_id = $1)
                AND ($2::TEXT IS NULL OR r.status = $2)
                AND ($3::TEXT IS NULL OR r.academic_year = $3)
            ORDER BY r.requested_at DESC",
            &[&student_id, &status_str, &academic_year]
        ).await?;

        let mut requests: Vec<RegistrationDetail> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let request = request_from_row(row)?;

            let role_str: &str = row.try_get("student_role")?;
            let student = UserSummary {
                id: request.student_id,
                name: row.try_get("student_name")?,
                email: row.try_get("student_email")?,
                role: role_str.parse()?,
            };
            let subject = SubjectSummary {
                id: request.subject_id,
                name: row.try_get("subject_name")?,
                code: row.try_get("subject_code")?,
                credits: row.try_get("subject_credits")?,
            };

            let approver = match request.approved_by {
                Some(approver_id) => {
                    let role_str: Option<String> = row.try_get("approver_role")?;
                    match role_str {
                        Some(role_str) => Some(UserSummary {
                            id: approver_id,
                            name: row.try_get::<_, Option<String>>("approver_name")?
                                .unwrap_or_default(),
                            email: row.try_get::<_, Option<String>>("approver_email")?
                                .unwrap_or_default(),
                            role: role_str.parse()?,
                        }),
                        // The approver reference can outlive the join row
                        // only mid-deletion; treat it as absent.
                        None => None,
                    }
                },
                None => None,
            };

            requests.push(RegistrationDetail {
                request,
                student: Some(student),
                subject: Some(subject),
                approver,
            });
        }

        Ok(requests)
    }

    /// Record the terminal decision on a request: new status, optional
    /// admin note, the deciding admin, and the decision timestamp.
    pub async fn set_decision(
        &self,
        id: i64,
        status: RegistrationStatus,
        admin_note: Option<&str>,
        approved_by: i64,
    ) -> Result<RegistrationRequest, DbError> {
        log::trace!(
            "Store::set_decision( {}, {}, {:?}, {} ) called.",
            &id, &status, &admin_note, &approved_by
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "UPDATE registration_requests SET
                status = $2,
                admin_note = $3,
                approved_by = $4,
                approved_at = now()
            WHERE id = $1
            RETURNING *",
            &[&id, &status.to_string(), &admin_note, &approved_by]
        ).await?;

        let req = request_from_row(&row)?;
        log::info!("Registration request {} now {}.", &req.id, &req.status);
        Ok(req)
    }

    /// Subjects a student could still ask to register for in the given
    /// year: everything without an enrollment or an open request.
    pub async fn get_available_subjects(
        &self,
        student_id: i64,
        academic_year: &str,
    ) -> Result<Vec<Subject>, DbError> {
        log::trace!(
            "Store::get_available_subjects( {}, {:?} ) called.",
            &student_id, academic_year
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM subjects
            WHERE id NOT IN (
                SELECT subject_id FROM student_enrollments
                    WHERE student_id = $1 AND academic_year = $2
            )
            AND id NOT IN (
                SELECT subject_id FROM registration_requests
                    WHERE student_id = $1 AND academic_year = $2
                    AND status = 'pending'
            )
            ORDER BY id",
            &[&student_id, &academic_year]
        ).await?;

        let mut subjects: Vec<Subject> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            subjects.push(super::subjects::subject_from_row(row)?);
        }

        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;
    use crate::user::Role;

    struct Fixture {
        admin: crate::user::User,
        student: crate::user::User,
        math: Subject,
        lit: Subject,
    }

    async fn fixture(db: &Store) -> Fixture {
        let admin = db.insert_user(
            "a-thelma", "Thelma Admin", "thelma@gradeview.test", Role::Admin
        ).await.unwrap();
        let student = db.insert_user(
            "s-jsmith", "John Smith", "jsmith@gradeview.test", Role::Student
        ).await.unwrap();
        let math = db.insert_subject("Algebra", "MATH101", None, 3)
            .await.unwrap();
        let lit = db.insert_subject("Literature", "LIT200", None, 2)
            .await.unwrap();

        Fixture { admin, student, math, lit }
    }

    #[tokio::test]
    #[serial]
    async fn request_lifecycle() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let fx = fixture(&db).await;
        let year = "2023-2024";

        let req = db.insert_request(
            fx.student.id, fx.math.id, year, Some("Needed for my major.")
        ).await.unwrap();
        assert_eq!(req.status, RegistrationStatus::Pending);
        assert!(req.approved_at.is_none());

        let pending = db.find_pending(fx.student.id, fx.math.id, year)
            .await.unwrap().unwrap();
        assert_eq!(pending.id, req.id);

        let decided = db.set_decision(
            req.id,
            RegistrationStatus::Approved,
            Some("Welcome aboard."),
            fx.admin.id,
        ).await.unwrap();
        assert_eq!(decided.status, RegistrationStatus::Approved);
        assert_eq!(decided.approved_by, Some(fx.admin.id));
        assert!(decided.approved_at.is_some());

        assert!(db.find_pending(fx.student.id, fx.math.id, year)
            .await.unwrap().is_none());

        let listed = db.get_requests(None, Some(RegistrationStatus::Approved), Some(year))
            .await.unwrap();
        assert_eq!(listed.len(), 1);
        let detail = &listed[0];
        assert_eq!(detail.student.as_ref().unwrap().email, "jsmith@gradeview.test");
        assert_eq!(detail.subject.as_ref().unwrap().code, "MATH101");
        assert_eq!(detail.approver.as_ref().unwrap().name, "Thelma Admin");

        assert!(db.get_requests(None, Some(RegistrationStatus::Pending), None)
            .await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn available_subjects_shrink() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        let fx = fixture(&db).await;
        let year = "2023-2024";

        let avail = db.get_available_subjects(fx.student.id, year)
            .await.unwrap();
        assert_eq!(avail.len(), 2);

        // An enrollment takes one subject off the table...
        db.insert_enrollment(fx.student.id, fx.math.id, year).await.unwrap();
        let avail = db.get_available_subjects(fx.student.id, year)
            .await.unwrap();
        assert_eq!(avail.len(), 1);
        assert_eq!(avail[0].code, "LIT200");

        // ...and an open request takes the other.
        db.insert_request(fx.student.id, fx.lit.id, year, None)
            .await.unwrap();
        assert!(db.get_available_subjects(fx.student.id, year)
            .await.unwrap().is_empty());

        // A different year is unaffected.
        let next_year = db.get_available_subjects(fx.student.id, "2024-2025")
            .await.unwrap();
        assert_eq!(next_year.len(), 2);

        db.nuke_database().await.unwrap();
    }
}
