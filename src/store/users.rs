/*
`Store` methods et. al. for dealing with shadow user records.

```sql
CREATE TABLE users (
    id          BIGSERIAL PRIMARY KEY,
    provider_id TEXT UNIQUE NOT NULL,
    name        TEXT NOT NULL,
    email       TEXT UNIQUE NOT NULL,
    role        TEXT NOT NULL   /* one of { 'admin', 'teacher', 'student' } */
);
```
*/
use tokio_postgres::{Row, types::ToSql};

use super::{DbError, Store};
use crate::user::{Role, User};

pub(crate) fn user_from_row(row: &Row) -> Result<User, DbError> {
    log::trace!("user_from_row( {:?} ) called.", row);

    let role_str: &str = row.try_get("role")?;
    let u = User {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: role_str.parse()?,
    };

    log::trace!("    ...user_from_row() returning {:?}", &u);
    Ok(u)
}

impl Store {
    pub async fn insert_user(
        &self,
        provider_id: &str,
        name: &str,
        email: &str,
        role: Role,
    ) -> Result<User, DbError> {
        log::trace!(
            "Store::insert_user( {:?}, {:?}, {:?}, {} ) called.",
            provider_id, name, email, role
        );

        let client = self.connect().await?;

        let row = client.query_one(
            "INSERT INTO users (provider_id, name, email, role)
                VALUES ($1, $2, $3, $4)
                RETURNING *",
            &[&provider_id, &name, &email, &role.to_string()]
        ).await?;

        let u = user_from_row(&row)?;
        log::trace!("Inserted {} {:?} ({}).", u.role, &u.name, &u.email);
        Ok(u)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_id( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE id = $1", &[&id]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_user_by_provider_id(
        &self,
        provider_id: &str,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_provider_id( {:?} ) called.", provider_id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE provider_id = $1", &[&provider_id]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_email( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE email = $1", &[&email]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_users(&self) -> Result<Vec<User>, DbError> {
        log::trace!("Store::get_users() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM users ORDER BY id", &[]
        ).await?;

        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }

        Ok(users)
    }

    pub async fn get_users_by_role(&self, role: Role) -> Result<Vec<User>, DbError> {
        log::trace!("Store::get_users_by_role( {} ) called.", role);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM users WHERE role = $1 ORDER BY id",
            &[&role.to_string()]
        ).await?;

        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }

        Ok(users)
    }

    /// Update whichever of name/email/role are supplied; the rest keep
    /// their current values. Returns `None` if there is no such user.
    pub async fn update_user(
        &self,
        id: i64,
        name: Option<&str>,
        email: Option<&str>,
        role: Option<Role>,
    ) -> Result<Option<User>, DbError> {
        log::trace!(
            "Store::update_user( {}, {:?}, {:?}, {:?} ) called.",
            &id, &name, &email, &role
        );

        let role_str: Option<String> = role.map(|r| r.to_string());

        let client = self.connect().await?;
        match client.query_opt(
            "UPDATE users SET
                name  = COALESCE($2, name),
                email = COALESCE($3, email),
                role  = COALESCE($4, role)
            WHERE id = $1
            RETURNING *",
            &[&id, &name, &email, &role_str]
        ).await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
    Deletes a user from the database, regardless of role.

    Everything hanging off the user goes in the same transaction: grades
    (whether the user was the graded student or the grading teacher),
    teaching assignments, enrollments, and registration requests; requests
    this user approved survive with their approver reference cleared. Any
    provider-side cleanup is the caller's problem and deliberately happens
    outside this transaction.
    */
    pub async fn delete_user(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::delete_user( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let params: [&(dyn ToSql + Sync); 1] = [&id];

        let (g_res, a_res, e_res, r_res, ap_res) = tokio::join!(
            t.execute(
                "DELETE FROM grades WHERE student_id = $1 OR teacher_id = $1",
                &params[..]
            ),
            t.execute(
                "DELETE FROM teacher_subject_assignments WHERE teacher_id = $1",
                &params[..]
            ),
            t.execute(
                "DELETE FROM student_enrollments WHERE student_id = $1",
                &params[..]
            ),
            t.execute(
                "DELETE FROM registration_requests WHERE student_id = $1",
                &params[..]
            ),
            t.execute(
                "UPDATE registration_requests SET approved_by = NULL
                    WHERE approved_by = $1",
                &params[..]
            ),
        );

        for (what, res) in [
            ("grade", g_res),
            ("assignment", a_res),
            ("enrollment", e_res),
            ("registration request", r_res),
            ("approver reference", ap_res),
        ] {
            match res {
                Err(e) => { return Err(e.into()); },
                Ok(0) => {},
                Ok(n) => {
                    log::trace!(
                        "Deleting user {} touched {} {} record(s).",
                        &id, &n, what
                    );
                },
            }
        }

        let n = t.execute(
            "DELETE FROM users WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with id {}.", &id)))
        } else {
            t.commit().await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    static ADMINS: &[(&str, &str, &str)] = &[
        ("11111111-aaaa-0000-0000-000000000001", "Thelma Admin", "thelma@gradeview.test"),
    ];

    static TEACHERS: &[(&str, &str, &str)] = &[
        ("22222222-bbbb-0000-0000-000000000001", "Mr Berro", "berro@gradeview.test"),
        ("22222222-bbbb-0000-0000-000000000002", "Ms Jenny", "jenny@gradeview.test"),
    ];

    static STUDENTS: &[(&str, &str, &str)] = &[
        ("33333333-cccc-0000-0000-000000000001", "John Smith", "jsmith@gradeview.test"),
        ("33333333-cccc-0000-0000-000000000002", "Mary Major", "mmajor@gradeview.test"),
    ];

    #[tokio::test]
    #[serial]
    async fn insert_and_fetch_users() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        for (pid, name, email) in ADMINS.iter() {
            db.insert_user(pid, name, email, Role::Admin).await.unwrap();
        }
        for (pid, name, email) in TEACHERS.iter() {
            db.insert_user(pid, name, email, Role::Teacher).await.unwrap();
        }
        for (pid, name, email) in STUDENTS.iter() {
            db.insert_user(pid, name, email, Role::Student).await.unwrap();
        }

        let all = db.get_users().await.unwrap();
        assert_eq!(all.len(), ADMINS.len() + TEACHERS.len() + STUDENTS.len());

        let teachers = db.get_users_by_role(Role::Teacher).await.unwrap();
        assert_eq!(teachers.len(), TEACHERS.len());

        let (pid, name, email) = STUDENTS[0];
        let u = db.get_user_by_provider_id(pid).await.unwrap().unwrap();
        assert_eq!(
            (u.name.as_str(), u.email.as_str(), u.role),
            (name, email, Role::Student)
        );

        let by_email = db.get_user_by_email(email).await.unwrap().unwrap();
        assert_eq!(by_email.id, u.id);

        let updated = db.update_user(u.id, Some("John Q Smith"), None, None)
            .await.unwrap().unwrap();
        assert_eq!(updated.name, "John Q Smith");
        assert_eq!(updated.email, email);

        assert!(db.update_user(999_999, Some("Nobody"), None, None)
            .await.unwrap().is_none());

        for u in all.iter() {
            db.delete_user(u.id).await.unwrap();
        }
        assert!(db.get_users().await.unwrap().is_empty());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[serial]
    async fn delete_user_cascades() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let year = "2023-2024";

        let (pid, name, email) = TEACHERS[0];
        let teacher = db.insert_user(pid, name, email, Role::Teacher).await.unwrap();
        let (pid, name, email) = STUDENTS[0];
        let student = db.insert_user(pid, name, email, Role::Student).await.unwrap();
        let (pid, name, email) = ADMINS[0];
        let admin = db.insert_user(pid, name, email, Role::Admin).await.unwrap();

        let subject = db.insert_subject("Algebra", "MATH101", None, 3)
            .await.unwrap();

        db.insert_assignment(teacher.id, subject.id, year).await.unwrap();
        db.insert_enrollment(student.id, subject.id, year).await.unwrap();
        db.insert_grade(
            student.id, subject.id, teacher.id, 8.5, "Term 1", year, None
        ).await.unwrap();
        let req = db.insert_request(student.id, subject.id, year, Some("please"))
            .await.unwrap();
        db.set_decision(
            req.id,
            crate::registration::RegistrationStatus::Approved,
            None,
            admin.id,
        ).await.unwrap();

        // Dropping the student takes its grades, enrollments, and requests
        // along, and nothing else.
        db.delete_user(student.id).await.unwrap();

        assert!(db.get_user_by_id(student.id).await.unwrap().is_none());
        assert!(db.get_student_grades(student.id, None, None, None)
            .await.unwrap().is_empty());
        assert!(db.get_enrollment(student.id, subject.id, year)
            .await.unwrap().is_none());
        assert!(db.get_requests(Some(student.id), None, None)
            .await.unwrap().is_empty());
        assert!(db.get_user_by_id(teacher.id).await.unwrap().is_some());
        assert!(db.get_subject_by_id(subject.id).await.unwrap().is_some());

        // Dropping the teacher clears the assignment.
        db.delete_user(teacher.id).await.unwrap();
        assert!(db.get_assignment(subject.id, year).await.unwrap().is_none());

        db.delete_user(admin.id).await.unwrap();

        // Nobody left to delete.
        assert!(db.delete_user(student.id).await.is_err());

        db.nuke_database().await.unwrap();
    }
}
