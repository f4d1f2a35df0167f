/*!
`Store` methods et. al. for dealing with users and the Student and Teacher
profiles attached to them.

Deleting a row from `users` takes its `students` and `teachers` rows with
it (`ON DELETE CASCADE`), and deleting a teacher takes the teacher's lessons.
*/
use async_trait::async_trait;
use tokio_postgres::Row;

use super::{DbError, Store, StudentRepo, TeacherRepo, UserRepo};
use crate::user::*;

fn user_from_row(row: &Row) -> Result<User, DbError> {
    log::trace!("user_from_row( {:?} ) called", row);

    let role_str: &str = row.try_get("role")?;
    let u = User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role_str.parse()?,
        registered: row.try_get("registered")?,
        active: row.try_get("active")?,
    };

    Ok(u)
}

fn student_from_row(row: &Row) -> Result<Student, DbError> {
    Ok(Student {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        level_id: row.try_get("level_id")?,
        birth: row.try_get("birth")?,
    })
}

fn teacher_from_row(row: &Row) -> Result<Teacher, DbError> {
    Ok(Teacher {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        subject: row.try_get("subject")?,
        level_id: row.try_get("level_id")?,
    })
}

#[async_trait]
impl UserRepo for Store {
    async fn users(&self) -> Result<Vec<User>, DbError> {
        log::trace!("Store::users() called.");

        let client = self.connect().await?;
        let rows = client.query("SELECT * FROM users ORDER BY id", &[]).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, DbError> {
        log::trace!("Store::users_with_role( {} ) called.", &role);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM users WHERE role = $1 ORDER BY name",
            &[&role.as_str()]
        ).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn user(&self, id: i64) -> Result<Option<User>, DbError> {
        log::trace!("Store::user( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt("SELECT * FROM users WHERE id = $1", &[&id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::user_by_email( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM users WHERE email = $1",
            &[&email]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    async fn insert_user(&self, new: &NewUser) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_user( {:?}, {:?}, {} ) called.",
            &new.name, &new.email, &new.role
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_one(
            "INSERT INTO users (name, email, password_hash, role, registered, active)
                VALUES ($1, $2, $3, $4, $5, TRUE)
                RETURNING id",
            &[
                &new.name,
                &new.email,
                &new.password_hash,
                &new.role.as_str(),
                &crate::now(),
            ]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting user"))?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        log::trace!("Inserted User {:?} ({}) w/id {}.", &new.name, &new.email, &id);
        Ok(id)
    }

    async fn update_user(&self, u: &User) -> Result<(), DbError> {
        log::trace!("Store::update_user( {} ) called.", &u.id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE users SET
                name = $1, email = $2, password_hash = $3, role = $4, active = $5
                WHERE id = $6",
            &[
                &u.name, &u.email, &u.password_hash,
                &u.role.as_str(), &u.active, &u.id
            ]
        ).await.map_err(|e| DbError::from(e).annotate("Error updating user"))?;

        if n == 0 {
            return Err(DbError(format!("There is no user with id {}.", &u.id)));
        }

        t.commit().await?;
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_user( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute("DELETE FROM users WHERE id = $1", &[&id]).await
            .map_err(|e| DbError::from(e).annotate("Error deleting user"))?;

        t.commit().await?;
        Ok(n > 0)
    }
}

#[async_trait]
impl StudentRepo for Store {
    async fn students(&self) -> Result<Vec<Student>, DbError> {
        log::trace!("Store::students() called.");

        let client = self.connect().await?;
        let rows = client.query("SELECT * FROM students ORDER BY id", &[]).await?;
        rows.iter().map(student_from_row).collect()
    }

    async fn student(&self, id: i64) -> Result<Option<Student>, DbError> {
        log::trace!("Store::student( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt("SELECT * FROM students WHERE id = $1", &[&id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(student_from_row(&row)?)),
        }
    }

    async fn student_by_user(&self, user_id: i64) -> Result<Option<Student>, DbError> {
        log::trace!("Store::student_by_user( {} ) called.", &user_id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM students WHERE user_id = $1",
            &[&user_id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(student_from_row(&row)?)),
        }
    }

    async fn insert_student(&self, s: &Student) -> Result<i64, DbError> {
        log::trace!("Store::insert_student( {:?} ) called.", s);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let row = t.query_one(
            "INSERT INTO students (user_id, level_id, birth)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&s.user_id, &s.level_id, &s.birth]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting student"))?;
        let id: i64 = row.try_get("id")?;

        t.commit().await?;
        Ok(id)
    }

    async fn update_student(&self, s: &Student) -> Result<(), DbError> {
        log::trace!("Store::update_student( {:?} ) called.", s);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute(
            "UPDATE students SET user_id = $1, level_id = $2, birth = $3
                WHERE id = $4",
            &[&s.user_id, &s.level_id, &s.birth, &s.id]
        ).await.map_err(|e| DbError::from(e).annotate("Error updating student"))?;

        if n == 0 {
            return Err(DbError(format!("There is no student with id {}.", &s.id)));
        }

        t.commit().await?;
        Ok(())
    }

    async fn delete_student(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_student( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute("DELETE FROM students WHERE id = $1", &[&id]).await
            .map_err(|e| DbError::from(e).annotate("Error deleting student"))?;

        t.commit().await?;
        Ok(n > 0)
    }
}

#[async_trait]
impl TeacherRepo for Store {
    async fn teachers(&self) -> Result<Vec<Teacher>, DbError> {
        log::trace!("Store::teachers() called.");

        let client = self.connect().await?;
        let rows = client.query("SELECT * FROM teachers ORDER BY id", &[]).await?;
        rows.iter().map(teacher_from_row).collect()
    }

    async fn teacher(&self, id: i64) -> Result<Option<Teacher>, DbError> {
        log::trace!("Store::teacher( {} ) called.", &id);

        let client = self.connect().await?;
        match client.query_opt("SELECT * FROM teachers WHERE id = $1", &[&id]).await? {
            None => Ok(None),
            Some(row) => Ok(Some(teacher_from_row(&row)?)),
        }
    }

    async fn teacher_by_user(&self, user_id: i64) -> Result<Option<Teacher>, DbError> {
        log::trace!("Store::teacher_by_user( {} ) called.", &user_id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM teachers WHERE user_id = $1",
            &[&user_id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(teacher_from_row(&row)?)),
        }
    }

    async fn insert_teacher(&self, t: &Teacher) -> Result<i64, DbError> {
        log::trace!("Store::insert_teacher( {:?} ) called.", t);

        let mut client = self.connect().await?;
        let tx = client.transaction().await?;

        let row = tx.query_one(
            "INSERT INTO teachers (user_id, subject, level_id)
                VALUES ($1, $2, $3)
                RETURNING id",
            &[&t.user_id, &t.subject, &t.level_id]
        ).await.map_err(|e| DbError::from(e).annotate("Error inserting teacher"))?;
        let id: i64 = row.try_get("id")?;

        tx.commit().await?;
        Ok(id)
    }

    async fn update_teacher(&self, t: &Teacher) -> Result<(), DbError> {
        log::trace!("Store::update_teacher( {:?} ) called.", t);

        let mut client = self.connect().await?;
        let tx = client.transaction().await?;

        let n = tx.execute(
            "UPDATE teachers SET user_id = $1, subject = $2, level_id = $3
                WHERE id = $4",
            &[&t.user_id, &t.subject, &t.level_id, &t.id]
        ).await.map_err(|e| DbError::from(e).annotate("Error updating teacher"))?;

        if n == 0 {
            return Err(DbError(format!("There is no teacher with id {}.", &t.id)));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_teacher(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("Store::delete_teacher( {} ) called.", &id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n = t.execute("DELETE FROM teachers WHERE id = $1", &[&id]).await
            .map_err(|e| DbError::from(e).annotate("Error deleting teacher"))?;

        t.commit().await?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::store::{LevelRepo, Repo};
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    static USERS: &[(&str, &str, Role)] = &[
        ("Admin General", "admin@example.com", Role::Admin),
        ("Profesor Juan", "juan@example.com", Role::Teacher),
        ("Estudiante Ana", "ana@example.com", Role::Student),
    ];

    fn new_user(name: &str, email: &str, role: Role) -> NewUser {
        NewUser {
            name: name.to_owned(),
            email: email.to_owned(),
            password_hash: "$argon2id$placeholder".to_owned(),
            role,
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_users() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let mut ids = Vec::new();
        for (name, email, role) in USERS.iter() {
            ids.push(db.insert_user(&new_user(name, email, *role)).await.unwrap());
        }

        let dupe = new_user("Otra Ana", "ana@example.com", Role::Student);
        assert!(db.insert_user(&dupe).await.is_err());

        assert_eq!(db.users().await.unwrap().len(), USERS.len());
        let teachers = db.users_with_role(Role::Teacher).await.unwrap();
        assert_eq!(teachers.len(), 1);
        assert_eq!(&teachers[0].email, "juan@example.com");

        let mut ana = db.user_by_email("ana@example.com").await.unwrap().unwrap();
        assert!(ana.active);
        ana.name = "Ana María".to_owned();
        db.update_user(&ana).await.unwrap();
        assert_eq!(&db.user(ana.id).await.unwrap().unwrap().name, "Ana María");

        for id in ids.iter() {
            assert!(db.delete_user(*id).await.unwrap());
        }
        assert!(!db.delete_user(ids[0]).await.unwrap());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn profiles_cascade_with_user() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let level_id = db.insert_level("Intermedio").await.unwrap();
        let uid = db.insert_user(
            &new_user("Pedro", "pedro@example.com", Role::Student)
        ).await.unwrap();

        let s = Student { id: 0, user_id: uid, level_id, birth: date!(2008 - 03 - 14) };
        let sid = db.insert_student(&s).await.unwrap();
        // One Student profile per user.
        assert!(db.insert_student(&s).await.is_err());

        let t = Teacher { id: 0, user_id: uid, subject: "Conversación".to_owned(), level_id: None };
        let tid = db.insert_teacher(&t).await.unwrap();
        assert!(db.insert_teacher(&t).await.is_err());

        // A Level with Students can't go.
        assert!(db.delete_level(level_id).await.is_err());

        db.delete_user(uid).await.unwrap();
        assert!(db.student(sid).await.unwrap().is_none());
        assert!(db.teacher(tid).await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }
}
