/*!
An in-memory `Repo`.

Every operation takes the table lock for its whole duration and checks all
its constraints before touching anything, so a failed operation leaves the
tables as they were. The uniqueness and foreign-key rules, and the cascades,
mirror the Postgres schema in `store`.
*/
use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::*;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    levels: BTreeMap<i64, Level>,
    students: BTreeMap<i64, Student>,
    teachers: BTreeMap<i64, Teacher>,
    lessons: BTreeMap<i64, Lesson>,
    exercises: BTreeMap<i64, Exercise>,
    progress: BTreeMap<i64, Progress>,
}

impl Tables {
    fn new_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_level_name(&self, name: &str, own_id: i64) -> Result<(), DbError> {
        if self.levels.values().any(|l| l.name == name && l.id != own_id) {
            return Err(DbError(format!("Level name {:?} already exists.", name)));
        }
        Ok(())
    }

    fn check_email(&self, email: &str, own_id: i64) -> Result<(), DbError> {
        if self.users.values().any(|u| u.email == email && u.id != own_id) {
            return Err(DbError(format!("Email {:?} already in use.", email)));
        }
        Ok(())
    }

    fn check_user(&self, user_id: i64) -> Result<(), DbError> {
        if !self.users.contains_key(&user_id) {
            return Err(DbError(format!("There is no user with id {}.", &user_id)));
        }
        Ok(())
    }

    fn check_level(&self, level_id: Option<i64>) -> Result<(), DbError> {
        match level_id {
            Some(id) if !self.levels.contains_key(&id) => Err(
                DbError(format!("There is no level with id {}.", &id))
            ),
            _ => Ok(()),
        }
    }

    fn check_student(&self, s: &Student) -> Result<(), DbError> {
        self.check_user(s.user_id)?;
        self.check_level(Some(s.level_id))?;
        if self.students.values().any(|x| x.user_id == s.user_id && x.id != s.id) {
            return Err(DbError(format!(
                "User {} already has a student profile.", &s.user_id
            )));
        }
        Ok(())
    }

    fn check_teacher(&self, t: &Teacher) -> Result<(), DbError> {
        self.check_user(t.user_id)?;
        self.check_level(t.level_id)?;
        if self.teachers.values().any(|x| x.user_id == t.user_id && x.id != t.id) {
            return Err(DbError(format!(
                "User {} already has a teacher profile.", &t.user_id
            )));
        }
        Ok(())
    }

    fn check_lesson(&self, l: &Lesson) -> Result<(), DbError> {
        if !self.teachers.contains_key(&l.teacher_id) {
            return Err(DbError(format!("There is no teacher with id {}.", &l.teacher_id)));
        }
        self.check_level(l.level_id)
    }

    fn check_exercise(&self, x: &Exercise) -> Result<(), DbError> {
        if !self.lessons.contains_key(&x.lesson_id) {
            return Err(DbError(format!("There is no lesson with id {}.", &x.lesson_id)));
        }
        Ok(())
    }

    fn remove_exercise(&mut self, id: i64) -> bool {
        self.progress.retain(|_, p| p.exercise_id != id);
        self.exercises.remove(&id).is_some()
    }

    fn remove_lesson(&mut self, id: i64) -> bool {
        let doomed: Vec<i64> = self.exercises.values()
            .filter(|x| x.lesson_id == id)
            .map(|x| x.id)
            .collect();
        for xid in doomed.into_iter() {
            self.remove_exercise(xid);
        }
        self.lessons.remove(&id).is_some()
    }

    fn remove_teacher(&mut self, id: i64) -> bool {
        let doomed: Vec<i64> = self.lessons.values()
            .filter(|l| l.teacher_id == id)
            .map(|l| l.id)
            .collect();
        for lid in doomed.into_iter() {
            self.remove_lesson(lid);
        }
        self.teachers.remove(&id).is_some()
    }

    fn remove_student(&mut self, id: i64) -> bool {
        self.progress.retain(|_, p| p.student_id != id);
        self.students.remove(&id).is_some()
    }
}

#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        log::trace!("MemStore::new() called.");
        Self::default()
    }
}

#[async_trait]
impl LevelRepo for MemStore {
    async fn levels(&self) -> Result<Vec<Level>, DbError> {
        Ok(self.tables.read().await.levels.values().cloned().collect())
    }

    async fn level(&self, id: i64) -> Result<Option<Level>, DbError> {
        Ok(self.tables.read().await.levels.get(&id).cloned())
    }

    async fn level_by_name(&self, name: &str) -> Result<Option<Level>, DbError> {
        Ok(self.tables.read().await.levels.values()
            .find(|l| l.name == name)
            .cloned())
    }

    async fn insert_level(&self, name: &str) -> Result<i64, DbError> {
        log::trace!("MemStore::insert_level( {:?} ) called.", name);

        let mut tabs = self.tables.write().await;
        tabs.check_level_name(name, 0)?;
        let id = tabs.new_id();
        tabs.levels.insert(id, Level { id, name: name.to_owned() });
        Ok(id)
    }

    async fn update_level(&self, level: &Level) -> Result<(), DbError> {
        let mut tabs = self.tables.write().await;
        tabs.check_level_name(&level.name, level.id)?;
        match tabs.levels.get_mut(&level.id) {
            Some(l) => { l.name = level.name.clone(); Ok(()) },
            None => Err(DbError(format!("There is no level with id {}.", &level.id))),
        }
    }

    async fn delete_level(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("MemStore::delete_level( {} ) called.", &id);

        let mut tabs = self.tables.write().await;
        if tabs.students.values().any(|s| s.level_id == id) {
            return Err(DbError(format!(
                "Level {} is still assigned to one or more students.", &id
            )));
        }

        for t in tabs.teachers.values_mut().filter(|t| t.level_id == Some(id)) {
            t.level_id = None;
        }
        for l in tabs.lessons.values_mut().filter(|l| l.level_id == Some(id)) {
            l.level_id = None;
        }
        Ok(tabs.levels.remove(&id).is_some())
    }
}

#[async_trait]
impl UserRepo for MemStore {
    async fn users(&self) -> Result<Vec<User>, DbError> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, DbError> {
        let mut users: Vec<User> = self.tables.read().await.users.values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn user(&self, id: i64) -> Result<Option<User>, DbError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        Ok(self.tables.read().await.users.values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&self, new: &NewUser) -> Result<i64, DbError> {
        log::trace!("MemStore::insert_user( {:?}, {:?} ) called.", &new.name, &new.email);

        let mut tabs = self.tables.write().await;
        tabs.check_email(&new.email, 0)?;
        let id = tabs.new_id();
        tabs.users.insert(id, User {
            id,
            name: new.name.clone(),
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            role: new.role,
            registered: crate::now(),
            active: true,
        });
        Ok(id)
    }

    async fn update_user(&self, u: &User) -> Result<(), DbError> {
        let mut tabs = self.tables.write().await;
        tabs.check_email(&u.email, u.id)?;
        match tabs.users.get_mut(&u.id) {
            Some(x) => {
                let registered = x.registered;
                *x = u.clone();
                x.registered = registered;
                Ok(())
            },
            None => Err(DbError(format!("There is no user with id {}.", &u.id))),
        }
    }

    async fn delete_user(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("MemStore::delete_user( {} ) called.", &id);

        let mut tabs = self.tables.write().await;
        let sids: Vec<i64> = tabs.students.values()
            .filter(|s| s.user_id == id)
            .map(|s| s.id)
            .collect();
        for sid in sids.into_iter() {
            tabs.remove_student(sid);
        }
        let tids: Vec<i64> = tabs.teachers.values()
            .filter(|t| t.user_id == id)
            .map(|t| t.id)
            .collect();
        for tid in tids.into_iter() {
            tabs.remove_teacher(tid);
        }
        Ok(tabs.users.remove(&id).is_some())
    }
}

#[async_trait]
impl StudentRepo for MemStore {
    async fn students(&self) -> Result<Vec<Student>, DbError> {
        Ok(self.tables.read().await.students.values().cloned().collect())
    }

    async fn student(&self, id: i64) -> Result<Option<Student>, DbError> {
        Ok(self.tables.read().await.students.get(&id).cloned())
    }

    async fn student_by_user(&self, user_id: i64) -> Result<Option<Student>, DbError> {
        Ok(self.tables.read().await.students.values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn insert_student(&self, s: &Student) -> Result<i64, DbError> {
        let mut tabs = self.tables.write().await;
        let mut s = s.clone();
        s.id = 0;
        tabs.check_student(&s)?;
        s.id = tabs.new_id();
        let id = s.id;
        tabs.students.insert(id, s);
        Ok(id)
    }

    async fn update_student(&self, s: &Student) -> Result<(), DbError> {
        let mut tabs = self.tables.write().await;
        if !tabs.students.contains_key(&s.id) {
            return Err(DbError(format!("There is no student with id {}.", &s.id)));
        }
        tabs.check_student(s)?;
        tabs.students.insert(s.id, s.clone());
        Ok(())
    }

    async fn delete_student(&self, id: i64) -> Result<bool, DbError> {
        Ok(self.tables.write().await.remove_student(id))
    }
}

#[async_trait]
impl TeacherRepo for MemStore {
    async fn teachers(&self) -> Result<Vec<Teacher>, DbError> {
        Ok(self.tables.read().await.teachers.values().cloned().collect())
    }

    async fn teacher(&self, id: i64) -> Result<Option<Teacher>, DbError> {
        Ok(self.tables.read().await.teachers.get(&id).cloned())
    }

    async fn teacher_by_user(&self, user_id: i64) -> Result<Option<Teacher>, DbError> {
        Ok(self.tables.read().await.teachers.values()
            .find(|t| t.user_id == user_id)
            .cloned())
    }

    async fn insert_teacher(&self, t: &Teacher) -> Result<i64, DbError> {
        let mut tabs = self.tables.write().await;
        let mut t = t.clone();
        t.id = 0;
        tabs.check_teacher(&t)?;
        t.id = tabs.new_id();
        let id = t.id;
        tabs.teachers.insert(id, t);
        Ok(id)
    }

    async fn update_teacher(&self, t: &Teacher) -> Result<(), DbError> {
        let mut tabs = self.tables.write().await;
        if !tabs.teachers.contains_key(&t.id) {
            return Err(DbError(format!("There is no teacher with id {}.", &t.id)));
        }
        tabs.check_teacher(t)?;
        tabs.teachers.insert(t.id, t.clone());
        Ok(())
    }

    async fn delete_teacher(&self, id: i64) -> Result<bool, DbError> {
        log::trace!("MemStore::delete_teacher( {} ) called.", &id);
        Ok(self.tables.write().await.remove_teacher(id))
    }
}

#[async_trait]
impl LessonRepo for MemStore {
    async fn lessons(&self) -> Result<Vec<Lesson>, DbError> {
        Ok(self.tables.read().await.lessons.values().cloned().collect())
    }

    async fn lesson(&self, id: i64) -> Result<Option<Lesson>, DbError> {
        Ok(self.tables.read().await.lessons.get(&id).cloned())
    }

    async fn lessons_by_teacher(&self, teacher_id: i64) -> Result<Vec<Lesson>, DbError> {
        Ok(self.tables.read().await.lessons.values()
            .filter(|l| l.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    async fn lessons_by_level(&self, level_id: i64) -> Result<Vec<Lesson>, DbError> {
        Ok(self.tables.read().await.lessons.values()
            .filter(|l| l.level_id == Some(level_id))
            .cloned()
            .collect())
    }

    async fn insert_lesson(&self, l: &Lesson) -> Result<i64, DbError> {
        let mut tabs = self.tables.write().await;
        tabs.check_lesson(l)?;
        let id = tabs.new_id();
        let mut l = l.clone();
        l.id = id;
        tabs.lessons.insert(id, l);
        Ok(id)
    }

    async fn update_lesson(&self, l: &Lesson) -> Result<(), DbError> {
        let mut tabs = self.tables.write().await;
        if !tabs.lessons.contains_key(&l.id) {
            return Err(DbError(format!("There is no lesson with id {}.", &l.id)));
        }
        tabs.check_lesson(l)?;
        tabs.lessons.insert(l.id, l.clone());
        Ok(())
    }

    async fn delete_lesson(&self, id: i64) -> Result<bool, DbError> {
        Ok(self.tables.write().await.remove_lesson(id))
    }
}

#[async_trait]
impl ExerciseRepo for MemStore {
    async fn exercises(&self) -> Result<Vec<Exercise>, DbError> {
        Ok(self.tables.read().await.exercises.values().cloned().collect())
    }

    async fn exercise(&self, id: i64) -> Result<Option<Exercise>, DbError> {
        Ok(self.tables.read().await.exercises.get(&id).cloned())
    }

    async fn exercises_by_lesson(&self, lesson_id: i64) -> Result<Vec<Exercise>, DbError> {
        Ok(self.tables.read().await.exercises.values()
            .filter(|x| x.lesson_id == lesson_id)
            .cloned()
            .collect())
    }

    async fn insert_exercise(&self, x: &Exercise) -> Result<i64, DbError> {
        let mut tabs = self.tables.write().await;
        tabs.check_exercise(x)?;
        let id = tabs.new_id();
        let mut x = x.clone();
        x.id = id;
        tabs.exercises.insert(id, x);
        Ok(id)
    }

    async fn update_exercise(&self, x: &Exercise) -> Result<(), DbError> {
        let mut tabs = self.tables.write().await;
        if !tabs.exercises.contains_key(&x.id) {
            return Err(DbError(format!("There is no exercise with id {}.", &x.id)));
        }
        tabs.check_exercise(x)?;
        tabs.exercises.insert(x.id, x.clone());
        Ok(())
    }

    async fn delete_exercise(&self, id: i64) -> Result<bool, DbError> {
        Ok(self.tables.write().await.remove_exercise(id))
    }
}

#[async_trait]
impl ProgressRepo for MemStore {
    async fn progress(&self) -> Result<Vec<Progress>, DbError> {
        let mut recs: Vec<Progress> = self.tables.read().await.progress.values()
            .cloned()
            .collect();
        recs.sort_by(|a, b| b.completed.cmp(&a.completed));
        Ok(recs)
    }

    async fn progress_by_student(&self, student_id: i64) -> Result<Vec<Progress>, DbError> {
        let mut recs: Vec<Progress> = self.tables.read().await.progress.values()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect();
        recs.sort_by(|a, b| b.completed.cmp(&a.completed));
        Ok(recs)
    }

    async fn insert_progress(&self, p: &Progress) -> Result<i64, DbError> {
        let mut tabs = self.tables.write().await;
        if !tabs.students.contains_key(&p.student_id) {
            return Err(DbError(format!("There is no student with id {}.", &p.student_id)));
        }
        if !tabs.exercises.contains_key(&p.exercise_id) {
            return Err(DbError(format!("There is no exercise with id {}.", &p.exercise_id)));
        }
        let id = tabs.new_id();
        let mut p = p.clone();
        p.id = id;
        tabs.progress.insert(id, p);
        Ok(id)
    }
}

#[async_trait]
impl Repo for MemStore {
    async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("MemStore::ensure_db_schema() called; nothing to do.");
        Ok(())
    }

    async fn insert_levels(&self, names: &[&str]) -> Result<usize, DbError> {
        log::trace!("MemStore::insert_levels( {:?} ) called.", names);

        let mut tabs = self.tables.write().await;
        let mut n_inserted: usize = 0;
        for name in names.iter() {
            if tabs.check_level_name(name, 0).is_ok() {
                let id = tabs.new_id();
                tabs.levels.insert(id, Level { id, name: (*name).to_owned() });
                n_inserted += 1;
            }
        }
        Ok(n_inserted)
    }
}
